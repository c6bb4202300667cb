use marker_overlay_aruco::{
    dictionary_by_name, generate_marker, ArucoDetectorParams, MarkerDecoder, MarkerDetection,
    MarkerDetector,
};
use marker_overlay_core::{homography_from_4pt, GrayImage};
use nalgebra::Point2;

const SIDE: usize = 120;

fn marker(id: u32) -> GrayImage {
    let dict = dictionary_by_name("DICT_6X6_250").expect("dict");
    generate_marker(&dict, id, SIDE as u32, 1).expect("marker")
}

fn paste(canvas: &mut GrayImage, img: &GrayImage, x0: usize, y0: usize) {
    for y in 0..img.height {
        for x in 0..img.width {
            canvas.data[(y0 + y) * canvas.width + x0 + x] = img.data[y * img.width + x];
        }
    }
}

fn rotate_cw(img: &GrayImage) -> GrayImage {
    let n = img.width;
    let mut out = GrayImage::filled(n, n, 0);
    for y in 0..n {
        for x in 0..n {
            out.data[y * n + x] = img.data[(n - 1 - x) * n + y];
        }
    }
    out
}

fn assert_corners(det: &MarkerDetection, expected: [Point2<f64>; 4], tol: f64) {
    for (k, (c, e)) in det.corners.iter().zip(expected.iter()).enumerate() {
        assert!(
            (c - e).norm() <= tol,
            "corner {k}: got {c:?}, expected {e:?} (all: {:?})",
            det.corners
        );
    }
}

fn detector() -> MarkerDetector {
    MarkerDetector::new(ArucoDetectorParams::default()).expect("detector")
}

#[test]
fn detects_axis_aligned_marker_with_top_left_first() {
    let mut frame = GrayImage::filled(400, 300, 235);
    paste(&mut frame, &marker(17), 100, 80);

    let dets = detector().detect(&frame.view());
    assert_eq!(dets.len(), 1, "{dets:?}");
    let d = &dets[0];
    assert_eq!(d.id, 17);
    assert_eq!(d.hamming, 0);
    assert!(d.score > 0.9);

    let (x0, y0, x1, y1) = (100.0, 80.0, 219.0, 199.0);
    assert_corners(
        d,
        [
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        ],
        1.0,
    );
}

#[test]
fn rotated_marker_reports_its_own_top_left() {
    let mut frame = GrayImage::filled(400, 300, 235);
    paste(&mut frame, &rotate_cw(&marker(42)), 150, 90);

    let dets = detector().decode(&frame.view());
    assert_eq!(dets.len(), 1, "{dets:?}");
    let d = &dets[0];
    assert_eq!(d.id, 42);

    // A clockwise quarter turn puts the marker's top-left at the image
    // top-right of the pasted square.
    let (x0, y0, x1, y1) = (150.0, 90.0, 269.0, 209.0);
    assert_corners(
        d,
        [
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
            Point2::new(x0, y0),
        ],
        1.0,
    );
}

#[test]
fn perspective_warped_marker_is_found() {
    let m = marker(123);
    let s = SIDE as f64;
    let src = [
        Point2::new(0.0, 0.0),
        Point2::new(s, 0.0),
        Point2::new(s, s),
        Point2::new(0.0, s),
    ];
    let dst = [
        Point2::new(120.0, 60.0),
        Point2::new(290.0, 85.0),
        Point2::new(270.0, 240.0),
        Point2::new(100.0, 210.0),
    ];
    let h = homography_from_4pt(&src, &dst).expect("homography");
    let inv = h.inverse().expect("invertible");

    let mut frame = GrayImage::filled(400, 300, 235);
    for y in 0..frame.height {
        for x in 0..frame.width {
            let p = inv.apply(Point2::new(x as f64 + 0.5, y as f64 + 0.5));
            if p.x >= 0.0 && p.y >= 0.0 && p.x < s && p.y < s {
                frame.data[y * frame.width + x] = m.data[p.y as usize * SIDE + p.x as usize];
            }
        }
    }

    let dets = detector().detect(&frame.view());
    assert_eq!(dets.len(), 1, "{dets:?}");
    assert_eq!(dets[0].id, 123);
    assert_corners(&dets[0], dst, 2.5);
}

#[test]
fn several_markers_are_reported_once_each() {
    let mut frame = GrayImage::filled(640, 360, 240);
    paste(&mut frame, &marker(3), 40, 60);
    paste(&mut frame, &marker(200), 260, 120);
    paste(&mut frame, &marker(3), 460, 60);

    let mut dets = detector().detect(&frame.view());
    dets.sort_by_key(|d| d.id);
    let ids: Vec<u32> = dets.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![3, 200]);
}

#[test]
fn blank_frame_has_no_markers() {
    let frame = GrayImage::filled(320, 240, 128);
    assert!(detector().detect(&frame.view()).is_empty());
}
