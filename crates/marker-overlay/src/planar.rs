//! Perspective warp of a flat image onto detected markers.

use log::{debug, trace};
use marker_overlay_aruco::MarkerDetection;
use marker_overlay_core::{homography_from_4pt, Homography};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::asset::OverlayAsset;
use crate::raster::fill_quad;
use crate::Frame;

/// Replaces every marker quad with the warped overlay asset.
#[derive(Clone, Debug)]
pub struct PlanarOverlayCompositor {
    asset: OverlayAsset,
}

impl PlanarOverlayCompositor {
    pub fn new(asset: OverlayAsset) -> Self {
        Self { asset }
    }

    /// Asset-to-image homography mapping `(0,0), (W,0), (W,H), (0,H)` onto
    /// the marker corners (TL, TR, BR, BL).
    pub fn homography_for(&self, corners: &[Point2<f64>; 4]) -> Option<Homography> {
        let (w, h) = (self.asset.width() as f64, self.asset.height() as f64);
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(w, 0.0),
            Point2::new(w, h),
            Point2::new(0.0, h),
        ];
        homography_from_4pt(&src, corners)
    }

    /// Warp the asset into one marker quad. Returns `false` when the
    /// marker geometry is singular and nothing was drawn.
    pub fn composite_into(&self, frame: &mut Frame, detection: &MarkerDetection) -> bool {
        let Some(inv) = self
            .homography_for(&detection.corners)
            .and_then(|h| h.inverse())
        else {
            debug!("marker {}: singular homography, skipped", detection.id);
            return false;
        };

        let (fw, fh) = frame.dimensions();
        let mut written = 0usize;
        fill_quad(fw, fh, &detection.corners, |x, y| {
            let p = inv.apply(Point2::new(x as f64, y as f64));
            frame.put_pixel(x, y, image::Rgb(self.asset.sample(p.x, p.y)));
            written += 1;
        });
        trace!("marker {}: {} pixels composited", detection.id, written);
        true
    }

    /// Composite onto a copy of `frame`; later detections overwrite
    /// earlier ones where quads overlap.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(markers = detections.len()))
    )]
    pub fn apply(&self, frame: &Frame, detections: &[MarkerDetection]) -> Frame {
        let mut out = frame.clone();
        for det in detections {
            self.composite_into(&mut out, det);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn detection(id: u32, corners: [Point2<f64>; 4]) -> MarkerDetection {
        MarkerDetection {
            id,
            corners,
            rotation: 0,
            hamming: 0,
            border_score: 1.0,
            score: 1.0,
        }
    }

    fn solid_asset(w: u32, h: u32, c: [u8; 3]) -> OverlayAsset {
        OverlayAsset::from_rgb(RgbImage::from_pixel(w, h, Rgb(c))).expect("asset")
    }

    #[test]
    fn homography_maps_asset_corners_onto_marker() {
        let comp = PlanarOverlayCompositor::new(solid_asset(64, 48, [1, 2, 3]));
        let corners = [
            Point2::new(101.3, 52.7),
            Point2::new(180.9, 60.2),
            Point2::new(170.4, 140.8),
            Point2::new(95.1, 131.6),
        ];
        let h = comp.homography_for(&corners).expect("homography");
        let asset_corners = [(0.0, 0.0), (64.0, 0.0), (64.0, 48.0), (0.0, 48.0)];
        for ((x, y), c) in asset_corners.iter().zip(&corners) {
            let p = h.apply(Point2::new(*x, *y));
            assert!((p - c).norm() < 1e-6, "{p:?} vs {c:?}");
        }
    }

    #[test]
    fn pixels_outside_the_quad_are_untouched() {
        let frame = RgbImage::from_pixel(60, 40, Rgb([10, 20, 30]));
        let comp = PlanarOverlayCompositor::new(solid_asset(8, 8, [250, 0, 0]));
        let quad = [
            Point2::new(10.0, 5.0),
            Point2::new(30.0, 8.0),
            Point2::new(28.0, 30.0),
            Point2::new(12.0, 25.0),
        ];
        let out = comp.apply(&frame, &[detection(1, quad)]);

        let mut inside = Vec::new();
        fill_quad(60, 40, &quad, |x, y| inside.push((x, y)));
        assert!(!inside.is_empty());
        for (x, y, px) in out.enumerate_pixels() {
            if inside.contains(&(x, y)) {
                assert_eq!(px, &Rgb([250, 0, 0]));
            } else {
                assert_eq!(px, frame.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn later_detection_wins_on_overlap() {
        let frame = RgbImage::new(40, 40);
        let first = PlanarOverlayCompositor::new(solid_asset(4, 4, [255, 255, 255]));
        let quad_a = [
            Point2::new(5.0, 5.0),
            Point2::new(25.0, 5.0),
            Point2::new(25.0, 25.0),
            Point2::new(5.0, 25.0),
        ];
        let quad_b = [
            Point2::new(15.0, 15.0),
            Point2::new(35.0, 15.0),
            Point2::new(35.0, 35.0),
            Point2::new(15.0, 35.0),
        ];
        let out = first.apply(&frame, &[detection(1, quad_a), detection(2, quad_b)]);
        assert_eq!(out.get_pixel(20, 20), &Rgb([255, 255, 255]));

        let mut marked = frame.clone();
        let red = PlanarOverlayCompositor::new(solid_asset(4, 4, [255, 0, 0]));
        red.composite_into(&mut marked, &detection(1, quad_a));
        let blue = PlanarOverlayCompositor::new(solid_asset(4, 4, [0, 0, 255]));
        blue.composite_into(&mut marked, &detection(2, quad_b));
        assert_eq!(marked.get_pixel(20, 20), &Rgb([0, 0, 255]));
        assert_eq!(marked.get_pixel(10, 10), &Rgb([255, 0, 0]));
    }

    #[test]
    fn collapsed_quad_is_skipped() {
        let frame = RgbImage::from_pixel(20, 20, Rgb([7, 7, 7]));
        let comp = PlanarOverlayCompositor::new(solid_asset(4, 4, [255, 0, 0]));
        let line = [
            Point2::new(2.0, 2.0),
            Point2::new(6.0, 6.0),
            Point2::new(10.0, 10.0),
            Point2::new(14.0, 14.0),
        ];
        let out = comp.apply(&frame, &[detection(9, line)]);
        assert_eq!(out, frame);
    }

    #[test]
    fn asset_content_follows_marker_orientation() {
        // Left half black, right half white asset.
        let asset = RgbImage::from_fn(20, 20, |x, _| {
            if x < 10 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let comp = PlanarOverlayCompositor::new(OverlayAsset::from_rgb(asset).expect("asset"));
        let frame = RgbImage::from_pixel(50, 50, Rgb([128, 128, 128]));

        // Marker rotated by a quarter turn: its top-left is the image top-right.
        let corners = [
            Point2::new(40.0, 10.0),
            Point2::new(40.0, 40.0),
            Point2::new(10.0, 40.0),
            Point2::new(10.0, 10.0),
        ];
        let out = comp.apply(&frame, &[detection(0, corners)]);
        // Asset left half lands on the image top rows.
        assert_eq!(out.get_pixel(25, 13), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(25, 37), &Rgb([255, 255, 255]));
    }
}
