//! Quad coverage and thick line drawing on top of `imageproc::drawing`.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;
use nalgebra::{Point2, Vector2};

/// Vertices further out than this are not rasterized.
const MAX_COORD: f64 = 1.0e6;

fn to_pixel(p: Point2<f64>) -> Option<Point<i32>> {
    let ok = p.x.is_finite() && p.y.is_finite() && p.x.abs() <= MAX_COORD && p.y.abs() <= MAX_COORD;
    ok.then(|| Point::new(p.x.round() as i32, p.y.round() as i32))
}

/// `draw_polygon_mut` panics on rings whose last point repeats the first.
fn open_ring(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let mut ring: Vec<Point<i32>> = Vec::with_capacity(points.len());
    for &p in points {
        if ring.last() != Some(&p) {
            ring.push(p);
        }
    }
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// Call `visit(x, y)` for every frame pixel covered by the quad.
///
/// Corners are rounded to the pixel grid and boundary pixels are included.
pub fn fill_quad(width: u32, height: u32, corners: &[Point2<f64>; 4], mut visit: impl FnMut(u32, u32)) {
    if width == 0 || height == 0 {
        return;
    }
    let Some(px) = corners
        .iter()
        .map(|&c| to_pixel(c))
        .collect::<Option<Vec<_>>>()
    else {
        return;
    };

    let x_lo = px.iter().map(|p| p.x).min().unwrap_or(0).max(0);
    let y_lo = px.iter().map(|p| p.y).min().unwrap_or(0).max(0);
    let x_hi = px.iter().map(|p| p.x).max().unwrap_or(-1).min(width as i32 - 1);
    let y_hi = px.iter().map(|p| p.y).max().unwrap_or(-1).min(height as i32 - 1);
    if x_lo > x_hi || y_lo > y_hi {
        return;
    }

    // Rasterize into a mask covering only the clipped bounding box.
    let shifted: Vec<Point<i32>> = px.iter().map(|p| Point::new(p.x - x_lo, p.y - y_lo)).collect();
    let ring = open_ring(&shifted);
    let mut mask = GrayImage::new((x_hi - x_lo + 1) as u32, (y_hi - y_lo + 1) as u32);
    if ring.len() > 1 {
        draw_polygon_mut(&mut mask, &ring, Luma([255]));
    } else {
        // All corners on one in-frame pixel; the mask is that pixel.
        mask.put_pixel(0, 0, Luma([255]));
    }

    for (x, y, v) in mask.enumerate_pixels() {
        if v[0] != 0 {
            visit(x + x_lo as u32, y + y_lo as u32);
        }
    }
}

/// Liang-Barsky clip of `a -> b` against `[x0, x1] x [y0, y1]`.
fn clip_segment(
    a: Point2<f64>,
    b: Point2<f64>,
    (x0, y0): (f64, f64),
    (x1, y1): (f64, f64),
) -> Option<(Point2<f64>, Point2<f64>)> {
    if ![a.x, a.y, b.x, b.y].iter().all(|v| v.is_finite()) {
        return None;
    }
    let d = b - a;
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-d.x, a.x - x0),
        (d.x, x1 - a.x),
        (-d.y, a.y - y0),
        (d.y, y1 - a.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((a + d * t0, a + d * t1))
}

/// Draw a segment `thickness` pixels wide with round caps.
///
/// The segment is clipped to the image first, so far-away or partially
/// visible endpoints cost no more than the visible part.
pub fn draw_thick_line(img: &mut RgbImage, a: Point2<f64>, b: Point2<f64>, thickness: u32, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let thickness = thickness.max(1);
    let radius = (thickness - 1) / 2;
    let margin = radius as f64 + 1.0;
    let Some((a, b)) = clip_segment(
        a,
        b,
        (-margin, -margin),
        (w as f64 - 1.0 + margin, h as f64 - 1.0 + margin),
    ) else {
        return;
    };

    if thickness == 1 {
        draw_line_segment_mut(img, (a.x as f32, a.y as f32), (b.x as f32, b.y as f32), color);
        return;
    }

    let half = (thickness - 1) as f64 / 2.0;
    let d = b - a;
    let len = d.norm();
    if len > 1e-9 {
        let n = Vector2::new(-d.y, d.x) * (half / len);
        let band = [a + n, b + n, b - n, a - n].map(|p| Point::new(p.x.round() as i32, p.y.round() as i32));
        let ring = open_ring(&band);
        if ring.len() > 1 {
            draw_polygon_mut(img, &ring, color);
        }
    }
    for end in [a, b] {
        let c = (end.x.round() as i32, end.y.round() as i32);
        draw_filled_circle_mut(img, c, radius as i32, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered(w: u32, h: u32, q: &[Point2<f64>; 4]) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        fill_quad(w, h, q, |x, y| out.push((x, y)));
        out
    }

    #[test]
    fn axis_aligned_square_includes_boundary() {
        let q = [
            Point2::new(2.0, 3.0),
            Point2::new(5.0, 3.0),
            Point2::new(5.0, 6.0),
            Point2::new(2.0, 6.0),
        ];
        let px = covered(10, 10, &q);
        assert_eq!(px.len(), 16);
        assert!(px.contains(&(2, 3)));
        assert!(px.contains(&(5, 6)));
        assert!(!px.contains(&(6, 6)));
    }

    #[test]
    fn corners_are_rounded_and_clipped() {
        let q = [
            Point2::new(-4.6, -2.2),
            Point2::new(1.4, -2.2),
            Point2::new(1.4, 0.6),
            Point2::new(-4.6, 0.6),
        ];
        let mut px = covered(8, 8, &q);
        px.sort_unstable();
        assert_eq!(px, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn diamond_rows_follow_the_edges() {
        let q = [
            Point2::new(4.0, 0.0),
            Point2::new(8.0, 4.0),
            Point2::new(4.0, 8.0),
            Point2::new(0.0, 4.0),
        ];
        let px = covered(10, 10, &q);
        let mut row2: Vec<u32> = px.iter().filter(|p| p.1 == 2).map(|p| p.0).collect();
        row2.sort_unstable();
        assert_eq!(row2, vec![2, 3, 4, 5, 6]);
        assert_eq!(px.iter().filter(|p| p.1 == 0).count(), 1);
    }

    #[test]
    fn tiny_quad_collapsing_to_one_pixel_is_covered() {
        let q = [
            Point2::new(3.1, 3.1),
            Point2::new(3.2, 3.1),
            Point2::new(3.2, 3.2),
            Point2::new(3.1, 3.2),
        ];
        assert_eq!(covered(8, 8, &q), vec![(3, 3)]);
    }

    #[test]
    fn non_finite_or_far_quad_draws_nothing() {
        let q = [Point2::new(f64::NAN, 0.0); 4];
        assert!(covered(10, 10, &q).is_empty());
        let far = [
            Point2::new(-1e9, -1e9),
            Point2::new(1e9, -1e9),
            Point2::new(1e9, 1e9),
            Point2::new(-1e9, 1e9),
        ];
        assert!(covered(10, 10, &far).is_empty());
    }

    #[test]
    fn thick_line_covers_a_band() {
        let mut img = RgbImage::new(20, 20);
        let blue = Rgb([0, 0, 255]);
        draw_thick_line(&mut img, Point2::new(2.0, 10.0), Point2::new(17.0, 10.0), 5, blue);
        assert_eq!(img.get_pixel(10, 10), &blue);
        assert_eq!(img.get_pixel(10, 8), &blue);
        assert_eq!(img.get_pixel(10, 12), &blue);
        assert_eq!(img.get_pixel(10, 13), &Rgb([0, 0, 0]));
        assert_eq!(img.get_pixel(0, 10), &blue);
        assert_eq!(img.get_pixel(19, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn long_line_is_clipped_to_the_frame() {
        let mut img = RgbImage::new(30, 20);
        let red = Rgb([255, 0, 0]);
        draw_thick_line(&mut img, Point2::new(-1e12, 5.0), Point2::new(1e12, 5.0), 3, red);
        assert!((0..30).all(|x| img.get_pixel(x, 5) == &red));
        assert_eq!(img.get_pixel(15, 8), &Rgb([0, 0, 0]));

        let mut untouched = RgbImage::new(30, 20);
        draw_thick_line(&mut untouched, Point2::new(-50.0, -50.0), Point2::new(-10.0, -40.0), 5, red);
        assert!(untouched.pixels().all(|p| p == &Rgb([0, 0, 0])));
    }

    #[test]
    fn segment_clip_keeps_inside_part() {
        let (a, b) = clip_segment(
            Point2::new(-10.0, 0.0),
            Point2::new(10.0, 0.0),
            (0.0, -1.0),
            (5.0, 1.0),
        )
        .expect("visible");
        assert_eq!(a, Point2::new(0.0, 0.0));
        assert_eq!(b, Point2::new(5.0, 0.0));
        assert!(clip_segment(
            Point2::new(0.0, 5.0),
            Point2::new(3.0, 5.0),
            (0.0, 0.0),
            (4.0, 4.0)
        )
        .is_none());
    }
}
