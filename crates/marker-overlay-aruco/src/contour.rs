//! Blob borders and their polygon approximations.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;
use nalgebra::Point2;

/// One traced outer border.
#[derive(Clone, Debug)]
pub(crate) struct Border {
    pub points: Vec<Point<i32>>,
    /// Closed arc length in pixels.
    pub length: f64,
}

/// Outer borders of every foreground blob in `mask`. Hole borders are
/// dropped; blobs nested inside holes still contribute their own outer
/// border.
pub(crate) fn outer_borders(mask: &GrayImage) -> Vec<Border> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.points.len() >= 3)
        .map(|c| {
            let length = arc_length(&c.points, true);
            Border {
                points: c.points,
                length,
            }
        })
        .collect()
}

fn point_line_distance(p: Point2<f64>, a: Point2<f64>, b: Point2<f64>) -> f64 {
    let ab = b - a;
    let len = ab.norm();
    if len < 1e-12 {
        return (p - a).norm();
    }
    ab.perp(&(p - a)).abs() / len
}

/// Closed polygon within `eps` pixels of the border.
///
/// The Douglas-Peucker pass always keeps the border's first point, so a
/// final sweep removes vertices lying within `eps` of the chord between
/// their neighbours.
pub(crate) fn approx_polygon(border: &[Point<i32>], eps: f64) -> Vec<Point2<f64>> {
    if border.len() < 3 || !eps.is_finite() || eps <= 0.0 {
        return Vec::new();
    }
    let mut poly: Vec<Point2<f64>> = approximate_polygon_dp(border, eps, true)
        .into_iter()
        .map(|p| Point2::new(p.x as f64, p.y as f64))
        .collect();

    while poly.len() > 3 {
        let m = poly.len();
        let flattest = (0..m)
            .map(|i| {
                let d = point_line_distance(poly[i], poly[(i + m - 1) % m], poly[(i + 1) % m]);
                (i, d)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match flattest {
            Some((i, d)) if d < eps => {
                poly.remove(i);
            }
            _ => break,
        }
    }
    poly
}

/// Twice the signed area; positive for clockwise-on-screen polygons.
pub(crate) fn signed_area2(poly: &[Point2<f64>]) -> f64 {
    let n = poly.len();
    (0..n)
        .map(|i| {
            let a = poly[i];
            let b = poly[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum()
}

pub(crate) fn is_convex(poly: &[Point2<f64>]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f64;
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        let c = poly[(i + 2) % n];
        let cross = (b - a).perp(&(c - b));
        if cross.abs() < 1e-9 {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

pub(crate) fn perimeter(poly: &[Point2<f64>]) -> f64 {
    let n = poly.len();
    (0..n).map(|i| (poly[(i + 1) % n] - poly[i]).norm()).sum()
}
