//! Quadrilateral marker candidates from a grayscale image.

use log::trace;
use marker_overlay_core::GrayImageView;
use nalgebra::Point2;

use crate::contour::{approx_polygon, is_convex, outer_borders, perimeter, signed_area2};
use crate::detector::ArucoDetectorParams;
use crate::threshold::{adaptive_threshold, to_luma};

/// A convex 4-gon, clockwise on screen.
#[derive(Clone, Debug)]
pub(crate) struct QuadCandidate {
    pub corners: [Point2<f64>; 4],
    pub perimeter: f64,
}

/// Extract candidate quads over all configured threshold windows.
pub(crate) fn find_quad_candidates(
    img: &GrayImageView<'_>,
    params: &ArucoDetectorParams,
) -> Vec<QuadCandidate> {
    let Some(gray) = to_luma(img) else {
        return Vec::new();
    };
    let max_dim = img.width.max(img.height) as f64;
    let min_perimeter = params.min_marker_perimeter_rate * max_dim;
    let max_perimeter = params.max_marker_perimeter_rate * max_dim;

    let mut candidates = Vec::new();
    for &window in &params.adaptive_thresh_win_sizes {
        let mask = adaptive_threshold(&gray, window as u32, params.adaptive_thresh_constant);
        let before = candidates.len();

        for border in outer_borders(&mask) {
            if border.length < min_perimeter || border.length > max_perimeter {
                continue;
            }
            let eps = params.polygonal_approx_accuracy_rate * border.length;
            let poly = approx_polygon(&border.points, eps);
            if let Some(q) = quad_from_polygon(&poly, img, params) {
                candidates.push(q);
            }
        }
        trace!(
            "window {window}: {} quad candidates",
            candidates.len() - before
        );
    }

    merge_near_duplicates(candidates, params.min_marker_distance_rate)
}

fn quad_from_polygon(
    poly: &[Point2<f64>],
    img: &GrayImageView<'_>,
    params: &ArucoDetectorParams,
) -> Option<QuadCandidate> {
    if poly.len() != 4 || !is_convex(poly) {
        return None;
    }

    let mut corners = [poly[0], poly[1], poly[2], poly[3]];
    if signed_area2(&corners) < 0.0 {
        corners.swap(1, 3);
    }

    let per = perimeter(&corners);
    let min_side = (0..4)
        .map(|i| (corners[(i + 1) % 4] - corners[i]).norm())
        .fold(f64::INFINITY, f64::min);
    if min_side < params.min_corner_distance_rate * per {
        return None;
    }

    let border = params.min_distance_to_border as f64;
    let (w, h) = (img.width as f64, img.height as f64);
    if corners
        .iter()
        .any(|c| c.x < border || c.y < border || c.x > w - 1.0 - border || c.y > h - 1.0 - border)
    {
        return None;
    }

    Some(QuadCandidate {
        corners,
        perimeter: per,
    })
}

/// Mean corner distance between two clockwise quads, minimised over the
/// four cyclic alignments.
fn quad_distance(a: &[Point2<f64>; 4], b: &[Point2<f64>; 4]) -> f64 {
    (0..4)
        .map(|shift| {
            (0..4)
                .map(|i| (a[i] - b[(i + shift) % 4]).norm())
                .sum::<f64>()
                / 4.0
        })
        .fold(f64::INFINITY, f64::min)
}

/// Collapse candidates whose corners nearly coincide, keeping the larger.
fn merge_near_duplicates(mut candidates: Vec<QuadCandidate>, rate: f64) -> Vec<QuadCandidate> {
    candidates.sort_by(|a, b| b.perimeter.total_cmp(&a.perimeter));
    let mut kept: Vec<QuadCandidate> = Vec::with_capacity(candidates.len());
    for c in candidates {
        let duplicate = kept.iter().any(|k| {
            let limit = rate * c.perimeter.min(k.perimeter);
            quad_distance(&k.corners, &c.corners) < limit
        });
        if !duplicate {
            kept.push(c);
        }
    }
    kept
}
