//! Bit decoding of quad candidates through `calib-targets-aruco`.

use std::collections::BTreeMap;

use calib_targets_aruco::{decode_marker_in_cell, MarkerCell, Matcher, ScanDecodeConfig};
use calib_targets_core::GridCoords;
use log::trace;
use marker_overlay_core::GrayImageView;
use nalgebra::Point2;

use crate::detector::MarkerDetection;

/// Side of the square the candidate is rectified onto. Only the sampling
/// grid lives in this frame; pixel reads happen in the source image.
const CANONICAL_SIDE_PX: f32 = 64.0;

/// Per-candidate decoding settings. The quad is the marker's outer edge, so
/// there is no inset and no surrounding margin inside the cell.
pub(crate) fn scan_config(border_bits: usize, min_border_score: f32) -> ScanDecodeConfig {
    ScanDecodeConfig {
        border_bits,
        inset_frac: 0.0,
        marker_size_rel: 1.0,
        min_border_score,
        dedup_by_id: false,
        multi_threshold: true,
    }
}

fn cell_view<'a>(img: &GrayImageView<'a>) -> calib_targets_core::GrayImageView<'a> {
    calib_targets_core::GrayImageView {
        width: img.width,
        height: img.height,
        data: img.data,
    }
}

/// Decode one clockwise candidate quad. White-on-black markers are
/// dropped unless `accept_inverted` is set.
pub(crate) fn decode_candidate(
    img: &GrayImageView<'_>,
    corners: &[Point2<f64>; 4],
    cfg: &ScanDecodeConfig,
    matcher: &Matcher,
    accept_inverted: bool,
) -> Option<MarkerDetection> {
    let cell = MarkerCell {
        gc: GridCoords { i: 0, j: 0 },
        corners_img: corners.map(|c| Point2::new(c.x as f32, c.y as f32)),
    };
    let det = decode_marker_in_cell(&cell_view(img), &cell, CANONICAL_SIDE_PX, cfg, matcher)?;
    if det.inverted && !accept_inverted {
        trace!("id {} decoded with inverted polarity, ignored", det.id);
        return None;
    }
    Some(MarkerDetection {
        id: det.id,
        corners: rotate_corners(corners, det.rotation),
        rotation: det.rotation,
        hamming: det.hamming,
        border_score: det.border_score,
        score: det.score,
    })
}

/// Reorder candidate corners so index 0 is the marker's own top-left.
///
/// `rotation` is the matcher's rotation: the observed code equals the
/// dictionary code rotated `rotation` quarter turns, which puts the
/// dictionary's top-left cell at candidate corner `rotation`.
pub(crate) fn rotate_corners(corners: &[Point2<f64>; 4], rotation: u8) -> [Point2<f64>; 4] {
    let r = (rotation & 3) as usize;
    std::array::from_fn(|k| corners[(r + k) % 4])
}

/// One detection per id, the highest score winning; ordered by id.
pub(crate) fn best_per_id(dets: impl IntoIterator<Item = MarkerDetection>) -> Vec<MarkerDetection> {
    let mut best: BTreeMap<u32, MarkerDetection> = BTreeMap::new();
    for det in dets {
        match best.get(&det.id) {
            Some(kept) if kept.score >= det.score => {}
            _ => {
                best.insert(det.id, det);
            }
        }
    }
    best.into_values().collect()
}
