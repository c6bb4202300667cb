use calib_targets_aruco::{builtins, Dictionary, Matcher, ScanDecodeConfig};
use log::debug;
use marker_overlay_core::GrayImageView;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::quad::find_quad_candidates;
use crate::scan::{best_per_id, decode_candidate, scan_config};

/// Dictionary used when none is configured.
pub const DEFAULT_DICTIONARY: &str = "DICT_6X6_250";

/// One decoded marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerDetection {
    pub id: u32,
    /// Image corners, clockwise on screen, starting at the marker's own
    /// top-left corner (TL, TR, BR, BL). Pixel centers are integers.
    pub corners: [Point2<f64>; 4],
    /// Quarter turns between the dictionary pattern and the image.
    pub rotation: u8,
    pub hamming: u8,
    pub border_score: f32,
    /// Combined quality in `[0, 1]`.
    pub score: f32,
}

/// Turns a grayscale frame into marker detections.
pub trait MarkerDecoder {
    fn decode(&self, image: &GrayImageView<'_>) -> Vec<MarkerDetection>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("unknown marker dictionary `{0}`")]
    UnknownDictionary(String),
    #[error("adaptive threshold window sizes must be odd and >= 3, got {0:?}")]
    InvalidWindowSizes(Vec<usize>),
    #[error("invalid detector parameter `{name}`: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// Detector configuration. Defaults follow the usual ArUco detector
/// settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArucoDetectorParams {
    /// Built-in dictionary name.
    pub dictionary: String,
    /// Box sizes for the adaptive threshold passes.
    pub adaptive_thresh_win_sizes: Vec<usize>,
    /// A pixel is dark when it is this far below its local mean.
    pub adaptive_thresh_constant: f32,
    /// Contour length bounds relative to the larger image side.
    pub min_marker_perimeter_rate: f64,
    pub max_marker_perimeter_rate: f64,
    /// Polygon approximation tolerance relative to contour length.
    pub polygonal_approx_accuracy_rate: f64,
    /// Shortest allowed side relative to the quad perimeter.
    pub min_corner_distance_rate: f64,
    /// Corners closer than this to the image edge are rejected.
    pub min_distance_to_border: u32,
    /// Candidates closer than this (relative to perimeter) are merged.
    pub min_marker_distance_rate: f64,
    /// Border width in cells.
    pub marker_border_bits: usize,
    /// Required fraction of black border cells.
    pub min_border_score: f32,
    /// Hamming tolerance; `None` derives it from the dictionary's
    /// correction capacity.
    pub max_hamming: Option<u8>,
    /// Also try white-on-black markers.
    pub detect_inverted: bool,
}

impl Default for ArucoDetectorParams {
    fn default() -> Self {
        Self {
            dictionary: DEFAULT_DICTIONARY.to_string(),
            adaptive_thresh_win_sizes: vec![7, 23, 53],
            adaptive_thresh_constant: 7.0,
            min_marker_perimeter_rate: 0.03,
            max_marker_perimeter_rate: 4.0,
            polygonal_approx_accuracy_rate: 0.03,
            min_corner_distance_rate: 0.05,
            min_distance_to_border: 3,
            min_marker_distance_rate: 0.05,
            marker_border_bits: 1,
            min_border_score: 0.85,
            max_hamming: None,
            detect_inverted: false,
        }
    }
}

impl ArucoDetectorParams {
    pub fn validate(&self) -> Result<(), DetectorError> {
        let windows = &self.adaptive_thresh_win_sizes;
        if windows.is_empty() || windows.iter().any(|&w| w < 3 || w % 2 == 0) {
            return Err(DetectorError::InvalidWindowSizes(windows.clone()));
        }

        let positive: [(&'static str, f64); 4] = [
            ("min_marker_perimeter_rate", self.min_marker_perimeter_rate),
            ("max_marker_perimeter_rate", self.max_marker_perimeter_rate),
            (
                "polygonal_approx_accuracy_rate",
                self.polygonal_approx_accuracy_rate,
            ),
            ("marker_border_bits", self.marker_border_bits as f64),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(DetectorError::InvalidParameter { name, value });
            }
        }
        if self.max_marker_perimeter_rate < self.min_marker_perimeter_rate {
            return Err(DetectorError::InvalidParameter {
                name: "max_marker_perimeter_rate",
                value: self.max_marker_perimeter_rate,
            });
        }
        if !(0.0..=1.0).contains(&self.min_border_score) {
            return Err(DetectorError::InvalidParameter {
                name: "min_border_score",
                value: self.min_border_score as f64,
            });
        }
        Ok(())
    }
}

/// Look up a built-in dictionary by name, e.g. `DICT_6X6_250`.
pub fn dictionary_by_name(name: &str) -> Result<Dictionary, DetectorError> {
    builtins::builtin_dictionary(name).ok_or_else(|| DetectorError::UnknownDictionary(name.into()))
}

/// Hamming tolerance used when none is configured: 60 % of the
/// dictionary's correction capacity, rounded down.
pub fn default_max_hamming(dict: &Dictionary) -> u8 {
    (dict.max_correction_bits as u32 * 3 / 5) as u8
}

/// Square-marker detector: adaptive threshold, quad extraction, bit
/// decoding against a built-in dictionary.
#[derive(Clone, Debug)]
pub struct MarkerDetector {
    params: ArucoDetectorParams,
    matcher: Matcher,
    scan: ScanDecodeConfig,
}

impl MarkerDetector {
    pub fn new(params: ArucoDetectorParams) -> Result<Self, DetectorError> {
        params.validate()?;
        let dict = dictionary_by_name(&params.dictionary)?;
        let max_hamming = params
            .max_hamming
            .unwrap_or_else(|| default_max_hamming(&dict))
            .min(dict.max_correction_bits);
        let scan = scan_config(params.marker_border_bits, params.min_border_score);
        Ok(Self {
            params,
            matcher: Matcher::new(dict, max_hamming),
            scan,
        })
    }

    #[inline]
    pub fn params(&self) -> &ArucoDetectorParams {
        &self.params
    }

    #[inline]
    pub fn dictionary(&self) -> Dictionary {
        self.matcher.dictionary()
    }

    /// Detect markers; ids in the result are unique.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, image), fields(w = image.width, h = image.height))
    )]
    pub fn detect(&self, image: &GrayImageView<'_>) -> Vec<MarkerDetection> {
        if image.is_empty() {
            return Vec::new();
        }

        let candidates = find_quad_candidates(image, &self.params);
        let decoded: Vec<MarkerDetection> = candidates
            .iter()
            .filter_map(|cand| {
                decode_candidate(
                    image,
                    &cand.corners,
                    &self.scan,
                    &self.matcher,
                    self.params.detect_inverted,
                )
            })
            .collect();

        let n_decoded = decoded.len();
        let out = best_per_id(decoded);
        debug!(
            "{} candidates, {} decoded, {} unique markers",
            candidates.len(),
            n_decoded,
            out.len()
        );
        out
    }
}

impl MarkerDecoder for MarkerDetector {
    fn decode(&self, image: &GrayImageView<'_>) -> Vec<MarkerDetection> {
        self.detect(image)
    }
}
