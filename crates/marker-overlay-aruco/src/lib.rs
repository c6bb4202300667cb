//! Square fiducial marker detection.
//!
//! The detector binarizes the frame with a few adaptive-threshold windows,
//! traces the outer boundary of every dark blob, keeps convex quadrilaterals
//! and reads the bit grid inside each one. Codes are matched against the
//! built-in ArUco dictionaries from `calib-targets-aruco`, `DICT_6X6_250`
//! by default.
//!
//! ```no_run
//! use marker_overlay_aruco::{ArucoDetectorParams, MarkerDetector};
//! use marker_overlay_core::GrayImage;
//!
//! let detector = MarkerDetector::new(ArucoDetectorParams::default()).unwrap();
//! let frame = GrayImage::filled(640, 480, 255);
//! for m in detector.detect(&frame.view()) {
//!     println!("marker {} at {:?}", m.id, m.corners);
//! }
//! ```

mod contour;
mod detector;
mod generate;
mod quad;
mod scan;
mod threshold;

pub use calib_targets_aruco::Dictionary;
pub use detector::{
    default_max_hamming, dictionary_by_name, ArucoDetectorParams, DetectorError, MarkerDecoder,
    MarkerDetection, MarkerDetector, DEFAULT_DICTIONARY,
};
pub use generate::{generate_marker, with_quiet_zone, GenerateError};
