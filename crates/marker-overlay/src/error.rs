use std::path::PathBuf;

use marker_overlay_aruco::DetectorError;

use crate::asset::AssetError;
use crate::config::ConfigError;
use crate::io::{SinkError, SourceError};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("planar mode requires an overlay image path")]
    MissingAssetPath,
    #[error("marker length must be positive and finite, got {0}")]
    InvalidMarkerLength(f64),
    #[error("invalid camera intrinsics (fx, fy must be positive and finite)")]
    InvalidCamera,
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("frame {index} is {got:?}, expected {expected:?} like the first frame")]
    FrameSizeChanged {
        index: usize,
        expected: (u32, u32),
        got: (u32, u32),
    },
    #[error("no frames found in {0}")]
    EmptySource(PathBuf),
}
