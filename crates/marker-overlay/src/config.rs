//! JSON configuration for overlay runs.

use std::fs;
use std::path::{Path, PathBuf};

use marker_overlay_aruco::ArucoDetectorParams;
use marker_overlay_core::{CameraModel, PnpParams};
use serde::{Deserialize, Serialize};

use crate::render::CubeStyle;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Which overlay strategy a pipeline runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    /// Warp a flat image onto each marker.
    #[default]
    Planar,
    /// Draw a wireframe cube standing on each marker.
    Pose,
}

fn default_marker_length() -> f64 {
    0.05
}

/// Everything needed to build a [`FramePipeline`](crate::FramePipeline).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default)]
    pub mode: OverlayMode,
    /// Overlay image; required in planar mode.
    #[serde(default)]
    pub overlay_path: Option<PathBuf>,
    /// Physical marker side, in the unit the cube is drawn in.
    #[serde(default = "default_marker_length")]
    pub marker_length: f64,
    /// Camera model; estimated from the first frame when absent.
    #[serde(default)]
    pub camera: Option<CameraModel>,
    #[serde(default)]
    pub detector: ArucoDetectorParams,
    #[serde(default)]
    pub pnp: PnpParams,
    #[serde(default)]
    pub cube: CubeStyle,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            mode: OverlayMode::default(),
            overlay_path: None,
            marker_length: default_marker_length(),
            camera: None,
            detector: ArucoDetectorParams::default(),
            pnp: PnpParams::default(),
            cube: CubeStyle::default(),
        }
    }
}

impl OverlayConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
