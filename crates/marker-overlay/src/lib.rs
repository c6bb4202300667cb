//! Perspective-correct overlays on square fiducial markers.
//!
//! A [`FramePipeline`] detects ArUco markers in each RGB frame and hands
//! the detections to one overlay strategy:
//!
//! - [`PlanarOverlayCompositor`] warps a flat image onto every marker
//!   through the asset-to-marker homography,
//! - [`PoseOverlayRenderer`] solves each marker's 3D pose and draws a
//!   wireframe cube standing on it.
//!
//! Frames are `image::RgbImage`s. Sources and sinks for image files and
//! image sequences live in [`io`].
//!
//! ```no_run
//! use marker_overlay::{FramePipeline, OverlayConfig, OverlayMode};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OverlayConfig {
//!     mode: OverlayMode::Pose,
//!     ..OverlayConfig::default()
//! };
//! let mut pipeline = FramePipeline::from_config(&config)?;
//! let frame = image::open("frame.png")?.to_rgb8();
//! if let Some(out) = pipeline.process_frame(Some(frame)) {
//!     out.save("frame_overlay.png")?;
//! }
//! # Ok(())
//! # }
//! ```

pub use marker_overlay_aruco as aruco;
pub use marker_overlay_core as core;

mod asset;
mod config;
mod error;
pub mod io;
mod pipeline;
mod planar;
mod raster;
mod render;

pub use asset::{AssetError, OverlayAsset};
pub use config::{ConfigError, OverlayConfig, OverlayMode};
pub use error::PipelineError;
pub use marker_overlay_aruco::{ArucoDetectorParams, MarkerDecoder, MarkerDetection, MarkerDetector};
pub use marker_overlay_core::{CameraIntrinsics, CameraModel, Distortion, PnpParams, Pose};
pub use pipeline::{FramePipeline, Overlay, RunStats};
pub use planar::PlanarOverlayCompositor;
pub use raster::{draw_thick_line, fill_quad};
pub use render::{CubeModel, CubeStyle, PoseOverlayRenderer};

use marker_overlay_core::{GrayImage, GrayImageView};

/// An RGB video frame.
pub type Frame = image::RgbImage;

/// Luma of an RGB frame (Rec. 601 weights, rounded).
pub fn to_gray(frame: &Frame) -> GrayImage {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let data = frame
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
        })
        .collect();
    GrayImage {
        width: w,
        height: h,
        data,
    }
}

/// Borrow a grayscale buffer as a view.
#[inline]
pub fn gray_view(img: &GrayImage) -> GrayImageView<'_> {
    img.view()
}

/// Run `decoder` on an RGB frame. Zero-size frames yield no detections.
pub fn detect_markers<D: MarkerDecoder + ?Sized>(decoder: &D, frame: &Frame) -> Vec<MarkerDetection> {
    if frame.width() == 0 || frame.height() == 0 {
        return Vec::new();
    }
    let gray = to_gray(frame);
    decoder.decode(&gray_view(&gray))
}
