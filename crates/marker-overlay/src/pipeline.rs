//! Per-frame orchestration: detect markers, then run one overlay strategy.

use log::{debug, info};
use marker_overlay_aruco::{MarkerDecoder, MarkerDetection, MarkerDetector};
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::asset::OverlayAsset;
use crate::config::{OverlayConfig, OverlayMode};
use crate::error::PipelineError;
use crate::io::{FrameSink, FrameSource};
use crate::planar::PlanarOverlayCompositor;
use crate::render::PoseOverlayRenderer;
use crate::{detect_markers, Frame};

/// The overlay strategy a pipeline dispatches to.
#[derive(Clone, Debug)]
pub enum Overlay {
    Planar(PlanarOverlayCompositor),
    Pose(PoseOverlayRenderer),
}

impl Overlay {
    /// Build the strategy named by `config`, loading the asset in planar mode.
    pub fn from_config(config: &OverlayConfig) -> Result<Self, PipelineError> {
        match config.mode {
            OverlayMode::Planar => {
                let path = config
                    .overlay_path
                    .as_ref()
                    .ok_or(PipelineError::MissingAssetPath)?;
                let asset = OverlayAsset::load(path)?;
                Ok(Self::Planar(PlanarOverlayCompositor::new(asset)))
            }
            OverlayMode::Pose => {
                let mut renderer = PoseOverlayRenderer::new(config.marker_length)?
                    .with_pnp_params(config.pnp.clone())
                    .with_style(config.cube);
                if let Some(camera) = config.camera {
                    if !camera.intrinsics.is_valid() {
                        return Err(PipelineError::InvalidCamera);
                    }
                    renderer = renderer.with_camera(camera);
                }
                Ok(Self::Pose(renderer))
            }
        }
    }

    pub fn mode(&self) -> OverlayMode {
        match self {
            Self::Planar(_) => OverlayMode::Planar,
            Self::Pose(_) => OverlayMode::Pose,
        }
    }

    /// Draw onto `frame` for the given detections.
    pub fn apply(&mut self, frame: Frame, detections: &[MarkerDetection]) -> Frame {
        match self {
            Self::Planar(compositor) => compositor.apply(&frame, detections),
            Self::Pose(renderer) => {
                let mut frame = frame;
                renderer.apply(&mut frame, detections);
                frame
            }
        }
    }
}

/// Counters reported by [`FramePipeline::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub frames: usize,
    pub frames_with_markers: usize,
    pub markers: usize,
}

/// Marker detection followed by exactly one overlay strategy.
///
/// Frames are processed independently; the only state carried between
/// frames is the pose renderer's camera cache.
#[derive(Clone, Debug)]
pub struct FramePipeline<D = MarkerDetector> {
    decoder: D,
    overlay: Overlay,
}

impl FramePipeline<MarkerDetector> {
    /// Build the detector and the overlay strategy from a config.
    pub fn from_config(config: &OverlayConfig) -> Result<Self, PipelineError> {
        let detector = MarkerDetector::new(config.detector.clone())?;
        let overlay = Overlay::from_config(config)?;
        info!(
            "pipeline: {:?} overlay, dictionary {}",
            overlay.mode(),
            detector.dictionary().name
        );
        Ok(Self::new(detector, overlay))
    }
}

impl<D: MarkerDecoder> FramePipeline<D> {
    pub fn new(decoder: D, overlay: Overlay) -> Self {
        Self { decoder, overlay }
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Detect markers and composite the overlay. `None` passes through;
    /// frames without markers come back unchanged.
    pub fn process_frame(&mut self, frame: Option<Frame>) -> Option<Frame> {
        let frame = frame?;
        let (frame, _) = self.process_with_detections(frame);
        Some(frame)
    }

    /// Like [`process_frame`](Self::process_frame), also returning the
    /// detections that drove the overlay.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(w = frame.width(), h = frame.height()))
    )]
    pub fn process_with_detections(&mut self, frame: Frame) -> (Frame, Vec<MarkerDetection>) {
        let detections = detect_markers(&self.decoder, &frame);
        if detections.is_empty() {
            debug!("no markers");
            return (frame, detections);
        }
        debug!("{} markers", detections.len());
        let out = self.overlay.apply(frame, &detections);
        (out, detections)
    }

    /// Drive `source` into `sink` until the source is exhausted.
    ///
    /// Every frame must have the size of the first one.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> Result<RunStats, PipelineError> {
        let mut stats = RunStats::default();
        let mut expected = None;

        while let Some(frame) = source.next_frame()? {
            let dims = frame.dimensions();
            match expected {
                None => expected = Some(dims),
                Some(first) if first != dims => {
                    return Err(PipelineError::FrameSizeChanged {
                        index: stats.frames,
                        expected: first,
                        got: dims,
                    });
                }
                Some(_) => {}
            }

            let (out, detections) = self.process_with_detections(frame);
            stats.frames += 1;
            if !detections.is_empty() {
                stats.frames_with_markers += 1;
                stats.markers += detections.len();
            }
            sink.write_frame(&out)?;
        }
        sink.finish()?;

        info!(
            "processed {} frames, {} with markers, {} markers total",
            stats.frames, stats.frames_with_markers, stats.markers
        );
        Ok(stats)
    }
}
