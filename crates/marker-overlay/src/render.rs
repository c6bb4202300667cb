//! Pose estimation and wireframe cube rendering.

use image::Rgb;
use log::{debug, trace};
use marker_overlay_aruco::MarkerDetection;
use marker_overlay_core::{solve_planar_pnp, CameraModel, PnpParams, Pose};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::PipelineError;
use crate::raster::draw_thick_line;
use crate::Frame;

/// Eight cube vertices standing on a square marker of side `L`.
///
/// Base `0..4` is the marker square `(0,0,0) (L,0,0) (L,L,0) (0,L,0)`,
/// top `4..8` is the same square at `z = -L` (towards the camera).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubeModel {
    pub points: [Point3<f64>; 8],
}

impl CubeModel {
    /// Vertex index pairs: base ring, top ring, verticals.
    pub const EDGES: [(usize, usize); 12] = [
        (0, 1),
        (1, 2),
        (2, 3),
        (3, 0),
        (4, 5),
        (5, 6),
        (6, 7),
        (7, 4),
        (0, 4),
        (1, 5),
        (2, 6),
        (3, 7),
    ];

    pub fn new(side: f64) -> Self {
        let l = side;
        Self {
            points: [
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(l, 0.0, 0.0),
                Point3::new(l, l, 0.0),
                Point3::new(0.0, l, 0.0),
                Point3::new(0.0, 0.0, -l),
                Point3::new(l, 0.0, -l),
                Point3::new(l, l, -l),
                Point3::new(0.0, l, -l),
            ],
        }
    }

    /// Marker corners in object space, TL, TR, BR, BL.
    pub fn base(&self) -> [Point3<f64>; 4] {
        [self.points[0], self.points[1], self.points[2], self.points[3]]
    }
}

/// Line style of the wireframe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeStyle {
    pub thickness: u32,
    /// RGB.
    pub color: [u8; 3],
}

impl Default for CubeStyle {
    fn default() -> Self {
        Self {
            thickness: 5,
            color: [0, 0, 255],
        }
    }
}

/// Solves each marker's pose and draws a cube on it.
///
/// Without an explicit camera the intrinsics are estimated from the first
/// frame seen and then reused for the renderer's lifetime.
#[derive(Clone, Debug)]
pub struct PoseOverlayRenderer {
    cube: CubeModel,
    marker_length: f64,
    camera: Option<CameraModel>,
    pnp: PnpParams,
    style: CubeStyle,
}

impl PoseOverlayRenderer {
    pub fn new(marker_length: f64) -> Result<Self, PipelineError> {
        if !marker_length.is_finite() || marker_length <= 0.0 {
            return Err(PipelineError::InvalidMarkerLength(marker_length));
        }
        Ok(Self {
            cube: CubeModel::new(marker_length),
            marker_length,
            camera: None,
            pnp: PnpParams::default(),
            style: CubeStyle::default(),
        })
    }

    pub fn with_camera(mut self, camera: CameraModel) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_pnp_params(mut self, pnp: PnpParams) -> Self {
        self.pnp = pnp;
        self
    }

    pub fn with_style(mut self, style: CubeStyle) -> Self {
        self.style = style;
        self
    }

    #[inline]
    pub fn marker_length(&self) -> f64 {
        self.marker_length
    }

    /// The camera in use, if one was supplied or already estimated.
    #[inline]
    pub fn camera(&self) -> Option<&CameraModel> {
        self.camera.as_ref()
    }

    pub fn cube(&self) -> &CubeModel {
        &self.cube
    }

    pub fn style(&self) -> CubeStyle {
        self.style
    }

    fn camera_for(&mut self, frame: &Frame) -> CameraModel {
        *self.camera.get_or_insert_with(|| {
            let cam = CameraModel::estimate_from_image_size(frame.width(), frame.height());
            debug!(
                "estimated camera from {}x{} frame: fx={:.1} cx={:.1} cy={:.1}",
                frame.width(),
                frame.height(),
                cam.intrinsics.fx,
                cam.intrinsics.cx,
                cam.intrinsics.cy
            );
            cam
        })
    }

    /// Pose of one marker, or `None` when the solve is rejected.
    pub fn estimate_pose(&self, camera: &CameraModel, detection: &MarkerDetection) -> Option<Pose> {
        match solve_planar_pnp(&self.cube.base(), &detection.corners, camera, &self.pnp) {
            Ok(sol) => {
                trace!(
                    "marker {}: pose rms {:.3}px after {} iterations",
                    detection.id,
                    sol.rms_px,
                    sol.iterations
                );
                Some(sol.pose)
            }
            Err(err) => {
                debug!("marker {}: pose rejected: {err}", detection.id);
                None
            }
        }
    }

    /// Draw the cube for every marker whose pose solves. Returns the number
    /// of markers drawn.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(markers = detections.len()))
    )]
    pub fn apply(&mut self, frame: &mut Frame, detections: &[MarkerDetection]) -> usize {
        if frame.width() == 0 || frame.height() == 0 {
            return 0;
        }
        let camera = self.camera_for(frame);
        let color = Rgb(self.style.color);

        let mut drawn = 0;
        for det in detections {
            let Some(pose) = self.estimate_pose(&camera, det) else {
                continue;
            };
            let projected = pose.project_points(&camera, &self.cube.points);
            draw_edges(frame, &projected, self.style.thickness, color);
            drawn += 1;
        }
        drawn
    }
}

fn draw_edges(frame: &mut Frame, projected: &[Option<Point2<f64>>], thickness: u32, color: Rgb<u8>) {
    for &(i, j) in &CubeModel::EDGES {
        // Edges with an endpoint behind the camera are left out.
        if let (Some(a), Some(b)) = (projected[i], projected[j]) {
            draw_thick_line(frame, a, b, thickness, color);
        }
    }
}
