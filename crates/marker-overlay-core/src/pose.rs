use nalgebra::{Point2, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;

/// Marker-to-camera transform: `X_cam = R(rvec) * X_obj + tvec`.
///
/// `rvec` is an axis-angle vector whose norm is the rotation angle in
/// radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl Pose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    pub fn from_rotation(rotation: &Rotation3<f64>, tvec: Vector3<f64>) -> Self {
        Self {
            rvec: rotation.scaled_axis(),
            tvec,
        }
    }

    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::new(self.rvec)
    }

    pub fn is_finite(&self) -> bool {
        self.rvec.iter().chain(self.tvec.iter()).all(|v| v.is_finite())
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation() * p + self.tvec
    }

    /// Project object points into the image.
    ///
    /// Entries are `None` for points that land at or behind the camera.
    pub fn project_points(
        &self,
        camera: &CameraModel,
        object: &[Point3<f64>],
    ) -> Vec<Option<Point2<f64>>> {
        object
            .iter()
            .map(|p| camera.project(&self.transform_point(p)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn projection_goes_through_the_camera_frame() {
        let cam = CameraModel::estimate_from_image_size(200, 100);
        let pose = Pose::new(Vector3::new(0.1, -0.3, 0.2), Vector3::new(0.05, 0.0, 2.0));
        let p = Point3::new(0.04, 0.02, -0.01);
        let projected = pose.project_points(&cam, &[p]);
        let expected = cam.project(&pose.transform_point(&p));
        assert_eq!(projected, vec![expected]);
        assert!(expected.is_some());

        let behind = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, -1.0));
        assert_eq!(behind.project_points(&cam, &[p]), vec![None]);
    }

    #[test]
    fn quarter_turn_about_z() {
        let pose = Pose::new(Vector3::new(0.0, 0.0, FRAC_PI_2), Vector3::zeros());
        let q = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(q, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn rotation_round_trips_through_scaled_axis() {
        let r = Rotation3::from_euler_angles(0.2, -0.4, 1.1);
        let pose = Pose::from_rotation(&r, Vector3::zeros());
        assert_relative_eq!(pose.rotation(), r, epsilon = 1e-12);
    }

    #[test]
    fn points_behind_the_camera_are_not_projected() {
        let camera = CameraModel::estimate_from_image_size(200, 100);
        let pose = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 1.0));
        let projected = pose.project_points(
            &camera,
            &[Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, -2.0)],
        );
        let first = projected[0].expect("in front");
        assert_relative_eq!(first.x, 100.0);
        assert_relative_eq!(first.y, 50.0);
        assert!(projected[1].is_none());
    }
}
