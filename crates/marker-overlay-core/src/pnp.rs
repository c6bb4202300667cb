//! Pose of a planar target from 2D-3D correspondences.
//!
//! The object points must lie on the `z = 0` plane of the target frame. The
//! solver undistorts the observations, takes an initial pose from the
//! plane-induced homography, then refines rotation and translation with
//! Levenberg-Marquardt on pixel reprojection error (distortion applied).

use log::trace;
use nalgebra::{
    DMatrix, DVector, Matrix3, Point2, Point3, Rotation3, SMatrix, SVector, Vector2, Vector3,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::camera::CameraModel;
use crate::homography::estimate_homography;
use crate::pose::Pose;

type Params6 = SVector<f64, 6>;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PnpParams {
    /// Levenberg-Marquardt iteration cap.
    pub max_iterations: usize,
    /// Reject solutions whose RMS reprojection error exceeds this; `None`
    /// accepts any converged pose in front of the camera.
    pub max_reprojection_rms_px: Option<f64>,
    /// Minimum triangle area, relative to the squared point spread, that a
    /// point set must reach somewhere to count as non-collinear.
    pub min_relative_area: f64,
}

impl Default for PnpParams {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_reprojection_rms_px: None,
            min_relative_area: 1e-3,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PnpError {
    #[error("need at least 4 correspondences, got {0}")]
    TooFewPoints(usize),
    #[error("object/image point count mismatch ({object} vs {image})")]
    LengthMismatch { object: usize, image: usize },
    #[error("object points must lie on the z = 0 plane")]
    NonPlanar,
    #[error("camera intrinsics are not usable")]
    InvalidCamera,
    #[error("point configuration is degenerate (near-collinear)")]
    Degenerate,
    #[error("solver produced non-finite values")]
    NonFinite,
    #[error("target ends up behind the camera")]
    BehindCamera,
    #[error("reprojection RMS {rms_px:.3} px exceeds {max_px:.3} px")]
    ReprojectionTooLarge { rms_px: f64, max_px: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PnpSolution {
    pub pose: Pose,
    pub rms_px: f64,
    pub iterations: usize,
}

/// Largest triangle area over consecutive triples, divided by the squared
/// mean distance to the centroid.
fn relative_spread(pts: &[Point2<f64>]) -> f64 {
    let n = pts.len();
    let c = pts.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n as f64;
    let scale = pts.iter().map(|p| (p.coords - c).norm()).sum::<f64>() / n as f64;
    if scale.is_nan() || scale <= 1e-12 {
        return 0.0;
    }

    (0..n)
        .map(|i| {
            let a = pts[i];
            let b = pts[(i + 1) % n];
            let d = pts[(i + 2) % n];
            0.5 * ((b - a).perp(&(d - a))).abs()
        })
        .fold(0.0, f64::max)
        / (scale * scale)
}

/// Rigid pose from the homography `n ~ H * [x y 1]^T` between target-plane
/// coordinates and normalized image coordinates.
fn pose_from_plane_homography(h: &Matrix3<f64>) -> Option<Pose> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let norm = h1.norm() + h2.norm();
    if norm.is_nan() || norm <= 1e-12 {
        return None;
    }
    let mut lambda = 2.0 / norm;
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let t = h3 * lambda;

    let approx = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = approx.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed.column_mut(2).neg_mut();
        r = u_fixed * v_t;
    }

    let pose = Pose::from_rotation(&Rotation3::from_matrix_unchecked(r), t);
    pose.is_finite().then_some(pose)
}

fn to_params(pose: &Pose) -> Params6 {
    Params6::new(
        pose.rvec.x,
        pose.rvec.y,
        pose.rvec.z,
        pose.tvec.x,
        pose.tvec.y,
        pose.tvec.z,
    )
}

fn from_params(p: &Params6) -> Pose {
    Pose::new(
        Vector3::new(p[0], p[1], p[2]),
        Vector3::new(p[3], p[4], p[5]),
    )
}

/// Stacked `(u - u_obs, v - v_obs)` residuals, or `None` when any point
/// fails to project.
fn residuals(
    p: &Params6,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
) -> Option<DVector<f64>> {
    let pose = from_params(p);
    let r = pose.rotation();
    let mut out = DVector::zeros(2 * object.len());
    for (k, (o, obs)) in object.iter().zip(image).enumerate() {
        let px = camera.project(&(r * o + pose.tvec))?;
        out[2 * k] = px.x - obs.x;
        out[2 * k + 1] = px.y - obs.y;
    }
    Some(out)
}

fn numeric_jacobian(
    p: &Params6,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
) -> Option<DMatrix<f64>> {
    let mut jac = DMatrix::zeros(2 * object.len(), 6);
    for i in 0..6 {
        let step = 1e-6 * p[i].abs().max(1.0);
        let mut plus = *p;
        let mut minus = *p;
        plus[i] += step;
        minus[i] -= step;
        let rp = residuals(&plus, object, image, camera)?;
        let rm = residuals(&minus, object, image, camera)?;
        jac.set_column(i, &((rp - rm) / (2.0 * step)));
    }
    Some(jac)
}

/// Levenberg-Marquardt with Marquardt diagonal scaling. Returns the refined
/// parameters and the number of accepted steps.
fn refine_lm(
    init: Params6,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
    max_iterations: usize,
) -> Option<(Params6, usize)> {
    let mut p = init;
    let mut cost = residuals(&p, object, image, camera)?.norm_squared();
    let mut lambda = 1e-3;
    let mut accepted = 0;

    for _ in 0..max_iterations {
        let r = residuals(&p, object, image, camera)?;
        let jac = numeric_jacobian(&p, object, image, camera)?;
        let jtj: SMatrix<f64, 6, 6> = (jac.transpose() * &jac).fixed_view::<6, 6>(0, 0).clone_owned();
        let g: Params6 = (jac.transpose() * r).fixed_rows::<6>(0).clone_owned();

        let mut improved = None;
        for _ in 0..10 {
            let mut a = jtj;
            for d in 0..6 {
                a[(d, d)] += lambda * jtj[(d, d)].max(1e-12);
            }
            let Some(step) = a.lu().solve(&(-g)) else {
                lambda *= 10.0;
                continue;
            };
            let candidate = p + step;
            let c_cost = residuals(&candidate, object, image, camera)
                .map(|r| r.norm_squared())
                .unwrap_or(f64::INFINITY);
            if c_cost < cost {
                improved = Some((candidate, c_cost, step.norm()));
                lambda = (lambda / 10.0).max(1e-12);
                break;
            }
            lambda *= 10.0;
        }

        let Some((next, next_cost, step_norm)) = improved else {
            break;
        };
        let rel_drop = (cost - next_cost) / cost.max(1e-300);
        p = next;
        cost = next_cost;
        accepted += 1;
        if step_norm < 1e-12 || rel_drop < 1e-12 || cost < 1e-20 {
            break;
        }
    }

    Some((p, accepted))
}

/// Solve the pose of a planar target.
///
/// `object` holds target-frame points with `z = 0`, `image` the matching
/// observed (distorted) pixels.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "trace", skip_all, fields(points = object.len()))
)]
pub fn solve_planar_pnp(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
    params: &PnpParams,
) -> Result<PnpSolution, PnpError> {
    if object.len() != image.len() {
        return Err(PnpError::LengthMismatch {
            object: object.len(),
            image: image.len(),
        });
    }
    if object.len() < 4 {
        return Err(PnpError::TooFewPoints(object.len()));
    }
    if !camera.intrinsics.is_valid() {
        return Err(PnpError::InvalidCamera);
    }

    let planar: Vec<Point2<f64>> = object.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let extent = planar
        .iter()
        .map(|p| p.x.abs().max(p.y.abs()))
        .fold(0.0, f64::max)
        .max(1e-12);
    if object
        .iter()
        .any(|p| !p.z.is_finite() || p.z.abs() > 1e-9 * extent)
    {
        return Err(PnpError::NonPlanar);
    }

    let normalized = image
        .iter()
        .map(|&px| camera.undistort_to_normalized(px))
        .collect::<Option<Vec<_>>>()
        .ok_or(PnpError::NonFinite)?;

    if relative_spread(&planar) < params.min_relative_area
        || relative_spread(&normalized) < params.min_relative_area
    {
        return Err(PnpError::Degenerate);
    }

    let h = estimate_homography(&planar, &normalized).ok_or(PnpError::Degenerate)?;
    let init = pose_from_plane_homography(&h.h).ok_or(PnpError::NonFinite)?;
    trace!(
        "pnp init rvec=({:.4},{:.4},{:.4}) tvec=({:.4},{:.4},{:.4})",
        init.rvec.x,
        init.rvec.y,
        init.rvec.z,
        init.tvec.x,
        init.tvec.y,
        init.tvec.z
    );

    let (refined, iterations) =
        refine_lm(to_params(&init), object, image, camera, params.max_iterations)
            .ok_or(PnpError::NonFinite)?;
    let pose = from_params(&refined);
    if !pose.is_finite() {
        return Err(PnpError::NonFinite);
    }
    if pose.tvec.z <= 0.0 {
        return Err(PnpError::BehindCamera);
    }

    let res = residuals(&refined, object, image, camera).ok_or(PnpError::BehindCamera)?;
    let rms_px = (res.norm_squared() / object.len() as f64).sqrt();
    if !rms_px.is_finite() {
        return Err(PnpError::NonFinite);
    }
    if let Some(max_px) = params.max_reprojection_rms_px {
        if rms_px > max_px {
            return Err(PnpError::ReprojectionTooLarge { rms_px, max_px });
        }
    }

    Ok(PnpSolution {
        pose,
        rms_px,
        iterations,
    })
}
