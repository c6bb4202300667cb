//! Pinhole camera with `(k1, k2, p1, p2)` lens distortion.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    #[inline]
    pub fn pixel_to_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    #[inline]
    pub fn normalized_to_pixel(&self, n: Point2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }
}

/// Radial `(k1, k2)` and tangential `(p1, p2)` coefficients.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
}

impl Distortion {
    pub fn from_array(coeffs: [f64; 4]) -> Self {
        Self {
            k1: coeffs[0],
            k2: coeffs[1],
            p1: coeffs[2],
            p2: coeffs[3],
        }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.k1, self.k2, self.p1, self.p2]
    }

    pub fn is_zero(&self) -> bool {
        self.to_array().iter().all(|&c| c == 0.0)
    }

    pub fn distort_normalized(&self, n: Point2<f64>) -> Point2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2;
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Point2::new(x * radial + dx, y * radial + dy)
    }

    /// Fixed-point inversion of [`Self::distort_normalized`].
    pub fn undistort_normalized(&self, d: Point2<f64>) -> Option<Point2<f64>> {
        if self.is_zero() {
            return Some(d);
        }

        let (mut x, mut y) = (d.x, d.y);
        for _ in 0..UNDISTORT_ITERS {
            let r2 = x * x + y * y;
            let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2;
            if !radial.is_finite() || radial.abs() < 1e-12 {
                return None;
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            let nx = (d.x - dx) / radial;
            let ny = (d.y - dy) / radial;
            if !nx.is_finite() || !ny.is_finite() {
                return None;
            }
            let step = (nx - x).hypot(ny - y);
            x = nx;
            y = ny;
            if step < 1e-12 {
                break;
            }
        }
        Some(Point2::new(x, y))
    }
}

const UNDISTORT_ITERS: usize = 20;

/// Intrinsics plus distortion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraModel {
    pub intrinsics: CameraIntrinsics,
    #[serde(default)]
    pub distortion: Distortion,
}

impl CameraModel {
    pub fn new(intrinsics: CameraIntrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Rough camera for an uncalibrated frame of `width x height` pixels.
    ///
    /// Focal length equals the larger image dimension, the principal point
    /// is the image center and distortion is zero.
    pub fn estimate_from_image_size(width: u32, height: u32) -> Self {
        let focal = width.max(height) as f64;
        Self {
            intrinsics: CameraIntrinsics {
                fx: focal,
                fy: focal,
                cx: width as f64 / 2.0,
                cy: height as f64 / 2.0,
            },
            distortion: Distortion::default(),
        }
    }

    /// Project a camera-frame point to distorted pixel coordinates.
    ///
    /// Returns `None` for points at or behind the camera plane.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z.is_nan() || p.z <= 1e-12 {
            return None;
        }
        let n = Point2::new(p.x / p.z, p.y / p.z);
        let px = self
            .intrinsics
            .normalized_to_pixel(self.distortion.distort_normalized(n));
        (px.x.is_finite() && px.y.is_finite()).then_some(px)
    }

    /// Remove lens distortion from an observed pixel, returning normalized
    /// pinhole coordinates.
    pub fn undistort_to_normalized(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        if !self.intrinsics.is_valid() {
            return None;
        }
        self.distortion
            .undistort_normalized(self.intrinsics.pixel_to_normalized(p))
    }
}
