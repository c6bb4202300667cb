//! Core geometry for marker overlays.
//!
//! This crate is intentionally small and purely geometric. It knows nothing
//! about fiducial dictionaries or concrete image file formats; it provides:
//! - lightweight grayscale image views,
//! - exact 4-point and least-squares homographies,
//! - a pinhole camera model with `(k1, k2, p1, p2)` distortion,
//! - an axis-angle [`Pose`] and a planar perspective-n-point solver.

mod camera;
mod homography;
mod image;
mod logger;
mod pnp;
mod pose;

pub use camera::{CameraIntrinsics, CameraModel, Distortion};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use image::{GrayImage, GrayImageView};
pub use pnp::{solve_planar_pnp, PnpError, PnpParams, PnpSolution};
pub use pose::Pose;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
