//! Core geometry for map/localization frame calibration.
//!
//! This crate is intentionally small and purely geometric. It knows nothing
//! about sessions, pose sources, or how a result is delivered: it turns a set
//! of point correspondences into an [`AffineTransform`].
//!
//! ```
//! use mapcal_core::{estimate_affine, Point2};
//!
//! let map = [Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), Point2::new(0.0, 10.0)];
//! let real = [Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
//!
//! let t = estimate_affine(&map, &real).unwrap();
//! let p = t.apply(Point2::new(5.0, 5.0));
//! assert!((p.x - 0.5).abs() < 1e-12 && (p.y - 0.5).abs() < 1e-12);
//! ```

mod estimate;
mod logger;
mod transform;

pub use nalgebra::Point2;

pub use estimate::{
    estimate_affine, fit_transform, EstimateError, TransformFit, TransformModel,
    MIN_CORRESPONDENCES,
};
pub use transform::{AffineTransform, TransformError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};
