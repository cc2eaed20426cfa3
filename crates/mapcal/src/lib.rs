//! Map/real frame calibration for floor-plan based robot deployments.
//!
//! This crate provides:
//! - re-exports of the geometry (`mapcal-core`) and capture protocol
//!   (`mapcal-session`) crates
//! - the JSON project file that lists calibration points and the pose source
//! - pose source adapters (replayed poses, UDP pose stream)
//! - result delivery (stdout or a single UDP datagram)
//! - a terminal presentation adapter driving a session from line input
//!
//! ## Quickstart
//!
//! ```
//! use mapcal::{CalibrationSession, MapPoint, Step};
//! use mapcal::pose_source::ReplayPoseSource;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = CalibrationSession::new([
//!     MapPoint::new("A", 0, 0.0, 0.0),
//!     MapPoint::new("B", 0, 10.0, 0.0),
//!     MapPoint::new("C", 0, 0.0, 10.0),
//! ])?;
//! let mut poses = ReplayPoseSource::new([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
//!
//! loop {
//!     if let Step::Completed(fit) = session.advance(&mut poses)? {
//!         println!("{}", fit.transform);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `mapcal::core`: affine transform type and estimators.
//! - `mapcal::session`: the capture state machine and the `PoseSource` trait.
//! - `mapcal::project`: project file loading and validation.
//! - `mapcal::pose_source`: concrete pose sources.
//! - `mapcal::delivery`: result channels.
//! - `mapcal::terminal`: line-driven presentation adapter.

pub use mapcal_core as core;
pub use mapcal_session as session;

pub use mapcal_core::{
    estimate_affine, fit_transform, AffineTransform, EstimateError, Point2, TransformFit,
    TransformModel,
};
pub use mapcal_session::{
    CalibrationSession, MapPoint, Pose, PoseQueryError, PoseSource, SessionError, Step,
};

pub mod delivery;
pub mod pose_source;
pub mod project;
pub mod terminal;
