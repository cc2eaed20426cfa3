//! Capture protocol for map/real frame calibration.
//!
//! A [`CalibrationSession`] walks an ordered list of map points. Each call to
//! [`CalibrationSession::advance`] performs exactly one protocol step: capture
//! the current pose for the active point, move on to the next point, or, after
//! the last capture, fit the transform between the two frames.
//!
//! The session is driven from outside (a UI button, a terminal prompt, a test)
//! and queries poses through the [`PoseSource`] trait, so it holds no I/O of
//! its own.

mod error;
mod point;
mod pose;
mod session;

pub use error::SessionError;
pub use point::{CalibrationPoint, MapPoint};
pub use pose::{Pose, PoseQueryError, PoseSource};
pub use session::{CalibrationSession, CapturePrompt, CaptureReading, SessionState, Step};
