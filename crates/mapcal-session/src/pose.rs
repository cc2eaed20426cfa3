use std::time::Duration;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Planar pose reported by a localization system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    /// Heading in radians. Not used for calibration.
    #[serde(default)]
    pub theta: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    #[inline]
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

impl From<[f64; 3]> for Pose {
    fn from([x, y, theta]: [f64; 3]) -> Self {
        Self { x, y, theta }
    }
}

/// Failures reading a pose. All of them leave the session untouched.
#[derive(thiserror::Error, Debug)]
pub enum PoseQueryError {
    #[error("pose source unavailable: {0}")]
    Unavailable(String),
    #[error("no pose received within {0:?}")]
    Timeout(Duration),
    #[error("malformed pose message: {0}")]
    Malformed(String),
    #[error("pose ({x}, {y}) is not finite")]
    NonFinite { x: f64, y: f64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Anything that can report the robot's current pose.
pub trait PoseSource {
    fn current_pose(&mut self) -> Result<Pose, PoseQueryError>;
}

impl<F> PoseSource for F
where
    F: FnMut() -> Result<Pose, PoseQueryError>,
{
    fn current_pose(&mut self) -> Result<Pose, PoseQueryError> {
        self()
    }
}
