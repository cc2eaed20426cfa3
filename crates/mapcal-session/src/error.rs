use mapcal_core::EstimateError;

use crate::PoseQueryError;

/// Errors returned by [`CalibrationSession`](crate::CalibrationSession).
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("a calibration session needs at least one map point")]
    NoPoints,
    #[error("calibration point {label} is listed more than once")]
    DuplicatePoint { label: String },
    #[error("map coordinate of calibration point {label} is not finite")]
    NonFiniteMapPoint { label: String },
    /// The pose could not be read; the session did not move.
    #[error("pose query failed: {0}")]
    PoseQuery(#[from] PoseQueryError),
    /// Fitting failed; the session is now [`SessionState::Failed`](crate::SessionState::Failed).
    #[error("transform estimation failed: {0}")]
    Estimation(#[from] EstimateError),
}

impl SessionError {
    /// `true` when the same `advance()` may simply be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::PoseQuery(_))
    }
}
