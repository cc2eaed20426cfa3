use std::collections::HashSet;
use std::fmt;

use mapcal_core::{fit_transform, EstimateError, TransformFit, TransformModel};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{CalibrationPoint, MapPoint, PoseQueryError, PoseSource, SessionError};

/// Where the session is in the capture protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the robot to be placed on the active point.
    AwaitingCapture,
    /// The active point has its real coordinate; waiting for confirmation.
    Captured,
    /// Fitting the transform. Only held inside the final `advance()`.
    Estimating,
    Done,
    Failed,
}

/// Shown when the session starts waiting on a point.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturePrompt {
    pub cursor: usize,
    pub total: usize,
    pub label: String,
    /// Where to draw the marker.
    pub map: Point2<f64>,
}

impl fmt::Display for CapturePrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Please place robot at Point {} shown on the map and press [Capture].",
            self.label
        )
    }
}

/// Shown after a point's real coordinate was recorded.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureReading {
    pub cursor: usize,
    pub label: String,
    pub real: Point2<f64>,
}

impl fmt::Display for CaptureReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Read real point {} coordinate of [{:.6}, {:.6}].",
            self.label, self.real.x, self.real.y
        )
    }
}

/// Outcome of one [`CalibrationSession::advance`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// Moved on to the next point.
    AwaitingCapture(CapturePrompt),
    /// Recorded the real coordinate of the active point.
    Captured(CaptureReading),
    /// All points captured and the transform fitted. Returned exactly once.
    Completed(TransformFit),
    /// The session already ended; nothing happened.
    Finished,
}

/// Stepwise collector of map/real correspondences.
///
/// Points are visited strictly in the order given at construction. Each
/// point takes two `advance()` calls: one to capture the pose, one to
/// confirm and move on. Confirming the last point runs the estimator.
#[derive(Clone, Debug)]
pub struct CalibrationSession {
    points: Vec<CalibrationPoint>,
    cursor: usize,
    state: SessionState,
    model: TransformModel,
    failure: Option<EstimateError>,
}

impl CalibrationSession {
    /// Start a session over `points`, in order.
    ///
    /// Fewer than three points is accepted here; such a session fails when
    /// it reaches estimation.
    pub fn new(points: impl IntoIterator<Item = MapPoint>) -> Result<Self, SessionError> {
        let points: Vec<MapPoint> = points.into_iter().collect();
        if points.is_empty() {
            return Err(SessionError::NoPoints);
        }

        let mut seen = HashSet::with_capacity(points.len());
        for p in &points {
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(SessionError::NonFiniteMapPoint { label: p.label() });
            }
            if !seen.insert((p.name.as_str(), p.index)) {
                return Err(SessionError::DuplicatePoint { label: p.label() });
            }
        }

        log::debug!("calibration session over {} points", points.len());
        Ok(Self {
            points: points
                .into_iter()
                .map(CalibrationPoint::from_map_point)
                .collect(),
            cursor: 0,
            state: SessionState::AwaitingCapture,
            model: TransformModel::Affine,
            failure: None,
        })
    }

    /// Fit a constrained model instead of the full affine one.
    pub fn with_model(mut self, model: TransformModel) -> Self {
        self.model = model;
        self
    }

    #[inline]
    pub fn model(&self) -> TransformModel {
        self.model
    }

    #[inline]
    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    /// Index of the active point; equals `points().len()` once all are captured.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, SessionState::Done | SessionState::Failed)
    }

    /// The estimation error that ended the session, if it failed.
    pub fn failure(&self) -> Option<&EstimateError> {
        self.failure.as_ref()
    }

    /// Prompt for the active point while awaiting its capture.
    pub fn prompt(&self) -> Option<CapturePrompt> {
        (self.state == SessionState::AwaitingCapture).then(|| self.active_prompt())
    }

    fn active_prompt(&self) -> CapturePrompt {
        let p = &self.points[self.cursor];
        CapturePrompt {
            cursor: self.cursor,
            total: self.points.len(),
            label: p.label(),
            map: p.map(),
        }
    }

    /// Reading of the active point while it waits for confirmation.
    pub fn reading(&self) -> Option<CaptureReading> {
        if self.state != SessionState::Captured {
            return None;
        }
        let p = &self.points[self.cursor];
        Some(CaptureReading {
            cursor: self.cursor,
            label: p.label(),
            real: p.real()?,
        })
    }

    /// Perform the next protocol step.
    ///
    /// A pose query failure is returned as [`SessionError::PoseQuery`] and
    /// leaves the session exactly as it was, so the call can be repeated.
    /// An estimation failure moves the session to [`SessionState::Failed`].
    /// Once finished, further calls return [`Step::Finished`].
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, poses), fields(cursor = self.cursor, state = ?self.state))
    )]
    pub fn advance<P: PoseSource + ?Sized>(&mut self, poses: &mut P) -> Result<Step, SessionError> {
        match self.state {
            SessionState::AwaitingCapture => self.capture(poses),
            SessionState::Captured if self.cursor + 1 < self.points.len() => {
                self.cursor += 1;
                self.state = SessionState::AwaitingCapture;
                let prompt = self.active_prompt();
                log::debug!("awaiting capture of {}", prompt.label);
                Ok(Step::AwaitingCapture(prompt))
            }
            SessionState::Captured => self.estimate(),
            SessionState::Estimating | SessionState::Done | SessionState::Failed => {
                Ok(Step::Finished)
            }
        }
    }

    fn capture<P: PoseSource + ?Sized>(&mut self, poses: &mut P) -> Result<Step, SessionError> {
        let pose = poses.current_pose().inspect_err(|e| {
            log::warn!(
                "pose query for {} failed: {e}",
                self.points[self.cursor].label()
            );
        })?;
        if !pose.x.is_finite() || !pose.y.is_finite() {
            return Err(PoseQueryError::NonFinite {
                x: pose.x,
                y: pose.y,
            }
            .into());
        }

        let point = &mut self.points[self.cursor];
        point.record_real(pose.position());
        self.state = SessionState::Captured;

        let reading = CaptureReading {
            cursor: self.cursor,
            label: point.label(),
            real: pose.position(),
        };
        log::info!(
            "captured {} -> ({:.4}, {:.4})",
            reading.label,
            reading.real.x,
            reading.real.y
        );
        Ok(Step::Captured(reading))
    }

    fn estimate(&mut self) -> Result<Step, SessionError> {
        self.cursor = self.points.len();
        self.state = SessionState::Estimating;

        let (map, real): (Vec<_>, Vec<_>) = self
            .points
            .iter()
            .filter_map(CalibrationPoint::correspondence)
            .unzip();

        match fit_transform(&map, &real, self.model) {
            Ok(fit) => {
                self.state = SessionState::Done;
                log::info!(
                    "calibration complete ({} points, rms residual {:.4})",
                    map.len(),
                    fit.rms_residual
                );
                Ok(Step::Completed(fit))
            }
            Err(err) => {
                self.state = SessionState::Failed;
                log::error!("calibration failed: {err}");
                self.failure = Some(err.clone());
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pose;

    fn points() -> Vec<MapPoint> {
        vec![
            MapPoint::new("A", 0, 0.0, 0.0),
            MapPoint::new("B", 0, 10.0, 0.0),
            MapPoint::new("C", 0, 0.0, 10.0),
        ]
    }

    #[test]
    fn empty_point_list_is_rejected() {
        assert!(matches!(
            CalibrationSession::new(Vec::new()),
            Err(SessionError::NoPoints)
        ));
    }

    #[test]
    fn duplicate_name_and_index_is_rejected() {
        let mut pts = points();
        pts.push(MapPoint::new("B", 0, 3.0, 3.0));
        match CalibrationSession::new(pts) {
            Err(SessionError::DuplicatePoint { label }) => assert_eq!(label, "B_P0"),
            other => panic!("unexpected {other:?}"),
        }

        let mut pts = points();
        pts.push(MapPoint::new("B", 1, 3.0, 3.0));
        assert!(CalibrationSession::new(pts).is_ok());
    }

    #[test]
    fn non_finite_map_point_is_rejected() {
        let mut pts = points();
        pts[1].y = f64::NAN;
        assert!(matches!(
            CalibrationSession::new(pts),
            Err(SessionError::NonFiniteMapPoint { .. })
        ));
    }

    #[test]
    fn starts_awaiting_the_first_point() {
        let session = CalibrationSession::new(points()).unwrap();
        assert_eq!(session.state(), SessionState::AwaitingCapture);
        assert_eq!(session.cursor(), 0);
        assert!(session.reading().is_none());

        let prompt = session.prompt().unwrap();
        assert_eq!(prompt.label, "A_P0");
        assert_eq!(prompt.total, 3);
        assert_eq!(
            prompt.to_string(),
            "Please place robot at Point A_P0 shown on the map and press [Capture]."
        );
    }

    #[test]
    fn reading_text_matches_captured_pose() {
        let mut session = CalibrationSession::new(points()).unwrap();
        let mut poses = || -> Result<Pose, PoseQueryError> { Ok(Pose::new(1.25, -0.5, 3.0)) };

        let reading = match session.advance(&mut poses).unwrap() {
            Step::Captured(reading) => reading,
            other => panic!("expected a capture, got {other:?}"),
        };
        assert_eq!(
            reading.to_string(),
            "Read real point A_P0 coordinate of [1.250000, -0.500000]."
        );
        assert_eq!(session.reading(), Some(reading));
        assert!(session.prompt().is_none());
    }

    #[test]
    fn non_finite_pose_is_a_retryable_query_error() {
        let mut session = CalibrationSession::new(points()).unwrap();
        let mut poses = || -> Result<Pose, PoseQueryError> { Ok(Pose::new(f64::NAN, 0.0, 0.0)) };

        let err = session.advance(&mut poses).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(session.state(), SessionState::AwaitingCapture);
        assert!(session.points()[0].real().is_none());
    }
}
