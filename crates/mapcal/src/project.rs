//! JSON project file: calibration points, fit model and pose source.

use std::{
    fs,
    path::{Path, PathBuf},
};

use mapcal_core::{TransformModel, MIN_CORRESPONDENCES};
use mapcal_session::{CalibrationSession, MapPoint, SessionError};
use serde::{Deserialize, Serialize};

use crate::pose_source::PoseSourceConfig;

/// Name of the only configuration calibration may run under.
pub const CALIBRATE_CONFIG: &str = "calibrate";

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("cannot read project file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write project file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid project file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(
        "current configuration is {found:?}; calibration only runs on a project whose \
         current configuration is \"calibrate\""
    )]
    NotCalibrationConfig { found: String },
    #[error("choose at least {required} calibration points, the project lists {found}")]
    TooFewPoints { found: usize, required: usize },
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Project file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default)]
    pub name: Option<String>,
    /// Active configuration; must be [`CALIBRATE_CONFIG`].
    pub current_config: String,
    #[serde(default)]
    pub model: TransformModel,
    #[serde(default)]
    pub pose_source: PoseSourceConfig,
    /// Landmarks in visiting order, in map coordinates.
    pub calibration_points: Vec<MapPoint>,
}

impl ProjectFile {
    /// Load a JSON project from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ProjectError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ProjectError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Write this project to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ProjectError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn ensure_calibration_config(&self) -> Result<(), ProjectError> {
        if self.current_config != CALIBRATE_CONFIG {
            return Err(ProjectError::NotCalibrationConfig {
                found: self.current_config.clone(),
            });
        }
        Ok(())
    }

    /// Build a session over the listed points using the configured model.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip(self),
            fields(points = self.calibration_points.len())
        )
    )]
    pub fn build_session(&self) -> Result<CalibrationSession, ProjectError> {
        let found = self.calibration_points.len();
        if found < MIN_CORRESPONDENCES {
            return Err(ProjectError::TooFewPoints {
                found,
                required: MIN_CORRESPONDENCES,
            });
        }
        let session = CalibrationSession::new(self.calibration_points.iter().cloned())?;
        Ok(session.with_model(self.model))
    }
}
