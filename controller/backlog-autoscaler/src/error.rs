//! Error taxonomy for the control loop

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScalingError {
    /// Bad configuration or malformed input. Fatal to the run.
    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    /// A queue or fleet read failed; the current cycle is skipped.
    #[error("{collaborator} observation unavailable: {message}")]
    ObservationUnavailable {
        collaborator: &'static str,
        message: String,
    },

    /// The orchestration write failed; cooldown is not consumed.
    #[error("Scaling action to {attempted} workers failed: {message}")]
    ScalingActionFailed { attempted: u32, message: String },

    /// Telemetry delivery failed. Logged only.
    #[error("Metric emission failed: {message}")]
    MetricEmissionFailed { message: String },
}

/// Stable name of an error variant, used in response bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidParameters,
    ObservationUnavailable,
    ScalingActionFailed,
    MetricEmissionFailed,
}

impl ScalingError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ScalingError::InvalidParameters {
            message: message.into(),
        }
    }

    pub fn observation(collaborator: &'static str, message: impl Into<String>) -> Self {
        ScalingError::ObservationUnavailable {
            collaborator,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ScalingError::InvalidParameters { .. } => ErrorKind::InvalidParameters,
            ScalingError::ObservationUnavailable { .. } => ErrorKind::ObservationUnavailable,
            ScalingError::ScalingActionFailed { .. } => ErrorKind::ScalingActionFailed,
            ScalingError::MetricEmissionFailed { .. } => ErrorKind::MetricEmissionFailed,
        }
    }

    /// Whether the next scheduled tick may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScalingError::ObservationUnavailable { .. } | ScalingError::ScalingActionFailed { .. }
        )
    }
}
