// Copyright (c) 2022-2023 The MobileCoin Foundation

use tokio::time::error::Elapsed;

use fpsensor_core::{
    engine::{EnrollFailureReason, Error as EngineError, LinkError, LockoutAction},
    proto::{Command, SensorError},
};

/// Fingerprint sensor API Error Type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport IO error
    #[error("Transport error {0}")]
    Io(#[from] std::io::Error),

    /// Transport closed by the sensor
    #[error("Transport disconnected")]
    Disconnected,

    /// Request rejected by the engine
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Command failed after exhausting retries
    #[error("{command} failed: {error}")]
    Link { command: Command, error: LinkError },

    /// Sensor reported an error
    #[error("{command} error: {error}")]
    Sensor { command: Command, error: SensorError },

    /// Enrollment failed
    #[error("Enrollment failed: {0:?}")]
    Enroll(EnrollFailureReason),

    /// Recognition failed
    #[error("Recognition failed: {error} (action: {action:?})")]
    Recognize {
        error: SensorError,
        action: Option<LockoutAction>,
    },

    /// Sensor is paired but no communication key is stored
    #[error("Sensor paired with an unknown communication key")]
    KeyStateMismatch,

    /// Unexpected engine output
    #[error("Unexpected response")]
    UnexpectedResponse,

    /// Timeout waiting for user
    #[error("Timeout waiting for finger")]
    UserTimeout,

    /// Request timeout
    #[error("Timeout waiting for sensor response")]
    RequestTimeout,

    /// State file encoding error
    #[error("State encoding error: {0}")]
    State(#[from] serde_json::Error),
}

impl From<Elapsed> for Error {
    fn from(_: Elapsed) -> Self {
        Error::RequestTimeout
    }
}
