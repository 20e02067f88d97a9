// Copyright (c) 2022-2023 The MobileCoin Foundation

use heapless::Vec;

use fpsensor_proto::{
    payload::{KeyMaterial, MAX_IDENT_LEN},
    Command, SensorError, MAX_MSG_DATA_LENGTH,
};

use super::{LinkError, LockoutAction, Purpose};

/// Reasons an enrollment failed
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum EnrollFailureReason {
    /// Sensor reported a terminal error
    Sensor(SensorError),
    /// Capture attempt limit reached
    ExceededAttempts,
    /// Key material reported before the final capture
    UnexpectedKey,
}

/// [`Engine`][super::Engine] outputs (in response to events)
#[derive(Clone, PartialEq, Debug)]
pub enum Output {
    None,

    /// Request written to the sensor
    Sent(Command),

    /// Enrollment capture accepted
    EnrollStep {
        /// Number of accepted captures
        step: u8,
        finger_id: u8,
    },

    /// Enrollment capture rejected, the user may try again
    CaptureRetry {
        step: u8,
        error: SensorError,
        /// Capture attempts remaining
        remaining: u8,
    },

    /// Enrollment complete
    EnrollSuccess {
        slot: u8,
        finger_id: u8,
        key: Option<KeyMaterial>,
    },

    /// Enrollment failed
    EnrollFailure {
        reason: EnrollFailureReason,
    },

    /// Finger recognised
    RecognizeSuccess {
        purpose: Purpose,
        finger_id: u8,
        score: u8,
        key: Option<KeyMaterial>,
    },

    /// Recognition failed, with any lockout action taken
    RecognizeFailure {
        purpose: Purpose,
        error: SensorError,
        action: Option<LockoutAction>,
    },

    /// Finger(s) deleted, `None` for all slots
    Deleted {
        slot: Option<u8>,
    },

    /// Sensor registered finger count
    RegisteredCount {
        count: u8,
        /// Count matches the manager record
        in_sync: bool,
    },

    FirmwareVersion {
        version: [u8; 4],
    },

    InitState {
        bound: bool,
    },

    ChipId(Vec<u8, MAX_IDENT_LEN>),

    Uid(Vec<u8, MAX_IDENT_LEN>),

    AesKeyState {
        set: bool,
    },

    /// Communication key provisioned and stored
    AesKeySet,

    /// Sensor holds a key but none is stored locally
    KeyStateMismatch,

    /// Command completed successfully
    Complete(Command),

    /// Raw command response
    Response {
        command: Command,
        data: Vec<u8, MAX_MSG_DATA_LENGTH>,
    },

    /// Sensor reported an error status
    SensorError {
        command: Command,
        error: SensorError,
    },

    /// Outstanding command cancelled
    Cancelled {
        command: Command,
    },

    /// Command failed after exhausting retries
    CommandFailed {
        command: Command,
        error: LinkError,
    },

    /// Frame received with no matching request
    Unsolicited {
        code: u16,
    },
}
