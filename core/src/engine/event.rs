// Copyright (c) 2022-2023 The MobileCoin Foundation

use fpsensor_proto::{Command, FrameError, RawFrame};

use super::Purpose;

/// [`Engine`][super::Engine] input events, from the transport, timer, or user
#[derive(Clone, Debug)]
pub enum Event<'a> {
    None,

    /// Completed frame from an external [FrameReader][fpsensor_proto::FrameReader]
    Frame(&'a RawFrame),

    /// Framing error from an external reader
    FrameError(FrameError),

    /// 100ms timer tick
    Tick,

    /// Detect module and restore pairing
    Start,

    /// Enroll a finger into the provided slot
    Register {
        slot: u8,
    },

    /// Delete a single finger slot
    Delete {
        slot: u8,
    },

    /// Delete all fingers
    DeleteAll,

    /// Match a finger for the provided purpose
    Recognize(Purpose),

    /// Cancel any outstanding operation
    Cancel,

    GetVersion,
    GetInitState,
    GetChipId,
    GetUid,
    GetRegisteredCount,
    GetAesKeyState,

    /// Provision a fresh communication key
    SetAesKey,

    SetLowPower,
    SysReset,

    /// Issue a command directly, reporting the raw response
    Raw {
        command: Command,
        data: &'a [u8],
    },
}
