// Copyright (c) 2022-2023 The MobileCoin Foundation

/// [Engine][super::Engine] errors, returned when a request cannot be started
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum Error {
    /// A command is already outstanding
    #[cfg_attr(feature = "thiserror", error("sensor busy"))]
    Busy = 0x00,

    /// Finger slot out of range
    #[cfg_attr(feature = "thiserror", error("invalid finger slot"))]
    InvalidSlot = 0x01,

    /// Finger slot already registered
    #[cfg_attr(feature = "thiserror", error("finger slot in use"))]
    SlotInUse = 0x02,

    /// Wallet index out of range
    #[cfg_attr(feature = "thiserror", error("invalid wallet index"))]
    InvalidWallet = 0x03,

    /// No registered fingers
    #[cfg_attr(feature = "thiserror", error("no registered fingers"))]
    NoFingers = 0x04,

    /// Fingerprint unlock not enabled
    #[cfg_attr(feature = "thiserror", error("fingerprint unlock disabled"))]
    UnlockDisabled = 0x05,

    /// Fingerprint signing not enabled for this wallet
    #[cfg_attr(feature = "thiserror", error("fingerprint signing disabled"))]
    SignDisabled = 0x06,

    /// Too many failed recognitions
    #[cfg_attr(feature = "thiserror", error("fingerprint locked out"))]
    LockedOut = 0x07,

    /// No communication key installed
    #[cfg_attr(feature = "thiserror", error("no session key"))]
    NoSessionKey = 0x08,

    /// Request payload too long
    #[cfg_attr(feature = "thiserror", error("payload too long"))]
    PayloadTooLong = 0x09,

    /// Message encoding failed
    #[cfg_attr(feature = "thiserror", error("message encoding failed"))]
    EncodingFailed = 0x0a,

    /// Secure element read / write failed
    #[cfg_attr(feature = "thiserror", error("secure element access failed"))]
    SecureElement = 0x0b,

    /// Invalid engine state
    #[cfg_attr(feature = "thiserror", error("invalid engine state"))]
    InvalidState = 0x0c,

    /// Fingerprint module not detected
    #[cfg_attr(feature = "thiserror", error("fingerprint module not present"))]
    NotPresent = 0x0d,

    /// Unknown / not-yet defined error (placeholder)
    #[cfg_attr(feature = "thiserror", error("unknown"))]
    Unknown = 0xf0,
}

/// Link (transport / protocol) errors, retried by the engine and reported
/// once the retry budget is exhausted
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(i8)]
pub enum LinkError {
    /// Transport write failed
    #[cfg_attr(feature = "thiserror", error("send failed"))]
    SendError = -1,

    /// No acknowledgement received
    #[cfg_attr(feature = "thiserror", error("acknowledgement timeout"))]
    AckTimeout = -2,

    /// Request rejected by the sensor
    #[cfg_attr(feature = "thiserror", error("request rejected"))]
    AckError = -3,

    /// No response received
    #[cfg_attr(feature = "thiserror", error("response timeout"))]
    ReceiveTimeout = -4,

    /// Frame corrupted in transit
    #[cfg_attr(feature = "thiserror", error("wire CRC mismatch"))]
    WireCrc = -5,

    /// Inner signature mismatch, keys or sequence out of sync
    #[cfg_attr(feature = "thiserror", error("protocol signature mismatch"))]
    ProtocolCrc = -6,

    /// Response for a different command
    #[cfg_attr(feature = "thiserror", error("unexpected command"))]
    UnexpectedCommand = -7,

    /// Malformed or unprotected response
    #[cfg_attr(feature = "thiserror", error("receive error"))]
    ReceiveError = -8,

    /// Communication key replaced while the command was outstanding
    #[cfg_attr(feature = "thiserror", error("communication key changed"))]
    KeyChanged = -9,
}

impl LinkError {
    /// User facing message for link failures
    pub fn message(&self) -> &'static str {
        "Fingerprint module unresponsive"
    }
}
