// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Sensor status codes
//!
//! Status codes are reported in the first payload byte of most responses,
//! a non-zero value indicates the sensor answered the exchange but could not
//! complete the requested operation.

use num_enum::{FromPrimitive, IntoPrimitive};
use strum::Display;

/// Errors reported by the sensor in response payloads
#[derive(Copy, Clone, PartialEq, Eq, Debug, FromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum SensorError {
    #[cfg_attr(feature = "thiserror", error("no finger pressed"))]
    NoFingerPress = 0x11,

    #[cfg_attr(feature = "thiserror", error("finger lifted too fast"))]
    LiftTooFast = 0x14,

    #[cfg_attr(feature = "thiserror", error("finger left the sensor early"))]
    FingerLeave = 0x17,

    #[cfg_attr(feature = "thiserror", error("no fingers available"))]
    NumberOfFingerZero = 0x2D,

    #[cfg_attr(feature = "thiserror", error("matching algorithm failed"))]
    AlgorithmicFailure = 0x30,

    #[cfg_attr(feature = "thiserror", error("finger too wet"))]
    TooWet = 0x38,

    #[cfg_attr(feature = "thiserror", error("contact area too small"))]
    AreaSmall = 0x39,

    #[cfg_attr(feature = "thiserror", error("poor image quality"))]
    PoorQuality = 0x3A,

    #[cfg_attr(feature = "thiserror", error("capture overlaps previous samples"))]
    OverlapsTooMuch = 0x3B,

    #[cfg_attr(feature = "thiserror", error("too much pressure"))]
    TooMuchWeight = 0x3C,

    #[cfg_attr(feature = "thiserror", error("finger taken off"))]
    TakenFingerOff = 0x50,

    #[cfg_attr(feature = "thiserror", error("firmware upgrade failed"))]
    FwUpgradeFail = 0x51,

    #[cfg_attr(feature = "thiserror", error("firmware image oversize"))]
    FwOversize = 0x52,

    #[cfg_attr(feature = "thiserror", error("template save failed"))]
    TemplateSaving = 0x53,

    #[cfg_attr(feature = "thiserror", error("enrollment failed"))]
    Enroll = 0x54,

    #[cfg_attr(feature = "thiserror", error("enrollment completion failed"))]
    EnrollFinish = 0x55,

    #[cfg_attr(feature = "thiserror", error("general failure"))]
    GeneralFail = 0x56,

    #[cfg_attr(feature = "thiserror", error("flash write failed"))]
    FlashMessage = 0x80,

    #[cfg_attr(feature = "thiserror", error("no matching fingerprint"))]
    NoTemplatesMatched = 0x81,

    #[cfg_attr(feature = "thiserror", error("fingerprint does not exist"))]
    NonExistentFingerprint = 0x84,

    #[cfg_attr(feature = "thiserror", error("communication key already set"))]
    AesKeyAlreadyExists = 0x8B,

    #[cfg_attr(feature = "thiserror", error("finger already registered"))]
    RepeatFinger = 0x93,

    #[num_enum(default)]
    #[cfg_attr(feature = "thiserror", error("unknown sensor error"))]
    Unknown = 0xFF,
}

/// How a [SensorError] affects the enrollment / recognition flow
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum Disposition {
    /// Capture problem, the user may retry the same step
    RetryStep,
    /// Operation cannot continue
    Abort,
    /// Finger did not match, counts towards lockout
    Mismatch,
}

impl SensorError {
    /// Human readable message for display
    pub fn message(&self) -> &'static str {
        match self {
            SensorError::NoFingerPress => "No finger detected, press your finger on the sensor",
            SensorError::LiftTooFast => "Finger lifted too fast, hold it a little longer",
            SensorError::FingerLeave => "Finger moved away, keep it on the sensor",
            SensorError::NumberOfFingerZero => "No fingerprints registered",
            SensorError::AlgorithmicFailure => "Could not process the image, try again",
            SensorError::TooWet => "Finger is too wet, dry it and try again",
            SensorError::AreaSmall => "Contact area too small, cover more of the sensor",
            SensorError::PoorQuality => "Poor image quality, clean the sensor and try again",
            SensorError::OverlapsTooMuch => "Adjust your finger position slightly",
            SensorError::TooMuchWeight => "Pressing too hard, press gently",
            SensorError::TakenFingerOff => "Finger taken off, place it again",
            SensorError::FwUpgradeFail => "Firmware upgrade failed",
            SensorError::FwOversize => "Firmware image too large",
            SensorError::TemplateSaving => "Could not save fingerprint",
            SensorError::Enroll => "Enrollment failed",
            SensorError::EnrollFinish => "Could not complete enrollment",
            SensorError::GeneralFail => "Fingerprint module error",
            SensorError::FlashMessage => "Fingerprint storage error",
            SensorError::NoTemplatesMatched => "Fingerprint not recognized",
            SensorError::NonExistentFingerprint => "Fingerprint does not exist",
            SensorError::AesKeyAlreadyExists => "Module already paired",
            SensorError::RepeatFinger => "This finger is already registered",
            SensorError::Unknown => "Unknown fingerprint module error",
        }
    }

    /// Classify error for enrollment / recognition handling
    pub fn disposition(&self) -> Disposition {
        use SensorError::*;

        match self {
            NoFingerPress | LiftTooFast | FingerLeave | AlgorithmicFailure | TooWet
            | AreaSmall | PoorQuality | OverlapsTooMuch | TooMuchWeight | TakenFingerOff => {
                Disposition::RetryStep
            }
            NoTemplatesMatched => Disposition::Mismatch,
            NumberOfFingerZero | FwUpgradeFail | FwOversize | TemplateSaving | Enroll
            | EnrollFinish | GeneralFail | FlashMessage | NonExistentFingerprint
            | AesKeyAlreadyExists | RepeatFinger | Unknown => Disposition::Abort,
        }
    }

    /// Split a status byte into a result
    pub fn check(status: u8) -> Result<(), SensorError> {
        match status {
            crate::STATUS_SUCCESS => Ok(()),
            v => Err(SensorError::from(v)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(SensorError::check(0x00), Ok(()));
        assert_eq!(SensorError::check(0x93), Err(SensorError::RepeatFinger));
        assert_eq!(SensorError::check(0x8B), Err(SensorError::AesKeyAlreadyExists));
        assert_eq!(SensorError::from(0x42), SensorError::Unknown);

        let code: u8 = SensorError::NoFingerPress.into();
        assert_eq!(code, 0x11);
    }

    #[test]
    fn dispositions() {
        assert_eq!(
            SensorError::NoFingerPress.disposition(),
            Disposition::RetryStep
        );
        assert_eq!(SensorError::TooWet.disposition(), Disposition::RetryStep);
        assert_eq!(SensorError::RepeatFinger.disposition(), Disposition::Abort);
        assert_eq!(SensorError::FlashMessage.disposition(), Disposition::Abort);
        assert_eq!(
            SensorError::NoTemplatesMatched.disposition(),
            Disposition::Mismatch
        );
    }
}
