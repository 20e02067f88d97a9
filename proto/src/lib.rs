// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol / frame definitions for fingerprint sensor communication
//!
//! This module provides the wire protocol spoken between a wallet MCU and its
//! fingerprint sensor module, split into:
//!
//! - [frame] codec and [reader] for byte-at-a-time frame reassembly
//! - [session] for AES protected frames and per-message nonce handling
//! - [command] codes and [status] codes reported by the sensor
//! - [payload] encodings for request and response bodies
//! - [manager_info] record mirrored to the secure element
//!
//! Multi-byte fields are little-endian. Frames are synchronised by [SYNC] and
//! carry a CRC-32 over the whole frame as well as an inner signature over the
//! command block, so wire corruption and key / sequence desynchronisation are
//! reported separately.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod command;
pub mod frame;
pub mod manager_info;
pub mod payload;
pub mod reader;
pub mod session;
pub mod status;

mod helpers;

pub use command::Command;
pub use frame::{Authenticator, Crc32Signature, FrameCipher, FrameError, FrameFlags, Message};
pub use manager_info::ManagerInfo;
pub use reader::{FrameReader, RawFrame};
pub use session::{Session, SessionError};
pub use status::{Disposition, SensorError};

/// Frame synchronisation marker
pub const SYNC: u8 = 0xAA;

/// Receive buffer capacity, no frame may exceed this length
pub const RCV_MSG_MAX_LEN: usize = 512;

/// Maximum payload carried by a single frame
pub const MAX_MSG_DATA_LENGTH: usize = 240;

/// Maximum payload for host originated frames
pub const MAX_SEND_DATA_LENGTH: usize = 229;

/// Length of the per-frame nonce for encrypted frames
pub const NONCE_LEN: usize = 16;

/// Communication key length (AES-128)
pub const KEY_LEN: usize = 16;

/// Sensor challenge length, returned by [Command::GetRandomNum]
pub const RANDOM_LEN: usize = 16;

/// Number of finger slots supported by the sensor
pub const MAX_FINGERS: usize = 3;

/// Number of wallets with independent sign flags
pub const MAX_WALLETS: usize = 3;

/// Sensor status code for a successful operation
pub const STATUS_SUCCESS: u8 = 0x00;

/// Protocol / payload encoding errors
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum ProtoError {
    /// Buffer too short for encode / decode
    #[cfg_attr(feature = "thiserror", error("invalid length"))]
    InvalidLength = 0x01,

    /// Field contents could not be decoded
    #[cfg_attr(feature = "thiserror", error("invalid encoding"))]
    InvalidEncoding = 0x02,

    /// Payload exceeds frame capacity
    #[cfg_attr(feature = "thiserror", error("payload too long"))]
    PayloadTooLong = 0x03,
}

impl From<encdec::Error> for ProtoError {
    fn from(e: encdec::Error) -> Self {
        match e {
            encdec::Error::Length => ProtoError::InvalidLength,
            _ => ProtoError::InvalidEncoding,
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use encdec::EncDec;

    use super::*;

    /// Helper for payload encode / decode tests
    pub fn encode_decode_payload<'a, P: EncDec<'a, ProtoError> + PartialEq>(
        buff: &'a mut [u8],
        payload: &P,
    ) -> usize {
        // Encode payload
        let n = payload.encode(buff).expect("encode failed");

        // Ensure encoded data fits a host frame
        assert!(
            n <= MAX_MSG_DATA_LENGTH,
            "encoded length {n} exceeds maximum frame payload {MAX_MSG_DATA_LENGTH}"
        );

        // Check encoded length matches expected length
        let expected_n = payload.encode_len().expect("get length failed");
        assert_eq!(n, expected_n, "encode length mismatch");

        // Decode payload
        let (decoded, decoded_n) = P::decode(&buff[..n]).expect("decode failed");

        assert_eq!(payload, &decoded);
        assert_eq!(expected_n, decoded_n);

        n
    }
}
