// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Fingerprint manager record
//!
//! The host keeps a small record describing registered fingers and how they
//! may be used, mirrored to secure element storage so it survives power
//! cycles.
//!
//! ## Encoding
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  UNLOCK_FLAG  |  SIGN_FLAG_0  |  SIGN_FLAG_1  |  SIGN_FLAG_2  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  FINGER_NUM   |  FINGER_ID_0  |  FINGER_ID_1  |  FINGER_ID_2  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /                        RESERVED (24)                          /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! A `FINGER_ID` of zero marks an empty slot, occupied slots hold `slot + 1`.

use encdec::{Decode, Encode};

use crate::{helpers::arr, ProtoError, MAX_FINGERS, MAX_WALLETS};

/// Encoded manager record length
pub const MANAGER_INFO_LEN: usize = 32;

const RESERVED_LEN: usize = MANAGER_INFO_LEN - 2 - MAX_FINGERS - MAX_WALLETS;

/// Fingerprint manager record
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ProtoError")]
pub struct ManagerInfo {
    /// Fingers may unlock the device
    pub unlock_flag: u8,

    /// Per-wallet fingerprint signing enabled
    #[encdec(with = "arr")]
    pub sign_flags: [u8; MAX_WALLETS],

    /// Number of registered fingers
    pub finger_num: u8,

    /// Per-slot finger identifiers, zero where empty
    #[encdec(with = "arr")]
    pub finger_ids: [u8; MAX_FINGERS],

    #[encdec(with = "arr")]
    pub reserved: [u8; RESERVED_LEN],
}

impl Default for ManagerInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerInfo {
    /// Create an empty record
    pub const fn new() -> Self {
        Self {
            unlock_flag: 0,
            sign_flags: [0u8; MAX_WALLETS],
            finger_num: 0,
            finger_ids: [0u8; MAX_FINGERS],
            reserved: [0u8; RESERVED_LEN],
        }
    }

    /// Encode record to fixed size storage bytes
    pub fn to_bytes(&self) -> [u8; MANAGER_INFO_LEN] {
        let mut b = [0u8; MANAGER_INFO_LEN];

        b[0] = self.unlock_flag;
        b[1..4].copy_from_slice(&self.sign_flags);
        b[4] = self.finger_num;
        b[5..8].copy_from_slice(&self.finger_ids);
        b[8..].copy_from_slice(&self.reserved);

        b
    }

    /// Decode record from storage bytes
    pub fn from_bytes(b: &[u8; MANAGER_INFO_LEN]) -> Self {
        // Fixed length input cannot fail to decode
        match Self::decode(b) {
            Ok((v, _)) => v,
            Err(_) => Self::default(),
        }
    }

    /// Check whether a slot holds a registered finger
    pub fn is_registered(&self, slot: u8) -> bool {
        self.finger_ids
            .get(slot as usize)
            .map(|id| *id != 0)
            .unwrap_or(false)
    }

    /// Fetch the first empty slot, if any
    pub fn free_slot(&self) -> Option<u8> {
        self.finger_ids
            .iter()
            .position(|id| *id == 0)
            .map(|i| i as u8)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::encode_decode_payload;

    #[test]
    fn layout() {
        let m = ManagerInfo {
            unlock_flag: 1,
            sign_flags: [1, 0, 1],
            finger_num: 2,
            finger_ids: [1, 0, 3],
            ..Default::default()
        };

        let b = m.to_bytes();
        assert_eq!(&b[..8], &[1, 1, 0, 1, 2, 1, 0, 3]);
        assert!(b[8..].iter().all(|v| *v == 0));

        let mut buff = [0u8; 64];
        assert_eq!(encode_decode_payload(&mut buff, &m), MANAGER_INFO_LEN);
        assert_eq!(&buff[..MANAGER_INFO_LEN], &b[..]);

        assert_eq!(ManagerInfo::from_bytes(&b), m);
    }

    #[test]
    fn slots() {
        let m = ManagerInfo {
            finger_ids: [1, 0, 3],
            finger_num: 2,
            ..Default::default()
        };

        assert!(m.is_registered(0));
        assert!(!m.is_registered(1));
        assert!(!m.is_registered(7));
        assert_eq!(m.free_slot(), Some(1));
    }
}
