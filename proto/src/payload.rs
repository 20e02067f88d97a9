// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Request and response payload encodings
//!
//! Most responses start with a sensor status byte (see
//! [SensorError][crate::SensorError]), with response fields only present
//! where the status indicates success.

use core::fmt::Debug;

use encdec::{Decode, DecodeOwned, Encode};
use heapless::Vec;
use zeroize::Zeroize;

use crate::{helpers::arr, ProtoError, KEY_LEN, RANDOM_LEN, STATUS_SUCCESS};

/// Length of key material returned on completed enrollment / recognition
pub const KEY_MATERIAL_LEN: usize = 32;

/// Maximum identifier length for chip ID / UID responses
pub const MAX_IDENT_LEN: usize = 32;

/// Enrollment requires this many accepted captures
pub const ENROLL_STEPS: u8 = 8;

/// Key material released by the sensor, zeroized on drop
#[derive(Clone, PartialEq)]
pub struct KeyMaterial([u8; KEY_MATERIAL_LEN]);

impl KeyMaterial {
    /// Create key material from bytes
    pub fn new(b: [u8; KEY_MATERIAL_LEN]) -> Self {
        Self(b)
    }

    /// Access key material
    pub fn as_bytes(&self) -> &[u8; KEY_MATERIAL_LEN] {
        &self.0
    }
}

impl Debug for KeyMaterial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "KeyMaterial(..)")
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Single byte parameter request (slot index, recognition mode, reserved)
#[derive(Copy, Clone, PartialEq, Debug, Default, Encode, Decode)]
#[encdec(error = "ProtoError")]
pub struct ParamReq {
    pub param: u8,
}

impl ParamReq {
    pub fn new(param: u8) -> Self {
        Self { param }
    }
}

/// Communication key provisioning request
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ProtoError")]
pub struct SetAesKeyReq {
    #[encdec(with = "arr")]
    pub key: [u8; KEY_LEN],
}

/// Status only response
#[derive(Copy, Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ProtoError")]
pub struct StatusResp {
    pub status: u8,
}

/// Sensor challenge response
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ProtoError")]
pub struct RandomResp {
    pub status: u8,
    #[encdec(with = "arr")]
    pub value: [u8; RANDOM_LEN],
}

/// Firmware version response
#[derive(Copy, Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ProtoError")]
pub struct VersionResp {
    #[encdec(with = "arr")]
    pub version: [u8; 4],
}

/// Registered finger count response
#[derive(Copy, Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ProtoError")]
pub struct RegNumResp {
    pub status: u8,
    pub count: u8,
}

/// Binding state response, `bound` is non-zero once the sensor is paired
#[derive(Copy, Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ProtoError")]
pub struct InitStateResp {
    pub status: u8,
    pub bound: u8,
}

/// Communication key state response
#[derive(Copy, Clone, PartialEq, Debug, Encode, Decode)]
#[encdec(error = "ProtoError")]
pub struct AesKeyStateResp {
    pub state: u8,
}

/// Enrollment step response
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    STATUS     |   FINGER_ID   |     COUNT     |     SCORE     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     AREA      |   RESERVED    |  KEY (32, final step only)    /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Failed captures carry only the status byte.
#[derive(Clone, PartialEq, Debug)]
pub struct RegisterResp {
    pub status: u8,
    pub finger_id: u8,
    pub count: u8,
    pub score: u8,
    pub area: u8,
    pub key: Option<KeyMaterial>,
}

impl RegisterResp {
    /// Create a failed capture response
    pub fn failed(status: u8) -> Self {
        Self {
            status,
            finger_id: 0,
            count: 0,
            score: 0,
            area: 0,
            key: None,
        }
    }
}

impl Encode for RegisterResp {
    type Error = ProtoError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(match (self.status, &self.key) {
            (STATUS_SUCCESS, None) => 6,
            (STATUS_SUCCESS, Some(_)) => 6 + KEY_MATERIAL_LEN,
            _ => 1,
        })
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.encode_len()?;
        if buff.len() < n {
            return Err(ProtoError::InvalidLength);
        }

        buff[0] = self.status;
        if n == 1 {
            return Ok(1);
        }

        buff[1..6].copy_from_slice(&[self.finger_id, self.count, self.score, self.area, 0]);
        if let Some(k) = &self.key {
            buff[6..][..KEY_MATERIAL_LEN].copy_from_slice(k.as_bytes());
        }

        Ok(n)
    }
}

impl DecodeOwned for RegisterResp {
    type Output = Self;

    type Error = ProtoError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let status = *buff.first().ok_or(ProtoError::InvalidLength)?;
        if status != STATUS_SUCCESS {
            return Ok((Self::failed(status), 1));
        }

        if buff.len() < 6 {
            return Err(ProtoError::InvalidLength);
        }

        let (key, n) = decode_key(&buff[6..])?;

        Ok((
            Self {
                status,
                finger_id: buff[1],
                count: buff[2],
                score: buff[3],
                area: buff[4],
                key,
            },
            6 + n,
        ))
    }
}

/// Recognition response
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    STATUS     |     SCORE     |   FINGER_ID   |   RESERVED    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           RESERVED            |  KEY (32, where requested)    /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct RecognizeResp {
    pub status: u8,
    pub score: u8,
    pub finger_id: u8,
    pub key: Option<KeyMaterial>,
}

impl Encode for RecognizeResp {
    type Error = ProtoError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(match (self.status, &self.key) {
            (STATUS_SUCCESS, None) => 6,
            (STATUS_SUCCESS, Some(_)) => 6 + KEY_MATERIAL_LEN,
            _ => 1,
        })
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.encode_len()?;
        if buff.len() < n {
            return Err(ProtoError::InvalidLength);
        }

        buff[0] = self.status;
        if n == 1 {
            return Ok(1);
        }

        buff[1..6].copy_from_slice(&[self.score, self.finger_id, 0, 0, 0]);
        if let Some(k) = &self.key {
            buff[6..][..KEY_MATERIAL_LEN].copy_from_slice(k.as_bytes());
        }

        Ok(n)
    }
}

impl DecodeOwned for RecognizeResp {
    type Output = Self;

    type Error = ProtoError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let status = *buff.first().ok_or(ProtoError::InvalidLength)?;
        if status != STATUS_SUCCESS {
            let r = Self {
                status,
                score: 0,
                finger_id: 0,
                key: None,
            };
            return Ok((r, 1));
        }

        if buff.len() < 6 {
            return Err(ProtoError::InvalidLength);
        }

        let (key, n) = decode_key(&buff[6..])?;

        Ok((
            Self {
                status,
                score: buff[1],
                finger_id: buff[2],
                key,
            },
            6 + n,
        ))
    }
}

/// Identifier response (chip ID / UID)
#[derive(Clone, PartialEq, Debug)]
pub struct IdentResp {
    pub status: u8,
    pub ident: Vec<u8, MAX_IDENT_LEN>,
}

impl Encode for IdentResp {
    type Error = ProtoError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(1 + self.ident.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.encode_len()?;
        if buff.len() < n {
            return Err(ProtoError::InvalidLength);
        }

        buff[0] = self.status;
        buff[1..n].copy_from_slice(&self.ident);

        Ok(n)
    }
}

impl DecodeOwned for IdentResp {
    type Output = Self;

    type Error = ProtoError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let status = *buff.first().ok_or(ProtoError::InvalidLength)?;

        let n = buff.len().min(1 + MAX_IDENT_LEN);
        let ident = Vec::from_slice(&buff[1..n]).map_err(|_| ProtoError::InvalidLength)?;

        Ok((Self { status, ident }, n))
    }
}

/// Decode trailing key material where present
fn decode_key(buff: &[u8]) -> Result<(Option<KeyMaterial>, usize), ProtoError> {
    match buff.len() {
        0 => Ok((None, 0)),
        n if n >= KEY_MATERIAL_LEN => {
            let (k, n) = arr::dec::<KEY_MATERIAL_LEN>(buff)?;
            Ok((Some(KeyMaterial(k)), n))
        }
        _ => Err(ProtoError::InvalidLength),
    }
}

/// Decode a response payload, mapping trailing garbage to an error
pub fn decode_exact<'a, T>(buff: &'a [u8]) -> Result<T::Output, ProtoError>
where
    T: Decode<'a, Error = ProtoError>,
{
    let (v, n) = T::decode(buff)?;
    if n != buff.len() {
        return Err(ProtoError::InvalidLength);
    }
    Ok(v)
}
