// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Frame encoding and decoding
//!
//! ## Outer frame
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   SYNC (AA)   |E|           LENGTH            |               /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+               /
//! /                     NONCE (16, if E set)                      /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /                INNER BLOCK (multiple of 16 bytes)             /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         CRC32 (LE)                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! `LENGTH` is a little-endian `u16` counting every byte following it, with
//! the top bit (`E`) set for encrypted frames. `CRC32` (ISO-HDLC) covers all
//! preceding bytes.
//!
//! ## Inner block
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       SIGNATURE (LE)                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    CMD_HI     |    CMD_LO     |     FLAGS     |   FRAME_NUM   /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /   (LE)        |         DATA_LEN (LE)         |     DATA...   /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /                     DATA... | ZERO PADDING                    /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! `SIGNATURE` is computed by an [Authenticator] over `CMD_HI..DATA`,
//! defaulting to [Crc32Signature]. For encrypted frames the whole inner block
//! is encrypted, so a signature mismatch indicates key or sequence drift
//! rather than wire corruption.

use byteorder::{ByteOrder, LittleEndian};
use crc::{Crc, CRC_32_ISO_HDLC};
use heapless::Vec;
use static_assertions::const_assert;

use crate::{MAX_MSG_DATA_LENGTH, NONCE_LEN, RCV_MSG_MAX_LEN, SYNC};

/// CRC-32 used for wire and signature checks
pub(crate) const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Cipher block length
pub const BLOCK_LEN: usize = 16;

/// Sync and length header
pub const HEADER_LEN: usize = 3;

/// Trailing wire CRC
pub const CRC_LEN: usize = 4;

/// Fixed inner block fields preceding data
pub const INNER_HEADER_LEN: usize = 11;

/// Offset of signed fields in the inner block
const SIGNED_OFFSET: usize = 4;

/// Length flag for encrypted frames
const LEN_ENCRYPTED: u16 = 0x8000;

/// Maximum padded inner block length
pub const MAX_INNER_LEN: usize = padded_len(INNER_HEADER_LEN + MAX_MSG_DATA_LENGTH);

/// Maximum encoded frame length
pub const MAX_FRAME_LEN: usize = HEADER_LEN + NONCE_LEN + MAX_INNER_LEN + CRC_LEN;

/// Minimum encoded frame length (empty plaintext frame, ie. an ACK)
pub const MIN_FRAME_LEN: usize = HEADER_LEN + BLOCK_LEN + CRC_LEN;

const_assert!(MAX_FRAME_LEN <= RCV_MSG_MAX_LEN);
const_assert!(MAX_INNER_LEN % BLOCK_LEN == 0);

/// Round a length up to a whole number of cipher blocks
pub const fn padded_len(n: usize) -> usize {
    (n + BLOCK_LEN - 1) / BLOCK_LEN * BLOCK_LEN
}

bitflags::bitflags! {
    /// Inner block flags
    pub struct FrameFlags: u8 {
        /// Request frame rejected by the receiver
        const NAK = 1 << 0;
    }
}

impl Default for FrameFlags {
    fn default() -> Self {
        FrameFlags::empty()
    }
}

/// Frame codec errors
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum FrameError {
    /// Missing sync marker
    #[cfg_attr(feature = "thiserror", error("missing sync marker"))]
    Sync = 0x01,

    /// Declared or actual frame length invalid
    #[cfg_attr(feature = "thiserror", error("invalid frame length"))]
    InvalidLength = 0x02,

    /// Frame exceeded the receive buffer
    #[cfg_attr(feature = "thiserror", error("receive buffer overflow"))]
    Overflow = 0x03,

    /// Wire CRC mismatch, frame corrupted in transit
    #[cfg_attr(feature = "thiserror", error("wire CRC mismatch"))]
    WireCrc = 0x04,

    /// Inner signature mismatch, keys or sequence out of sync
    #[cfg_attr(feature = "thiserror", error("protocol signature mismatch"))]
    ProtocolCrc = 0x05,

    /// Payload exceeds frame capacity
    #[cfg_attr(feature = "thiserror", error("payload too long"))]
    PayloadTooLong = 0x06,

    /// Output buffer too small
    #[cfg_attr(feature = "thiserror", error("output buffer too small"))]
    BufferOverrun = 0x07,

    /// Frame is encrypted and requires a session to decode
    #[cfg_attr(feature = "thiserror", error("frame is encrypted"))]
    Encrypted = 0x08,
}

/// Inner signature construction, pluggable to match paired sensor firmware
pub trait Authenticator {
    /// Compute a signature over `CMD_HI..DATA`
    fn sign(&self, data: &[u8]) -> u32;

    /// Verify a received signature
    fn verify(&self, data: &[u8], signature: u32) -> bool {
        self.sign(data) == signature
    }
}

impl<T: Authenticator> Authenticator for &T {
    fn sign(&self, data: &[u8]) -> u32 {
        T::sign(self, data)
    }
}

/// Default [Authenticator], CRC-32 over the signed fields
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct Crc32Signature;

impl Authenticator for Crc32Signature {
    fn sign(&self, data: &[u8]) -> u32 {
        CRC32.checksum(data)
    }
}

/// Cipher applied to inner blocks of encrypted frames
pub trait FrameCipher {
    /// Nonce transmitted with the frame
    fn nonce(&self) -> [u8; NONCE_LEN];

    /// Encrypt a padded inner block in place
    fn encrypt(&self, inner: &mut [u8]);
}

/// Decoded frame contents
#[derive(Clone, PartialEq, Debug)]
pub struct Message {
    /// Raw command code (may not map to a known [Command][crate::Command])
    pub code: u16,
    /// Frame flags
    pub flags: FrameFlags,
    /// Frame sequence number
    pub frame_num: u16,
    /// Payload data
    pub data: Vec<u8, MAX_MSG_DATA_LENGTH>,
}

impl Message {
    /// Create a new message with the provided payload
    pub fn new(code: u16, frame_num: u16, data: &[u8]) -> Result<Self, FrameError> {
        let data = Vec::from_slice(data).map_err(|_| FrameError::PayloadTooLong)?;

        Ok(Self {
            code,
            flags: FrameFlags::empty(),
            frame_num,
            data,
        })
    }

    /// Create an empty acknowledgement for a request
    pub fn ack(code: u16, frame_num: u16) -> Self {
        Self {
            code,
            flags: FrameFlags::empty(),
            frame_num,
            data: Vec::new(),
        }
    }

    /// Create a negative acknowledgement for a request
    pub fn nak(code: u16, frame_num: u16) -> Self {
        Self {
            code,
            flags: FrameFlags::NAK,
            frame_num,
            data: Vec::new(),
        }
    }

    /// Check whether this is an (N)ACK rather than a response
    pub fn is_ack(&self) -> bool {
        self.data.is_empty()
    }

    /// Length of the padded inner block for this message
    pub fn inner_len(&self) -> usize {
        padded_len(INNER_HEADER_LEN + self.data.len())
    }

    /// Length of the encoded frame
    pub fn encode_len(&self, encrypted: bool) -> usize {
        let nonce_len = if encrypted { NONCE_LEN } else { 0 };
        HEADER_LEN + nonce_len + self.inner_len() + CRC_LEN
    }
}

/// Encode a message to wire bytes, encrypting the inner block where a cipher is provided
pub fn encode<A: Authenticator>(
    msg: &Message,
    auth: &A,
    cipher: Option<&dyn FrameCipher>,
    buff: &mut [u8],
) -> Result<usize, FrameError> {
    let n = msg.encode_len(cipher.is_some());
    if buff.len() < n {
        return Err(FrameError::BufferOverrun);
    }

    let mut index = 0;

    // Write header
    let remaining = (n - HEADER_LEN) as u16;
    let len_field = match cipher.is_some() {
        true => remaining | LEN_ENCRYPTED,
        false => remaining,
    };
    buff[0] = SYNC;
    LittleEndian::write_u16(&mut buff[1..], len_field);
    index += HEADER_LEN;

    // Write nonce
    if let Some(c) = cipher {
        buff[index..][..NONCE_LEN].copy_from_slice(&c.nonce());
        index += NONCE_LEN;
    }

    // Write inner block
    let inner_len = msg.inner_len();
    let inner = &mut buff[index..][..inner_len];
    inner.fill(0);

    let [hi, lo] = msg.code.to_be_bytes();
    inner[4] = hi;
    inner[5] = lo;
    inner[6] = msg.flags.bits();
    LittleEndian::write_u16(&mut inner[7..], msg.frame_num);
    LittleEndian::write_u16(&mut inner[9..], msg.data.len() as u16);
    inner[INNER_HEADER_LEN..][..msg.data.len()].copy_from_slice(&msg.data);

    let signature = auth.sign(&inner[SIGNED_OFFSET..INNER_HEADER_LEN + msg.data.len()]);
    LittleEndian::write_u32(&mut inner[..4], signature);

    if let Some(c) = cipher {
        c.encrypt(inner);
    }
    index += inner_len;

    // Append wire CRC
    let crc = CRC32.checksum(&buff[..index]);
    LittleEndian::write_u32(&mut buff[index..], crc);
    index += CRC_LEN;

    Ok(index)
}

/// Compute total frame length from the `LENGTH` header field
pub fn frame_len(len_field: u16) -> Result<usize, FrameError> {
    let encrypted = len_field & LEN_ENCRYPTED != 0;
    let remaining = (len_field & !LEN_ENCRYPTED) as usize;

    let overhead = CRC_LEN + if encrypted { NONCE_LEN } else { 0 };
    if remaining < overhead + BLOCK_LEN {
        return Err(FrameError::InvalidLength);
    }

    let inner_len = remaining - overhead;
    if inner_len % BLOCK_LEN != 0 || inner_len > MAX_INNER_LEN {
        return Err(FrameError::InvalidLength);
    }

    Ok(HEADER_LEN + remaining)
}

/// Split view of a received frame
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Frame<'a> {
    /// Nonce, present for encrypted frames
    pub nonce: Option<&'a [u8]>,
    /// Inner block (still encrypted where a nonce is present)
    pub inner: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Split a complete frame, checking sync, length and wire CRC
    pub fn split(raw: &'a [u8]) -> Result<Self, FrameError> {
        if raw.len() < MIN_FRAME_LEN {
            return Err(FrameError::InvalidLength);
        }
        if raw[0] != SYNC {
            return Err(FrameError::Sync);
        }

        let len_field = LittleEndian::read_u16(&raw[1..]);
        let n = frame_len(len_field)?;
        if raw.len() != n {
            return Err(FrameError::InvalidLength);
        }

        let (body, crc) = raw.split_at(n - CRC_LEN);
        if CRC32.checksum(body) != LittleEndian::read_u32(crc) {
            return Err(FrameError::WireCrc);
        }

        let body = &body[HEADER_LEN..];
        match len_field & LEN_ENCRYPTED != 0 {
            true => Ok(Self {
                nonce: Some(&body[..NONCE_LEN]),
                inner: &body[NONCE_LEN..],
            }),
            false => Ok(Self {
                nonce: None,
                inner: body,
            }),
        }
    }

    /// Check whether the frame is encrypted
    pub fn encrypted(&self) -> bool {
        self.nonce.is_some()
    }
}

/// Parse a plaintext inner block, checking the signature
pub fn parse_inner<A: Authenticator>(inner: &[u8], auth: &A) -> Result<Message, FrameError> {
    if inner.len() < BLOCK_LEN || inner.len() % BLOCK_LEN != 0 {
        return Err(FrameError::InvalidLength);
    }

    let data_len = LittleEndian::read_u16(&inner[9..]) as usize;
    if data_len > MAX_MSG_DATA_LENGTH || INNER_HEADER_LEN + data_len > inner.len() {
        return Err(FrameError::ProtocolCrc);
    }

    let signature = LittleEndian::read_u32(&inner[..4]);
    if !auth.verify(&inner[SIGNED_OFFSET..INNER_HEADER_LEN + data_len], signature) {
        return Err(FrameError::ProtocolCrc);
    }

    let data = Vec::from_slice(&inner[INNER_HEADER_LEN..][..data_len])
        .map_err(|_| FrameError::PayloadTooLong)?;

    Ok(Message {
        code: u16::from_be_bytes([inner[4], inner[5]]),
        flags: FrameFlags::from_bits_truncate(inner[6]),
        frame_num: LittleEndian::read_u16(&inner[7..]),
        data,
    })
}

/// Decode a plaintext frame
pub fn decode<A: Authenticator>(raw: &[u8], auth: &A) -> Result<Message, FrameError> {
    let f = Frame::split(raw)?;
    if f.encrypted() {
        return Err(FrameError::Encrypted);
    }

    parse_inner(f.inner, auth)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Command;

    #[test]
    fn frame_limits() {
        assert_eq!(MAX_INNER_LEN, 256);
        assert_eq!(MAX_FRAME_LEN, 279);
        assert_eq!(MIN_FRAME_LEN, 23);
    }

    #[test]
    fn encode_ack() {
        let msg = Message::ack(Command::GetVer.code(), 7);
        let mut buff = [0u8; MAX_FRAME_LEN];

        let n = encode(&msg, &Crc32Signature, None, &mut buff).unwrap();
        assert_eq!(n, MIN_FRAME_LEN);

        // Header
        assert_eq!(&buff[..3], &[0xAA, 20, 0]);
        // Command and frame number
        assert_eq!(&buff[7..12], &[0xB5, 0x00, 0x00, 7, 0]);
        // Data length and padding
        assert!(buff[12..19].iter().all(|b| *b == 0));

        let decoded = decode(&buff[..n], &Crc32Signature).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.is_ack());
    }

    #[test]
    fn round_trip_all_lengths() {
        let mut buff = [0u8; MAX_FRAME_LEN];
        let payload: std::vec::Vec<u8> = (0..crate::MAX_SEND_DATA_LENGTH as u8).collect();

        for n in 0..=payload.len() {
            let msg = Message::new(Command::Register.code(), n as u16, &payload[..n]).unwrap();

            let len = encode(&msg, &Crc32Signature, None, &mut buff).unwrap();
            assert_eq!(len, msg.encode_len(false));
            assert_eq!((len - HEADER_LEN - CRC_LEN) % BLOCK_LEN, 0);

            let decoded = decode(&buff[..len], &Crc32Signature).unwrap();
            assert_eq!(decoded.code, Command::Register.code());
            assert_eq!(decoded.frame_num, n as u16);
            assert_eq!(&decoded.data[..], &payload[..n]);
        }
    }

    #[test]
    fn payload_limit() {
        let payload = [0u8; MAX_MSG_DATA_LENGTH + 1];

        assert_eq!(
            Message::new(Command::Register.code(), 0, &payload),
            Err(FrameError::PayloadTooLong)
        );
    }

    #[test]
    fn wire_and_protocol_crc() {
        let msg = Message::new(Command::GetRegNum.code(), 1, &[0x00, 0x02]).unwrap();
        let mut buff = [0u8; MAX_FRAME_LEN];
        let n = encode(&msg, &Crc32Signature, None, &mut buff).unwrap();

        // Corruption on the wire is caught by the outer CRC
        let mut corrupt = buff;
        corrupt[12] ^= 0x01;
        assert_eq!(
            decode(&corrupt[..n], &Crc32Signature),
            Err(FrameError::WireCrc)
        );

        // Inner corruption with a recomputed wire CRC fails the signature
        let mut resigned = buff;
        resigned[12] ^= 0x01;
        let crc = CRC32.checksum(&resigned[..n - CRC_LEN]);
        LittleEndian::write_u32(&mut resigned[n - CRC_LEN..], crc);
        assert_eq!(
            decode(&resigned[..n], &Crc32Signature),
            Err(FrameError::ProtocolCrc)
        );
    }

    #[test]
    fn custom_authenticator() {
        struct Fixed;

        impl Authenticator for Fixed {
            fn sign(&self, _data: &[u8]) -> u32 {
                0x5A5A_A5A5
            }
        }

        let msg = Message::new(Command::GetUid.code(), 3, &[0x00]).unwrap();
        let mut buff = [0u8; MAX_FRAME_LEN];
        let n = encode(&msg, &Fixed, None, &mut buff).unwrap();

        assert_eq!(&buff[3..7], &[0xA5, 0xA5, 0x5A, 0x5A]);
        assert_eq!(decode(&buff[..n], &Fixed), Ok(msg));
        assert_eq!(
            decode(&buff[..n], &Crc32Signature),
            Err(FrameError::ProtocolCrc)
        );
    }

    #[test]
    fn invalid_lengths() {
        // Too short for an inner block
        assert_eq!(frame_len(8), Err(FrameError::InvalidLength));
        // Inner block not block aligned
        assert_eq!(frame_len(4 + 17), Err(FrameError::InvalidLength));
        // Oversize
        assert_eq!(
            frame_len((4 + MAX_INNER_LEN + BLOCK_LEN) as u16),
            Err(FrameError::InvalidLength)
        );
        // Encrypted frames must carry a nonce
        assert_eq!(frame_len(0x8000 | 20), Err(FrameError::InvalidLength));

        assert_eq!(frame_len(20), Ok(MIN_FRAME_LEN));
        assert_eq!(frame_len(0x8000 | 36), Ok(MIN_FRAME_LEN + NONCE_LEN));
    }
}
