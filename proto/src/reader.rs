// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Byte-at-a-time frame reassembly
//!
//! [FrameReader::feed] performs no allocation and completes in bounded time,
//! so it may be called from a receive interrupt. Completed frames are copied
//! out as [RawFrame]s for handling outside of interrupt context.

use byteorder::{ByteOrder, LittleEndian};
use heapless::Vec;

use crate::{
    frame::{frame_len, Frame, FrameError, HEADER_LEN},
    RCV_MSG_MAX_LEN, SYNC,
};

/// Ticks without input after which a partial frame is discarded
pub const STALE_TICKS: u8 = 2;

/// Complete frame with a valid wire CRC
#[derive(Clone, PartialEq, Debug)]
pub struct RawFrame(Vec<u8, RCV_MSG_MAX_LEN>);

impl RawFrame {
    /// Create a raw frame from received bytes, checking framing and wire CRC
    pub fn new(b: &[u8]) -> Result<Self, FrameError> {
        let _ = Frame::split(b)?;

        let v = Vec::from_slice(b).map_err(|_| FrameError::Overflow)?;
        Ok(Self(v))
    }

    /// Fetch frame bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Split frame into nonce and inner block
    pub fn split(&self) -> Result<Frame<'_>, FrameError> {
        Frame::split(&self.0)
    }
}

impl AsRef<[u8]> for RawFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Frame reassembly buffer
pub struct FrameReader {
    buff: [u8; RCV_MSG_MAX_LEN],
    index: usize,
    expected: usize,
    idle: u8,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// Create a new (empty) frame reader
    pub const fn new() -> Self {
        Self {
            buff: [0u8; RCV_MSG_MAX_LEN],
            index: 0,
            expected: 0,
            idle: 0,
        }
    }

    /// Feed a received byte, returning a frame on completion
    ///
    /// Bytes outside of a frame are discarded until the next [SYNC] marker.
    /// Length and CRC errors discard the partial frame and are returned so
    /// the caller can account for them.
    pub fn feed(&mut self, b: u8) -> Result<Option<RawFrame>, FrameError> {
        self.idle = 0;

        // Wait for sync at the start of a frame
        if self.index == 0 && b != SYNC {
            return Ok(None);
        }

        if self.index >= self.buff.len() {
            self.reset();
            return Err(FrameError::Overflow);
        }

        self.buff[self.index] = b;
        self.index += 1;

        // Validate length as soon as the header is complete
        if self.index == HEADER_LEN {
            let len_field = LittleEndian::read_u16(&self.buff[1..]);

            match frame_len(len_field) {
                Ok(n) if n <= self.buff.len() => self.expected = n,
                _ => {
                    #[cfg(feature = "log")]
                    log::debug!("discarding frame with length field {:04x}", len_field);

                    self.reset();
                    return Err(FrameError::InvalidLength);
                }
            }
        }

        if self.expected == 0 || self.index < self.expected {
            return Ok(None);
        }

        // Frame complete, check and copy out
        let r = RawFrame::new(&self.buff[..self.index]);
        self.reset();

        r.map(Some)
    }

    /// Advance the inter-byte timer, discarding stale partial frames
    pub fn tick(&mut self) {
        if self.index == 0 {
            return;
        }

        self.idle = self.idle.saturating_add(1);
        if self.idle >= STALE_TICKS {
            #[cfg(feature = "log")]
            log::debug!("discarding stale partial frame ({} bytes)", self.index);

            self.reset();
        }
    }

    /// Discard any partial frame
    pub fn reset(&mut self) {
        self.index = 0;
        self.expected = 0;
        self.idle = 0;
    }

    /// Number of buffered bytes
    pub fn pending(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, RngCore, SeedableRng};

    use super::*;
    use crate::{
        frame::{decode, encode, Crc32Signature, Message, MAX_FRAME_LEN},
        Command,
    };

    fn encoded(cmd: Command, frame_num: u16, data: &[u8]) -> std::vec::Vec<u8> {
        let msg = Message::new(cmd.code(), frame_num, data).unwrap();
        let mut buff = [0u8; MAX_FRAME_LEN];
        let n = encode(&msg, &Crc32Signature, None, &mut buff).unwrap();
        buff[..n].to_vec()
    }

    fn feed_all(r: &mut FrameReader, b: &[u8]) -> std::vec::Vec<Result<RawFrame, FrameError>> {
        b.iter()
            .filter_map(|b| r.feed(*b).transpose())
            .collect()
    }

    #[test]
    fn chunking_invariance() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut payload = [0u8; 120];
        rng.fill_bytes(&mut payload);

        let a = encoded(Command::Recognize, 1, &payload);
        let b = encoded(Command::GetVer, 2, &[1, 2, 3, 4]);
        let stream = [&a[..], &b[..]].concat();

        for chunk in [1, 2, 7, 64, stream.len()] {
            let mut r = FrameReader::new();
            let mut frames = std::vec::Vec::new();

            for c in stream.chunks(chunk) {
                frames.extend(feed_all(&mut r, c));
            }

            assert_eq!(frames.len(), 2, "chunk size {chunk}");
            assert_eq!(frames[0].as_ref().unwrap().as_bytes(), &a[..]);
            assert_eq!(frames[1].as_ref().unwrap().as_bytes(), &b[..]);
        }
    }

    #[test]
    fn skip_noise() {
        let f = encoded(Command::GetRegNum, 9, &[0, 1]);
        let stream = [&[0x00, 0x13, 0x55][..], &f[..]].concat();

        let mut r = FrameReader::new();
        let frames = feed_all(&mut r, &stream);

        assert_eq!(frames.len(), 1);
        let m = decode(frames[0].as_ref().unwrap().as_bytes(), &Crc32Signature).unwrap();
        assert_eq!(m.frame_num, 9);
    }

    #[test]
    fn resync_after_invalid_length() {
        let f = encoded(Command::GetRegNum, 4, &[0, 1]);
        let stream = [&[SYNC, 0xff, 0x7f, 0x01, 0x02][..], &f[..]].concat();

        let mut r = FrameReader::new();
        let frames = feed_all(&mut r, &stream);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Err(FrameError::InvalidLength));
        assert_eq!(frames[1].as_ref().unwrap().as_bytes(), &f[..]);
    }

    #[test]
    fn wire_crc_error() {
        let mut f = encoded(Command::DeleteAll, 5, &[0]);
        let n = f.len();
        f[n - 1] ^= 0xff;

        let mut r = FrameReader::new();
        assert_eq!(feed_all(&mut r, &f), vec![Err(FrameError::WireCrc)]);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn stale_partial_frame() {
        let f = encoded(Command::GetUid, 6, &[0, 1, 2, 3]);

        let mut r = FrameReader::new();
        assert!(feed_all(&mut r, &f[..10]).is_empty());
        assert_eq!(r.pending(), 10);

        r.tick();
        assert_eq!(r.pending(), 10);
        r.tick();
        assert_eq!(r.pending(), 0);

        // Full frame is received after the stale bytes are dropped
        let frames = feed_all(&mut r, &f);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_ok());
    }
}
