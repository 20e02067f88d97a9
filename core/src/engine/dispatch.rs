// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command dispatch, timeouts and retries
//!
//! A single command may be outstanding at any time. Each command moves
//! through the following phases, driven by received frames and 100ms ticks:
//!
//! ```text
//! [FetchingRandom] --random--> AwaitingAck --ack--> AwaitingResponse --response--> done
//! ```
//!
//! `FetchingRandom` applies only to encrypted commands, which require a fresh
//! sensor challenge before each transmission. Timeouts and link errors resend
//! the command with the same frame number and a fresh nonce until the retry
//! budget is exhausted.

use heapless::Vec;
use rand_core::CryptoRngCore;
use strum::Display;

use fpsensor_proto::{
    frame::{encode, parse_inner, MAX_FRAME_LEN},
    payload::{decode_exact, RandomResp},
    Command, FrameCipher, FrameError, FrameFlags, Message, RawFrame, SessionError,
    MAX_SEND_DATA_LENGTH, STATUS_SUCCESS,
};

use super::{handler::Response, Driver, Engine, Error, LinkError, Output, State};

/// Timer tick period
pub const TICK_MS: u32 = 100;

/// Per-command timeout and retry policy, in ticks
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct TimeoutPolicy {
    /// Ticks to wait for an acknowledgement (or sensor challenge)
    pub ack_ticks: Option<u16>,
    /// Ticks to wait for a response once acknowledged
    pub response_ticks: Option<u16>,
    /// Resends permitted before the command fails
    pub max_retries: u8,
}

impl TimeoutPolicy {
    pub const DEFAULT: Self = Self {
        ack_ticks: Some(10),
        response_ticks: Some(20),
        max_retries: 3,
    };

    /// User-paced commands wait indefinitely for the finger once acknowledged
    pub const USER_PACED: Self = Self {
        ack_ticks: Some(10),
        response_ticks: None,
        max_retries: 3,
    };

    /// No timers and no automatic retries
    pub const NEVER: Self = Self {
        ack_ticks: None,
        response_ticks: None,
        max_retries: 0,
    };

    /// Fetch the policy for a command
    pub fn for_command(command: Command) -> Self {
        match command {
            Command::Register | Command::Recognize => Self::USER_PACED,
            Command::SysTest | Command::ParamReset => Self::NEVER,
            _ => Self::DEFAULT,
        }
    }
}

/// Outstanding command phase
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum Phase {
    FetchingRandom,
    AwaitingAck,
    AwaitingResponse,
}

/// Outstanding command entry
#[derive(Clone, PartialEq, Debug)]
pub struct Entry {
    pub command: Command,
    pub payload: Vec<u8, MAX_SEND_DATA_LENGTH>,
    pub frame_num: u16,
    pub phase: Phase,
    pub retries: u8,
    pub ticks: Option<u16>,
    pub policy: TimeoutPolicy,
    /// Report raw responses rather than handling them
    pub raw: bool,
}

impl Entry {
    /// Command code expected in the next received frame
    pub fn expected_code(&self) -> u16 {
        match self.phase {
            Phase::FetchingRandom => Command::GetRandomNum.code(),
            _ => self.command.code(),
        }
    }

    fn arm(&mut self, phase: Phase) {
        self.phase = phase;
        self.ticks = match phase {
            Phase::FetchingRandom | Phase::AwaitingAck => self.policy.ack_ticks,
            Phase::AwaitingResponse => self.policy.response_ticks,
        };
    }
}

/// Outstanding command slot and frame sequencing
#[derive(Clone, PartialEq, Debug)]
pub struct Dispatch {
    entry: Option<Entry>,
    frame_num: u16,
    cancelled: Option<(Command, u16)>,
}

impl Default for Dispatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatch {
    pub const fn new() -> Self {
        Self {
            entry: None,
            frame_num: 0,
            cancelled: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.entry.is_some()
    }

    pub fn entry(&self) -> Option<&Entry> {
        self.entry.as_ref()
    }

    /// Create an outstanding entry for a command
    pub fn start(&mut self, command: Command, payload: &[u8], raw: bool) -> Result<(), Error> {
        if self.entry.is_some() {
            return Err(Error::Busy);
        }

        let payload = Vec::from_slice(payload).map_err(|_| Error::PayloadTooLong)?;

        self.frame_num = self.frame_num.wrapping_add(1);

        self.entry = Some(Entry {
            command,
            payload,
            frame_num: self.frame_num,
            phase: Phase::AwaitingAck,
            retries: 0,
            ticks: None,
            policy: TimeoutPolicy::for_command(command),
            raw,
        });

        Ok(())
    }

    /// Remove the outstanding entry on completion
    pub fn complete(&mut self) -> Option<Entry> {
        self.entry.take()
    }

    /// Remove the outstanding entry, recording it so late frames are
    /// reported as unsolicited
    pub fn cancel(&mut self) -> Option<Command> {
        let e = self.entry.take()?;
        self.cancelled = Some((e.command, e.frame_num));
        Some(e.command)
    }

    /// Check whether a frame belongs to a cancelled command
    pub fn is_cancelled(&self, code: u16, frame_num: u16) -> bool {
        matches!(self.cancelled, Some((c, n)) if c.code() == code && n == frame_num)
    }

    fn arm(&mut self, phase: Phase) {
        if let Some(e) = self.entry.as_mut() {
            e.arm(phase);
        }
    }

    /// Acknowledgement received, wait for the response
    ///
    /// Retries are counted across all phases of the command.
    fn acked(&mut self) {
        if let Some(e) = self.entry.as_mut() {
            e.arm(Phase::AwaitingResponse);
        }
    }

    /// Advance timers, returning an error on expiry
    pub fn tick(&mut self) -> Option<LinkError> {
        let e = self.entry.as_mut()?;
        let t = e.ticks.as_mut()?;

        *t = t.saturating_sub(1);
        if *t > 0 {
            return None;
        }

        e.ticks = None;
        match e.phase {
            Phase::AwaitingResponse => Some(LinkError::ReceiveTimeout),
            _ => Some(LinkError::AckTimeout),
        }
    }
}

impl<DRV: Driver, RNG: CryptoRngCore> Engine<DRV, RNG> {
    /// Start a command, sending it (or its challenge fetch) immediately
    pub(super) fn issue(&mut self, command: Command, payload: &[u8]) -> Result<Output, Error> {
        self.issue_inner(command, payload, false)
    }

    pub(super) fn issue_inner(
        &mut self,
        command: Command,
        payload: &[u8],
        raw: bool,
    ) -> Result<Output, Error> {
        if command.encrypted() && !self.session.has_key() {
            return Err(Error::NoSessionKey);
        }

        self.dispatch.start(command, payload, raw)?;

        #[cfg(feature = "log")]
        log::debug!("issue {} ({} bytes)", command, payload.len());

        Ok(self.transmit())
    }

    /// Start a follow-up command, reporting `out` unless sending fails
    ///
    /// A transport failure on the follow-up is reported in place of `out`,
    /// state already applied for `out` is retained.
    pub(super) fn chain(
        &mut self,
        out: Output,
        command: Command,
        payload: &[u8],
    ) -> Result<Output, Error> {
        match self.issue(command, payload) {
            Ok(o @ Output::CommandFailed { .. }) => {
                #[cfg(feature = "log")]
                log::warn!("follow-up {} failed, dropping output: {:?}", command, out);

                Ok(o)
            }
            Ok(_) => Ok(out),
            Err(_e) => {
                #[cfg(feature = "log")]
                log::warn!("follow-up {} not sent: {:?}", command, _e);

                self.bootstrap = false;
                Ok(out)
            }
        }
    }

    /// (Re)transmit the outstanding command
    fn transmit(&mut self) -> Output {
        let (command, frame_num) = match self.dispatch.entry() {
            Some(e) => (e.command, e.frame_num),
            None => return Output::None,
        };

        let r = match command.encrypted() {
            true => {
                self.dispatch.arm(Phase::FetchingRandom);
                self.write_frame(Command::GetRandomNum, frame_num, &[], false)
            }
            false => {
                self.dispatch.arm(Phase::AwaitingAck);
                self.write_entry(false)
            }
        };

        match r {
            Ok(()) => Output::Sent(command),
            Err(e) => self.fail(e),
        }
    }

    fn write_entry(&mut self, encrypt: bool) -> Result<(), LinkError> {
        let (command, frame_num, payload) = match self.dispatch.entry() {
            Some(e) => (e.command, e.frame_num, e.payload.clone()),
            None => return Ok(()),
        };

        self.write_frame(command, frame_num, &payload, encrypt)
    }

    fn write_frame(
        &mut self,
        command: Command,
        frame_num: u16,
        data: &[u8],
        encrypt: bool,
    ) -> Result<(), LinkError> {
        let msg = Message::new(command.code(), frame_num, data).map_err(|_| LinkError::SendError)?;
        let mut buff = [0u8; MAX_FRAME_LEN];

        let n = match encrypt {
            true => {
                self.session
                    .refresh_nonce(&mut self.rng)
                    .map_err(|_| LinkError::KeyChanged)?;
                let cipher: &dyn FrameCipher = &self.session;
                encode(&msg, self.session.authenticator(), Some(cipher), &mut buff)
            }
            false => encode(&msg, self.session.authenticator(), None, &mut buff),
        }
        .map_err(|_| LinkError::SendError)?;

        #[cfg(feature = "log")]
        log::trace!("tx {} #{}: {:02x?}", command, frame_num, &buff[..n]);

        self.drv
            .send(&buff[..n])
            .map_err(|_| LinkError::SendError)
    }

    /// Fail the outstanding command
    pub(super) fn fail(&mut self, error: LinkError) -> Output {
        let command = match self.dispatch.complete() {
            Some(e) => e.command,
            None => return Output::None,
        };

        #[cfg(feature = "log")]
        log::warn!("{} failed: {:?}", command, error);

        self.bootstrap = false;
        if command == Command::SetAesKey {
            self.clear_pending_key();
        }
        if matches!(self.state, State::Enrolling(_) | State::Recognizing(_)) {
            self.state = State::Idle;
        }

        Output::CommandFailed { command, error }
    }

    /// Handle a link error, resending the outstanding command while the
    /// retry budget allows
    pub(super) fn link_error(&mut self, error: LinkError) -> Output {
        let (retries, max_retries) = match self.dispatch.entry.as_mut() {
            Some(e) => {
                e.retries = e.retries.saturating_add(1);
                (e.retries, e.policy.max_retries)
            }
            None => return Output::None,
        };

        if retries > max_retries {
            return self.fail(error);
        }

        #[cfg(feature = "log")]
        log::debug!("{:?}, retry {}/{}", error, retries, max_retries);

        match self.transmit() {
            Output::Sent(_) => Output::None,
            o => o,
        }
    }

    /// Advance timers
    pub(super) fn handle_tick(&mut self) -> Output {
        self.reader.tick();

        match self.dispatch.tick() {
            Some(e) => self.link_error(e),
            None => Output::None,
        }
    }

    /// Handle a framing error from the reader
    pub(super) fn frame_error(&mut self, e: FrameError) -> Output {
        #[cfg(feature = "log")]
        log::debug!("frame error: {:?}", e);

        match e {
            FrameError::WireCrc if self.dispatch.is_busy() => self.link_error(LinkError::WireCrc),
            _ => Output::None,
        }
    }

    /// Decrypt (where required) and verify a received frame
    fn open(&mut self, raw: &RawFrame) -> Result<(Message, bool), LinkError> {
        let f = raw.split().map_err(|_| LinkError::WireCrc)?;

        if !f.encrypted() {
            let m = parse_inner(f.inner, self.session.authenticator())
                .map_err(|_| LinkError::ProtocolCrc)?;
            return Ok((m, false));
        }

        match self.session.decrypt_and_verify(raw.as_bytes()) {
            Ok(m) => Ok((m, true)),
            Err(SessionError::BadKeyState) => Err(LinkError::ReceiveError),
            Err(SessionError::IntegrityFailure) => Err(LinkError::ProtocolCrc),
        }
    }

    /// Match a received frame against the outstanding command
    pub(super) fn handle_frame(&mut self, raw: &RawFrame) -> Result<Output, Error> {
        let (msg, encrypted) = match self.open(raw) {
            Ok(v) => v,
            Err(e) => {
                #[cfg(feature = "log")]
                log::debug!("rx error: {:?}", e);

                return Ok(self.link_error(e));
            }
        };

        #[cfg(feature = "log")]
        log::trace!("rx {:04x} #{}: {:02x?}", msg.code, msg.frame_num, &msg.data[..]);

        // Late frames for cancelled commands are dropped
        if self.dispatch.is_cancelled(msg.code, msg.frame_num) {
            return Ok(Output::Unsolicited { code: msg.code });
        }

        let (expected, frame_num, phase, command) = match self.dispatch.entry() {
            Some(e) => (e.expected_code(), e.frame_num, e.phase, e.command),
            None => {
                #[cfg(feature = "log")]
                log::debug!("unsolicited frame {:04x}", msg.code);

                return Ok(Output::Unsolicited { code: msg.code });
            }
        };

        if msg.code != expected {
            self.reader.reset();
            return Ok(self.link_error(LinkError::UnexpectedCommand));
        }

        if msg.frame_num != frame_num {
            #[cfg(feature = "log")]
            log::debug!("dropping stale frame #{} (expected #{})", msg.frame_num, frame_num);

            return Ok(Output::None);
        }

        if msg.flags.contains(FrameFlags::NAK) {
            return Ok(self.link_error(LinkError::AckError));
        }

        match phase {
            Phase::FetchingRandom if msg.is_ack() => return Ok(Output::None),
            Phase::FetchingRandom => return Ok(self.on_random(&msg.data)),
            _ if command.encrypted() && !encrypted => {
                return Ok(self.link_error(LinkError::ReceiveError))
            }
            Phase::AwaitingAck if msg.is_ack() => {
                self.dispatch.acked();
                return Ok(Output::None);
            }
            Phase::AwaitingResponse if msg.is_ack() => return Ok(Output::None),
            _ => (),
        }

        self.handle_response(&msg.data)
    }

    /// Sensor challenge received, send the encrypted command
    fn on_random(&mut self, data: &[u8]) -> Output {
        let r = match decode_exact::<RandomResp>(data) {
            Ok(r) if r.status == STATUS_SUCCESS => r,
            _ => return self.link_error(LinkError::ReceiveError),
        };

        self.session.set_sensor_random(&r.value);
        self.dispatch.arm(Phase::AwaitingAck);

        match self.write_entry(true) {
            Ok(()) => Output::None,
            Err(e) => self.fail(e),
        }
    }

    /// Parse and handle a command response
    fn handle_response(&mut self, data: &[u8]) -> Result<Output, Error> {
        let (command, raw, param) = match self.dispatch.entry() {
            Some(e) => (e.command, e.raw, e.payload.first().copied().unwrap_or(0)),
            None => return Ok(Output::None),
        };

        if raw {
            self.dispatch.complete();
            let data = Vec::from_slice(data).map_err(|_| Error::PayloadTooLong)?;
            return Ok(Output::Response { command, data });
        }

        let resp = match Response::parse(command, data) {
            Ok(r) => r,
            Err(_) => return Ok(self.link_error(LinkError::ReceiveError)),
        };

        // Enrollment completes on the final capture
        if command != Command::Register {
            self.dispatch.complete();
        }

        self.on_response(command, param, resp)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn policies() {
        assert_eq!(
            TimeoutPolicy::for_command(Command::Register),
            TimeoutPolicy::USER_PACED
        );
        assert_eq!(
            TimeoutPolicy::for_command(Command::SysTest),
            TimeoutPolicy::NEVER
        );
        assert_eq!(
            TimeoutPolicy::for_command(Command::GetUid),
            TimeoutPolicy::DEFAULT
        );
    }

    #[test]
    fn busy_and_sequence() {
        let mut d = Dispatch::new();

        d.start(Command::GetVer, &[], false).unwrap();
        assert_eq!(d.start(Command::GetUid, &[], false), Err(Error::Busy));
        assert_eq!(d.entry().unwrap().frame_num, 1);

        d.complete();
        d.start(Command::GetUid, &[0u8; MAX_SEND_DATA_LENGTH], false)
            .unwrap();
        assert_eq!(d.entry().unwrap().frame_num, 2);
        d.complete();

        assert_eq!(
            d.start(Command::GetUid, &[0u8; MAX_SEND_DATA_LENGTH + 1], false),
            Err(Error::PayloadTooLong)
        );
    }

    #[test]
    fn ticks_expire() {
        let mut d = Dispatch::new();
        d.start(Command::GetVer, &[], false).unwrap();
        d.arm(Phase::AwaitingAck);

        for _ in 0..9 {
            assert_eq!(d.tick(), None);
        }
        assert_eq!(d.tick(), Some(LinkError::AckTimeout));
        // Timer disarmed until resent
        assert_eq!(d.tick(), None);

        d.acked();
        for _ in 0..19 {
            assert_eq!(d.tick(), None);
        }
        assert_eq!(d.tick(), Some(LinkError::ReceiveTimeout));
    }

    #[test]
    fn ack_keeps_retry_count() {
        let mut d = Dispatch::new();
        d.start(Command::GetVer, &[], false).unwrap();

        d.entry.as_mut().unwrap().retries = 2;
        d.acked();

        let e = d.entry().unwrap();
        assert_eq!(e.phase, Phase::AwaitingResponse);
        assert_eq!(e.retries, 2);
    }

    #[test]
    fn cancel_idempotent() {
        let mut d = Dispatch::new();
        assert_eq!(d.cancel(), None);

        d.start(Command::Register, &[0], false).unwrap();
        assert_eq!(d.cancel(), Some(Command::Register));
        assert_eq!(d.cancel(), None);

        assert!(!d.is_busy());
        assert!(d.is_cancelled(Command::Register.code(), 1));
        assert!(!d.is_cancelled(Command::Register.code(), 2));
    }
}
