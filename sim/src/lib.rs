// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Simulated fingerprint sensor module
//!
//! [SimSensor] models the sensor side of the serial protocol, for testing
//! drivers without hardware. Bytes written by the host are passed to
//! [SimSensor::receive], with response bytes collected via
//! [SimSensor::take_output].
//!
//! Finger presses are modelled as a queue of [Touch]es consumed by
//! enrollment and recognition, and [Faults] may be injected to exercise
//! host retry handling.

use std::collections::VecDeque;

use log::{debug, warn};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use strum::Display;

use fpsensor_proto::{
    frame::{encode, parse_inner, MAX_FRAME_LEN},
    payload::{ENROLL_STEPS, KEY_MATERIAL_LEN},
    Authenticator, Command, Crc32Signature, FrameCipher, FrameReader, Message, RawFrame,
    SensorError, Session, KEY_LEN, MAX_FINGERS, RANDOM_LEN, STATUS_SUCCESS,
};

/// Default simulated firmware version
pub const SIM_VERSION: [u8; 4] = [1, 0, 3, 7];

/// Maximum touches consumed per request, bounds automatic touches
const MAX_TOUCHES: usize = 32;

/// Simulated finger press
#[derive(Copy, Clone, PartialEq, Debug, Display)]
pub enum Touch {
    /// Finger with the provided identity
    Finger(u8),
    /// Capture failure
    Error(SensorError),
}

/// Injected link faults, each counter applies to the next N frames
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Faults {
    /// Ignore received requests
    pub drop: usize,
    /// Corrupt the wire CRC of transmitted frames
    pub corrupt: usize,
    /// Reject received requests
    pub nak: usize,
    /// Answer the next N encrypted requests with an ACK carrying a bad
    /// signature, and nothing else
    pub forge: usize,
    /// Ignore all requests
    pub silent: bool,
    /// Acknowledge requests without responding
    pub mute: bool,
}

/// Signature construction that never verifies
struct Forged;

impl Authenticator for Forged {
    fn sign(&self, data: &[u8]) -> u32 {
        !Crc32Signature.sign(data)
    }
}

/// User-paced operation waiting for touches
#[derive(Copy, Clone, PartialEq, Debug)]
enum Operation {
    Register { slot: u8, frame_num: u16, count: u8 },
    Recognize { frame_num: u16, mode: u8 },
}

/// Simulated sensor module
pub struct SimSensor {
    reader: FrameReader,
    session: Session,

    version: [u8; 4],
    chip_id: [u8; 8],
    uid: [u8; 16],
    templates: [Option<u8>; MAX_FINGERS],

    touches: VecDeque<Touch>,
    auto_touch: Option<Touch>,
    op: Option<Operation>,
    low_power: bool,

    faults: Faults,
    received: Vec<Command>,
    output: Vec<u8>,

    rng: StdRng,
}

impl Default for SimSensor {
    fn default() -> Self {
        Self::new()
    }
}

/// Key material released for a simulated finger
pub fn template_key(finger: u8) -> [u8; KEY_MATERIAL_LEN] {
    let mut k = [0u8; KEY_MATERIAL_LEN];
    for (i, b) in k.iter_mut().enumerate() {
        *b = finger.wrapping_mul(31).wrapping_add(i as u8);
    }
    k
}

impl SimSensor {
    /// Create an unpaired sensor with no registered fingers
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a sensor with a deterministic challenge source
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(mut rng: StdRng) -> Self {
        let mut uid = [0u8; 16];
        rng.fill_bytes(&mut uid);

        Self {
            reader: FrameReader::new(),
            session: Session::new(),
            version: SIM_VERSION,
            chip_id: *b"FPSIM001",
            uid,
            templates: [None; MAX_FINGERS],
            touches: VecDeque::new(),
            auto_touch: None,
            op: None,
            low_power: false,
            faults: Faults::default(),
            received: Vec::new(),
            output: Vec::new(),
            rng,
        }
    }

    /// Pair the sensor with the provided communication key
    pub fn with_key(mut self, key: &[u8; KEY_LEN]) -> Self {
        self.session.set_key(key);
        self
    }

    /// Register a finger template directly
    pub fn with_template(mut self, slot: u8, finger: u8) -> Self {
        self.enroll_template(slot, finger);
        self
    }

    /// Register a finger template directly
    pub fn enroll_template(&mut self, slot: u8, finger: u8) {
        if let Some(t) = self.templates.get_mut(slot as usize) {
            *t = Some(finger);
        }
    }

    /// Queue a touch, consumed by the next enrollment / recognition capture
    pub fn queue(&mut self, touch: Touch) {
        self.touches.push_back(touch);
    }

    /// Press a finger, completing any waiting capture
    pub fn press(&mut self, touch: Touch) {
        self.queue(touch);
        self.process_touches();
    }

    /// Set a touch applied whenever the queue is empty
    pub fn set_auto_touch(&mut self, touch: Option<Touch>) {
        self.auto_touch = touch;
    }

    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    pub fn has_key(&self) -> bool {
        self.session.has_key()
    }

    pub fn templates(&self) -> &[Option<u8>; MAX_FINGERS] {
        &self.templates
    }

    pub fn registered_count(&self) -> u8 {
        self.templates.iter().filter(|t| t.is_some()).count() as u8
    }

    pub fn is_low_power(&self) -> bool {
        self.low_power
    }

    /// Check whether a capture is awaiting a touch
    pub fn is_waiting(&self) -> bool {
        self.op.is_some()
    }

    /// Commands received (and decoded) so far
    pub fn received(&self) -> &[Command] {
        &self.received
    }

    /// Take bytes written by the sensor
    pub fn take_output(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.output)
    }

    /// Handle bytes written by the host
    pub fn receive(&mut self, data: &[u8]) {
        for b in data {
            match self.reader.feed(*b) {
                Ok(Some(f)) => self.handle(&f),
                Ok(None) => (),
                Err(e) => debug!("sim frame error: {:?}", e),
            }
        }
    }

    fn handle(&mut self, raw: &RawFrame) {
        if self.faults.silent {
            return;
        }
        if self.faults.drop > 0 {
            self.faults.drop -= 1;
            debug!("sim dropping frame");
            return;
        }

        let f = match raw.split() {
            Ok(f) => f,
            Err(_) => return,
        };

        // Undecryptable frames are ignored, the host will time out
        let (msg, encrypted) = match f.encrypted() {
            true => match self.session.decrypt_and_verify(raw.as_bytes()) {
                Ok(m) => (m, true),
                Err(e) => {
                    warn!("sim decrypt failed: {:?}", e);
                    return;
                }
            },
            false => match parse_inner(f.inner, self.session.authenticator()) {
                Ok(m) => (m, false),
                Err(e) => {
                    warn!("sim decode failed: {:?}", e);
                    return;
                }
            },
        };

        let command = match Command::try_from(msg.code) {
            Ok(c) => c,
            Err(_) => {
                warn!("sim unknown command: {:04x}", msg.code);
                self.write(&Message::nak(msg.code, msg.frame_num), encrypted);
                return;
            }
        };

        debug!("sim rx {} #{} ({} bytes)", command, msg.frame_num, msg.data.len());
        self.received.push(command);

        if self.faults.nak > 0 || (command.encrypted() && !encrypted) {
            self.faults.nak = self.faults.nak.saturating_sub(1);
            self.write(&Message::nak(msg.code, msg.frame_num), encrypted);
            return;
        }

        if encrypted && self.faults.forge > 0 {
            self.faults.forge -= 1;
            debug!("sim forging ack signature");
            self.write_with(&Message::ack(msg.code, msg.frame_num), encrypted, true);
            return;
        }

        // Challenge requests are answered without acknowledgement
        if command != Command::GetRandomNum {
            self.write(&Message::ack(msg.code, msg.frame_num), encrypted);

            if self.faults.mute {
                debug!("sim muted, not responding");
                return;
            }
        }

        self.execute(command, msg.frame_num, &msg.data, encrypted);
    }

    fn execute(&mut self, command: Command, frame_num: u16, data: &[u8], encrypted: bool) {
        let param = data.first().copied().unwrap_or(0);

        match command {
            Command::GetVer => {
                let v = self.version;
                self.reply(command, frame_num, &v, encrypted);
            }
            Command::GetRandomNum => {
                let mut r = [0u8; RANDOM_LEN];
                self.rng.fill_bytes(&mut r);
                self.session.set_sensor_random(&r);

                let mut resp = vec![STATUS_SUCCESS];
                resp.extend_from_slice(&r);
                self.reply(command, frame_num, &resp, false);
            }
            Command::SetAesKey => {
                let status = match (self.session.has_key(), <[u8; KEY_LEN]>::try_from(data)) {
                    (true, _) => u8::from(SensorError::AesKeyAlreadyExists),
                    (false, Ok(k)) => {
                        self.session.set_key(&k);
                        STATUS_SUCCESS
                    }
                    (false, Err(_)) => u8::from(SensorError::GeneralFail),
                };
                self.reply(command, frame_num, &[status], encrypted);
            }
            Command::GetAesKeyState => {
                let s = self.session.has_key() as u8;
                self.reply(command, frame_num, &[s], encrypted);
            }
            Command::GetInitState => {
                let s = self.session.has_key() as u8;
                self.reply(command, frame_num, &[STATUS_SUCCESS, s], encrypted);
            }
            Command::GetRegNum => {
                let n = self.registered_count();
                self.reply(command, frame_num, &[STATUS_SUCCESS, n], encrypted);
            }
            Command::GetChipId | Command::GetUid => {
                let mut resp = vec![STATUS_SUCCESS];
                match command {
                    Command::GetChipId => resp.extend_from_slice(&self.chip_id),
                    _ => resp.extend_from_slice(&self.uid),
                }
                self.reply(command, frame_num, &resp, encrypted);
            }
            Command::DeleteSingle => {
                let status = match self.templates.get_mut(param as usize) {
                    Some(t) => {
                        *t = None;
                        STATUS_SUCCESS
                    }
                    None => u8::from(SensorError::NonExistentFingerprint),
                };
                self.reply(command, frame_num, &[status], encrypted);
            }
            Command::DeleteAll => {
                self.templates = [None; MAX_FINGERS];
                self.reply(command, frame_num, &[STATUS_SUCCESS], encrypted);
            }
            Command::CancelExecute | Command::SysReset | Command::ParamReset => {
                self.op = None;
                self.low_power = false;
                self.reply(command, frame_num, &[STATUS_SUCCESS], encrypted);
            }
            Command::LowPower => {
                self.low_power = true;
                self.reply(command, frame_num, &[STATUS_SUCCESS], encrypted);
            }
            Command::SysTest => {
                self.reply(command, frame_num, &[STATUS_SUCCESS], encrypted);
            }
            Command::Register => {
                if param as usize >= MAX_FINGERS {
                    self.reply(command, frame_num, &[u8::from(SensorError::GeneralFail)], encrypted);
                    return;
                }
                self.op = Some(Operation::Register {
                    slot: param,
                    frame_num,
                    count: 0,
                });
                self.process_touches();
            }
            Command::Recognize => {
                self.op = Some(Operation::Recognize {
                    frame_num,
                    mode: param,
                });
                self.process_touches();
            }
        }
    }

    fn process_touches(&mut self) {
        for _ in 0..MAX_TOUCHES {
            if self.op.is_none() {
                break;
            }

            let touch = match self.touches.pop_front().or(self.auto_touch) {
                Some(t) => t,
                None => break,
            };

            debug!("sim touch: {}", touch);
            self.apply_touch(touch);
        }
    }

    fn apply_touch(&mut self, touch: Touch) {
        let op = match self.op {
            Some(op) => op,
            None => return,
        };

        match (op, touch) {
            (Operation::Register { frame_num, .. }, Touch::Error(e)) => {
                self.reply(Command::Register, frame_num, &[u8::from(e)], true);
            }
            (
                Operation::Register {
                    slot,
                    frame_num,
                    count,
                },
                Touch::Finger(f),
            ) => {
                // Fingers may only be registered once
                let repeat = self
                    .templates
                    .iter()
                    .enumerate()
                    .any(|(i, t)| i != slot as usize && *t == Some(f));
                if repeat {
                    self.op = None;
                    self.reply(
                        Command::Register,
                        frame_num,
                        &[u8::from(SensorError::RepeatFinger)],
                        true,
                    );
                    return;
                }

                let count = count + 1;
                let mut resp = vec![STATUS_SUCCESS, slot + 1, count, 90, 100, 0];

                if count >= ENROLL_STEPS {
                    self.templates[slot as usize] = Some(f);
                    self.op = None;
                    resp.extend_from_slice(&template_key(f));
                } else {
                    self.op = Some(Operation::Register {
                        slot,
                        frame_num,
                        count,
                    });
                }

                self.reply(Command::Register, frame_num, &resp, true);
            }
            (Operation::Recognize { frame_num, .. }, Touch::Error(e)) => {
                self.op = None;
                self.reply(Command::Recognize, frame_num, &[u8::from(e)], true);
            }
            (Operation::Recognize { frame_num, mode }, Touch::Finger(f)) => {
                self.op = None;

                let slot = self.templates.iter().position(|t| *t == Some(f));
                let resp = match slot {
                    Some(s) => {
                        let mut r = vec![STATUS_SUCCESS, 95, s as u8 + 1, 0, 0, 0];
                        if mode != 0 {
                            r.extend_from_slice(&template_key(f));
                        }
                        r
                    }
                    None => vec![u8::from(SensorError::NoTemplatesMatched)],
                };

                self.reply(Command::Recognize, frame_num, &resp, true);
            }
        }
    }

    fn reply(&mut self, command: Command, frame_num: u16, data: &[u8], encrypted: bool) {
        match Message::new(command.code(), frame_num, data) {
            Ok(m) => self.write(&m, encrypted),
            Err(e) => warn!("sim reply encoding failed: {:?}", e),
        }
    }

    fn write(&mut self, msg: &Message, encrypted: bool) {
        self.write_with(msg, encrypted, false)
    }

    fn write_with(&mut self, msg: &Message, encrypted: bool, forged: bool) {
        let mut buff = [0u8; MAX_FRAME_LEN];

        let cipher: Option<&dyn FrameCipher> = match encrypted && self.session.has_key() {
            true => Some(&self.session),
            false => None,
        };
        let r = match forged {
            true => encode(msg, &Forged, cipher, &mut buff),
            false => encode(msg, self.session.authenticator(), cipher, &mut buff),
        };
        let n = match r {
            Ok(n) => n,
            Err(e) => {
                warn!("sim frame encoding failed: {:?}", e);
                return;
            }
        };

        if self.faults.corrupt > 0 {
            self.faults.corrupt -= 1;
            buff[n - 1] ^= 0xff;
        }

        self.output.extend_from_slice(&buff[..n]);
    }
}
