#![allow(unused)]

use log::{debug, trace};
use rand::{rngs::StdRng, SeedableRng};

use fpsensor_core::{
    engine::{Driver, DriverError, Engine, Output, TICK_MS},
    proto::{
        frame::{encode, MAX_FRAME_LEN},
        manager_info::MANAGER_INFO_LEN,
        Crc32Signature, Message, KEY_LEN,
    },
};
use fpsensor_sim::{SimSensor, Touch};

/// Finger used for enrolled templates
pub const FINGER: u8 = 7;

/// Finger never enrolled
pub const OTHER_FINGER: u8 = 9;

/// Driver implementation for test use
#[derive(Clone, Debug, Default)]
pub struct TestDriver {
    /// Bytes written to the sensor and not yet delivered
    pub outbox: Vec<u8>,
    /// Number of frames written
    pub sends: usize,
    /// Simulate a broken transport
    pub fail_send: bool,
    /// Break the transport once this many frames have been written
    pub fail_after: Option<usize>,

    /// Secure element manager record
    pub manager_info: [u8; MANAGER_INFO_LEN],
    /// Number of manager record writes
    pub manager_writes: usize,
    /// Secure element communication key
    pub comm_key: Option<[u8; KEY_LEN]>,
}

impl Driver for TestDriver {
    fn send(&mut self, data: &[u8]) -> Result<(), DriverError> {
        if self.fail_send || self.fail_after.map(|n| self.sends >= n).unwrap_or(false) {
            return Err(DriverError::Transport);
        }

        trace!("send: {:02x?}", data);

        self.outbox.extend_from_slice(data);
        self.sends += 1;
        Ok(())
    }

    fn write_manager_info(&mut self, info: &[u8; MANAGER_INFO_LEN]) -> Result<(), DriverError> {
        self.manager_info = *info;
        self.manager_writes += 1;
        Ok(())
    }

    fn read_manager_info(&mut self) -> Result<[u8; MANAGER_INFO_LEN], DriverError> {
        Ok(self.manager_info)
    }

    fn store_comm_key(&mut self, key: &[u8; KEY_LEN]) -> Result<(), DriverError> {
        self.comm_key = Some(*key);
        Ok(())
    }

    fn load_comm_key(&mut self) -> Result<Option<[u8; KEY_LEN]>, DriverError> {
        Ok(self.comm_key)
    }
}

/// Engine connected to a simulated sensor
pub struct Harness {
    pub engine: Engine<TestDriver, StdRng>,
    pub sim: SimSensor,
}

impl Harness {
    pub fn new(sim: SimSensor) -> Self {
        Self::with_driver(sim, TestDriver::default())
    }

    pub fn with_driver(sim: SimSensor, drv: TestDriver) -> Self {
        let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());

        Self {
            engine: Engine::new_with_rng(drv, StdRng::seed_from_u64(7)),
            sim,
        }
    }

    /// Bootstrap against an unpaired sensor, provisioning a new key
    pub fn paired() -> Self {
        let mut h = Self::new(SimSensor::with_seed(1));

        h.engine.start().unwrap();
        let out = h.pump();

        assert_eq!(out.last(), Some(&Output::AesKeySet));
        assert!(h.engine.has_session_key());

        h
    }

    /// Paired harness with [FINGER] enrolled in slot 0
    pub fn enrolled() -> Self {
        let mut h = Self::paired();

        h.sim.enroll_template(0, FINGER);
        h.engine.manager_mut().add_finger(0, 0).unwrap();

        h
    }

    /// Exchange bytes until both sides are quiet, returning engine outputs
    pub fn pump(&mut self) -> Vec<Output> {
        let mut outputs = vec![];

        loop {
            let tx = core::mem::take(&mut self.engine.driver_mut().outbox);
            if !tx.is_empty() {
                self.sim.receive(&tx);
            }

            let rx = self.sim.take_output();
            if tx.is_empty() && rx.is_empty() {
                break;
            }

            for b in rx {
                match self.engine.receive(b).unwrap() {
                    Output::None => (),
                    o => outputs.push(o),
                }
            }
        }

        debug!("outputs: {:?}", outputs);

        outputs
    }

    /// Advance timers by `n` ticks, pumping between each
    pub fn ticks(&mut self, n: usize) -> Vec<Output> {
        let mut outputs = vec![];

        for _ in 0..n {
            match self.engine.tick().unwrap() {
                Output::None => (),
                o => outputs.push(o),
            }
            outputs.extend(self.pump());
        }

        outputs
    }

    /// Feed a plaintext frame to the engine as if sent by the sensor
    pub fn inject(&mut self, msg: &Message) -> Vec<Output> {
        let mut buff = [0u8; MAX_FRAME_LEN];
        let n = encode(msg, &Crc32Signature, None, &mut buff).unwrap();

        let mut outputs = vec![];
        for b in &buff[..n] {
            match self.engine.receive(*b).unwrap() {
                Output::None => (),
                o => outputs.push(o),
            }
        }

        outputs
    }

    /// Discard bytes written by the engine without delivering them
    pub fn discard(&mut self) {
        self.engine.driver_mut().outbox.clear();
    }

    /// Present a finger, returning resulting outputs
    pub fn press(&mut self, touch: Touch) -> Vec<Output> {
        self.sim.press(touch);
        self.pump()
    }
}

/// Ticks per second of simulated time
pub const TICKS_PER_SEC: usize = 1000 / TICK_MS as usize;
