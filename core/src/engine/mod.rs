// Copyright (c) 2022-2023 The MobileCoin Foundation

//! The [Engine] drives a fingerprint sensor module.
//!
//! This handles [Event] inputs (received bytes, timer ticks and user
//! requests) and returns [Output] responses to the caller, see
//! [proto][crate::proto] for the wire protocol.
//!
//! Requests return as soon as the command is written, with completion
//! reported by a later [Output] from [Engine::receive] or [Engine::tick].

use rand_core::{CryptoRngCore, OsRng};
use strum::{Display, EnumIter, EnumString, EnumVariantNames};
use zeroize::Zeroize;

use fpsensor_proto::{
    manager_info::MANAGER_INFO_LEN, Command, FrameReader, Session, KEY_LEN, MAX_FINGERS,
    MAX_WALLETS,
};

mod dispatch;
pub use dispatch::{Entry, Phase, TimeoutPolicy, TICK_MS};
use dispatch::Dispatch;

mod enroll;
pub use enroll::MAX_ATTEMPTS as ENROLL_MAX_ATTEMPTS;
use enroll::Enrollment;

mod handler;

mod lockout;
pub use lockout::{
    Lockout, LockoutAction, ENABLE_SIGN_MAX_FAILURES, SIGN_ATTEMPT_MAX_FAILURES,
    SIGN_MAX_FAILURES, UNLOCK_MAX_FAILURES,
};

mod manager;
pub use manager::Manager;

mod event;
pub use event::Event;

mod output;
pub use output::{EnrollFailureReason, Output};

mod error;
pub use error::{Error, LinkError};

/// Recognition purpose, determining lockout policy and key release
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Display)]
pub enum Purpose {
    /// Device unlock
    #[default]
    Unlock,
    /// Confirm enabling fingerprint signing for a wallet
    EnableSign { wallet: u8 },
    /// Transaction signing
    Sign { wallet: u8 },
}

impl Purpose {
    /// Recognition mode byte, non-zero requests key material
    pub fn mode(&self) -> u8 {
        match self {
            Purpose::Unlock => 0,
            _ => 1,
        }
    }

    /// Wallet index, where applicable
    pub fn wallet(&self) -> Option<u8> {
        match self {
            Purpose::Unlock => None,
            Purpose::EnableSign { wallet } | Purpose::Sign { wallet } => Some(*wallet),
        }
    }
}

/// Engine internal state enumeration
#[derive(Copy, Clone, PartialEq, Debug, EnumString, Display, EnumVariantNames, EnumIter)]
pub enum State {
    /// No enrollment or recognition running
    Idle,
    /// Enrollment running, waiting for the given capture step
    Enrolling(u8),
    EnrollSuccess,
    EnrollFailure,
    /// Recognition running
    Recognizing(Purpose),
    RecognizeSuccess,
    RecognizeFailure,
}

/// [Engine] provides hardware-independent fingerprint sensor support
pub struct Engine<DRV: Driver, RNG: CryptoRngCore = OsRng> {
    state: State,

    reader: FrameReader,
    session: Session,
    dispatch: Dispatch,

    manager: Manager,
    lockout: Lockout,
    enroll: Enrollment,

    present: bool,
    bootstrap: bool,
    version: Option<[u8; 4]>,
    pending_key: Option<[u8; KEY_LEN]>,
    wallet: u8,

    drv: DRV,
    rng: RNG,
}

/// [`Driver`] errors
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
pub enum DriverError {
    #[cfg_attr(feature = "thiserror", error("transport write failed"))]
    Transport,
    #[cfg_attr(feature = "thiserror", error("secure element access failed"))]
    SecureElement,
}

/// [`Driver`] trait provides platform support for [`Engine`] instances
pub trait Driver {
    /// Write bytes to the sensor
    fn send(&mut self, data: &[u8]) -> Result<(), DriverError>;

    /// Store the manager record in the secure element
    fn write_manager_info(&mut self, info: &[u8; MANAGER_INFO_LEN]) -> Result<(), DriverError>;

    /// Read the manager record from the secure element
    fn read_manager_info(&mut self) -> Result<[u8; MANAGER_INFO_LEN], DriverError>;

    /// Store the communication key in the secure element
    fn store_comm_key(&mut self, key: &[u8; KEY_LEN]) -> Result<(), DriverError>;

    /// Load the communication key from the secure element
    fn load_comm_key(&mut self) -> Result<Option<[u8; KEY_LEN]>, DriverError>;
}

impl<T: Driver> Driver for &mut T {
    fn send(&mut self, data: &[u8]) -> Result<(), DriverError> {
        T::send(self, data)
    }

    fn write_manager_info(&mut self, info: &[u8; MANAGER_INFO_LEN]) -> Result<(), DriverError> {
        T::write_manager_info(self, info)
    }

    fn read_manager_info(&mut self) -> Result<[u8; MANAGER_INFO_LEN], DriverError> {
        T::read_manager_info(self)
    }

    fn store_comm_key(&mut self, key: &[u8; KEY_LEN]) -> Result<(), DriverError> {
        T::store_comm_key(self, key)
    }

    fn load_comm_key(&mut self) -> Result<Option<[u8; KEY_LEN]>, DriverError> {
        T::load_comm_key(self)
    }
}

impl<DRV: Driver> Engine<DRV> {
    /// Create a new engine instance with the provided driver,
    /// using the default [OsRng]
    pub const fn new(drv: DRV) -> Self {
        Self::new_with_rng(drv, OsRng {})
    }
}

impl<DRV: Driver, RNG: CryptoRngCore> Engine<DRV, RNG> {
    /// Create a new engine instance with the provided driver and rng
    pub const fn new_with_rng(drv: DRV, rng: RNG) -> Self {
        Self {
            state: State::Idle,
            reader: FrameReader::new(),
            session: Session::new(),
            dispatch: Dispatch::new(),
            manager: Manager::new(),
            lockout: Lockout::new(),
            enroll: Enrollment::new(),
            present: false,
            bootstrap: false,
            version: None,
            pending_key: None,
            wallet: 0,
            drv,
            rng,
        }
    }

    /// Handle incoming events
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn update(&mut self, evt: &Event) -> Result<Output, Error> {
        #[cfg(feature = "log")]
        log::debug!("event: {:02x?}", evt);

        match evt {
            Event::None => Ok(Output::None),
            Event::Frame(f) => self.handle_frame(f),
            Event::FrameError(e) => Ok(self.frame_error(*e)),
            Event::Tick => self.tick(),
            Event::Start => self.start(),
            Event::Register { slot } => self.register(*slot),
            Event::Delete { slot } => self.delete(*slot),
            Event::DeleteAll => self.delete_all(),
            Event::Recognize(p) => self.recognize(*p),
            Event::Cancel => self.cancel(),
            Event::GetVersion => self.get_firmware_version(),
            Event::GetInitState => self.get_init_state(),
            Event::GetChipId => self.get_chip_id(),
            Event::GetUid => self.get_uid(),
            Event::GetRegisteredCount => self.get_registered_count(),
            Event::GetAesKeyState => self.get_aes_key_state(),
            Event::SetAesKey => self.set_aes_key(),
            Event::SetLowPower => self.set_low_power(),
            Event::SysReset => self.sys_reset(),
            Event::Raw { command, data } => self.raw(*command, data),
        }
    }

    /// Feed a received byte
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn receive(&mut self, b: u8) -> Result<Output, Error> {
        match self.reader.feed(b) {
            Ok(Some(f)) => self.handle_frame(&f),
            Ok(None) => Ok(Output::None),
            Err(e) => Ok(self.frame_error(e)),
        }
    }

    /// Advance timers, to be called every [TICK_MS]
    pub fn tick(&mut self) -> Result<Output, Error> {
        Ok(self.handle_tick())
    }

    /// Detect the sensor module and restore (or establish) pairing
    ///
    /// Fetches the firmware version, then the key state, then either
    /// provisions a new communication key or restores the stored key and
    /// manager record and checks the registered finger count.
    pub fn start(&mut self) -> Result<Output, Error> {
        if self.dispatch.is_busy() {
            return Err(Error::Busy);
        }

        self.present = false;
        self.bootstrap = true;

        let r = self.issue(Command::GetVer, &[]);
        if r.is_err() {
            self.bootstrap = false;
        }
        r
    }

    /// Enroll a finger into the provided slot
    pub fn register(&mut self, slot: u8) -> Result<Output, Error> {
        self.check_present()?;

        if slot as usize >= MAX_FINGERS {
            return Err(Error::InvalidSlot);
        }
        if self.manager.is_registered(slot) {
            return Err(Error::SlotInUse);
        }

        let out = self.issue(Command::Register, &[slot])?;
        if let Output::Sent(_) = out {
            self.enroll.start(slot);
            self.state = State::Enrolling(self.enroll.step());
        }

        Ok(out)
    }

    /// Delete a single finger slot
    pub fn delete(&mut self, slot: u8) -> Result<Output, Error> {
        self.check_present()?;

        if slot as usize >= MAX_FINGERS {
            return Err(Error::InvalidSlot);
        }

        self.issue(Command::DeleteSingle, &[slot])
    }

    /// Delete all registered fingers
    pub fn delete_all(&mut self) -> Result<Output, Error> {
        self.check_present()?;
        self.issue(Command::DeleteAll, &[])
    }

    /// Match a finger for the provided purpose
    pub fn recognize(&mut self, purpose: Purpose) -> Result<Output, Error> {
        self.check_present()?;
        self.lockout.check(purpose, &self.manager)?;

        let out = self.issue(Command::Recognize, &[purpose.mode()])?;
        if let Output::Sent(_) = out {
            self.state = State::Recognizing(purpose);
        }

        Ok(out)
    }

    /// Cancel any outstanding command
    ///
    /// Safe to call when idle. Frames arriving for the cancelled command are
    /// reported as [Output::Unsolicited].
    pub fn cancel(&mut self) -> Result<Output, Error> {
        let command = match self.discard() {
            Some(c) => c,
            None => return Ok(Output::None),
        };

        #[cfg(feature = "log")]
        log::debug!("cancelled {}", command);

        let out = Output::Cancelled { command };

        // Stop the sensor waiting for a finger
        if command.user_paced() && self.session.has_key() {
            return self.chain(out, Command::CancelExecute, &[]);
        }

        Ok(out)
    }

    pub fn get_firmware_version(&mut self) -> Result<Output, Error> {
        self.issue(Command::GetVer, &[])
    }

    pub fn get_init_state(&mut self) -> Result<Output, Error> {
        self.issue(Command::GetInitState, &[])
    }

    pub fn get_chip_id(&mut self) -> Result<Output, Error> {
        self.issue(Command::GetChipId, &[])
    }

    pub fn get_uid(&mut self) -> Result<Output, Error> {
        self.issue(Command::GetUid, &[])
    }

    pub fn get_registered_count(&mut self) -> Result<Output, Error> {
        self.issue(Command::GetRegNum, &[])
    }

    pub fn get_aes_key_state(&mut self) -> Result<Output, Error> {
        self.issue(Command::GetAesKeyState, &[])
    }

    /// Generate a communication key and provision it to the sensor,
    /// storing it in the secure element on success
    pub fn set_aes_key(&mut self) -> Result<Output, Error> {
        if self.dispatch.is_busy() {
            return Err(Error::Busy);
        }
        self.request_aes_key()
    }

    pub fn set_low_power(&mut self) -> Result<Output, Error> {
        self.issue(Command::LowPower, &[])
    }

    pub fn sys_reset(&mut self) -> Result<Output, Error> {
        self.issue(Command::SysReset, &[])
    }

    /// Issue a command directly, returning the raw response as [Output::Response]
    pub fn raw(&mut self, command: Command, data: &[u8]) -> Result<Output, Error> {
        self.issue_inner(command, data, true)
    }

    /// Install a communication key (eg. loaded from the secure element)
    ///
    /// Replacing the key fails any outstanding encrypted command with
    /// [LinkError::KeyChanged].
    pub fn install_comm_key(&mut self, key: &[u8; KEY_LEN]) -> Output {
        if !self.session.set_key(key) {
            return Output::None;
        }

        match self.dispatch.entry() {
            Some(e) if e.command.encrypted() => self.fail(LinkError::KeyChanged),
            _ => Output::None,
        }
    }

    /// Select the wallet used for enrollment sign flag handling
    pub fn select_wallet(&mut self, wallet: u8) -> Result<(), Error> {
        if wallet as usize >= MAX_WALLETS {
            return Err(Error::InvalidWallet);
        }
        self.wallet = wallet;
        Ok(())
    }

    /// Write the manager record to the secure element
    pub fn push_to_secure_element(&mut self) -> Result<(), Error> {
        self.manager.push(&mut self.drv)
    }

    /// Restore the manager record from the secure element
    pub fn load_from_secure_element(&mut self) -> Result<(), Error> {
        self.manager.load(&mut self.drv)
    }

    /// Clear all fingerprint state, both locally and on the sensor
    pub fn wipe(&mut self) -> Result<Output, Error> {
        self.discard();
        self.state = State::Idle;
        self.lockout = Lockout::new();

        self.manager.clear();
        self.manager.push(&mut self.drv)?;

        match self.present && self.session.has_key() {
            true => self.issue(Command::DeleteAll, &[]),
            false => Ok(Output::None),
        }
    }

    /// Clear lockout state for a purpose, following passcode verification
    pub fn reset_lockout(&mut self, purpose: Purpose) {
        self.lockout.reset(purpose);
    }

    /// Start a new signing attempt
    pub fn begin_sign_attempt(&mut self) {
        self.lockout.begin_sign_attempt();
    }

    pub fn is_module_present(&self) -> bool {
        self.present
    }

    pub fn registered_count(&self) -> u8 {
        self.manager.registered_count()
    }

    pub fn unlock_flag(&self) -> bool {
        self.manager.unlock_flag()
    }

    pub fn sign_flag(&self, wallet: u8) -> bool {
        self.manager.sign_flag(wallet)
    }

    /// Check whether fingerprint unlock may be offered
    pub fn unlock_available(&self) -> bool {
        self.present && self.lockout.unlock_available(&self.manager)
    }

    pub fn firmware_version(&self) -> Option<[u8; 4]> {
        self.version
    }

    pub fn has_session_key(&self) -> bool {
        self.session.has_key()
    }

    /// Check whether no command is outstanding
    pub fn is_idle(&self) -> bool {
        !self.dispatch.is_busy()
    }

    /// Fetch the outstanding command, if any
    pub fn outstanding(&self) -> Option<&Entry> {
        self.dispatch.entry()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// Mutable manager access, updates are not written to the secure
    /// element until [Engine::push_to_secure_element]
    pub fn manager_mut(&mut self) -> &mut Manager {
        &mut self.manager
    }

    pub fn driver(&self) -> &DRV {
        &self.drv
    }

    pub fn driver_mut(&mut self) -> &mut DRV {
        &mut self.drv
    }

    /// Drop the outstanding command along with any bootstrap or key
    /// provisioning in progress
    fn discard(&mut self) -> Option<Command> {
        let command = self.dispatch.cancel()?;

        self.bootstrap = false;
        self.clear_pending_key();
        if matches!(self.state, State::Enrolling(_) | State::Recognizing(_)) {
            self.state = State::Idle;
        }

        Some(command)
    }

    fn check_present(&self) -> Result<(), Error> {
        match self.present {
            true => Ok(()),
            false => Err(Error::NotPresent),
        }
    }
}

impl<DRV: Driver, RNG: CryptoRngCore> Drop for Engine<DRV, RNG> {
    fn drop(&mut self) {
        if let Some(k) = self.pending_key.as_mut() {
            k.zeroize();
        }
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn purpose_modes() {
        assert_eq!(Purpose::Unlock.mode(), 0);
        assert_eq!(Purpose::EnableSign { wallet: 1 }.mode(), 1);
        assert_eq!(Purpose::Sign { wallet: 2 }.wallet(), Some(2));
    }

    #[test]
    fn state_names() {
        let names: std::vec::Vec<_> = State::iter().map(|s| s.to_string()).collect();
        assert_eq!(names.len(), 7);
        assert!(names.contains(&"Enrolling".to_string()));
    }
}
