// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Recognition lockout policy
//!
//! Failure counters are scoped by [Purpose], a successful recognition only
//! resets the counters for its own purpose. Only non-matching fingers count
//! as failures, capture problems (wet finger, lifted early) do not.

use strum::Display;

use fpsensor_proto::MAX_WALLETS;

use super::{manager::Manager, Error, Purpose};

/// Consecutive unlock failures before falling back to passcode
pub const UNLOCK_MAX_FAILURES: u8 = 5;

/// Consecutive enable-signing failures before fingerprint is disabled
pub const ENABLE_SIGN_MAX_FAILURES: u8 = 5;

/// Failures within a single signing attempt before falling back to passcode
pub const SIGN_ATTEMPT_MAX_FAILURES: u8 = 3;

/// Consecutive signing failures before signing is disabled for all wallets
pub const SIGN_MAX_FAILURES: u8 = 15;

/// Action taken when a lockout threshold is reached
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum LockoutAction {
    /// Passcode required for this operation
    FallbackToPasscode,
    /// Fingerprint verification disabled until reset
    FingerprintDisabled,
    /// Fingerprint signing disabled for all wallets
    SignDisabled,
}

/// Recognition failure counters
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Lockout {
    unlock: u8,
    enable_sign: u8,
    sign_attempt: u8,
    sign_total: u8,
    disabled: bool,
}

impl Lockout {
    pub const fn new() -> Self {
        Self {
            unlock: 0,
            enable_sign: 0,
            sign_attempt: 0,
            sign_total: 0,
            disabled: false,
        }
    }

    /// Check whether recognition may be started for a purpose
    pub fn check(&self, purpose: Purpose, manager: &Manager) -> Result<(), Error> {
        if let Some(w) = purpose.wallet() {
            if w as usize >= MAX_WALLETS {
                return Err(Error::InvalidWallet);
            }
        }

        if manager.registered_count() == 0 {
            return Err(Error::NoFingers);
        }

        if self.disabled {
            return Err(Error::LockedOut);
        }

        match purpose {
            Purpose::Unlock if !manager.unlock_flag() => Err(Error::UnlockDisabled),
            Purpose::Unlock if self.unlock >= UNLOCK_MAX_FAILURES => Err(Error::LockedOut),
            Purpose::Sign { wallet } if !manager.sign_flag(wallet) => Err(Error::SignDisabled),
            Purpose::Sign { .. } if self.sign_attempt >= SIGN_ATTEMPT_MAX_FAILURES => {
                Err(Error::LockedOut)
            }
            _ => Ok(()),
        }
    }

    /// Apply a successful recognition
    pub fn on_success(&mut self, purpose: Purpose, manager: &mut Manager) {
        match purpose {
            Purpose::Unlock => self.unlock = 0,
            Purpose::EnableSign { wallet } => {
                self.enable_sign = 0;
                let _ = manager.update_sign_flag(wallet, true);
            }
            Purpose::Sign { .. } => {
                self.sign_attempt = 0;
                self.sign_total = 0;
            }
        }
    }

    /// Apply a failed (non-matching) recognition, returning any lockout action
    pub fn on_failure(&mut self, purpose: Purpose, manager: &mut Manager) -> Option<LockoutAction> {
        let action = match purpose {
            Purpose::Unlock => {
                self.unlock = self.unlock.saturating_add(1);
                (self.unlock >= UNLOCK_MAX_FAILURES).then_some(LockoutAction::FallbackToPasscode)
            }
            Purpose::EnableSign { .. } => {
                self.enable_sign = self.enable_sign.saturating_add(1);
                if self.enable_sign >= ENABLE_SIGN_MAX_FAILURES {
                    self.disabled = true;
                    Some(LockoutAction::FingerprintDisabled)
                } else {
                    None
                }
            }
            Purpose::Sign { .. } => {
                self.sign_attempt = self.sign_attempt.saturating_add(1);
                self.sign_total = self.sign_total.saturating_add(1);

                if self.sign_total >= SIGN_MAX_FAILURES {
                    manager.clear_sign_flags();
                    self.sign_attempt = 0;
                    self.sign_total = 0;
                    Some(LockoutAction::SignDisabled)
                } else if self.sign_attempt >= SIGN_ATTEMPT_MAX_FAILURES {
                    Some(LockoutAction::FallbackToPasscode)
                } else {
                    None
                }
            }
        };

        #[cfg(feature = "log")]
        log::debug!("{} failure, counters: {:?}, action: {:?}", purpose, self, action);

        action
    }

    /// Clear lockout state for a purpose (following passcode entry)
    pub fn reset(&mut self, purpose: Purpose) {
        match purpose {
            Purpose::Unlock => self.unlock = 0,
            Purpose::EnableSign { .. } => {
                self.enable_sign = 0;
                self.disabled = false;
            }
            Purpose::Sign { .. } => {
                self.sign_attempt = 0;
                self.sign_total = 0;
            }
        }
    }

    /// Start a new signing attempt, clearing the per-attempt counter
    pub fn begin_sign_attempt(&mut self) {
        self.sign_attempt = 0;
    }

    /// Check whether fingerprint unlock is currently available
    pub fn unlock_available(&self, manager: &Manager) -> bool {
        !self.disabled
            && manager.unlock_flag()
            && manager.registered_count() > 0
            && self.unlock < UNLOCK_MAX_FAILURES
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn manager() -> Manager {
        let mut m = Manager::new();
        m.add_finger(0, 0).unwrap();
        m.update_sign_flag(0, true).unwrap();
        m
    }

    #[test]
    fn unlock_fallback() {
        let mut m = manager();
        let mut l = Lockout::new();

        for _ in 0..UNLOCK_MAX_FAILURES - 1 {
            assert_eq!(l.on_failure(Purpose::Unlock, &mut m), None);
        }
        assert_eq!(
            l.on_failure(Purpose::Unlock, &mut m),
            Some(LockoutAction::FallbackToPasscode)
        );

        assert!(!l.unlock_available(&m));
        assert_eq!(l.check(Purpose::Unlock, &m), Err(Error::LockedOut));

        l.reset(Purpose::Unlock);
        assert!(l.unlock_available(&m));
    }

    #[test]
    fn enable_sign_disables_fingerprint() {
        let mut m = manager();
        let mut l = Lockout::new();
        let p = Purpose::EnableSign { wallet: 1 };

        for _ in 0..ENABLE_SIGN_MAX_FAILURES - 1 {
            assert_eq!(l.on_failure(p, &mut m), None);
        }
        assert_eq!(
            l.on_failure(p, &mut m),
            Some(LockoutAction::FingerprintDisabled)
        );

        // Success on another purpose does not re-enable
        l.on_success(Purpose::Unlock, &mut m);
        assert!(!l.unlock_available(&m));
        assert_eq!(l.check(Purpose::Unlock, &m), Err(Error::LockedOut));

        l.reset(p);
        assert!(l.unlock_available(&m));
        assert_eq!(l.check(p, &m), Ok(()));
    }

    #[test]
    fn sign_per_attempt_and_total() {
        let mut m = manager();
        let mut l = Lockout::new();
        let p = Purpose::Sign { wallet: 0 };

        let mut actions = std::vec::Vec::new();
        for _ in 0..SIGN_MAX_FAILURES {
            if l.check(p, &m) == Err(Error::LockedOut) {
                l.begin_sign_attempt();
            }
            actions.push(l.on_failure(p, &mut m));
        }

        let fallbacks = actions
            .iter()
            .filter(|a| **a == Some(LockoutAction::FallbackToPasscode))
            .count();
        assert_eq!(fallbacks, 4);
        assert_eq!(actions.last(), Some(&Some(LockoutAction::SignDisabled)));

        assert!(!m.sign_flag(0));
        assert_eq!(l.check(p, &m), Err(Error::SignDisabled));

        // Fingerprint remains available for unlock
        assert!(l.unlock_available(&m));
    }

    #[test]
    fn success_resets_own_purpose() {
        let mut m = manager();
        let mut l = Lockout::new();

        l.on_failure(Purpose::Unlock, &mut m);
        l.on_failure(Purpose::Sign { wallet: 0 }, &mut m);
        l.on_success(Purpose::Sign { wallet: 0 }, &mut m);

        assert_eq!(l.unlock, 1);
        assert_eq!(l.sign_total, 0);

        l.on_success(Purpose::EnableSign { wallet: 2 }, &mut m);
        assert!(m.sign_flag(2));
    }

    #[test]
    fn preconditions() {
        let mut m = Manager::new();
        let l = Lockout::new();

        assert_eq!(l.check(Purpose::Unlock, &m), Err(Error::NoFingers));
        assert_eq!(
            l.check(Purpose::Sign { wallet: 3 }, &m),
            Err(Error::InvalidWallet)
        );

        m.add_finger(0, 0).unwrap();
        m.update_unlock_flag(false);
        assert_eq!(l.check(Purpose::Unlock, &m), Err(Error::UnlockDisabled));
        assert_eq!(
            l.check(Purpose::Sign { wallet: 1 }, &m),
            Err(Error::SignDisabled)
        );
        assert_eq!(l.check(Purpose::EnableSign { wallet: 1 }, &m), Ok(()));
    }
}
