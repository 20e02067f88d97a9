// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Fingerprint manager state
//!
//! All updates apply to the in-memory record only, the secure element copy
//! is written exclusively via [Manager::push].

use fpsensor_proto::{ManagerInfo, MAX_FINGERS, MAX_WALLETS};

use super::{Driver, Error};

/// In-memory fingerprint manager record
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Manager {
    info: ManagerInfo,
}

impl Manager {
    pub const fn new() -> Self {
        Self {
            info: ManagerInfo::new(),
        }
    }

    /// Fetch the underlying record
    pub fn info(&self) -> &ManagerInfo {
        &self.info
    }

    pub fn update_unlock_flag(&mut self, enabled: bool) {
        self.info.unlock_flag = enabled as u8;
    }

    pub fn update_sign_flag(&mut self, wallet: u8, enabled: bool) -> Result<(), Error> {
        let f = self
            .info
            .sign_flags
            .get_mut(wallet as usize)
            .ok_or(Error::InvalidWallet)?;
        *f = enabled as u8;
        Ok(())
    }

    /// Set the raw status for a finger slot (0 for unregistered)
    pub fn update_registered_status(&mut self, slot: u8, status: u8) -> Result<(), Error> {
        let s = self
            .info
            .finger_ids
            .get_mut(slot as usize)
            .ok_or(Error::InvalidSlot)?;
        *s = status;
        Ok(())
    }

    pub fn update_registered_count(&mut self, count: u8) {
        self.info.finger_num = count;
    }

    pub fn registered_count(&self) -> u8 {
        self.info.finger_num
    }

    pub fn registered_status(&self, slot: u8) -> Option<u8> {
        self.info.finger_ids.get(slot as usize).copied()
    }

    pub fn unlock_flag(&self) -> bool {
        self.info.unlock_flag != 0
    }

    pub fn sign_flag(&self, wallet: u8) -> bool {
        self.info
            .sign_flags
            .get(wallet as usize)
            .map(|f| *f != 0)
            .unwrap_or(false)
    }

    pub fn first_free_slot(&self) -> Option<u8> {
        self.info.free_slot()
    }

    pub fn is_registered(&self, slot: u8) -> bool {
        self.info.is_registered(slot)
    }

    /// Record a newly enrolled finger
    ///
    /// The first finger enables unlock. Sign flags for wallets other than
    /// `wallet` are cleared so each wallet must re-confirm signing.
    pub fn add_finger(&mut self, slot: u8, wallet: u8) -> Result<(), Error> {
        if slot as usize >= MAX_FINGERS {
            return Err(Error::InvalidSlot);
        }

        for (i, f) in self.info.sign_flags.iter_mut().enumerate() {
            if i != wallet as usize {
                *f = 0;
            }
        }

        if self.info.finger_num == 0 {
            self.info.unlock_flag = 1;
        }

        if !self.info.is_registered(slot) {
            self.info.finger_num = self.info.finger_num.saturating_add(1);
        }
        self.info.finger_ids[slot as usize] = slot + 1;

        Ok(())
    }

    /// Remove a deleted finger, clearing the record once none remain
    pub fn remove_finger(&mut self, slot: u8) -> Result<(), Error> {
        if slot as usize >= MAX_FINGERS {
            return Err(Error::InvalidSlot);
        }

        if self.info.is_registered(slot) {
            self.info.finger_ids[slot as usize] = 0;
            self.info.finger_num = self.info.finger_num.saturating_sub(1);
        }

        if self.info.finger_num == 0 {
            self.clear();
        }

        Ok(())
    }

    /// Disable fingerprint signing for all wallets
    pub fn clear_sign_flags(&mut self) {
        self.info.sign_flags = [0u8; MAX_WALLETS];
    }

    /// Reset to an empty record
    pub fn clear(&mut self) {
        self.info = ManagerInfo::new();
    }

    /// Write the record to secure element storage
    pub fn push<DRV: Driver>(&self, drv: &mut DRV) -> Result<(), Error> {
        #[cfg(feature = "log")]
        log::debug!("push manager info: {:02x?}", &self.info.to_bytes()[..8]);

        drv.write_manager_info(&self.info.to_bytes())
            .map_err(|_| Error::SecureElement)
    }

    /// Restore the record from secure element storage
    pub fn load<DRV: Driver>(&mut self, drv: &mut DRV) -> Result<(), Error> {
        let b = drv.read_manager_info().map_err(|_| Error::SecureElement)?;
        self.info = ManagerInfo::from_bytes(&b);

        #[cfg(feature = "log")]
        log::debug!("loaded manager info: {:02x?}", &b[..8]);

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_remove() {
        let mut m = Manager::new();
        m.update_sign_flag(1, true).unwrap();
        m.update_sign_flag(2, true).unwrap();

        m.add_finger(1, 2).unwrap();

        assert!(m.unlock_flag());
        assert_eq!(m.registered_count(), 1);
        assert_eq!(m.registered_status(1), Some(2));
        assert!(!m.sign_flag(1));
        assert!(m.sign_flag(2));
        assert_eq!(m.first_free_slot(), Some(0));

        // Re-enrolling a slot does not double count
        m.add_finger(1, 2).unwrap();
        assert_eq!(m.registered_count(), 1);

        m.add_finger(0, 2).unwrap();
        assert_eq!(m.registered_count(), 2);

        m.remove_finger(0).unwrap();
        assert_eq!(m.registered_count(), 1);
        assert!(m.unlock_flag());

        // Removing the last finger clears everything
        m.remove_finger(1).unwrap();
        assert_eq!(m, Manager::new());
    }

    #[test]
    fn bounds() {
        let mut m = Manager::new();

        assert_eq!(m.update_sign_flag(3, true), Err(Error::InvalidWallet));
        assert_eq!(m.update_registered_status(3, 1), Err(Error::InvalidSlot));
        assert_eq!(m.add_finger(3, 0), Err(Error::InvalidSlot));
        assert!(!m.sign_flag(7));
        assert_eq!(m.registered_status(9), None);
    }
}
