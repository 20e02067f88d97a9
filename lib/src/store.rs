// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Host-side secure element emulation
//!
//! Hardware wallets hold the manager record and communication key in a
//! secure element, on hosts these are kept in a [SecureStore] which may be
//! persisted to a JSON state file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use fpsensor_core::{
    engine::{Driver, DriverError},
    proto::{manager_info::MANAGER_INFO_LEN, ManagerInfo, KEY_LEN},
};

use crate::Error;

/// Persistent fingerprint state
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct SecureStore {
    /// Encoded manager record
    #[serde(with = "hex_array")]
    pub manager_info: [u8; MANAGER_INFO_LEN],

    /// Sensor communication key
    #[serde(with = "hex_option", default)]
    pub comm_key: Option<[u8; KEY_LEN]>,
}

impl Default for SecureStore {
    fn default() -> Self {
        Self {
            manager_info: ManagerInfo::new().to_bytes(),
            comm_key: None,
        }
    }
}

impl Drop for SecureStore {
    fn drop(&mut self) {
        if let Some(k) = self.comm_key.as_mut() {
            k.zeroize();
        }
    }
}

impl SecureStore {
    /// Load state from a file, returning an empty store if the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let s = std::fs::read_to_string(path)?;
        let v = serde_json::from_str(&s)?;

        Ok(v)
    }

    /// Write state to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let s = serde_json::to_string_pretty(self)?;
        std::fs::write(path, s)?;
        Ok(())
    }

    /// Decode the stored manager record
    pub fn manager_info(&self) -> ManagerInfo {
        ManagerInfo::from_bytes(&self.manager_info)
    }
}

/// [Driver] implementation buffering outgoing bytes for async transports
#[derive(Debug, Default)]
pub struct HostDriver {
    outbox: Vec<u8>,
    store: SecureStore,
}

impl HostDriver {
    pub fn new(store: SecureStore) -> Self {
        Self {
            outbox: Vec::new(),
            store,
        }
    }

    /// Take bytes pending transmission
    pub fn take_outbox(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbox)
    }

    pub fn store(&self) -> &SecureStore {
        &self.store
    }
}

impl Driver for HostDriver {
    fn send(&mut self, data: &[u8]) -> Result<(), DriverError> {
        self.outbox.extend_from_slice(data);
        Ok(())
    }

    fn write_manager_info(&mut self, info: &[u8; MANAGER_INFO_LEN]) -> Result<(), DriverError> {
        self.store.manager_info = *info;
        Ok(())
    }

    fn read_manager_info(&mut self) -> Result<[u8; MANAGER_INFO_LEN], DriverError> {
        Ok(self.store.manager_info)
    }

    fn store_comm_key(&mut self, key: &[u8; KEY_LEN]) -> Result<(), DriverError> {
        self.store.comm_key = Some(*key);
        Ok(())
    }

    fn load_comm_key(&mut self) -> Result<Option<[u8; KEY_LEN]>, DriverError> {
        Ok(self.store.comm_key)
    }
}

mod hex_array {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(v: &[u8; N], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        d: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(d)?;

        let mut b = [0u8; N];
        hex::decode_to_slice(&s, &mut b).map_err(D::Error::custom)?;

        Ok(b)
    }
}

mod hex_option {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        v: &Option<[u8; N]>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match v {
            Some(v) => super::hex_array::serialize(v, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        d: D,
    ) -> Result<Option<[u8; N]>, D::Error> {
        #[derive(Deserialize)]
        struct Wrapper<const N: usize>(#[serde(with = "super::hex_array")] [u8; N]);

        let v = Option::<Wrapper<N>>::deserialize(d)?;
        Ok(v.map(|w| w.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn store_json() {
        let s = SecureStore {
            manager_info: [0x01; MANAGER_INFO_LEN],
            comm_key: Some([0xab; KEY_LEN]),
        };

        let j = serde_json::to_string(&s).unwrap();
        assert!(j.contains(&hex::encode([0xab; KEY_LEN])));

        let d: SecureStore = serde_json::from_str(&j).unwrap();
        assert_eq!(d, s);

        let e: SecureStore =
            serde_json::from_str(&format!(r#"{{"manager_info":"{}"}}"#, "00".repeat(32))).unwrap();
        assert_eq!(e, SecureStore::default());
    }
}
