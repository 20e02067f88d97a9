// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Crypto session for encrypted frames
//!
//! Each encrypted frame uses a fresh random 16-byte message key. The message
//! key is masked with the most recent sensor challenge (see
//! [Command::GetRandomNum][crate::Command::GetRandomNum]) and encrypted under
//! the communication key to form the transmitted nonce:
//!
//! ```text
//! nonce = AES128(comm_key, message_key ^ sensor_random)
//! inner = AES128(message_key, inner_block)  (per 16-byte block)
//! ```
//!
//! The receiver recovers the message key from the nonce, decrypts the inner
//! block and checks the inner signature. Responses echo the request nonce and
//! are encrypted under the same message key.

use aes::{
    cipher::generic_array::GenericArray, Aes128, BlockDecrypt, BlockEncrypt, NewBlockCipher,
};
use rand_core::CryptoRngCore;
use zeroize::Zeroize;

use crate::{
    frame::{parse_inner, Authenticator, Crc32Signature, Frame, FrameCipher, Message, BLOCK_LEN},
    frame::MAX_INNER_LEN,
    KEY_LEN, NONCE_LEN, RANDOM_LEN,
};

/// Crypto session errors
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum SessionError {
    /// No key installed, or frame not encrypted
    #[cfg_attr(feature = "thiserror", error("bad key state"))]
    BadKeyState = 0x01,

    /// Decrypted frame failed integrity checks
    #[cfg_attr(feature = "thiserror", error("integrity failure"))]
    IntegrityFailure = 0x02,
}

/// Encryption session state
pub struct Session<A: Authenticator = Crc32Signature> {
    key: Option<[u8; KEY_LEN]>,
    sensor_random: [u8; RANDOM_LEN],
    message_key: [u8; KEY_LEN],
    nonce: [u8; NONCE_LEN],
    auth: A,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a new session without a key
    pub const fn new() -> Self {
        Self::with_authenticator(Crc32Signature)
    }
}

impl<A: Authenticator> Session<A> {
    /// Create a new session using the provided signature construction
    pub const fn with_authenticator(auth: A) -> Self {
        Self {
            key: None,
            sensor_random: [0u8; RANDOM_LEN],
            message_key: [0u8; KEY_LEN],
            nonce: [0u8; NONCE_LEN],
            auth,
        }
    }

    /// Install a communication key, returning true if the key changed
    ///
    /// Installing the current key is a no-op. Callers must discard any
    /// outstanding encrypted exchange when the key changes.
    pub fn set_key(&mut self, key: &[u8; KEY_LEN]) -> bool {
        if self.key.as_ref() == Some(key) {
            return false;
        }

        if let Some(k) = self.key.as_mut() {
            k.zeroize();
        }
        self.key = Some(*key);

        self.message_key.zeroize();
        self.nonce.zeroize();

        true
    }

    /// Remove the communication key
    pub fn clear_key(&mut self) {
        if let Some(k) = self.key.as_mut() {
            k.zeroize();
        }
        self.key = None;
    }

    /// Check whether a key is installed
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Fetch the session authenticator
    pub fn authenticator(&self) -> &A {
        &self.auth
    }

    /// Install the sensor challenge used to mask subsequent nonces
    pub fn set_sensor_random(&mut self, r: &[u8; RANDOM_LEN]) {
        self.sensor_random = *r;
    }

    /// Draw a fresh message key and compute the matching nonce
    ///
    /// Must be called for each outgoing encrypted frame, including retries.
    pub fn refresh_nonce<R: CryptoRngCore>(
        &mut self,
        rng: &mut R,
    ) -> Result<[u8; NONCE_LEN], SessionError> {
        let cipher = self.cipher()?;

        rng.fill_bytes(&mut self.message_key);

        let mut block = self.message_key;
        xor(&mut block, &self.sensor_random);
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut block));

        self.nonce = block;

        Ok(self.nonce)
    }

    /// Decrypt an encrypted frame and verify the inner signature
    ///
    /// On success the recovered message key is retained so responses may be
    /// encrypted under the same nonce.
    pub fn decrypt_and_verify(&mut self, raw: &[u8]) -> Result<Message, SessionError> {
        let f = Frame::split(raw).map_err(|_| SessionError::IntegrityFailure)?;
        let nonce = match f.nonce {
            Some(n) => n,
            None => return Err(SessionError::BadKeyState),
        };
        let cipher = self.cipher()?;

        // Recover message key
        let mut message_key = [0u8; KEY_LEN];
        message_key.copy_from_slice(nonce);
        cipher.decrypt_block(GenericArray::from_mut_slice(&mut message_key));
        xor(&mut message_key, &self.sensor_random);

        // Decrypt inner block
        let mut inner = [0u8; MAX_INNER_LEN];
        let inner = &mut inner[..f.inner.len()];
        inner.copy_from_slice(f.inner);

        let block_cipher = Aes128::new(GenericArray::from_slice(&message_key));
        for b in inner.chunks_exact_mut(BLOCK_LEN) {
            block_cipher.decrypt_block(GenericArray::from_mut_slice(b));
        }

        let r = parse_inner(inner, &self.auth).map_err(|_| SessionError::IntegrityFailure);
        inner.zeroize();

        let m = match r {
            Ok(m) => m,
            Err(e) => {
                message_key.zeroize();
                return Err(e);
            }
        };

        self.nonce.copy_from_slice(nonce);
        self.message_key = message_key;
        message_key.zeroize();

        Ok(m)
    }

    fn cipher(&self) -> Result<Aes128, SessionError> {
        match &self.key {
            Some(k) => Ok(Aes128::new(GenericArray::from_slice(k))),
            None => Err(SessionError::BadKeyState),
        }
    }
}

impl<A: Authenticator> FrameCipher for Session<A> {
    fn nonce(&self) -> [u8; NONCE_LEN] {
        self.nonce
    }

    fn encrypt(&self, inner: &mut [u8]) {
        let c = Aes128::new(GenericArray::from_slice(&self.message_key));
        for b in inner.chunks_exact_mut(BLOCK_LEN) {
            c.encrypt_block(GenericArray::from_mut_slice(b));
        }
    }
}

impl<A: Authenticator> Drop for Session<A> {
    fn drop(&mut self) {
        self.clear_key();
        self.message_key.zeroize();
        self.sensor_random.zeroize();
    }
}

fn xor(a: &mut [u8; 16], b: &[u8; 16]) {
    for (a, b) in a.iter_mut().zip(b.iter()) {
        *a ^= b;
    }
}
