// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Handle for connected fingerprint sensors
//!
//! This drives an [Engine] over an async byte stream, providing timer ticks
//! and request / response handling for each operation.

use std::{sync::Arc, time::Duration};

use log::{debug, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
    time::MissedTickBehavior,
};

use fpsensor_core::{
    engine::{Driver, Engine, Error as EngineError, Output, Purpose, TICK_MS},
    proto::{payload::KeyMaterial, Command, ManagerInfo, KEY_LEN},
};

use crate::{Error, HostDriver, SecureStore};

/// Fingerprint sensor handle for a connected transport.
///
/// This is generic over async byte streams to support different
/// underlying transports
pub struct SensorHandle<T: AsyncRead + AsyncWrite + Unpin + Send> {
    inner: Arc<Mutex<Inner<T>>>,
    /// Timeout for user (finger) interactions
    user_timeout: Duration,
    /// Timeout for sensor requests
    request_timeout: Duration,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Clone for SensorHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            user_timeout: self.user_timeout,
            request_timeout: self.request_timeout,
        }
    }
}

struct Inner<T> {
    t: T,
    engine: Engine<HostDriver>,
}

/// Successful recognition
#[derive(Clone, PartialEq, Debug)]
pub struct Recognized {
    pub finger_id: u8,
    pub score: u8,
    pub key: Option<KeyMaterial>,
}

/// Sensor identification
#[derive(Clone, PartialEq, Debug)]
pub struct SensorInfo {
    pub version: [u8; 4],
    pub chip_id: Vec<u8>,
    pub uid: Vec<u8>,
    pub bound: bool,
    pub registered: u8,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SensorHandle<T> {
    /// Create a handle using the provided transport and persistent state
    pub fn new(t: T, store: SecureStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                t,
                engine: Engine::new(HostDriver::new(store)),
            })),
            user_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Override default timeouts
    pub fn with_timeouts(mut self, request: Duration, user: Duration) -> Self {
        self.request_timeout = request;
        self.user_timeout = user;
        self
    }

    /// Detect the sensor and restore or establish pairing,
    /// returning the firmware version
    pub async fn start(&self) -> Result<[u8; 4], Error> {
        debug!("Starting sensor");

        let out = self
            .execute(|e| e.start(), self.request_timeout, |_| ())
            .await?;

        for o in &out {
            match o {
                Output::AesKeySet => debug!("Provisioned new communication key"),
                Output::RegisteredCount { in_sync: false, .. } => {
                    warn!("Registered fingers out of sync, sensor cleared")
                }
                _ => (),
            }
        }

        out.iter()
            .find_map(|o| match o {
                Output::FirmwareVersion { version } => Some(*version),
                _ => None,
            })
            .ok_or(Error::UnexpectedResponse)
    }

    /// Fetch firmware version, chip and unique IDs and binding state
    pub async fn info(&self) -> Result<SensorInfo, Error> {
        let version = self
            .request(|e| e.get_firmware_version(), |o| match o {
                Output::FirmwareVersion { version } => Some(*version),
                _ => None,
            })
            .await?;

        let chip_id = self
            .request(|e| e.get_chip_id(), |o| match o {
                Output::ChipId(id) => Some(id.to_vec()),
                _ => None,
            })
            .await?;

        let uid = self
            .request(|e| e.get_uid(), |o| match o {
                Output::Uid(id) => Some(id.to_vec()),
                _ => None,
            })
            .await?;

        let bound = self
            .request(|e| e.get_init_state(), |o| match o {
                Output::InitState { bound } => Some(*bound),
                _ => None,
            })
            .await?;

        let registered = self.registered_count().await?;

        Ok(SensorInfo {
            version,
            chip_id,
            uid,
            bound,
            registered,
        })
    }

    /// Fetch the number of fingers registered on the sensor
    pub async fn registered_count(&self) -> Result<u8, Error> {
        self.request(|e| e.get_registered_count(), |o| match o {
            Output::RegisteredCount { count, .. } => Some(*count),
            _ => None,
        })
        .await
    }

    /// Enroll a finger for the provided wallet, returning released key material
    ///
    /// `progress` is called for each capture.
    pub async fn enroll(
        &self,
        slot: u8,
        wallet: u8,
        progress: impl FnMut(&Output) + Send,
    ) -> Result<Option<KeyMaterial>, Error> {
        debug!("Enrolling slot {} (wallet {})", slot, wallet);

        let out = self
            .execute(
                |e| {
                    e.select_wallet(wallet)?;
                    e.register(slot)
                },
                self.user_timeout,
                progress,
            )
            .await?;

        out.into_iter()
            .find_map(|o| match o {
                Output::EnrollSuccess { key, .. } => Some(key),
                _ => None,
            })
            .ok_or(Error::UnexpectedResponse)
    }

    /// Match a finger for the provided purpose
    pub async fn recognize(&self, purpose: Purpose) -> Result<Recognized, Error> {
        debug!("Recognizing finger for {}", purpose);

        let out = self
            .execute(|e| e.recognize(purpose), self.user_timeout, |_| ())
            .await?;

        out.into_iter()
            .find_map(|o| match o {
                Output::RecognizeSuccess {
                    finger_id,
                    score,
                    key,
                    ..
                } => Some(Recognized {
                    finger_id,
                    score,
                    key,
                }),
                _ => None,
            })
            .ok_or(Error::UnexpectedResponse)
    }

    /// Delete a single finger slot
    pub async fn delete(&self, slot: u8) -> Result<(), Error> {
        self.request(|e| e.delete(slot), |o| match o {
            Output::Deleted { .. } => Some(()),
            _ => None,
        })
        .await
    }

    /// Delete all registered fingers
    pub async fn delete_all(&self) -> Result<(), Error> {
        self.request(|e| e.delete_all(), |o| match o {
            Output::Deleted { .. } => Some(()),
            _ => None,
        })
        .await
    }

    /// Clear all fingerprint state, locally and on the sensor
    pub async fn wipe(&self) -> Result<(), Error> {
        self.execute(|e| e.wipe(), self.request_timeout, |_| ())
            .await?;
        Ok(())
    }

    /// Place the sensor in low power mode
    pub async fn low_power(&self) -> Result<(), Error> {
        self.complete(|e| e.set_low_power(), Command::LowPower).await
    }

    /// Reset the sensor
    pub async fn reset(&self) -> Result<(), Error> {
        self.complete(|e| e.sys_reset(), Command::SysReset).await
    }

    /// Issue a command directly, returning the raw response payload
    pub async fn raw(&self, command: Command, data: &[u8]) -> Result<Vec<u8>, Error> {
        let timeout = match command.user_paced() {
            true => self.user_timeout,
            false => self.request_timeout,
        };

        let out = self
            .execute(|e| e.raw(command, data), timeout, |_| ())
            .await?;

        out.into_iter()
            .find_map(|o| match o {
                Output::Response { data, .. } => Some(data.to_vec()),
                _ => None,
            })
            .ok_or(Error::UnexpectedResponse)
    }

    /// Install a communication key, replacing the stored key
    pub async fn install_comm_key(&self, key: &[u8; KEY_LEN]) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;

        let o = inner.engine.install_comm_key(key);
        if let Output::CommandFailed { command, error } = o {
            return Err(Error::Link { command, error });
        }

        inner
            .engine
            .driver_mut()
            .store_comm_key(key)
            .map_err(|_| EngineError::SecureElement)?;

        Ok(())
    }

    /// Clear lockout state following passcode verification
    pub async fn reset_lockout(&self, purpose: Purpose) {
        self.inner.lock().await.engine.reset_lockout(purpose)
    }

    /// Start a new signing attempt
    pub async fn begin_sign_attempt(&self) {
        self.inner.lock().await.engine.begin_sign_attempt()
    }

    /// Write the manager record to the secure store
    pub async fn push_state(&self) -> Result<(), Error> {
        self.inner.lock().await.engine.push_to_secure_element()?;
        Ok(())
    }

    /// Fetch the current manager record
    pub async fn manager_info(&self) -> ManagerInfo {
        self.inner.lock().await.engine.manager().info().clone()
    }

    /// Fetch a copy of the secure store for persistence
    pub async fn store(&self) -> SecureStore {
        self.inner.lock().await.engine.driver().store().clone()
    }

    /// Check whether fingerprint unlock may be offered
    pub async fn unlock_available(&self) -> bool {
        self.inner.lock().await.engine.unlock_available()
    }

    /// Execute a command expecting [Output::Complete]
    async fn complete(
        &self,
        start: impl FnOnce(&mut Engine<HostDriver>) -> Result<Output, EngineError> + Send,
        command: Command,
    ) -> Result<(), Error> {
        self.request(start, |o| match o {
            Output::Complete(c) if *c == command => Some(()),
            _ => None,
        })
        .await
    }

    /// Execute a command, extracting the result via `f`
    async fn request<R>(
        &self,
        start: impl FnOnce(&mut Engine<HostDriver>) -> Result<Output, EngineError> + Send,
        f: impl Fn(&Output) -> Option<R>,
    ) -> Result<R, Error> {
        let out = self.execute(start, self.request_timeout, |_| ()).await?;
        out.iter().find_map(f).ok_or(Error::UnexpectedResponse)
    }

    /// Start an operation then drive the engine until idle, returning
    /// collected outputs or the first failure reported
    async fn execute(
        &self,
        start: impl FnOnce(&mut Engine<HostDriver>) -> Result<Output, EngineError> + Send,
        timeout: Duration,
        mut progress: impl FnMut(&Output) + Send,
    ) -> Result<Vec<Output>, Error> {
        let mut inner = self.inner.lock().await;
        let mut outputs = vec![];

        let o = start(&mut inner.engine)?;
        record(&mut outputs, &mut progress, o);
        inner.flush().await?;

        let r = tokio::time::timeout(timeout, inner.run(&mut outputs, &mut progress)).await;

        match r {
            Ok(Ok(())) => (),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                let user_paced = inner
                    .engine
                    .outstanding()
                    .map(|e| e.command.user_paced())
                    .unwrap_or(false);

                warn!("Timeout, cancelling outstanding command");

                // Stop the sensor waiting for a finger, best effort
                inner.engine.cancel()?;
                inner.flush().await?;
                let _ = tokio::time::timeout(
                    self.request_timeout,
                    inner.run(&mut outputs, &mut progress),
                )
                .await;

                return match user_paced {
                    true => Err(Error::UserTimeout),
                    false => Err(Error::RequestTimeout),
                };
            }
        }

        check(&outputs)?;

        Ok(outputs)
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Inner<T> {
    /// Write pending bytes to the transport
    async fn flush(&mut self) -> Result<(), Error> {
        let b = self.engine.driver_mut().take_outbox();
        if !b.is_empty() {
            self.t.write_all(&b).await?;
            self.t.flush().await?;
        }
        Ok(())
    }

    /// Drive the engine with received bytes and ticks until idle
    async fn run(
        &mut self,
        outputs: &mut Vec<Output>,
        progress: &mut (impl FnMut(&Output) + Send),
    ) -> Result<(), Error> {
        let mut buff = [0u8; 256];

        let mut ticker = tokio::time::interval(Duration::from_millis(TICK_MS as u64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        while !self.engine.is_idle() {
            tokio::select! {
                r = self.t.read(&mut buff) => {
                    let n = r?;
                    if n == 0 {
                        return Err(Error::Disconnected);
                    }

                    for b in &buff[..n] {
                        let o = self.engine.receive(*b)?;
                        record(outputs, progress, o);
                    }
                }
                _ = ticker.tick() => {
                    let o = self.engine.tick()?;
                    record(outputs, progress, o);
                }
            }

            self.flush().await?;
        }

        Ok(())
    }
}

fn record(outputs: &mut Vec<Output>, progress: &mut impl FnMut(&Output), o: Output) {
    match o {
        Output::None | Output::Sent(_) => (),
        o => {
            debug!("Output: {:?}", o);
            progress(&o);
            outputs.push(o);
        }
    }
}

/// Map failure outputs to errors
fn check(outputs: &[Output]) -> Result<(), Error> {
    for o in outputs {
        let e = match o {
            Output::CommandFailed { command, error } => Error::Link {
                command: *command,
                error: *error,
            },
            Output::SensorError { command, error } => Error::Sensor {
                command: *command,
                error: *error,
            },
            Output::EnrollFailure { reason } => Error::Enroll(*reason),
            Output::RecognizeFailure { error, action, .. } => Error::Recognize {
                error: *error,
                action: *action,
            },
            Output::KeyStateMismatch => Error::KeyStateMismatch,
            _ => continue,
        };
        return Err(e);
    }

    Ok(())
}
