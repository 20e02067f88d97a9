// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command response handling

use rand_core::CryptoRngCore;
use zeroize::Zeroize;

use fpsensor_proto::{
    payload::{
        decode_exact, AesKeyStateResp, IdentResp, InitStateResp, RandomResp, RecognizeResp,
        RegNumResp, RegisterResp, StatusResp, VersionResp,
    },
    Command, Disposition, ProtoError, SensorError, STATUS_SUCCESS,
};

use super::{
    enroll::EnrollUpdate, Driver, EnrollFailureReason, Engine, Error, Output, State,
};

/// Decoded command response
#[derive(Clone, PartialEq, Debug)]
pub(super) enum Response {
    /// Status only, or a failed status for commands with response fields
    Status(u8),
    Random(RandomResp),
    Version([u8; 4]),
    RegNum(u8),
    InitState(bool),
    AesKeyState(bool),
    Ident(IdentResp),
    Register(RegisterResp),
    Recognize(RecognizeResp),
}

impl Response {
    /// Parse a response payload for the provided command
    pub fn parse(command: Command, data: &[u8]) -> Result<Self, ProtoError> {
        use Command::*;

        // Commands reporting a status byte omit response fields on failure
        let status = data.first().copied().ok_or(ProtoError::InvalidLength)?;
        let failed = status != STATUS_SUCCESS && data.len() == 1;

        let r = match command {
            Register => Response::Register(decode_exact::<RegisterResp>(data)?),
            Recognize => Response::Recognize(decode_exact::<RecognizeResp>(data)?),
            GetVer => Response::Version(decode_exact::<VersionResp>(data)?.version),
            GetAesKeyState => {
                Response::AesKeyState(decode_exact::<AesKeyStateResp>(data)?.state != 0)
            }
            _ if failed => Response::Status(status),
            GetRegNum => Response::RegNum(decode_exact::<RegNumResp>(data)?.count),
            GetInitState => Response::InitState(decode_exact::<InitStateResp>(data)?.bound != 0),
            GetChipId | GetUid => Response::Ident(decode_exact::<IdentResp>(data)?),
            GetRandomNum => Response::Random(decode_exact::<RandomResp>(data)?),
            DeleteSingle | DeleteAll | SysReset | CancelExecute | ParamReset | SetAesKey
            | SysTest | LowPower => Response::Status(decode_exact::<StatusResp>(data)?.status),
        };

        Ok(r)
    }
}

impl<DRV: Driver, RNG: CryptoRngCore> Engine<DRV, RNG> {
    /// Apply a parsed response, `param` is the first request payload byte
    pub(super) fn on_response(
        &mut self,
        command: Command,
        param: u8,
        resp: Response,
    ) -> Result<Output, Error> {
        match (command, resp) {
            (Command::Register, Response::Register(r)) => self.on_register(r),

            (Command::Recognize, Response::Recognize(r)) => self.on_recognize(r),

            (Command::GetVer, Response::Version(version)) => {
                self.present = true;
                self.version = Some(version);

                let out = Output::FirmwareVersion { version };
                match self.bootstrap {
                    true => self.chain(out, Command::GetAesKeyState, &[]),
                    false => Ok(out),
                }
            }

            (Command::GetAesKeyState, Response::AesKeyState(set)) => self.on_aes_key_state(set),

            (Command::SetAesKey, Response::Status(status)) => self.on_set_aes_key(status),

            (Command::GetRegNum, Response::RegNum(count)) => {
                self.bootstrap = false;

                let in_sync = count == self.manager.registered_count();
                let out = Output::RegisteredCount { count, in_sync };

                // Sensor and record disagree, start over
                if !in_sync {
                    #[cfg(feature = "log")]
                    log::warn!(
                        "registered count mismatch (sensor: {}, record: {}), deleting all",
                        count,
                        self.manager.registered_count()
                    );

                    self.manager.clear();
                    return self.chain(out, Command::DeleteAll, &[]);
                }

                Ok(out)
            }

            (Command::DeleteSingle, Response::Status(STATUS_SUCCESS)) => {
                self.manager.remove_finger(param)?;
                Ok(Output::Deleted { slot: Some(param) })
            }

            (Command::DeleteAll, Response::Status(STATUS_SUCCESS)) => {
                self.manager.clear();
                Ok(Output::Deleted { slot: None })
            }

            (Command::GetInitState, Response::InitState(bound)) => Ok(Output::InitState { bound }),

            (Command::GetChipId, Response::Ident(r)) => Ok(Output::ChipId(r.ident)),

            (Command::GetUid, Response::Ident(r)) => Ok(Output::Uid(r.ident)),

            (_, Response::Status(status)) => Ok(self.on_status(command, status)),

            (_, _r) => {
                #[cfg(feature = "log")]
                log::error!("unhandled response for {}: {:?}", command, _r);

                Err(Error::InvalidState)
            }
        }
    }

    fn on_status(&mut self, command: Command, status: u8) -> Output {
        match SensorError::check(status) {
            Ok(()) => Output::Complete(command),
            Err(error) => {
                #[cfg(feature = "log")]
                log::warn!("{} error: {} (0x{:02x})", command, error.message(), status);

                self.bootstrap = false;
                Output::SensorError { command, error }
            }
        }
    }

    fn on_register(&mut self, r: RegisterResp) -> Result<Output, Error> {
        let slot = self.enroll.slot();

        match self.enroll.update(r) {
            EnrollUpdate::Step { step, finger_id } => {
                self.state = State::Enrolling(self.enroll.step());
                Ok(Output::EnrollStep { step, finger_id })
            }
            EnrollUpdate::Retry {
                step,
                error,
                remaining,
            } => Ok(Output::CaptureRetry {
                step,
                error,
                remaining,
            }),
            EnrollUpdate::Complete { finger_id, key } => {
                self.dispatch.complete();
                self.manager.add_finger(slot, self.wallet)?;
                self.state = State::EnrollSuccess;

                #[cfg(feature = "log")]
                log::info!("enrolled slot {} (finger id {})", slot, finger_id);

                Ok(Output::EnrollSuccess {
                    slot,
                    finger_id,
                    key,
                })
            }
            EnrollUpdate::Failed(reason) => {
                self.state = State::EnrollFailure;

                #[cfg(feature = "log")]
                log::warn!("enrollment failed: {:?}", reason);

                let out = Output::EnrollFailure { reason };

                // Stop the sensor waiting for further captures
                if matches!(
                    reason,
                    EnrollFailureReason::ExceededAttempts | EnrollFailureReason::UnexpectedKey
                ) {
                    self.dispatch.cancel();
                    return self.chain(out, Command::CancelExecute, &[]);
                }

                self.dispatch.complete();
                Ok(out)
            }
        }
    }

    fn on_recognize(&mut self, r: RecognizeResp) -> Result<Output, Error> {
        let purpose = match self.state {
            State::Recognizing(p) => p,
            _ => return Err(Error::InvalidState),
        };

        match SensorError::check(r.status) {
            Ok(()) => {
                self.lockout.on_success(purpose, &mut self.manager);
                self.state = State::RecognizeSuccess;

                Ok(Output::RecognizeSuccess {
                    purpose,
                    finger_id: r.finger_id,
                    score: r.score,
                    key: r.key,
                })
            }
            Err(error) => {
                let action = match error.disposition() {
                    Disposition::Mismatch => self.lockout.on_failure(purpose, &mut self.manager),
                    _ => None,
                };
                self.state = State::RecognizeFailure;

                Ok(Output::RecognizeFailure {
                    purpose,
                    error,
                    action,
                })
            }
        }
    }

    fn on_aes_key_state(&mut self, set: bool) -> Result<Output, Error> {
        let out = Output::AesKeyState { set };
        if !self.bootstrap {
            return Ok(out);
        }

        // Unpaired sensor, provision a new key
        if !set {
            return match self.request_aes_key() {
                Ok(o @ Output::CommandFailed { .. }) => Ok(o),
                Ok(_) => Ok(out),
                Err(e) => {
                    self.bootstrap = false;
                    Err(e)
                }
            };
        }

        // Paired sensor, restore key and record then check finger count
        let mut key = match self.drv.load_comm_key() {
            Ok(Some(k)) => k,
            Ok(None) => {
                #[cfg(feature = "log")]
                log::warn!("sensor is paired but no communication key is stored");

                self.bootstrap = false;
                return Ok(Output::KeyStateMismatch);
            }
            Err(_) => {
                self.bootstrap = false;
                return Err(Error::SecureElement);
            }
        };

        self.session.set_key(&key);
        key.zeroize();

        if let Err(e) = self.manager.load(&mut self.drv) {
            self.bootstrap = false;
            return Err(e);
        }

        self.chain(out, Command::GetRegNum, &[])
    }

    fn on_set_aes_key(&mut self, status: u8) -> Result<Output, Error> {
        self.bootstrap = false;

        let mut key = match (SensorError::check(status), self.pending_key.take()) {
            (Ok(()), Some(k)) => k,
            (Ok(()), None) => return Err(Error::InvalidState),
            (Err(error), k) => {
                if let Some(mut k) = k {
                    k.zeroize();
                }
                return Ok(Output::SensorError {
                    command: Command::SetAesKey,
                    error,
                });
            }
        };

        let r = self.drv.store_comm_key(&key);
        if r.is_ok() {
            self.session.set_key(&key);
        }
        key.zeroize();

        match r {
            Ok(()) => Ok(Output::AesKeySet),
            Err(_) => Err(Error::SecureElement),
        }
    }

    /// Generate and provision a new communication key
    pub(super) fn request_aes_key(&mut self) -> Result<Output, Error> {
        let mut key = [0u8; fpsensor_proto::KEY_LEN];
        self.rng.fill_bytes(&mut key);

        let r = self.issue(Command::SetAesKey, &key);
        if let Ok(Output::Sent(_)) = r {
            self.pending_key = Some(key);
        }
        key.zeroize();

        r
    }

    pub(super) fn clear_pending_key(&mut self) {
        if let Some(mut k) = self.pending_key.take() {
            k.zeroize();
        }
    }
}
