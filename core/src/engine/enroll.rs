// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Enrollment progress tracking
//!
//! A single `REGISTER` request produces one response per finger capture,
//! with accepted captures advancing the step until [ENROLL_STEPS] is reached.

use fpsensor_proto::{
    payload::{KeyMaterial, RegisterResp, ENROLL_STEPS},
    Disposition, SensorError,
};

use super::EnrollFailureReason;

/// Maximum capture attempts (accepted or rejected) per enrollment
pub const MAX_ATTEMPTS: u8 = 18;

/// Enrollment progress
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Enrollment {
    slot: u8,
    step: u8,
    attempts: u8,
}

/// Result of applying a capture response
#[derive(Clone, PartialEq, Debug)]
pub enum EnrollUpdate {
    /// Capture accepted, waiting for the next step
    Step { step: u8, finger_id: u8 },
    /// Capture rejected, the current step may be retried
    Retry { step: u8, error: SensorError, remaining: u8 },
    /// Enrollment complete
    Complete { finger_id: u8, key: Option<KeyMaterial> },
    /// Enrollment failed
    Failed(EnrollFailureReason),
}

impl Enrollment {
    pub const fn new() -> Self {
        Self {
            slot: 0,
            step: 0,
            attempts: 0,
        }
    }

    /// Start enrollment of a slot
    pub fn start(&mut self, slot: u8) {
        self.slot = slot;
        self.step = 1;
        self.attempts = 0;
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    /// Current step (1..=[ENROLL_STEPS])
    pub fn step(&self) -> u8 {
        self.step
    }

    /// Apply a capture response
    pub fn update(&mut self, resp: RegisterResp) -> EnrollUpdate {
        self.attempts = self.attempts.saturating_add(1);

        let r = match SensorError::check(resp.status) {
            Ok(()) if resp.count >= ENROLL_STEPS => {
                return EnrollUpdate::Complete {
                    finger_id: resp.finger_id,
                    key: resp.key,
                };
            }
            Ok(()) if resp.key.is_some() => {
                return EnrollUpdate::Failed(EnrollFailureReason::UnexpectedKey);
            }
            Ok(()) => {
                self.step = resp.count.saturating_add(1).max(self.step);
                EnrollUpdate::Step {
                    step: resp.count,
                    finger_id: resp.finger_id,
                }
            }
            Err(e) if e.disposition() == Disposition::RetryStep => EnrollUpdate::Retry {
                step: self.step,
                error: e,
                remaining: MAX_ATTEMPTS.saturating_sub(self.attempts),
            },
            Err(e) => return EnrollUpdate::Failed(EnrollFailureReason::Sensor(e)),
        };

        if self.attempts >= MAX_ATTEMPTS {
            return EnrollUpdate::Failed(EnrollFailureReason::ExceededAttempts);
        }

        r
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn accepted(count: u8) -> RegisterResp {
        RegisterResp {
            status: 0,
            finger_id: 1,
            count,
            score: 80,
            area: 100,
            key: None,
        }
    }

    #[test]
    fn steps_to_completion() {
        let mut e = Enrollment::new();
        e.start(0);

        for c in 1..ENROLL_STEPS {
            assert_eq!(
                e.update(accepted(c)),
                EnrollUpdate::Step {
                    step: c,
                    finger_id: 1
                }
            );
            assert_eq!(e.step(), c + 1);
        }

        let mut last = accepted(ENROLL_STEPS);
        last.key = Some(KeyMaterial::new([9; 32]));

        assert_eq!(
            e.update(last),
            EnrollUpdate::Complete {
                finger_id: 1,
                key: Some(KeyMaterial::new([9; 32]))
            }
        );
    }

    #[test]
    fn early_key_rejected() {
        let mut e = Enrollment::new();
        e.start(0);
        e.update(accepted(1));

        let mut r = accepted(2);
        r.key = Some(KeyMaterial::new([9; 32]));

        assert_eq!(
            e.update(r),
            EnrollUpdate::Failed(EnrollFailureReason::UnexpectedKey)
        );
        assert_eq!(e.step(), 2);
    }

    #[test]
    fn transient_error_keeps_step() {
        let mut e = Enrollment::new();
        e.start(1);
        e.update(accepted(1));
        e.update(accepted(2));
        assert_eq!(e.step(), 3);

        let r = e.update(RegisterResp::failed(SensorError::NoFingerPress.into()));
        assert_eq!(
            r,
            EnrollUpdate::Retry {
                step: 3,
                error: SensorError::NoFingerPress,
                remaining: MAX_ATTEMPTS - 3
            }
        );
        assert_eq!(e.step(), 3);
    }

    #[test]
    fn terminal_error_fails() {
        let mut e = Enrollment::new();
        e.start(0);
        e.update(accepted(1));

        let r = e.update(RegisterResp::failed(SensorError::RepeatFinger.into()));
        assert_eq!(
            r,
            EnrollUpdate::Failed(EnrollFailureReason::Sensor(SensorError::RepeatFinger))
        );
        assert_eq!(e.step(), 2);
    }

    #[test]
    fn attempt_limit() {
        let mut e = Enrollment::new();
        e.start(0);

        let err = RegisterResp::failed(SensorError::TooWet.into());
        for _ in 0..MAX_ATTEMPTS - 1 {
            assert!(matches!(e.update(err.clone()), EnrollUpdate::Retry { .. }));
        }

        assert_eq!(
            e.update(err),
            EnrollUpdate::Failed(EnrollFailureReason::ExceededAttempts)
        );
    }
}
