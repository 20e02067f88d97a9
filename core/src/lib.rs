// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Fingerprint sensor driver core
//!
//! This provides a common [Engine][engine::Engine] driving a fingerprint
//! sensor module over a byte-oriented serial link, for execution on
//! hardware wallets.
//!
//! Interactions with the [Engine][engine::Engine] are performed via
//! [Event][engine::Event]s and [Output][engine::Output]s, see
//! [fpsensor_proto] for frame and payload encodings.
//!
//! ## Operations
//!
//! ### Start-up
//!
//! [`Engine::start`][engine::Engine::start] detects the module by fetching
//! the firmware version, then checks whether the sensor holds a communication
//! key. Unpaired sensors are provisioned with a freshly generated key which
//! is stored via the [`Driver`][engine::Driver]. Paired sensors have their
//! key and manager record restored from the secure element, and the sensor
//! registered finger count is compared against the record, with all fingers
//! deleted on mismatch.
//!
//! ### Enrollment
//!
//! [`Engine::register`][engine::Engine::register] starts enrollment of a
//! finger slot. The sensor reports each capture, producing
//! [`Output::EnrollStep`][engine::Output::EnrollStep] or
//! [`Output::CaptureRetry`][engine::Output::CaptureRetry] until enrollment
//! completes with [`Output::EnrollSuccess`][engine::Output::EnrollSuccess]
//! or [`Output::EnrollFailure`][engine::Output::EnrollFailure].
//!
//! ### Recognition
//!
//! [`Engine::recognize`][engine::Engine::recognize] matches a finger for a
//! [`Purpose`][engine::Purpose], subject to the lockout policy, with key
//! material released for signing purposes.
//!
//! ### Persistence
//!
//! Manager record updates are held in memory until the caller requests
//! [`Engine::push_to_secure_element`][engine::Engine::push_to_secure_element].
//!

#![cfg_attr(not(feature = "std"), no_std)]

pub use fpsensor_proto::{self as proto};

pub mod engine;
