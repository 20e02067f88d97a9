// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Fingerprint sensor host library (and CLI)
//!
//! This drives a fingerprint sensor module via the [fpsensor_core] engine
//! over an async byte stream, with a [SecureStore] standing in for the
//! secure element that hardware wallets use to hold pairing and manager
//! state.

/// Re-export `fpsensor-core` engine for consumers
pub use fpsensor_core::engine;

/// Re-export `fpsensor-proto` for consumers
pub use fpsensor_proto::{self as proto};

/// Transports and connection helpers
pub mod transport;

mod handle;
pub use handle::{Recognized, SensorHandle, SensorInfo};

mod store;
pub use store::{HostDriver, SecureStore};

mod error;
pub use error::Error;
