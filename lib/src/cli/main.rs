// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command line utility for interacting with fingerprint sensor modules

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use log::{debug, error, info, LevelFilter};
use tokio::io::{AsyncRead, AsyncWrite};

use fpsensor::{
    engine::Output,
    proto::Command,
    transport::{Connect, TcpOptions},
    SecureStore, SensorHandle,
};

mod helpers;
use helpers::*;

/// Fingerprint sensor command line utility
#[derive(Clone, PartialEq, Debug, Parser)]
struct Options {
    #[clap(flatten)]
    tcp: TcpOptions,

    /// State file holding the manager record and communication key
    #[clap(long, env = "FPSENSOR_STATE", default_value = "fpsensor.json")]
    state: PathBuf,

    /// Timeout for sensor requests
    #[clap(long, default_value = "10")]
    request_timeout_s: u64,

    /// Timeout waiting for a finger
    #[clap(long, default_value = "30")]
    user_timeout_s: u64,

    /// Subcommand to execute
    #[clap(subcommand)]
    cmd: Actions,

    /// Enable verbose logging
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, PartialEq, Debug, Parser)]
#[non_exhaustive]
enum Actions {
    /// Fetch sensor info
    Info,

    /// Enroll a finger
    Enroll {
        /// Finger slot (0..=2), defaults to the first free slot
        #[clap(long)]
        slot: Option<u8>,

        /// Wallet index for sign flag handling
        #[clap(long, default_value = "0")]
        wallet: u8,
    },

    /// Match a finger
    Recognize {
        /// Recognition purpose
        #[clap(long, value_enum, default_value = "unlock")]
        purpose: PurposeKind,

        /// Wallet index for signing purposes
        #[clap(long, default_value = "0")]
        wallet: u8,
    },

    /// Delete a finger slot
    Delete {
        #[clap(long)]
        slot: u8,
    },

    /// Delete all fingers
    DeleteAll,

    /// Clear all fingerprint state
    Wipe,

    /// Place the sensor in low power mode
    LowPower,

    /// Reset the sensor
    Reset,

    /// Replace the stored communication key
    SetKey {
        /// hex-encoded 16-byte key
        #[clap(long)]
        key: HexData<16>,
    },

    /// Issue a raw command
    Raw {
        /// Command name (eg. `get_ver`)
        command: Command,

        /// hex-encoded payload
        #[clap(long, default_value = "")]
        data: HexBytes,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Options::parse();

    // Setup logging
    simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default())?;

    // Load persistent state
    let store = SecureStore::load(&args.state)?;
    debug!("Loaded state from {}", args.state.display());

    // Connect to sensor
    let h = match args.tcp.connect(store).await {
        Ok(v) => v.with_timeouts(
            Duration::from_secs(args.request_timeout_s),
            Duration::from_secs(args.user_timeout_s),
        ),
        Err(e) => {
            error!("Failed to connect to sensor: {:?}", args.tcp);
            return Err(e.into());
        }
    };

    // Detect sensor and establish pairing
    let version = h.start().await?;
    info!("Sensor firmware: {}", version_string(&version));

    // Execute command
    let r = execute(&h, args.cmd).await;

    // Persist state regardless of command outcome
    h.push_state().await?;
    h.store().await.save(&args.state)?;

    r
}

/// Execute a command with the provided sensor handle
async fn execute<T>(h: &SensorHandle<T>, cmd: Actions) -> anyhow::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    debug!("Executing command: {:?}", cmd);

    match cmd {
        Actions::Info => {
            let i = h.info().await?;

            info!("firmware version: {}", version_string(&i.version));
            info!("chip id: {}", hex::encode(&i.chip_id));
            info!("uid: {}", hex::encode(&i.uid));
            info!("bound: {}", i.bound);
            info!("registered fingers: {}", i.registered);
        }
        Actions::Enroll { slot, wallet } => {
            let slot = match slot {
                Some(s) => s,
                None => h
                    .manager_info()
                    .await
                    .free_slot()
                    .ok_or_else(|| anyhow::anyhow!("No free finger slots"))?,
            };

            info!("Enrolling slot {}, place your finger on the sensor", slot);

            let key = h
                .enroll(slot, wallet, |o| match o {
                    Output::EnrollStep { step, .. } => info!("capture {} accepted", step),
                    Output::CaptureRetry { error, .. } => {
                        info!("capture failed ({}), try again", error.message())
                    }
                    _ => (),
                })
                .await?;

            info!("Enrolled slot {} (key released: {})", slot, key.is_some());
        }
        Actions::Recognize { purpose, wallet } => {
            info!("Recognizing for {}, place your finger on the sensor", purpose);

            let r = h.recognize(purpose.purpose(wallet)).await?;

            info!("Matched finger {} (score: {})", r.finger_id, r.score);
            if r.key.is_some() {
                info!("Key material released");
            }
        }
        Actions::Delete { slot } => {
            h.delete(slot).await?;
            info!("Deleted slot {}", slot);
        }
        Actions::DeleteAll => {
            h.delete_all().await?;
            info!("Deleted all fingers");
        }
        Actions::Wipe => {
            h.wipe().await?;
            info!("Fingerprint state cleared");
        }
        Actions::LowPower => h.low_power().await?,
        Actions::Reset => h.reset().await?,
        Actions::SetKey { key } => {
            h.install_comm_key(key.as_ref()).await?;
            info!("Communication key replaced");
        }
        Actions::Raw { command, data } => {
            let r = h.raw(command, &data.0).await?;
            info!("{} response: {}", command, hex::encode(r));
        }
    }

    Ok(())
}
