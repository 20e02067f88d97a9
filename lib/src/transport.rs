// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Sensor transports
//!
//! Any [AsyncRead] + [AsyncWrite] byte stream may carry sensor frames,
//! [TcpOptions] connects to a sensor exposed over TCP (such as
//! `fpsensor-sim`).

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use log::debug;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::{Error, SecureStore, SensorHandle};

/// Default simulator port
pub const DEFAULT_PORT: u16 = 1237;

/// TCP transport options
#[derive(Clone, PartialEq, Debug, clap::Parser)]
pub struct TcpOptions {
    /// Sensor address
    #[clap(long, env = "FPSENSOR_ADDR", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub addr: IpAddr,

    /// Sensor port
    #[clap(long, env = "FPSENSOR_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
        }
    }
}

/// Connect trait for supported transports
#[async_trait]
pub trait Connect {
    type Transport: AsyncRead + AsyncWrite + Unpin + Send;

    /// Connect to the sensor, using `store` for persistent state
    async fn connect(&self, store: SecureStore) -> Result<SensorHandle<Self::Transport>, Error>;
}

#[async_trait]
impl Connect for TcpOptions {
    type Transport = TcpStream;

    async fn connect(&self, store: SecureStore) -> Result<SensorHandle<TcpStream>, Error> {
        debug!("Connecting to {}:{}", self.addr, self.port);

        let s = TcpStream::connect((self.addr, self.port)).await?;
        s.set_nodelay(true)?;

        Ok(SensorHandle::new(s, store))
    }
}
