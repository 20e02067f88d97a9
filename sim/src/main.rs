// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{net::SocketAddr, sync::Arc};

use clap::Parser;
use log::{debug, info, warn, LevelFilter};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::Mutex,
};

use fpsensor_sim::{SimSensor, Touch};

/// Fingerprint sensor simulator
///
/// This exposes a simulated sensor module via TCP, for exercising
/// drivers (and the `fpsensor-cli` tool) without hardware.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct Args {
    /// Simulator listen address
    #[clap(long, env = "FPSENSOR_SIM_ADDR", default_value = "127.0.0.1:1237")]
    addr: SocketAddr,

    /// Finger presented for every capture request
    #[clap(long)]
    finger: Option<u8>,

    /// Enroll a template at startup (`SLOT:FINGER`)
    #[clap(long, value_parser = parse_template)]
    template: Vec<(u8, u8)>,

    /// Log level
    #[clap(long, default_value = "debug")]
    log_level: LevelFilter,
}

fn parse_template(s: &str) -> Result<(u8, u8), String> {
    let (slot, finger) = s
        .split_once(':')
        .ok_or_else(|| format!("expected SLOT:FINGER, found '{}'", s))?;
    let slot = slot.parse::<u8>().map_err(|e| e.to_string())?;
    let finger = finger.parse::<u8>().map_err(|e| e.to_string())?;
    Ok((slot, finger))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging
    let mut c = simplelog::ConfigBuilder::new();
    c.add_filter_allow_str("fpsensor");

    let _ = simplelog::SimpleLogger::init(args.log_level, c.build());

    // Setup sensor
    let mut sensor = SimSensor::new();
    sensor.set_auto_touch(args.finger.map(Touch::Finger));
    for (slot, finger) in &args.template {
        sensor.enroll_template(*slot, *finger);
    }
    let sensor = Arc::new(Mutex::new(sensor));

    let listener = TcpListener::bind(args.addr).await?;
    info!("Simulator listening on {}", args.addr);

    loop {
        tokio::select!(
            // Accept incoming connections
            r = listener.accept() => {
                let (stream, peer) = r?;
                info!("Connection from {}", peer);

                let s = sensor.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, s).await {
                        warn!("Connection error: {:?}", e);
                    }
                    debug!("Connection from {} closed", peer);
                });
            }
            // Exit on ctrl + c
            _ = tokio::signal::ctrl_c() => {
                debug!("Exit!");
                break;
            },
        );
    }

    Ok(())
}

async fn serve(mut stream: TcpStream, sensor: Arc<Mutex<SimSensor>>) -> anyhow::Result<()> {
    let mut buff = [0u8; 512];

    loop {
        let n = stream.read(&mut buff).await?;
        if n == 0 {
            return Ok(());
        }

        let out = {
            let mut s = sensor.lock().await;
            s.receive(&buff[..n]);
            s.take_output()
        };

        if !out.is_empty() {
            stream.write_all(&out).await?;
        }
    }
}
