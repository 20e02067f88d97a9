#![allow(unused)]

use std::{
    str::FromStr,
    sync::{Arc, Mutex},
    time::Duration,
};

use log::{debug, LevelFilter};
use simplelog::SimpleLogger;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use fpsensor::{SecureStore, SensorHandle};
use fpsensor_sim::SimSensor;

/// Finger used for enrollment
pub const FINGER: u8 = 7;

/// Shared simulator instance
pub type Sim = Arc<Mutex<SimSensor>>;

/// Connect a sensor handle to a simulated sensor via an in-memory stream
pub async fn setup(sim: SimSensor, store: SecureStore) -> (SensorHandle<DuplexStream>, Sim) {
    // Setup logging
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };
    let _ = SimpleLogger::init(log_level, Default::default());

    let (host, mut device) = tokio::io::duplex(1024);
    let sim = Arc::new(Mutex::new(sim));

    // Run simulator task
    let s = sim.clone();
    tokio::spawn(async move {
        let mut buff = [0u8; 512];

        loop {
            let n = match device.read(&mut buff).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };

            let out = {
                let mut s = s.lock().unwrap();
                s.receive(&buff[..n]);
                s.take_output()
            };

            if device.write_all(&out).await.is_err() {
                break;
            }
        }

        debug!("Simulator task exiting");
    });

    let h = SensorHandle::new(host, store)
        .with_timeouts(Duration::from_secs(5), Duration::from_millis(500));

    (h, sim)
}
