//! Module detection and pairing at start-up

use fpsensor_core::engine::{Error, LinkError, Manager, Output, State};
use fpsensor_core::proto::Command;
use fpsensor_sim::{SimSensor, SIM_VERSION};

mod helpers;
use helpers::*;

const KEY: [u8; 16] = [0x11; 16];

#[test]
fn unpaired_sensor_provisioned() -> anyhow::Result<()> {
    let mut h = Harness::new(SimSensor::with_seed(1));

    assert_eq!(h.engine.register(0), Err(Error::NotPresent));

    assert_eq!(h.engine.start()?, Output::Sent(Command::GetVer));
    let out = h.pump();

    assert_eq!(
        out,
        vec![
            Output::FirmwareVersion {
                version: SIM_VERSION
            },
            Output::AesKeyState { set: false },
            Output::AesKeySet,
        ]
    );

    assert!(h.engine.is_module_present());
    assert!(h.engine.has_session_key());
    assert_eq!(h.engine.firmware_version(), Some(SIM_VERSION));
    assert!(h.engine.driver().comm_key.is_some());
    assert!(h.sim.has_key());

    // Encrypted exchanges now succeed
    h.engine.get_registered_count()?;
    assert_eq!(
        h.pump(),
        vec![Output::RegisteredCount {
            count: 0,
            in_sync: true
        }]
    );

    Ok(())
}

#[test]
fn paired_sensor_restored() -> anyhow::Result<()> {
    let mut m = Manager::new();
    m.add_finger(0, 0)?;

    let drv = TestDriver {
        comm_key: Some(KEY),
        manager_info: m.info().to_bytes(),
        ..Default::default()
    };
    let sim = SimSensor::with_seed(2)
        .with_key(&KEY)
        .with_template(0, FINGER);
    let mut h = Harness::with_driver(sim, drv);

    h.engine.start()?;
    let out = h.pump();

    assert_eq!(
        out,
        vec![
            Output::FirmwareVersion {
                version: SIM_VERSION
            },
            Output::AesKeyState { set: true },
            Output::RegisteredCount {
                count: 1,
                in_sync: true
            },
        ]
    );

    assert_eq!(h.engine.registered_count(), 1);
    assert!(h.engine.unlock_flag());
    assert!(h.engine.unlock_available());
    assert_eq!(h.engine.state(), State::Idle);

    Ok(())
}

#[test]
fn count_mismatch_deletes_all() -> anyhow::Result<()> {
    let drv = TestDriver {
        comm_key: Some(KEY),
        ..Default::default()
    };
    let sim = SimSensor::with_seed(3)
        .with_key(&KEY)
        .with_template(1, FINGER);
    let mut h = Harness::with_driver(sim, drv);

    h.engine.start()?;
    let out = h.pump();

    assert_eq!(
        &out[2..],
        &[
            Output::RegisteredCount {
                count: 1,
                in_sync: false
            },
            Output::Deleted { slot: None },
        ]
    );

    assert_eq!(h.sim.registered_count(), 0);
    assert_eq!(h.engine.registered_count(), 0);

    // Record is not written until requested
    assert_eq!(h.engine.driver().manager_writes, 0);

    Ok(())
}

#[test]
fn paired_sensor_without_stored_key() -> anyhow::Result<()> {
    let sim = SimSensor::with_seed(4).with_key(&KEY);
    let mut h = Harness::new(sim);

    h.engine.start()?;
    let out = h.pump();

    assert_eq!(out.last(), Some(&Output::KeyStateMismatch));
    assert!(!h.engine.has_session_key());
    assert!(h.engine.is_idle());

    Ok(())
}

#[test]
fn absent_module() -> anyhow::Result<()> {
    let mut h = Harness::new(SimSensor::with_seed(5));
    h.sim.faults_mut().silent = true;

    h.engine.start()?;
    let out = h.ticks(4 * 10);

    assert_eq!(
        out,
        vec![Output::CommandFailed {
            command: Command::GetVer,
            error: LinkError::AckTimeout
        }]
    );
    assert!(!h.engine.is_module_present());
    assert!(!h.engine.unlock_available());

    Ok(())
}

#[test]
fn follow_up_send_failure() -> anyhow::Result<()> {
    let drv = TestDriver {
        fail_after: Some(1),
        ..Default::default()
    };
    let mut h = Harness::with_driver(SimSensor::with_seed(12), drv);

    h.engine.start()?;
    let out = h.pump();

    assert_eq!(
        out,
        vec![Output::CommandFailed {
            command: Command::GetAesKeyState,
            error: LinkError::SendError,
        }]
    );

    // Version response is still applied
    assert!(h.engine.is_module_present());
    assert_eq!(h.engine.firmware_version(), Some(SIM_VERSION));
    assert!(h.engine.is_idle());
    assert!(!h.engine.has_session_key());

    Ok(())
}
