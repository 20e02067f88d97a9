//! Manager record persistence

use fpsensor_core::engine::{Error, Output};
use fpsensor_core::proto::{Command, ManagerInfo};
use fpsensor_sim::{SimSensor, SIM_VERSION};

mod helpers;
use helpers::*;

#[test]
fn updates_held_until_push() -> anyhow::Result<()> {
    let mut h = Harness::paired();

    let m = h.engine.manager_mut();
    m.update_registered_status(1, 2)?;
    m.update_registered_count(1);
    m.update_unlock_flag(true);
    m.update_sign_flag(2, true)?;

    assert_eq!(h.engine.driver().manager_writes, 0);
    assert_eq!(h.engine.driver().manager_info, ManagerInfo::new().to_bytes());

    h.engine.push_to_secure_element()?;

    let stored = ManagerInfo::from_bytes(&h.engine.driver().manager_info);
    assert_eq!(stored.finger_ids, [0, 2, 0]);
    assert_eq!(stored.finger_num, 1);
    assert_eq!(stored.unlock_flag, 1);
    assert_eq!(stored.sign_flags, [0, 0, 1]);

    // Reload discards unpushed changes
    h.engine.manager_mut().update_registered_count(3);
    h.engine.load_from_secure_element()?;
    assert_eq!(h.engine.registered_count(), 1);

    Ok(())
}

#[test]
fn invalid_indices() {
    let mut h = Harness::new(SimSensor::with_seed(1));
    let m = h.engine.manager_mut();

    assert_eq!(m.update_registered_status(3, 1), Err(Error::InvalidSlot));
    assert_eq!(m.update_sign_flag(3, true), Err(Error::InvalidWallet));
    assert_eq!(h.engine.select_wallet(3), Err(Error::InvalidWallet));
}

#[test]
fn enrollment_clears_other_wallets() -> anyhow::Result<()> {
    let mut h = Harness::paired();
    h.engine.select_wallet(1)?;

    let m = h.engine.manager_mut();
    m.update_sign_flag(0, true)?;
    m.update_sign_flag(1, true)?;

    h.sim.set_auto_touch(Some(fpsensor_sim::Touch::Finger(FINGER)));
    h.engine.register(0)?;
    h.pump();

    assert_eq!(h.engine.registered_count(), 1);
    assert!(!h.engine.sign_flag(0));
    assert!(h.engine.sign_flag(1));

    Ok(())
}

#[test]
fn wipe() -> anyhow::Result<()> {
    let mut h = Harness::enrolled();
    h.engine.push_to_secure_element()?;

    assert_eq!(h.engine.wipe()?, Output::Sent(Command::DeleteAll));
    assert_eq!(h.engine.registered_count(), 0);
    assert_eq!(h.engine.driver().manager_writes, 2);
    assert_eq!(h.engine.driver().manager_info, ManagerInfo::new().to_bytes());

    assert_eq!(h.pump(), vec![Output::Deleted { slot: None }]);
    assert_eq!(h.sim.registered_count(), 0);

    Ok(())
}

#[test]
fn wipe_abandons_bootstrap() -> anyhow::Result<()> {
    let mut h = Harness::new(SimSensor::with_seed(11));

    h.engine.start()?;
    assert_eq!(h.engine.wipe()?, Output::None);
    assert!(h.engine.is_idle());

    // Replies to the abandoned request are ignored
    let out = h.pump();
    assert_eq!(
        out,
        vec![
            Output::Unsolicited {
                code: Command::GetVer.code()
            },
            Output::Unsolicited {
                code: Command::GetVer.code()
            },
        ]
    );

    // Later queries do not resume pairing
    h.engine.get_firmware_version()?;
    let out = h.pump();
    assert_eq!(
        out,
        vec![Output::FirmwareVersion {
            version: SIM_VERSION
        }]
    );
    assert!(!h.engine.has_session_key());
    assert!(!h.sim.has_key());

    Ok(())
}
