//! Sensor handle operations against the simulator

use fpsensor::{engine::Purpose, proto::Command, Error, SecureStore};
use fpsensor_sim::{template_key, SimSensor, Touch, SIM_VERSION};

mod helpers;
use helpers::*;

#[tokio::test]
async fn pair_and_info() -> anyhow::Result<()> {
    let (h, sim) = setup(SimSensor::with_seed(1), SecureStore::default()).await;

    assert_eq!(h.start().await?, SIM_VERSION);

    let store = h.store().await;
    assert!(store.comm_key.is_some());
    assert!(sim.lock().unwrap().has_key());

    let i = h.info().await?;
    assert_eq!(i.version, SIM_VERSION);
    assert_eq!(&i.chip_id[..], b"FPSIM001");
    assert_eq!(i.uid.len(), 16);
    assert!(i.bound);
    assert_eq!(i.registered, 0);

    let r = h.raw(Command::GetRegNum, &[]).await?;
    assert_eq!(r, vec![0, 0]);

    Ok(())
}

#[tokio::test]
async fn enroll_and_recognize() -> anyhow::Result<()> {
    let (h, sim) = setup(SimSensor::with_seed(2), SecureStore::default()).await;
    h.start().await?;

    sim.lock()
        .unwrap()
        .set_auto_touch(Some(Touch::Finger(FINGER)));

    let mut steps = 0;
    let key = h.enroll(0, 0, |_| steps += 1).await?;
    assert_eq!(steps, 8);
    assert_eq!(
        key.as_ref().map(|k| *k.as_bytes()),
        Some(template_key(FINGER))
    );

    let r = h.recognize(Purpose::Unlock).await?;
    assert_eq!(r.finger_id, 1);
    assert_eq!(r.key, None);

    // Manager state persisted on push
    h.push_state().await?;
    let info = h.store().await.manager_info();
    assert_eq!(info.finger_num, 1);
    assert!(info.is_registered(0));

    Ok(())
}

#[tokio::test]
async fn recognize_mismatch() -> anyhow::Result<()> {
    let (h, sim) = setup(SimSensor::with_seed(3), SecureStore::default()).await;
    h.start().await?;

    sim.lock()
        .unwrap()
        .set_auto_touch(Some(Touch::Finger(FINGER)));
    h.enroll(0, 0, |_| ()).await?;

    sim.lock().unwrap().set_auto_touch(Some(Touch::Finger(9)));
    let r = h.recognize(Purpose::Unlock).await;

    assert!(matches!(
        r,
        Err(Error::Recognize {
            action: None,
            ..
        })
    ));

    Ok(())
}

#[tokio::test]
async fn user_timeout_cancels() -> anyhow::Result<()> {
    let (h, sim) = setup(SimSensor::with_seed(4), SecureStore::default()).await;
    h.start().await?;

    let r = h.enroll(0, 0, |_| ()).await;
    assert!(matches!(r, Err(Error::UserTimeout)));

    // Sensor no longer waiting and handle usable
    assert!(!sim.lock().unwrap().is_waiting());
    assert_eq!(h.registered_count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn restart_restores_pairing() -> anyhow::Result<()> {
    let sim = SimSensor::with_seed(5);

    let (h, sim) = setup(sim, SecureStore::default()).await;
    h.start().await?;

    sim.lock()
        .unwrap()
        .set_auto_touch(Some(Touch::Finger(FINGER)));
    h.enroll(1, 0, |_| ()).await?;
    h.push_state().await?;

    let store = h.store().await;
    drop(h);

    // Reconnect using persisted state with the same sensor
    let s = std::mem::replace(&mut *sim.lock().unwrap(), SimSensor::with_seed(6));
    let (h, _sim) = setup(s, store).await;

    h.start().await?;
    assert!(h.unlock_available().await);

    let r = h.recognize(Purpose::Unlock).await?;
    assert_eq!(r.finger_id, 2);

    Ok(())
}
