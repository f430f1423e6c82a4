//! Eject timeout behavior and eject-poll timing: a unit held busy via the
//! `Driver::set_pending_io` test hook times out with `DriveInUse`, succeeds
//! once cleared, and a user break
//! signal aborts the poll immediately with `Break`.

mod common;

use std::time::{Duration, Instant};
use trackfile::{control, Driver, DriverError, InsertMediaOptions, StartUnitOptions};

fn loaded_unit(driver: &Driver, dir: &std::path::Path) -> u32 {
    let path = common::dd_image(dir, "a.adf", 0);
    let unit = control::start_unit(driver, None, StartUnitOptions::default()).unwrap();
    control::insert_media(
        driver,
        unit,
        InsertMediaOptions {
            image_file_name: Some(path),
            ..Default::default()
        },
    )
    .unwrap();
    unit
}

#[test]
fn eject_times_out_while_busy_then_succeeds_once_cleared() {
    common::init_logger();
    let dir = tempfile::tempdir().unwrap();
    let driver = Driver::new();
    let unit = loaded_unit(&driver, dir.path());

    driver.set_pending_io(unit, 1).unwrap();
    let start = Instant::now();
    let result = control::eject_media(&driver, unit, Duration::from_millis(400));
    assert_eq!(result, Err(DriverError::DriveInUse));
    assert!(start.elapsed() >= Duration::from_millis(380));

    driver.set_pending_io(unit, 0).unwrap();
    assert!(control::eject_media(&driver, unit, Duration::from_secs(2)).is_ok());
}

#[test]
fn eject_succeeds_once_the_busy_signal_clears_mid_poll() {
    common::init_logger();
    let dir = tempfile::tempdir().unwrap();
    let driver = Driver::new();
    let unit = loaded_unit(&driver, dir.path());
    let driver = std::sync::Arc::new(driver);
    driver.set_pending_io(unit, 1).unwrap();

    let clearer = driver.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(700));
        clearer.set_pending_io(unit, 0).unwrap();
    });

    let start = Instant::now();
    let result = control::eject_media(&driver, unit, Duration::from_secs(5));
    assert!(result.is_ok());
    assert!(start.elapsed() >= Duration::from_millis(650));

    handle.join().unwrap();
}

#[test]
fn eject_honors_a_user_break_signal() {
    common::init_logger();
    let dir = tempfile::tempdir().unwrap();
    let driver = Driver::new();
    let unit = loaded_unit(&driver, dir.path());

    driver.set_pending_io(unit, 1).unwrap();
    let start = Instant::now();
    let result = control::eject_media_breakable(&driver, unit, Duration::from_secs(5), || true);
    assert_eq!(result, Err(DriverError::Break));
    assert!(start.elapsed() < Duration::from_millis(200));
}
