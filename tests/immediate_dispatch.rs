//! Immediate commands stay lock-free: a queued command never makes an
//! immediate command wait, because immediate commands never touch the
//! worker's queue.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use trackfile::{control, Driver, InsertMediaOptions, StartUnitOptions};

#[test]
fn immediate_commands_do_not_wait_behind_a_busy_queue() {
    common::init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = common::dd_image(dir.path(), "a.adf", 0);

    let driver = Arc::new(Driver::new());
    let unit = control::start_unit(&driver, None, StartUnitOptions::default()).unwrap();
    control::insert_media(
        &driver,
        unit,
        InsertMediaOptions {
            image_file_name: Some(path),
            ..Default::default()
        },
    )
    .unwrap();

    // Keep the unit's worker queue continuously busy with writes from a
    // background thread while the foreground thread probes an immediate
    // command; its latency must stay bounded regardless of queue depth.
    let stop = Arc::new(AtomicBool::new(false));
    let flooder_driver = driver.clone();
    let flooder_stop = stop.clone();
    let flooder = std::thread::spawn(move || {
        let pattern = vec![0x11u8; 512];
        while !flooder_stop.load(Ordering::Relaxed) {
            let _ = control::write(&flooder_driver, unit, 0, pattern.clone());
        }
    });

    for _ in 0..50 {
        let start = Instant::now();
        assert!(control::change_state(&driver, unit).is_ok());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    stop.store(true, Ordering::Relaxed);
    flooder.join().unwrap();
}
