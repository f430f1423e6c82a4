//! Cache correctness and cache bound properties, plus the minimum cache
//! size / rounding behavior.

mod common;

use trackfile::{control, ChangeUnitTag, Driver, InsertMediaOptions, StartUnitOptions, CONTROL};

#[test]
fn cache_memory_below_one_track_is_rejected() {
    common::init_logger();
    let driver = Driver::new();
    let options = StartUnitOptions {
        max_cache_memory: Some(1),
        ..Default::default()
    };
    assert!(control::start_unit(&driver, None, options).is_err());
}

#[test]
fn cache_memory_is_rounded_up_to_a_whole_track() {
    common::init_logger();
    let driver = Driver::new();
    let one_and_a_half_tracks = 11 * 512 + 100;
    let options = StartUnitOptions {
        max_cache_memory: Some(one_and_a_half_tracks),
        ..Default::default()
    };
    control::start_unit(&driver, None, options).unwrap();
    assert_eq!(driver.max_cache_memory(), 2 * 11 * 512);
}

#[test]
fn zero_cache_memory_uninstalls_the_cache() {
    common::init_logger();
    let driver = Driver::new();
    let options = StartUnitOptions {
        max_cache_memory: Some(64 * 1024),
        ..Default::default()
    };
    control::start_unit(&driver, None, options).unwrap();
    assert!(driver.max_cache_memory() > 0);

    control::change_unit(&driver, CONTROL, &[ChangeUnitTag::MaxCacheMemory(0)]).unwrap();
    assert_eq!(driver.max_cache_memory(), 0);
}

#[test]
fn repeated_reads_of_the_same_track_hit_the_cache_and_agree_with_uncached_content() {
    common::init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = common::dd_image(dir.path(), "a.adf", 0x22);

    let driver = Driver::new();
    let options = StartUnitOptions {
        max_cache_memory: Some(64 * 1024),
        ..Default::default()
    };
    let unit = control::start_unit(&driver, None, options).unwrap();
    control::insert_media(
        &driver,
        unit,
        InsertMediaOptions {
            image_file_name: Some(path),
            enable_unit_cache: true,
            ..Default::default()
        },
    )
    .unwrap();

    let first = control::read(&driver, unit, 0, 512).unwrap();
    let second = control::read(&driver, unit, 0, 512).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, vec![0x22u8; 512]);

    let snapshot = control::get_unit_data(&driver, Some(unit)).unwrap();
    let stats = snapshot[0].cache_stats.unwrap();
    assert!(stats.misses >= 1);
    assert!(stats.hits >= 1);
}

#[test]
fn cache_is_silently_ignored_for_hd_units() {
    common::init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = common::hd_image(dir.path(), "a.adf", 0x44);

    let driver = Driver::new();
    let options = StartUnitOptions {
        drive_type: trackfile::DriveType::Hd,
        max_cache_memory: Some(64 * 1024),
        ..Default::default()
    };
    let unit = control::start_unit(&driver, None, options).unwrap();
    control::insert_media(
        &driver,
        unit,
        InsertMediaOptions {
            image_file_name: Some(path),
            enable_unit_cache: true,
            ..Default::default()
        },
    )
    .unwrap();

    let snapshot = control::get_unit_data(&driver, Some(unit)).unwrap();
    let stats = snapshot[0].cache_stats.unwrap();
    control::read(&driver, unit, 0, 512).unwrap();
    let snapshot_after = control::get_unit_data(&driver, Some(unit)).unwrap();
    let stats_after = snapshot_after[0].cache_stats.unwrap();
    assert_eq!(stats.hits, stats_after.hits);
    assert_eq!(stats.misses, stats_after.misses);
}
