//! End-to-end scenarios: full lifecycle, geometry surface, and bootable
//! install.

mod common;

use std::time::Duration;
use trackfile::{control, Driver, DriverError, DriveType, InsertMediaOptions, StartUnitOptions};

#[test]
fn full_lifecycle_start_insert_read_eject_stop() {
    common::init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = common::dd_image(dir.path(), "a.adf", 0x33);

    let driver = Driver::new();
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
    assert!(control::change_state(&driver, unit).unwrap());

    let data = control::read(&driver, unit, 0, 512).unwrap();
    assert_eq!(data, vec![0x33u8; 512]);

    control::eject_media(&driver, unit, Duration::from_secs(1)).unwrap();
    assert!(!control::change_state(&driver, unit).unwrap());

    control::stop_unit(&driver, unit).unwrap();
    assert_eq!(control::read(&driver, unit, 0, 512), Err(DriverError::UnitNotActive));
}

#[test]
fn geometry_surface_reports_dd_and_hd_sector_counts() {
    common::init_logger();
    let dir = tempfile::tempdir().unwrap();
    let dd_path = common::dd_image(dir.path(), "dd.adf", 0);
    let hd_path = common::hd_image(dir.path(), "hd.adf", 0);

    let driver = Driver::new();
    let dd_unit = control::start_unit(
        &driver,
        None,
        StartUnitOptions {
            drive_type: DriveType::Dd,
            ..Default::default()
        },
    )
    .unwrap();
    control::insert_media(
        &driver,
        dd_unit,
        InsertMediaOptions {
            image_file_name: Some(dd_path),
            ..Default::default()
        },
    )
    .unwrap();

    let hd_unit = control::start_unit(
        &driver,
        None,
        StartUnitOptions {
            drive_type: DriveType::Hd,
            ..Default::default()
        },
    )
    .unwrap();
    control::insert_media(
        &driver,
        hd_unit,
        InsertMediaOptions {
            image_file_name: Some(hd_path),
            ..Default::default()
        },
    )
    .unwrap();

    let dd_geometry = control::get_geometry(&driver, dd_unit).unwrap();
    let hd_geometry = control::get_geometry(&driver, hd_unit).unwrap();
    assert_eq!(dd_geometry.sectors_per_track(), 11);
    assert_eq!(hd_geometry.sectors_per_track(), 22);
    assert_eq!(control::get_num_tracks(&driver, dd_unit).unwrap(), 80);
    assert_eq!(control::get_num_tracks(&driver, hd_unit).unwrap(), 80);
}

#[test]
fn bootable_image_identity_is_captured_on_insert() {
    common::init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = common::dd_image_with_volume(dir.path(), "boot.adf", "Workbench", (1, 2, 3));

    let driver = Driver::new();
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

    let snapshot = control::get_unit_data(&driver, Some(unit)).unwrap();
    let identity = &snapshot[0];
    let volume = identity.volume.as_ref().unwrap();
    assert_eq!(volume.name, "Workbench");
    assert_eq!(volume.creation, (1, 2, 3));
    assert!(identity.dos_type.unwrap().is_amiga_dos());
}

#[test]
fn write_through_an_uncached_unit_is_visible_on_the_next_read() {
    common::init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = common::dd_image(dir.path(), "a.adf", 0);

    let driver = Driver::new();
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

    let pattern = vec![0x99u8; 512];
    control::write(&driver, unit, 1024, pattern.clone()).unwrap();
    let read_back = control::read(&driver, unit, 1024, 512).unwrap();
    assert_eq!(read_back, pattern);

    let untouched = control::read(&driver, unit, 0, 512).unwrap();
    assert_eq!(untouched, vec![0u8; 512]);
}
