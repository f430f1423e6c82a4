/*
    trackfile

    --------------------------------------------------------------------------

    src/control.rs

    The control-plane API (`start_unit`, `stop_unit`, `insert_media`,
    `eject_media`, `change_unit`, `get_unit_data`, `examine_file_size`) plus
    thin per-request convenience wrappers (`read`/`write`/`format`/...) built
    on `dispatcher::submit`. Every function here takes an explicit `&Driver`
    rather than touching a hidden global, so tests stay parametric over an
    explicit context instead of shared process state.
*/

use crate::admission::InsertMediaOptions;
use crate::cache::{SharedCache, MIN_CACHE_BYTES};
use crate::change_notify::ChangeSubscription;
use crate::dispatcher;
use crate::driver::{Driver, CONTROL};
use crate::eject::{self, EjectOutcome};
use crate::error::{DriverError, Result};
use crate::geometry::DriveType;
use crate::request::{Command, Request};
use crate::snapshot::UnitSnapshot;
use crate::unit::Unit;
use crate::unit::UnitState;
use crate::worker::{self, ControlJob};
use crossbeam_channel::bounded;
use std::sync::Arc;
use std::time::Duration;

/// `start_unit`'s tag list (`{drive_type=DD|HD, enable_checksums,
/// max_cache_memory}`).
#[derive(Debug, Clone, Copy)]
pub struct StartUnitOptions {
    pub drive_type: DriveType,
    pub enable_checksums: bool,
    pub max_cache_memory: Option<usize>,
}

impl Default for StartUnitOptions {
    fn default() -> Self {
        Self {
            drive_type: DriveType::Dd,
            enable_checksums: false,
            max_cache_memory: None,
        }
    }
}

/// `start_unit(unit | ANY, ...)`: `None` selects `ANY`.
pub fn start_unit(driver: &Driver, unit: Option<u32>, options: StartUnitOptions) -> Result<u32> {
    if let Some(bytes) = options.max_cache_memory {
        install_or_resize_cache(driver, bytes)?;
    }

    let number = match unit {
        Some(n) => n,
        None => driver.registry.allocate_next().ok_or(DriverError::OutOfMemory)?,
    };

    if let Some(slot) = driver.registry.peek(number) {
        let mut unit_guard = slot.unit.lock().expect("unit lock poisoned");
        match unit_guard.state {
            UnitState::Stopped => {
                unit_guard.drive_type = Some(options.drive_type);
                unit_guard.checksums_requested = options.enable_checksums;
                unit_guard.state = UnitState::RunningEmpty;
                drop(unit_guard);
                let handle = worker::spawn(number, slot.unit.clone(), driver.registry.clone(), driver.cache.clone());
                *slot.worker.lock().expect("worker lock poisoned") = Some(handle);
                Ok(number)
            }
            // Per-request `start` is a lazy no-op if already running.
            _ => Ok(number),
        }
    } else {
        let mut new_unit = Unit::new(number);
        new_unit.drive_type = Some(options.drive_type);
        new_unit.checksums_requested = options.enable_checksums;
        new_unit.state = UnitState::RunningEmpty;
        let slot = driver.registry.insert(number, new_unit);
        let handle = worker::spawn(number, slot.unit.clone(), driver.registry.clone(), driver.cache.clone());
        *slot.worker.lock().expect("worker lock poisoned") = Some(handle);
        Ok(number)
    }
}

/// `stop_unit(unit)`: allowed only when the unit has no medium loaded
/// (running/* -> stopped transition requires loaded=false).
pub fn stop_unit(driver: &Driver, unit: u32) -> Result<()> {
    let slot = driver.registry.peek(unit).ok_or(DriverError::UnitNotFound)?;
    let mut worker_guard = slot.worker.lock().expect("worker lock poisoned");
    let handle = worker_guard.as_ref().ok_or(DriverError::UnitNotActive)?;

    let (reply_tx, reply_rx) = bounded(1);
    handle
        .control_tx
        .send(ControlJob::Stop { reply: reply_tx })
        .map_err(|_| DriverError::UnitNotActive)?;
    reply_rx.recv().map_err(|_| DriverError::Aborted)??;

    if let Some(mut handle) = worker_guard.take() {
        handle.join();
    }
    drop(worker_guard);

    slot.unit.lock().expect("unit lock poisoned").state = UnitState::Stopped;
    Ok(())
}

/// `insert_media(unit, {...})`.
pub fn insert_media(driver: &Driver, unit: u32, options: InsertMediaOptions) -> Result<()> {
    let slot = driver.registry.peek(unit).ok_or(DriverError::UnitNotFound)?;
    {
        let unit_guard = slot.unit.lock().expect("unit lock poisoned");
        match unit_guard.state {
            UnitState::Stopped => return Err(DriverError::UnitNotFound),
            UnitState::RunningEmpty => {}
            _ => return Err(DriverError::AlreadyInUse),
        }
    }

    let worker_guard = slot.worker.lock().expect("worker lock poisoned");
    let handle = worker_guard.as_ref().ok_or(DriverError::UnitNotActive)?;

    let (reply_tx, reply_rx) = bounded(1);
    handle
        .control_tx
        .send(ControlJob::Insert { options, reply: reply_tx })
        .map_err(|_| DriverError::UnitNotActive)?;
    drop(worker_guard);

    reply_rx.recv().map_err(|_| DriverError::Aborted)?
}

/// `eject_media(unit, {timeout_seconds})`. Polls the worker's control
/// channel at `eject::POLL_INTERVAL` up to `timeout`: obtains the device
/// lock, sends a command to the worker, releases the device lock, then
/// polls.
pub fn eject_media(driver: &Driver, unit: u32, timeout: Duration) -> Result<()> {
    eject_media_breakable(driver, unit, timeout, || false)
}

/// As `eject_media`, but polls `should_break` each iteration for a
/// user-break signal.
pub fn eject_media_breakable(
    driver: &Driver,
    unit: u32,
    timeout: Duration,
    should_break: impl FnMut() -> bool,
) -> Result<()> {
    let slot = driver.registry.peek(unit).ok_or(DriverError::UnitNotFound)?;

    let attempt = || -> Result<()> {
        let worker_guard = slot.worker.lock().expect("worker lock poisoned");
        let handle = worker_guard.as_ref().ok_or(DriverError::UnitNotActive)?;
        let (reply_tx, reply_rx) = bounded(1);
        handle
            .control_tx
            .send(ControlJob::Eject { reply: reply_tx })
            .map_err(|_| DriverError::UnitNotActive)?;
        drop(worker_guard);
        reply_rx.recv().map_err(|_| DriverError::Aborted)?
    };

    match eject::poll_eject(timeout, attempt, should_break) {
        EjectOutcome::Ejected => Ok(()),
        EjectOutcome::TimedOut(e) => Err(e),
    }
}

/// One directive in `change_unit`'s ordered tag list.
#[derive(Debug, Clone, Copy)]
pub enum ChangeUnitTag {
    WriteProtected(bool),
    EnableUnitCache(bool),
    MaxCacheMemory(usize),
}

/// `change_unit` short-circuits on the first failing tag and reports which
/// one failed (`tag_item_failed`).
#[derive(Debug, Clone)]
pub struct ChangeUnitFailure {
    pub tag: ChangeUnitTag,
    pub error: DriverError,
}

/// `change_unit(unit | CONTROL, tags)`: applies each tag atomically-on-each,
/// short-circuiting on the first failure.
pub fn change_unit(
    driver: &Driver,
    unit: u32,
    tags: &[ChangeUnitTag],
) -> std::result::Result<(), ChangeUnitFailure> {
    for &tag in tags {
        let result = apply_change_unit_tag(driver, unit, tag);
        if let Err(error) = result {
            return Err(ChangeUnitFailure { tag, error });
        }
    }
    Ok(())
}

fn apply_change_unit_tag(driver: &Driver, unit: u32, tag: ChangeUnitTag) -> Result<()> {
    match tag {
        ChangeUnitTag::MaxCacheMemory(bytes) => {
            if unit != CONTROL {
                // "only on the CONTROL pseudo-unit" -- ignored elsewhere.
                return Ok(());
            }
            install_or_resize_cache(driver, bytes)
        }
        ChangeUnitTag::WriteProtected(value) => {
            if unit == CONTROL {
                return Ok(());
            }
            send_unit_control(driver, unit, |reply| ControlJob::SetWriteProtected { value, reply })
        }
        ChangeUnitTag::EnableUnitCache(value) => {
            if unit == CONTROL {
                return Ok(());
            }
            send_unit_control(driver, unit, |reply| ControlJob::SetCacheEnabled { value, reply })
        }
    }
}

fn send_unit_control(
    driver: &Driver,
    unit: u32,
    make_job: impl FnOnce(crossbeam_channel::Sender<Result<()>>) -> ControlJob,
) -> Result<()> {
    let slot = driver.registry.peek(unit).ok_or(DriverError::UnitNotFound)?;
    let worker_guard = slot.worker.lock().expect("worker lock poisoned");
    let handle = worker_guard.as_ref().ok_or(DriverError::UnitNotActive)?;
    let (reply_tx, reply_rx) = bounded(1);
    handle.control_tx.send(make_job(reply_tx)).map_err(|_| DriverError::UnitNotActive)?;
    drop(worker_guard);
    reply_rx.recv().map_err(|_| DriverError::Aborted)?
}

/// Install (if none exists) or resize the device-wide shared cache. Values
/// below one track are rejected; `0` uninstalls the cache; anything else is
/// rounded up to the nearest whole-track multiple.
fn install_or_resize_cache(driver: &Driver, bytes: usize) -> Result<()> {
    let mut cache_guard = driver.cache.lock().expect("cache lock poisoned");
    if bytes == 0 {
        *cache_guard = None;
        return Ok(());
    }
    if bytes < MIN_CACHE_BYTES {
        return Err(DriverError::NotSupported);
    }
    let rounded = bytes.div_ceil(MIN_CACHE_BYTES) * MIN_CACHE_BYTES;

    match cache_guard.as_ref() {
        Some(cache) => cache.resize(rounded),
        None => *cache_guard = Some(Arc::new(SharedCache::new(rounded))),
    }
    Ok(())
}

/// `get_unit_data(unit | ALL)`: `None` selects `ALL`.
pub fn get_unit_data(driver: &Driver, unit: Option<u32>) -> Result<Vec<UnitSnapshot>> {
    match unit {
        Some(n) => {
            let slot = driver.registry.peek(n).ok_or(DriverError::UnitNotFound)?;
            Ok(vec![snapshot_of(&slot.unit)])
        }
        None => Ok(driver
            .registry
            .iter_snapshot()
            .iter()
            .map(|slot| snapshot_of(&slot.unit))
            .collect()),
    }
}

fn snapshot_of(unit: &std::sync::Mutex<Unit>) -> UnitSnapshot {
    let unit = unit.lock().expect("unit lock poisoned");
    UnitSnapshot {
        number: unit.number,
        drive_type: unit.drive_type,
        active: !matches!(unit.state, UnitState::Stopped),
        loaded: unit.is_loaded(),
        busy: unit.busy,
        writable: !unit.write_protected,
        checksums_enabled: unit.checksums.is_some(),
        disk_checksum: unit.checksums.as_ref().map(|c| c.aggregate),
        volume: unit.fs_identity.as_ref().and_then(|id| id.volume.clone()),
        dos_type: unit.fs_identity.as_ref().map(|id| id.dos_type),
        boot_checksum: unit.fs_identity.as_ref().map(|id| id.boot_checksum),
        cache_stats: unit.is_loaded().then_some(crate::cache::CacheStats {
            hits: unit.cache.hits,
            misses: unit.cache.misses,
        }),
        image_path: unit.file.as_ref().map(|f| f.path.clone()),
        host_device_name: None,
    }
}

/// `examine_file_size(size_bytes) -> drive-type tag or "unsupported"`.
pub fn examine_file_size(size_bytes: u64) -> Result<DriveType> {
    DriveType::try_from(size_bytes).map_err(|_| DriverError::NotSupported)
}

// -- Per-request convenience wrappers, built on `dispatcher::submit` --------

pub fn read(driver: &Driver, unit: u32, offset: usize, length: usize) -> Result<Vec<u8>> {
    let reply = dispatcher::submit(&driver.registry, Request::new(unit, Command::Read).with_offset_len(offset, length))?;
    Ok(reply.data)
}

pub fn write(driver: &Driver, unit: u32, offset: usize, data: Vec<u8>) -> Result<usize> {
    let reply = dispatcher::submit(
        &driver.registry,
        Request::new(unit, Command::Write).with_offset_len(offset, data.len()).with_data(data),
    )?;
    Ok(reply.bytes_transferred)
}

pub fn format(driver: &Driver, unit: u32, offset: usize, pattern: Vec<u8>) -> Result<usize> {
    let reply = dispatcher::submit(
        &driver.registry,
        Request::new(unit, Command::Format).with_offset_len(offset, pattern.len()).with_data(pattern),
    )?;
    Ok(reply.bytes_transferred)
}

pub fn update(driver: &Driver, unit: u32) -> Result<()> {
    dispatcher::submit(&driver.registry, Request::new(unit, Command::Update)).map(|_| ())
}

/// `motor` command: `on = true` turns the motor on, `false` turns it off
/// (flushing first). Returns the previous motor state.
pub fn motor(driver: &Driver, unit: u32, on: bool) -> Result<bool> {
    let request = Request::new(unit, Command::Motor).with_offset_len(0, if on { 1 } else { 0 });
    let reply = dispatcher::submit(&driver.registry, request)?;
    Ok(reply.bytes_transferred != 0)
}

/// `get-geometry`: a queued (not immediate) command 's table, so
/// this goes through `dispatcher::submit` like read/write/format rather than
/// reading the unit directly.
pub fn get_geometry(driver: &Driver, unit: u32) -> Result<crate::geometry::Geometry> {
    let reply = dispatcher::submit(&driver.registry, Request::new(unit, Command::GetGeometry))?;
    let data = &reply.data;
    if data.len() < 6 {
        return Err(DriverError::NoMediumPresent);
    }
    let sectors_per_track = u16::from_ne_bytes([data[4], data[5]]);
    let drive_type = match sectors_per_track {
        11 => DriveType::Dd,
        22 => DriveType::Hd,
        _ => return Err(DriverError::NoMediumPresent),
    };
    Ok(drive_type.geometry())
}

/// `change-state`: `true` means a medium is present.
pub fn change_state(driver: &Driver, unit: u32) -> Result<bool> {
    let reply = dispatcher::submit(&driver.registry, Request::new(unit, Command::ChangeState))?;
    Ok(reply.bytes_transferred == 0)
}

pub fn change_count(driver: &Driver, unit: u32) -> Result<u64> {
    let reply = dispatcher::submit(&driver.registry, Request::new(unit, Command::ChangeCount))?;
    Ok(reply.bytes_transferred as u64)
}

pub fn protection_status(driver: &Driver, unit: u32) -> Result<bool> {
    let reply = dispatcher::submit(&driver.registry, Request::new(unit, Command::ProtectionStatus))?;
    Ok(reply.bytes_transferred != 0)
}

pub fn drive_type(driver: &Driver, unit: u32) -> Result<DriveType> {
    let reply = dispatcher::submit(&driver.registry, Request::new(unit, Command::DriveType))?;
    match reply.data.as_slice() {
        b"DD" => Ok(DriveType::Dd),
        b"HD" => Ok(DriveType::Hd),
        _ => Err(DriverError::NoMediumPresent),
    }
}

pub fn get_num_tracks(driver: &Driver, unit: u32) -> Result<u16> {
    let reply = dispatcher::submit(&driver.registry, Request::new(unit, Command::GetNumTracks))?;
    Ok(reply.bytes_transferred as u16)
}

/// Register a change-interrupt subscriber. Locks the unit directly rather
/// than going through the worker queue (see worker.rs's `AddChangeInterrupt`
/// arm for why); returns the subscription id `remove_change_interrupt` needs.
pub fn add_change_interrupt(driver: &Driver, unit: u32, callback: Arc<dyn Fn() + Send + Sync>) -> Result<usize> {
    let slot = driver.registry.peek(unit).ok_or(DriverError::UnitNotFound)?;
    let id = driver.next_subscription_id();
    slot.unit
        .lock()
        .expect("unit lock poisoned")
        .change_notify
        .add(ChangeSubscription::new(id, callback));
    Ok(id)
}

pub fn remove_change_interrupt(driver: &Driver, unit: u32, id: usize) -> Result<()> {
    let reply = dispatcher::submit(
        &driver.registry,
        Request::new(unit, Command::RemoveChangeInterrupt).with_offset_len(id, 0),
    )?;
    let _ = reply;
    Ok(())
}
