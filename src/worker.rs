/*
    trackfile

    --------------------------------------------------------------------------

    src/worker.rs

    One worker thread per running unit. The worker is the only
    party that opens/closes the backing file or touches the track buffer's
    contents; everything else (immediate-dispatch commands, snapshotting)
    only ever reads a `Unit` under its per-unit lock. Command delivery and
    the control-plane sideband channel are `crossbeam_channel`, used here to
    move background-thread results back to the calling thread.
*/

use crate::admission::{self, InsertMediaOptions};
use crate::buffer::TrackBuffer;
use crate::cache::SharedCache;
use crate::checksum::fletcher64;
use crate::eject;
use crate::error::{DriverError, Result};
use crate::registry::UnitRegistry;
use crate::request::{Command, Reply, Request};
use crate::unit::Unit;
use crossbeam_channel::{after, select, unbounded, Receiver, Sender};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long a loaded-and-idle unit stays with the motor on before an
/// automatic flush-and-motor-off (2.5 seconds).
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(2500);

pub struct QueuedJob {
    pub request: Request,
    pub reply: Sender<Result<Reply>>,
}

pub enum ControlJob {
    Insert {
        options: InsertMediaOptions,
        reply: Sender<Result<()>>,
    },
    Eject {
        reply: Sender<Result<()>>,
    },
    Stop {
        reply: Sender<Result<()>>,
    },
    SetWriteProtected {
        value: bool,
        reply: Sender<Result<()>>,
    },
    SetCacheEnabled {
        value: bool,
        reply: Sender<Result<()>>,
    },
}

/// What the registry keeps for a running unit's worker: the two channels
/// clients and the control plane submit work through, and the thread handle.
pub struct WorkerHandle {
    pub queue_tx: Sender<QueuedJob>,
    pub control_tx: Sender<ControlJob>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn join(&mut self) {
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the worker thread for `number`, 's `start_unit`
/// transition (stopped -> running/empty).
pub fn spawn(
    number: u32,
    unit: Arc<Mutex<Unit>>,
    registry: Arc<UnitRegistry>,
    cache: Arc<Mutex<Option<Arc<SharedCache>>>>,
) -> WorkerHandle {
    let (queue_tx, queue_rx) = unbounded::<QueuedJob>();
    let (control_tx, control_rx) = unbounded::<ControlJob>();

    let join = std::thread::spawn(move || run(number, unit, registry, cache, queue_rx, control_rx));

    WorkerHandle {
        queue_tx,
        control_tx,
        join: Some(join),
    }
}

fn run(
    number: u32,
    unit: Arc<Mutex<Unit>>,
    registry: Arc<UnitRegistry>,
    cache: Arc<Mutex<Option<Arc<SharedCache>>>>,
    queue_rx: Receiver<QueuedJob>,
    control_rx: Receiver<ControlJob>,
) {
    log::debug!("unit {number}: worker started");
    loop {
        let current_cache = cache.lock().expect("cache lock poisoned").clone();
        let idle_deadline = {
            let unit_guard = unit.lock().expect("unit lock poisoned");
            if unit_guard.motor_on {
                after(IDLE_TIMEOUT)
            } else {
                // No motor timeout pending; block indefinitely on a channel
                // that never fires.
                crossbeam_channel::never()
            }
        };

        select! {
            recv(control_rx) -> job => {
                match job {
                    Ok(job) => {
                        if handle_control(number, &unit, &registry, current_cache.as_deref(), job) {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            recv(queue_rx) -> job => {
                match job {
                    Ok(job) => handle_request(number, &unit, current_cache.as_deref(), job),
                    Err(_) => break,
                }
            }
            recv(idle_deadline) -> _ => {
                let mut unit_guard = unit.lock().expect("unit lock poisoned");
                if unit_guard.motor_on {
                    log::debug!("unit {number}: idle timeout, flushing and stopping motor");
                    let _ = flush_dirty_buffer(&mut unit_guard);
                    unit_guard.motor_on = false;
                    unit_guard.invalidate_buffer();
                    unit_guard.recompute_busy();
                }
            }
        }
    }
    log::debug!("unit {number}: worker stopped");
}

/// Returns `true` when the worker loop should exit (a `Stop` control job
/// succeeded).
fn handle_control(
    number: u32,
    unit: &Arc<Mutex<Unit>>,
    registry: &Arc<UnitRegistry>,
    cache: Option<&SharedCache>,
    job: ControlJob,
) -> bool {
    match job {
        ControlJob::Insert { options, reply } => {
            let mut unit_guard = unit.lock().expect("unit lock poisoned");
            let result = admission::admit(number, &mut unit_guard, &options, registry, cache);
            drop(unit_guard);
            let notify = result.is_ok();
            let _ = reply.send(result);
            if notify {
                unit.lock().expect("unit lock poisoned").change_notify.fire_all();
            }
            false
        }
        ControlJob::Eject { reply } => {
            let mut unit_guard = unit.lock().expect("unit lock poisoned");
            let result = eject::attempt_eject(number, &mut unit_guard, cache);
            drop(unit_guard);
            let _ = reply.send(result);
            false
        }
        ControlJob::Stop { reply } => {
            let loaded = unit.lock().expect("unit lock poisoned").is_loaded();
            if loaded {
                let _ = reply.send(Err(DriverError::UnitBusy));
                false
            } else {
                let _ = reply.send(Ok(()));
                true
            }
        }
        ControlJob::SetWriteProtected { value, reply } => {
            let mut unit_guard = unit.lock().expect("unit lock poisoned");
            if !unit_guard.is_loaded() {
                let _ = reply.send(Err(DriverError::NoMediumPresent));
                return false;
            }
            if !value {
                // Requesting writable: rejected if the backing file itself
                // can't be opened for writing.
                if let Some(file) = &unit_guard.file {
                    let writable = std::fs::OpenOptions::new().write(true).open(&file.path).is_ok();
                    if !writable {
                        let _ = reply.send(Err(DriverError::ReadOnlyFile));
                        return false;
                    }
                }
            }
            let changed = unit_guard.write_protected != value;
            unit_guard.write_protected = value;
            // A write-protect-only change still fires change-notifications.
            if changed {
                unit_guard.change_notify.fire_all();
            }
            let _ = reply.send(Ok(()));
            false
        }
        ControlJob::SetCacheEnabled { value, reply } => {
            let mut unit_guard = unit.lock().expect("unit lock poisoned");
            let hd = matches!(unit_guard.drive_type, Some(crate::geometry::DriveType::Hd));
            // Enabling the cache on a per-unit basis is silently ignored
            // for HD geometry.
            if !hd {
                unit_guard.cache.enabled = value;
            }
            let _ = reply.send(Ok(()));
            false
        }
    }
}

fn handle_request(number: u32, unit: &Arc<Mutex<Unit>>, cache: Option<&SharedCache>, job: QueuedJob) {
    let mut unit_guard = unit.lock().expect("unit lock poisoned");
    let result = process_request(number, &mut unit_guard, cache, &job.request);
    drop(unit_guard);
    let _ = job.reply.send(result);
}

/// Dispatch one queued (non-immediate) request against a locked unit:
/// read/write/format/motor/seek/update/eject/add-change-interrupt/
/// get-geometry/stop semantics.
pub fn process_request(
    number: u32,
    unit: &mut Unit,
    cache: Option<&SharedCache>,
    request: &Request,
) -> Result<Reply> {
    match request.command {
        Command::Read => read_path(number, unit, cache, request.offset, request.length),
        Command::Write => write_path(number, unit, cache, request.offset, &request.data, false),
        Command::Format => write_path(number, unit, cache, request.offset, &request.data, true),
        Command::Update => {
            flush_dirty_buffer(unit)?;
            Ok(Reply::default())
        }
        Command::Motor => {
            let was_on = unit.motor_on;
            if request.length == 0 {
                flush_dirty_buffer(unit)?;
                unit.motor_on = false;
                unit.invalidate_buffer();
            } else {
                unit.motor_on = true;
            }
            unit.recompute_busy();
            Ok(Reply {
                bytes_transferred: was_on as usize,
                data: Vec::new(),
            })
        }
        Command::Seek => {
            if request.offset % crate::geometry::SECTOR_SIZE != 0 {
                return Err(DriverError::BadLength);
            }
            if let Some(file) = &mut unit.file {
                file.last_position = Some(request.offset as u64);
            }
            Ok(Reply::default())
        }
        Command::GetGeometry => {
            let geometry = unit.geometry().ok_or(DriverError::NoMediumPresent)?;
            Ok(Reply {
                bytes_transferred: 0,
                data: encode_geometry(&geometry),
            })
        }
        Command::AddChangeInterrupt => {
            // Real registration happens in control.rs's `add_change_interrupt`,
            // which locks the unit directly rather than round-tripping the
            // worker queue: this request never replies, and an
            // enqueued job that never completes has no honest translation onto
            // a channel that a caller blocks on for a `Reply`.
            Err(DriverError::NotSupported)
        }
        Command::Stop => Err(DriverError::NotSupported),
        _ => Err(DriverError::NoCmd),
    }
}

fn encode_geometry(geometry: &crate::geometry::Geometry) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&(geometry.cylinders()).to_ne_bytes());
    out.push(geometry.heads());
    out.push(0);
    out.extend_from_slice(&(geometry.sectors_per_track()).to_ne_bytes());
    out
}

/// The sector-aligned read path.
fn read_path(
    number: u32,
    unit: &mut Unit,
    cache: Option<&SharedCache>,
    offset: usize,
    length: usize,
) -> Result<Reply> {
    let geometry = unit.geometry().ok_or(DriverError::NoMediumPresent)?;
    geometry.validate_request(offset, length)?;

    unit.motor_on = true;
    unit.recompute_busy();

    let mut out = vec![0u8; length];
    let mut remaining = length;
    let mut cursor = offset;
    let mut written = 0usize;

    while remaining > 0 {
        let (track, track_offset) = geometry.offset_to_track(cursor);
        let chunk_len = remaining.min(geometry.track_len() - track_offset);

        if let Some(cache) = cache.filter(|_| unit.cache.enabled) {
            if let Some(bytes) = cache.lookup(number, track) {
                out[written..written + chunk_len].copy_from_slice(&bytes[track_offset..track_offset + chunk_len]);
                unit.cache.hits += 1;
                remaining -= chunk_len;
                cursor += chunk_len;
                written += chunk_len;
                continue;
            }
            unit.cache.misses += 1;
        }

        ensure_track_loaded(unit, track)?;
        let buf = unit.track_buffer.as_ref().expect("track just loaded");
        out[written..written + chunk_len].copy_from_slice(&buf.as_slice()[track_offset..track_offset + chunk_len]);

        if let Some(cache) = cache.filter(|_| unit.cache.enabled) {
            cache.update(number, track, buf.as_slice(), true);
        }

        remaining -= chunk_len;
        cursor += chunk_len;
        written += chunk_len;
    }

    if let Some(file) = &mut unit.file {
        file.last_position = Some((offset + length) as u64);
    }

    Ok(Reply {
        bytes_transferred: length,
        data: out,
    })
}

/// The sector-aligned write/format path. `whole_track_only` selects
/// the format semantics (tolerates any sector pattern, still whole-track).
fn write_path(
    number: u32,
    unit: &mut Unit,
    cache: Option<&SharedCache>,
    offset: usize,
    data: &[u8],
    whole_track_only: bool,
) -> Result<Reply> {
    let geometry = unit.geometry().ok_or(DriverError::NoMediumPresent)?;
    geometry.validate_request(offset, data.len())?;
    if unit.write_protected {
        return Err(DriverError::WriteProt);
    }

    unit.motor_on = true;
    unit.recompute_busy();

    let mut remaining = data.len();
    let mut cursor = offset;
    let mut consumed = 0usize;

    while remaining > 0 {
        let (track, track_offset) = geometry.offset_to_track(cursor);
        let chunk_len = remaining.min(geometry.track_len() - track_offset);
        let full_track_write = track_offset == 0 && chunk_len == geometry.track_len();

        if whole_track_only && !full_track_write {
            return Err(DriverError::BadLength);
        }

        let skipped_pre_read = full_track_write && unit.current_track != Some(track);

        if !full_track_write {
            ensure_track_loaded(unit, track)?;
        } else if skipped_pre_read {
            flush_dirty_buffer(unit)?;
            unit.track_buffer = Some(TrackBuffer::new(geometry.track_len()));
            unit.current_track = Some(track);
        }

        let buf = unit.track_buffer.as_mut().expect("track just loaded");
        buf.overlay(track_offset, &data[consumed..consumed + chunk_len]);

        let new_checksum = fletcher64(buf.as_slice());
        // A full-track write/format with no pre-read has no honest baseline to
        // compare against -- the buffer was never loaded from disk, so treating
        // an all-zero payload as "unchanged" would silently skip a write-back
        // against whatever non-zero content the backing file actually holds.
        if skipped_pre_read || new_checksum != unit.pre_modification_checksum {
            unit.dirty = true;
            if let Some(table) = &mut unit.checksums {
                if let Some(entry) = table.per_track.get_mut(track) {
                    *entry = new_checksum;
                }
                let file_size = unit.file.as_ref().map(|f| f.size).unwrap_or(0);
                table.recompute_aggregate(file_size);
            }
            unit.recompute_busy();

            match write_track_back(unit, track) {
                Ok(()) => {
                    unit.pre_modification_checksum = new_checksum;
                    unit.dirty = false;
                    unit.recompute_busy();
                    if let Some(cache) = cache.filter(|_| unit.cache.enabled) {
                        let bytes = unit.track_buffer.as_ref().unwrap().as_slice().to_vec();
                        cache.update(number, track, &bytes, false);
                    }
                }
                Err(e) => {
                    if let Some(cache) = cache.filter(|_| unit.cache.enabled) {
                        cache.invalidate_one(number, track);
                    }
                    unit.invalidate_buffer();
                    return Err(e);
                }
            }
        }

        remaining -= chunk_len;
        cursor += chunk_len;
        consumed += chunk_len;
    }

    if let Some(file) = &mut unit.file {
        file.last_position = Some((offset + data.len()) as u64);
    }

    Ok(Reply {
        bytes_transferred: data.len(),
        data: Vec::new(),
    })
}

/// Ensure `unit.track_buffer` holds `track`'s current contents, flushing and
/// reloading as needed.
fn ensure_track_loaded(unit: &mut Unit, track: usize) -> Result<()> {
    if unit.current_track == Some(track) && unit.track_buffer.is_some() {
        return Ok(());
    }
    flush_dirty_buffer(unit)?;

    let geometry = unit.geometry().ok_or(DriverError::NoMediumPresent)?;
    let track_len = geometry.track_len();
    let byte_offset = (track * track_len) as u64;

    let file = unit.file.as_mut().ok_or(DriverError::NoMediumPresent)?;
    if file.last_position != Some(byte_offset) {
        file.handle.seek(SeekFrom::Start(byte_offset)).map_err(|_| DriverError::SeekError)?;
    }

    let mut buf = TrackBuffer::new(track_len);
    file.handle
        .read_exact(buf.as_mut_slice())
        .map_err(|_| DriverError::TooFewSecs)?;
    file.last_position = Some(byte_offset + track_len as u64);

    unit.pre_modification_checksum = fletcher64(buf.as_slice());
    unit.track_buffer = Some(buf);
    unit.current_track = Some(track);
    unit.dirty = false;
    unit.recompute_busy();
    Ok(())
}

/// Write the currently-held track buffer back to its position in the backing
/// file, unconditionally (the caller has already decided a write-back is
/// needed).
fn write_track_back(unit: &mut Unit, track: usize) -> Result<()> {
    let geometry = unit.geometry().ok_or(DriverError::NoMediumPresent)?;
    let track_len = geometry.track_len();
    let byte_offset = (track * track_len) as u64;

    let buf_bytes = unit.track_buffer.as_ref().expect("track buffer present").as_slice().to_vec();
    let file = unit.file.as_mut().ok_or(DriverError::NoMediumPresent)?;
    if file.last_position != Some(byte_offset) {
        file.handle.seek(SeekFrom::Start(byte_offset)).map_err(|_| DriverError::SeekError)?;
    }
    file.handle.write_all(&buf_bytes).map_err(|e| DriverError::Io(e.to_string()))?;
    file.last_position = Some(byte_offset + track_len as u64);
    Ok(())
}

/// Flush the held track buffer if dirty. Called from the idle timer, from
/// `update`, and from `eject.rs`'s single-attempt primitive.
pub fn flush_dirty_buffer(unit: &mut Unit) -> Result<()> {
    if !unit.dirty {
        return Ok(());
    }
    let track = unit.current_track.ok_or(DriverError::NotSpecified)?;
    write_track_back(unit, track)?;
    unit.dirty = false;
    unit.recompute_busy();
    Ok(())
}
