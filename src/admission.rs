/*
    trackfile

    --------------------------------------------------------------------------

    src/admission.rs

    The media admission pipeline run when a unit transitions
    running/empty -> running/loaded/idle. Pure with respect to its own unit's
    fields (the caller -- worker.rs -- holds the per-unit lock for the whole
    call) but reaches across to sibling units through `UnitRegistry` for the
    duplicate-volume and duplicate-disk comparisons (steps 7 and 9).
*/

use crate::cache::SharedCache;
use crate::checksum::{aggregate_disk_checksum, fletcher64};
use crate::error::{DriverError, Result};
use crate::filesystem_identity::{self, BOOTSECTS, BLOCK_SIZE, FilesystemIdentity};
use crate::geometry::DriveType;
use crate::registry::UnitRegistry;
use crate::unit::{BackingFile, CacheBinding, ChecksumTable, Unit, UnitState};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

/// Options accompanying `insert_media`, standing in for the ordered
/// tag list (`image_file_name`, `write_protected`, `enable_unit_cache`,
/// `prefill_unit_cache`).
#[derive(Debug, Clone, Default)]
pub struct InsertMediaOptions {
    pub image_file_name: Option<PathBuf>,
    pub write_protected: bool,
    pub enable_unit_cache: bool,
    pub prefill_unit_cache: bool,
}

/// Run the full admission pipeline against `unit`, which must already be
/// `RunningEmpty` (checked by the caller; that precondition belongs to the
/// caller's state machine, not this function).
pub fn admit(
    number: u32,
    unit: &mut Unit,
    options: &InsertMediaOptions,
    registry: &UnitRegistry,
    cache: Option<&SharedCache>,
) -> Result<()> {
    // Step 2: resolve the file (this crate only supports a supplied name;
    // there is no host-side file-handle abstraction to hand in instead).
    let path = options.image_file_name.clone().ok_or(DriverError::NoFileGiven)?;

    let mut handle = OpenOptions::new()
        .read(true)
        .write(!options.write_protected)
        .open(&path)
        .map_err(|_| DriverError::InvalidFile)?;

    let metadata = handle.metadata().map_err(DriverError::from)?;
    let size = metadata.len();

    // Step 3: size check.
    let drive_type = DriveType::try_from(size)?;
    let geometry = drive_type.geometry();

    // If `start_unit` declared an expected drive type, the detected geometry
    // must agree with it -- a DD-declared unit cannot swallow an HD image.
    if let Some(declared) = unit.drive_type {
        if declared != drive_type {
            return Err(DriverError::InvalidDriveType);
        }
    }

    // Step 4: write-protect forcing. This crate has no host volume state to
    // consult, so the only forcing rule it can apply is "the backing file
    // itself is not writable", surfaced through the open-for-write attempt
    // above (a read-only file still opens fine read-only).
    let file_writable = OpenOptions::new().write(true).open(&path).is_ok();
    let write_protected = options.write_protected || !file_writable;

    // Step 5: read the reserved blocks and record DOS-type + boot checksum.
    let mut reserved = vec![0u8; BOOTSECTS * BLOCK_SIZE];
    handle.seek(SeekFrom::Start(0)).map_err(DriverError::from)?;
    handle.read_exact(&mut reserved).map_err(|_| DriverError::NoSecHdr)?;
    let (dos_type, boot_checksum) = filesystem_identity::read_boot_identity(&reserved);

    // Step 6: validate the Amiga root block, if this looks like a default
    // filesystem image.
    let mut volume = None;
    if dos_type.is_amiga_dos() {
        let total_blocks = geometry.num_tracks() as usize * geometry.sectors_per_track() as usize;
        let root_offset = filesystem_identity::root_block_offset(total_blocks, BOOTSECTS);
        let mut root_block = [0u8; BLOCK_SIZE];
        handle
            .seek(SeekFrom::Start(root_offset as u64))
            .map_err(DriverError::from)?;
        if handle.read_exact(&mut root_block).is_ok() {
            volume = filesystem_identity::parse_root_block(&root_block);
        }
    }

    // Step 7: volume-collision probe against every other loaded unit.
    if let Some(candidate) = &volume {
        let mut collision = false;
        registry.for_each_other_unit(number, |_, other| {
            if !collision && other.is_loaded() {
                if let Some(other_identity) = &other.fs_identity {
                    if let Some(other_volume) = &other_identity.volume {
                        if other_volume == candidate {
                            collision = true;
                        }
                    }
                }
            }
        });
        if collision {
            return Err(DriverError::DuplicateVolume);
        }
    }

    // Step 8: optional per-track checksumming.
    let mut checksums = None;
    if unit.checksums_requested {
        let mut table = ChecksumTable {
            per_track: Vec::with_capacity(geometry.num_tracks() as usize),
            aggregate: (0, 0),
        };
        let mut track_buf = vec![0u8; geometry.track_len()];
        handle.seek(SeekFrom::Start(0)).map_err(DriverError::from)?;
        for _ in 0..geometry.num_tracks() {
            handle.read_exact(&mut track_buf).map_err(|_| DriverError::TooFewSecs)?;
            table.per_track.push(fletcher64(&track_buf));
        }
        table.aggregate = aggregate_disk_checksum(&table.per_track, size);
        checksums = Some(table);
    }

    // Step 9: duplicate-disk comparison against every other loaded unit, pair
    // by pair -- use the checksum comparison only when both sides have a
    // checksum table, falling back to the same-underlying-file test
    // otherwise, independent of whether this unit itself has checksums.
    let canonical = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
    let mut duplicate = false;
    registry.for_each_other_unit(number, |_, other| {
        if duplicate || !other.is_loaded() {
            return;
        }
        let is_duplicate = match (&checksums, &other.checksums) {
            (Some(table), Some(other_table)) => other_table.aggregate == table.aggregate,
            _ => match &other.file {
                Some(other_file) => {
                    let other_canonical = std::fs::canonicalize(&other_file.path)
                        .unwrap_or_else(|_| other_file.path.clone());
                    other_canonical == canonical
                }
                None => false,
            },
        };
        if is_duplicate {
            duplicate = true;
        }
    });
    if duplicate {
        return Err(DriverError::DuplicateDisk);
    }

    // Step 10: bind, clear buffer, bump change_count, transition, prefill.
    unit.drive_type = Some(drive_type);
    unit.file = Some(BackingFile {
        path: path.clone(),
        handle,
        size,
        last_position: None,
    });
    unit.invalidate_buffer();
    unit.track_buffer = None;
    unit.write_protected = write_protected;
    unit.change_count = unit.change_count.wrapping_add(1);
    unit.fs_identity = Some(FilesystemIdentity {
        dos_type,
        boot_checksum,
        volume,
    });
    unit.checksums = checksums;
    unit.cache = CacheBinding {
        enabled: options.enable_unit_cache && matches!(drive_type, DriveType::Dd),
        prefill: options.prefill_unit_cache,
        hits: 0,
        misses: 0,
    };
    unit.state = UnitState::RunningLoadedIdle;
    unit.recompute_busy();

    if unit.cache.enabled && unit.cache.prefill {
        if let Some(cache) = cache {
            prefill_cache(number, unit, cache);
        }
    }

    Ok(())
}

fn prefill_cache(number: u32, unit: &mut Unit, cache: &SharedCache) {
    let Some(file) = &mut unit.file else { return };
    let Some(geometry) = unit.drive_type.map(|dt| dt.geometry()) else { return };
    let track_len = geometry.track_len();
    let mut buf = vec![0u8; track_len];
    if file.handle.seek(SeekFrom::Start(0)).is_err() {
        return;
    }
    for track in 0..geometry.num_tracks() as usize {
        if file.handle.read_exact(&mut buf).is_err() {
            break;
        }
        cache.update(number, track, &buf, true);
    }
    file.last_position = None;
}
