/*
    trackfile

    --------------------------------------------------------------------------

    src/unit.rs

    The mutable state of one unit, and the lifecycle enum it
    moves through. A `Unit` is the thing the per-unit lock protects;
    only the owning worker thread (worker.rs) ever opens or closes the backing
    file or touches the track buffer's contents. Immediate-dispatch commands
    and snapshotting read a `Unit` under the same lock without going through
    the worker at all.
*/

use crate::buffer::TrackBuffer;
use crate::change_notify::ChangeNotifyList;
use crate::checksum::fletcher64;
use crate::filesystem_identity::FilesystemIdentity;
use crate::geometry::{DriveType, Geometry};
use std::fs::File;
use std::path::PathBuf;

/// Lifecycle states a unit moves through: stopped, running with no medium,
/// running and loaded but idle, or running and actively doing I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Stopped,
    RunningEmpty,
    RunningLoadedIdle,
    RunningLoadedActive,
}

/// Per-track checksum table plus the derived disk-aggregate checksum, kept
/// only when the unit was started with `enable_checksums`.
#[derive(Debug, Clone, Default)]
pub struct ChecksumTable {
    pub per_track: Vec<(u32, u32)>,
    pub aggregate: (u32, u32),
}

impl ChecksumTable {
    pub fn recompute_aggregate(&mut self, file_size: u64) {
        self.aggregate = crate::checksum::aggregate_disk_checksum(&self.per_track, file_size);
    }
}

/// The backing image a unit has loaded, plus the bookkeeping the read/write
/// path needs to elide redundant seeks.
#[derive(Debug)]
pub struct BackingFile {
    pub path: PathBuf,
    pub handle: File,
    pub size: u64,
    /// Last byte position the worker left the file descriptor at, so a
    /// following request at the same offset can skip the seek (
    /// "seek elision").
    pub last_position: Option<u64>,
}

/// Optional cache-binding bookkeeping a unit carries while a shared cache is
/// installed and enabled for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheBinding {
    pub enabled: bool,
    pub prefill: bool,
    pub hits: u64,
    pub misses: u64,
}

/// The full mutable state of one unit. Lives behind a per-unit
/// `Mutex` the registry hands out by `Arc`; the worker owns writes to it,
/// immediate-dispatch reads take a coherent snapshot under the same lock.
#[derive(Debug)]
pub struct Unit {
    pub number: u32,
    pub state: UnitState,
    pub drive_type: Option<DriveType>,

    pub file: Option<BackingFile>,

    pub track_buffer: Option<TrackBuffer>,
    pub current_track: Option<usize>,
    pub dirty: bool,
    /// Fletcher-64 of the track buffer's contents at load time, used to
    /// detect a no-op write ( write path step 2).
    pub pre_modification_checksum: (u32, u32),

    pub write_protected: bool,
    pub motor_on: bool,
    pub change_count: u64,
    /// motor on OR a dirty buffer awaiting flush.
    pub busy: bool,

    pub change_notify: ChangeNotifyList,

    /// Requested at `start_unit` time ( `start_unit` tag
    /// `enable_checksums`); admission consults this, not an insert-time
    /// option, since checksumming is a per-unit configuration rather than a
    /// per-insert one.
    pub checksums_requested: bool,
    pub checksums: Option<ChecksumTable>,
    pub fs_identity: Option<FilesystemIdentity>,

    pub cache: CacheBinding,

    /// Count of filesystem requests the host has outstanding against this
    /// unit; eject is refused while nonzero unless the caller's timeout has
    /// elapsed. This crate has no real host filesystem to report this, so
    /// tests drive it directly through `Unit::set_pending_io`.
    pending_io: u32,
}

impl Unit {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            state: UnitState::Stopped,
            drive_type: None,
            file: None,
            track_buffer: None,
            current_track: None,
            dirty: false,
            pre_modification_checksum: (0, 0),
            write_protected: false,
            motor_on: false,
            change_count: 0,
            busy: false,
            change_notify: ChangeNotifyList::new(),
            checksums_requested: false,
            checksums: None,
            fs_identity: None,
            cache: CacheBinding::default(),
            pending_io: 0,
        }
    }

    pub fn geometry(&self) -> Option<Geometry> {
        self.drive_type.map(|dt| dt.geometry())
    }

    pub fn is_loaded(&self) -> bool {
        self.file.is_some()
    }

    pub fn recompute_busy(&mut self) {
        self.busy = self.motor_on || self.dirty;
    }

    pub fn set_pending_io(&mut self, count: u32) {
        self.pending_io = count;
    }

    pub fn pending_io(&self) -> u32 {
        self.pending_io
    }

    /// Fletcher-64 of the track buffer's current contents, for write-back
    /// comparison against `pre_modification_checksum`.
    pub fn buffer_checksum(&self) -> (u32, u32) {
        match &self.track_buffer {
            Some(buf) => fletcher64(buf.as_slice()),
            None => (0, 0),
        }
    }

    /// Invalidate the track buffer and reset current-track to the sentinel:
    /// while motor_on is false or no medium is loaded, the current track is
    /// unknown and the buffer is marked invalid.
    pub fn invalidate_buffer(&mut self) {
        self.current_track = None;
        self.dirty = false;
    }
}
