/*
    trackfile

    --------------------------------------------------------------------------

    src/snapshot.rs

    `get_unit_data` returns an immutable, owned list of per-unit
    records. Optional `serde::Serialize` support sits behind a feature flag
    (`#[cfg_attr(feature = "serde", derive(serde::Serialize))]`); reporting a
    driver's live state is an ambient convenience layered on top of the core
    records.
*/

use crate::cache::CacheStats;
use crate::filesystem_identity::{DosType, VolumeIdentity};
use crate::geometry::DriveType;
use std::path::PathBuf;

/// One unit's worth of reportable state, copied out from behind the
/// per-unit lock just long enough to build this record (
/// "Snapshot acquires device lock and each per-unit lock only long enough
/// to copy").
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UnitSnapshot {
    pub number: u32,
    pub drive_type: Option<DriveType>,
    pub active: bool,
    pub loaded: bool,
    pub busy: bool,
    pub writable: bool,
    pub checksums_enabled: bool,
    pub disk_checksum: Option<(u32, u32)>,
    pub volume: Option<VolumeIdentity>,
    pub dos_type: Option<DosType>,
    pub boot_checksum: Option<u32>,
    pub cache_stats: Option<CacheStats>,
    /// Resolved path to the backing image file, best-effort: absent if no
    /// medium is loaded.
    pub image_path: Option<PathBuf>,
    /// Best-effort host-filesystem device name the image resides on. This
    /// crate has no host filesystem to query, so this is always `None`; the
    /// field may legitimately be absent if the backing filesystem does not
    /// support reverse-lookup -- `None` is a valid answer here, not a TODO.
    pub host_device_name: Option<String>,
}

impl std::fmt::Display for UnitSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unit {}: {}{}",
            self.number,
            self.drive_type.map(|d| d.to_string()).unwrap_or_else(|| "--".into()),
            if self.loaded { " [loaded]" } else { " [empty]" }
        )
    }
}
