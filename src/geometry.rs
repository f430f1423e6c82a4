/*
    trackfile

    --------------------------------------------------------------------------

    src/geometry.rs

    The two fixed Amiga floppy geometries (DD, HD) and the byte-offset
    arithmetic used throughout the I/O path. Unlike a general CHS address
    space, exactly two geometries are supported, so this module uses a
    closed two-variant enum plus a `Geometry` descriptor rather than an
    open-ended format table.
*/

use crate::error::{DriverError, Result};
use std::fmt::{self, Display, Formatter};

pub const SECTOR_SIZE: usize = 512;
pub const CYLINDERS: u16 = 80;
pub const HEADS: u8 = 2;

/// The two disk types a unit can be loaded with.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DriveType {
    /// Double density: 80 cylinders * 2 heads * 11 sectors * 512 bytes = 880 KiB.
    Dd,
    /// High density: 80 cylinders * 2 heads * 22 sectors * 512 bytes = 1760 KiB.
    Hd,
}

impl Display for DriveType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DriveType::Dd => write!(f, "DD"),
            DriveType::Hd => write!(f, "HD"),
        }
    }
}

impl DriveType {
    pub fn geometry(&self) -> Geometry {
        match self {
            DriveType::Dd => Geometry::new(*self, CYLINDERS, HEADS, 11),
            DriveType::Hd => Geometry::new(*self, CYLINDERS, HEADS, 22),
        }
    }
}

/// A fully resolved disk geometry: cylinders, heads, sectors/track, and the
/// derived track and image sizes.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Geometry {
    drive_type: DriveType,
    cylinders: u16,
    heads: u8,
    sectors_per_track: u16,
}

impl Geometry {
    fn new(drive_type: DriveType, cylinders: u16, heads: u8, sectors_per_track: u16) -> Self {
        Self {
            drive_type,
            cylinders,
            heads,
            sectors_per_track,
        }
    }

    pub fn drive_type(&self) -> DriveType {
        self.drive_type
    }
    pub fn cylinders(&self) -> u16 {
        self.cylinders
    }
    pub fn heads(&self) -> u8 {
        self.heads
    }
    pub fn sectors_per_track(&self) -> u16 {
        self.sectors_per_track
    }

    /// Number of tracks on the disk (cylinders * heads).
    pub fn num_tracks(&self) -> u32 {
        self.cylinders as u32 * self.heads as u32
    }

    /// Bytes in one track: heads_per_track_unit is implicit, a "track" here is
    /// one (cylinder, head) ring, per the GLOSSARY.
    pub fn track_len(&self) -> usize {
        self.sectors_per_track as usize * SECTOR_SIZE
    }

    /// Total image size in bytes.
    pub fn image_len(&self) -> usize {
        self.num_tracks() as usize * self.track_len()
    }

    /// `(cyl, head, sec) -> offset = ((cyl*2 + head)*sectors + sec)*512`.
    pub fn chs_to_offset(&self, cylinder: u16, head: u8, sector: u16) -> usize {
        (((cylinder as usize * self.heads as usize) + head as usize) * self.sectors_per_track as usize
            + sector as usize)
            * SECTOR_SIZE
    }

    /// Inverse of `chs_to_offset`: resolve a byte offset to its containing
    /// track index and the remaining intra-track byte offset.
    pub fn offset_to_track(&self, offset: usize) -> (usize, usize) {
        (offset / self.track_len(), offset % self.track_len())
    }

    /// Validate that `offset`/`length` are sector-aligned and fit within
    /// this geometry's image size.
    pub fn validate_request(&self, offset: usize, length: usize) -> Result<()> {
        if offset % SECTOR_SIZE != 0 || length % SECTOR_SIZE != 0 {
            return Err(DriverError::BadLength);
        }
        let end = match offset.checked_add(length) {
            Some(end) => end,
            None => return Err(DriverError::BadAddress),
        };
        if end > self.image_len() {
            return Err(DriverError::BadAddress);
        }
        Ok(())
    }
}

impl TryFrom<u64> for DriveType {
    type Error = DriverError;

    /// Resolve a file size to the drive type it must represent: only
    /// exactly 901120 or 1802240 bytes are admitted.
    fn try_from(size: u64) -> Result<Self> {
        match size {
            901_120 => Ok(DriveType::Dd),
            1_802_240 => Ok(DriveType::Hd),
            _ => Err(DriverError::InvalidFileSize),
        }
    }
}
