/*
    trackfile

    --------------------------------------------------------------------------

    src/lib.rs

    A virtual multi-unit Amiga-compatible floppy drive driver. The crate
    presents a collection of emulated "units", each loadable with a flat DD
    (880 KiB) or HD (1760 KiB) disk-image file, and exposes the same
    sector-oriented command surface a real trackdisk.device would: per-unit
    state machines driven by one worker thread each, a shared unit registry,
    a per-track buffered I/O path, media-insertion admission checks, an
    optional shared read cache, and the medium-eject/write-protect change
    protocol.

    What this crate is not: a raw-flux/MFM encoder, a general block-device
    abstraction, a host filesystem, or a command-line control utility -- those
    are external collaborators this crate only exposes interfaces to.
    Boot-block "install" and filesystem "format" of a newly created image
    are the host filesystem's job; this crate exposes only the sector-level
    `format` primitive they would use to do it.
*/

pub mod admission;
pub mod buffer;
pub mod cache;
pub mod change_notify;
pub mod checksum;
pub mod control;
pub mod dispatcher;
pub mod driver;
pub mod eject;
pub mod error;
pub mod filesystem_identity;
pub mod geometry;
pub mod registry;
pub mod request;
pub mod snapshot;
pub mod unit;
pub mod worker;

pub use admission::InsertMediaOptions;
pub use control::{ChangeUnitFailure, ChangeUnitTag, StartUnitOptions};
pub use driver::{Driver, CONTROL};
pub use error::{DriverError, Result};
pub use geometry::{DriveType, Geometry, SECTOR_SIZE};
pub use request::{Command, Reply, Request};
pub use snapshot::UnitSnapshot;
