/*
    trackfile

    --------------------------------------------------------------------------

    src/error.rs

    A single error enum returned by every public entry point: the control-plane
    API and the per-request command path. Errors are first-class enum values,
    never exceptions.
*/

use thiserror::Error;

/// Result alias used throughout the driver.
pub type Result<T> = std::result::Result<T, DriverError>;

/// All error conditions a caller can observe, spanning the control-plane error
/// enumeration and the physical-floppy error names a real trackdisk.device
/// would return (kept distinct variants so legacy callers keying off specific
/// names still get them back).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    // -- Control-plane / admission errors --------------------------------
    #[error("unit is busy (motor on or dirty buffer pending flush)")]
    UnitBusy,
    #[error("out of memory")]
    OutOfMemory,
    #[error("no unit exists with that number")]
    UnitNotFound,
    #[error("unit already has media loaded")]
    AlreadyInUse,
    #[error("unit's worker is not running")]
    UnitNotActive,
    #[error("the backing file could not be opened or is not a regular file")]
    InvalidFile,
    #[error("the backing file's size does not match a supported geometry")]
    InvalidFileSize,
    #[error("insert_media was called without a file name or handle")]
    NoFileGiven,
    #[error("the request was aborted before it completed")]
    Aborted,
    #[error("the worker process failed to start")]
    ProcessFailed,
    #[error("no medium is present in the unit")]
    NoMediumPresent,
    #[error("the volume backing this unit is read-only")]
    ReadOnlyVolume,
    #[error("the backing file is read-only")]
    ReadOnlyFile,
    #[error("this disk's content matches another currently loaded unit")]
    DuplicateDisk,
    #[error("this disk's volume identity matches a live, actively-used volume")]
    DuplicateVolume,
    #[error("the requested drive type is not DD or HD")]
    InvalidDriveType,
    #[error("the operation was denied")]
    Denied,
    #[error("the requested feature is not supported in this configuration")]
    NotSupported,

    // -- Generic I/O errors -----------------------------------------------
    #[error("failed to open the backing file")]
    OpenFail,
    #[error("unrecognized command code")]
    NoCmd,
    #[error("offset or length was not a multiple of the sector size")]
    BadLength,
    #[error("data pointer was not aligned as required")]
    BadAddress,
    #[error("self-test failed")]
    SelfTest,
    #[error("an I/O error occurred: {0}")]
    Io(String),

    // -- Physical-floppy-compatible error names ----------------------------
    #[error("unspecified drive error")]
    NotSpecified,
    #[error("no sector header found")]
    NoSecHdr,
    #[error("bad sector preamble")]
    BadSecPreamble,
    #[error("bad sector ID")]
    BadSecID,
    #[error("bad sector header checksum")]
    BadHdrSum,
    #[error("bad sector data checksum")]
    BadSecSum,
    #[error("too few sectors found on track")]
    TooFewSecs,
    #[error("malformed sector header")]
    BadSecHdr,
    #[error("medium is write-protected")]
    WriteProt,
    #[error("medium changed unexpectedly")]
    DiskChanged,
    #[error("seek failed")]
    SeekError,
    #[error("no memory available for the track buffer")]
    NoMem,
    #[error("unit number out of range")]
    BadUnitNum,
    #[error("drive type mismatch")]
    BadDriveType,
    #[error("drive is in use")]
    DriveInUse,
    #[error("eject was cancelled by a user break signal")]
    Break,
    #[error("operation attempted immediately after a reset")]
    PostReset,
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        DriverError::Io(err.to_string())
    }
}

impl From<binrw::Error> for DriverError {
    fn from(err: binrw::Error) -> Self {
        DriverError::Io(err.to_string())
    }
}
