/*
    trackfile

    --------------------------------------------------------------------------

    src/request.rs

    The uniform work item exchanged between clients, the dispatcher, and
    per-unit workers.
*/

use bitflags::bitflags;
use strum::{Display, EnumIter};

bitflags! {
    /// Bit flags carried on a [`Request`]. `QUICK` marks a request the caller
    /// wants handled without queuing if at all possible (the "immediate
    /// vs queued dispatch"); callers set it but the dispatcher is the
    /// authority on which commands actually qualify.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestFlags: u32 {
        const QUICK = 0b0000_0001;
    }
}

/// The per-request command set. Binary codes are intentionally not
/// modeled; only the semantics this driver fixes are.
#[derive(Debug, Display, EnumIter, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Read,
    Write,
    Format,
    Update,
    Motor,
    Seek,
    Eject,
    ChangeState,
    ChangeCount,
    ProtectionStatus,
    DriveType,
    GetNumTracks,
    GetGeometry,
    AddChangeInterrupt,
    RemoveChangeInterrupt,
    Start,
    Stop,
}

impl Command {
    /// Only geometry, change-state, change-count, drive-type,
    /// remove-change-interrupt, and start fast-path commands are executed on
    /// the caller's thread without entering the worker's queue.
    pub fn is_immediate(&self) -> bool {
        matches!(
            self,
            Command::ChangeState
                | Command::ChangeCount
                | Command::ProtectionStatus
                | Command::DriveType
                | Command::GetNumTracks
                | Command::RemoveChangeInterrupt
                | Command::Start
        )
    }
}

/// The uniform work item exchanged between clients, the dispatcher, and
/// per-unit workers. `data` is owned by the request for the request's
/// lifetime rather than expressed as a raw pointer, since this crate has no
/// reason to reproduce the original's shared-memory-message-port calling
/// convention.
#[derive(Debug, Clone)]
pub struct Request {
    pub command: Command,
    pub flags: RequestFlags,
    pub unit: u32,
    pub offset: usize,
    pub length: usize,
    pub data: Vec<u8>,
}

impl Request {
    pub fn new(unit: u32, command: Command) -> Self {
        Self {
            command,
            flags: RequestFlags::empty(),
            unit,
            offset: 0,
            length: 0,
            data: Vec::new(),
        }
    }

    pub fn with_offset_len(mut self, offset: usize, length: usize) -> Self {
        self.offset = offset;
        self.length = length;
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.length = data.len();
        self.data = data;
        self
    }

    pub fn quick(mut self) -> Self {
        self.flags |= RequestFlags::QUICK;
        self
    }
}

/// What a worker (or the immediate-dispatch path) hands back for a [`Request`].
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub bytes_transferred: usize,
    pub data: Vec<u8>,
}
