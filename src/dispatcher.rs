/*
    trackfile

    --------------------------------------------------------------------------

    src/dispatcher.rs

    The immediate-vs-queued dispatch split: the thin layer between a
    `Request` and either a direct per-unit-lock read (immediate commands) or
    the unit's worker queue. This is what keeps immediate commands lock-free
    in practice: a queued command stuck behind a slow worker never blocks an
    immediate one, because immediate commands never touch the worker's
    channel at all.
*/

use crate::error::{DriverError, Result};
use crate::registry::UnitRegistry;
use crate::request::{Command, Reply, Request};
use crate::unit::UnitState;
use crate::worker::QueuedJob;
use crossbeam_channel::bounded;

/// Submit `request` against `registry`. Immediate commands are answered
/// directly, under the unit's per-unit lock, on the calling thread. All
/// other commands are enqueued on the unit's worker and this call blocks
/// for the reply.
pub fn submit(registry: &UnitRegistry, request: Request) -> Result<Reply> {
    let slot = registry.peek(request.unit).ok_or(DriverError::UnitNotFound)?;

    if request.command.is_immediate() {
        return dispatch_immediate(&slot, &request);
    }

    let worker = slot.worker.lock().expect("worker lock poisoned");
    let handle = worker.as_ref().ok_or(DriverError::UnitNotActive)?;

    let (reply_tx, reply_rx) = bounded(1);
    handle
        .queue_tx
        .send(QueuedJob {
            request,
            reply: reply_tx,
        })
        .map_err(|_| DriverError::UnitNotActive)?;
    drop(worker);

    reply_rx.recv().map_err(|_| DriverError::Aborted)?
}

fn dispatch_immediate(slot: &crate::registry::UnitSlot, request: &Request) -> Result<Reply> {
    let mut unit = slot.unit.lock().expect("unit lock poisoned");

    match request.command {
        Command::ChangeState => {
            let present = unit.is_loaded();
            Ok(Reply {
                bytes_transferred: if present { 0 } else { 1 },
                data: Vec::new(),
            })
        }
        Command::ChangeCount => Ok(Reply {
            bytes_transferred: unit.change_count as usize,
            data: Vec::new(),
        }),
        Command::ProtectionStatus => Ok(Reply {
            bytes_transferred: unit.write_protected as usize,
            data: Vec::new(),
        }),
        Command::DriveType => {
            let drive_type = unit.drive_type.ok_or(DriverError::NoMediumPresent)?;
            Ok(Reply {
                bytes_transferred: 0,
                data: drive_type.to_string().into_bytes(),
            })
        }
        Command::GetNumTracks => {
            let geometry = unit.geometry().ok_or(DriverError::NoMediumPresent)?;
            Ok(Reply {
                bytes_transferred: geometry.cylinders() as usize,
                data: Vec::new(),
            })
        }
        Command::RemoveChangeInterrupt => {
            let id = request.offset;
            let removed = unit.change_notify.remove(id);
            if removed {
                Ok(Reply::default())
            } else {
                Err(DriverError::Denied)
            }
        }
        Command::Start => match unit.state {
            UnitState::Stopped => Err(DriverError::UnitNotFound),
            _ => Ok(Reply::default()),
        },
        _ => Err(DriverError::NoCmd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Command;
    use crate::unit::Unit;

    #[test]
    fn unknown_unit_is_rejected() {
        let registry = UnitRegistry::new();
        let result = submit(&registry, Request::new(5, Command::ChangeState));
        assert_eq!(result, Err(DriverError::UnitNotFound));
    }

    #[test]
    fn change_state_is_immediate_and_does_not_need_a_worker() {
        let registry = UnitRegistry::new();
        let slot = registry.insert(0, Unit::new(0));
        slot.unit.lock().unwrap().state = UnitState::RunningEmpty;
        let reply = submit(&registry, Request::new(0, Command::ChangeState)).unwrap();
        assert_eq!(reply.bytes_transferred, 1);
    }

    #[test]
    fn queued_command_without_a_running_worker_is_unit_not_active() {
        let registry = UnitRegistry::new();
        registry.insert(0, Unit::new(0));
        let result = submit(&registry, Request::new(0, Command::Read).with_offset_len(0, 512));
        assert_eq!(result, Err(DriverError::UnitNotActive));
    }
}
