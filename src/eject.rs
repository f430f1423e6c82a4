/*
    trackfile

    --------------------------------------------------------------------------

    src/eject.rs

    The worker's internal eject primitive (a single attempt,
    called under the per-unit lock by worker.rs), and the polling outer loop
    `eject_media` in control.rs drives at 2 Hz up to a caller-supplied
    timeout.
*/

use crate::cache::SharedCache;
use crate::error::{DriverError, Result};
use crate::unit::{Unit, UnitState};
use std::time::{Duration, Instant};

/// Poll interval for the outer `eject_media` loop (2 Hz).
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A single eject attempt, run under the per-unit lock: flush buffer if
/// dirty -> send a flush packet to the host filesystem -> close file ->
/// clear all cache entries for this unit -> fire change-notifications ->
/// transition to running/empty. Fails with `DriveInUse` if filesystem
/// I/O is still pending.
pub fn attempt_eject(number: u32, unit: &mut Unit, cache: Option<&SharedCache>) -> Result<()> {
    if unit.pending_io() > 0 {
        return Err(DriverError::DriveInUse);
    }

    if unit.dirty {
        crate::worker::flush_dirty_buffer(unit)?;
    }

    // Host-filesystem flush packet: modeled as a blocking call returning a
    // boolean. This crate has no host filesystem, so the call always
    // succeeds.
    let flush_ok = true;
    if !flush_ok {
        return Err(DriverError::DriveInUse);
    }

    unit.file = None;
    unit.track_buffer = None;
    unit.invalidate_buffer();
    unit.motor_on = false;

    if let Some(cache) = cache {
        cache.invalidate_unit(number);
    }

    unit.change_count = unit.change_count.wrapping_add(1);
    unit.state = UnitState::RunningEmpty;
    unit.recompute_busy();

    unit.change_notify.fire_all();

    Ok(())
}

/// The outcome of `eject_media`'s polling loop: success, or the last error
/// observed when the deadline passed.
pub enum EjectOutcome {
    Ejected,
    TimedOut(DriverError),
}

/// Retry an eject attempt at `POLL_INTERVAL` until it succeeds or `timeout`
/// elapses. `attempt` performs a single eject try (in `control.rs` this
/// round-trips the worker's control channel: obtain the device lock, send a
/// command to the worker, release the device lock, then poll; tests here
/// call `attempt_eject` directly against a locked `Unit` to exercise the
/// timing without a real worker thread). `should_break` is polled each
/// iteration for a user-break signal, which aborts the wait early.
pub fn poll_eject(
    timeout: Duration,
    mut attempt: impl FnMut() -> Result<()>,
    mut should_break: impl FnMut() -> bool,
) -> EjectOutcome {
    let deadline = Instant::now() + timeout;
    let mut last_error = DriverError::DriveInUse;

    loop {
        if should_break() {
            return EjectOutcome::TimedOut(DriverError::Break);
        }

        match attempt() {
            Ok(()) => return EjectOutcome::Ejected,
            Err(e) => last_error = e,
        }

        if Instant::now() >= deadline {
            return EjectOutcome::TimedOut(last_error);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        std::thread::sleep(remaining.min(POLL_INTERVAL));
    }
}
