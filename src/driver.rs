/*
    trackfile

    --------------------------------------------------------------------------

    src/driver.rs

    Global state modeled as a single process-wide driver context created at
    load time and torn down at unload, so tests can stay parametric over an
    explicit context rather than a hidden global. `Driver` is that context:
    it owns the unit registry and the optional shared cache, and every
    control-plane entry point in `control.rs` takes `&Driver` instead of
    reaching for a `static`.
*/

use crate::cache::SharedCache;
use crate::error::{DriverError, Result};
use crate::registry::UnitRegistry;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Pseudo-unit number reserved for device-wide configuration, used as
/// `change_unit(unit | CONTROL, ...)`. Never a real registry slot;
/// `change_unit` special-cases it before touching the registry at all.
pub const CONTROL: u32 = u32::MAX;

/// Process-wide driver context: the unit registry plus the optional shared
/// read cache, constructible (and droppable) as many times as a test needs.
pub struct Driver {
    pub(crate) registry: Arc<UnitRegistry>,
    pub(crate) cache: Arc<Mutex<Option<Arc<SharedCache>>>>,
    pub(crate) next_subscription_id: AtomicUsize,
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(UnitRegistry::new()),
            cache: Arc::new(Mutex::new(None)),
            next_subscription_id: AtomicUsize::new(1),
        }
    }

    /// Unique id for a newly registered change-interrupt subscription,
    /// handed back to the caller so `remove_change_interrupt` can name it
    /// later (matching on pointer identity -- this crate's
    /// stand-in for comparing request pointers).
    pub(crate) fn next_subscription_id(&self) -> usize {
        self.next_subscription_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Current device-wide cache size in bytes, or 0 if no cache is
    /// installed.
    pub fn max_cache_memory(&self) -> usize {
        self.cache
            .lock()
            .expect("cache lock poisoned")
            .as_ref()
            .map(|c| c.max_bytes())
            .unwrap_or(0)
    }

    /// Test/host-integration hook: set how many host-filesystem requests are
    /// currently outstanding against `unit`, the signal `eject_media` consults
    /// to decide whether the drive is busy. This crate has
    /// no real host filesystem to report this on its own.
    pub fn set_pending_io(&self, unit: u32, count: u32) -> Result<()> {
        let slot = self.registry.peek(unit).ok_or(DriverError::UnitNotFound)?;
        slot.unit.lock().expect("unit lock poisoned").set_pending_io(count);
        Ok(())
    }
}
