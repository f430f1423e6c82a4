/*
    trackfile

    --------------------------------------------------------------------------

    src/registry.rs

    The process-wide, ordered collection of units keyed by unit
    number, protected by a single device-wide lock. Units are never
    deallocated once created; only their worker comes and goes.
*/

use crate::unit::{Unit, UnitState};
use std::sync::{Arc, Mutex, RwLock};

/// One registry slot: the unit number, its per-unit-locked state, and
/// whatever the worker needs other threads to reach it by (installed by
/// worker.rs when a worker is spawned, cleared on stop).
pub struct UnitSlot {
    pub number: u32,
    pub unit: Arc<Mutex<Unit>>,
    pub worker: Mutex<Option<crate::worker::WorkerHandle>>,
}

struct RegistryInner {
    /// Ordered by most-recently-looked-up first; a lookup moves the unit to
    /// the list head (MRU bump).
    slots: Vec<Arc<UnitSlot>>,
}

/// The shared unit registry, the "device lock" subject; a single
/// `RwLock` stands in for the read/write semaphore.
pub struct UnitRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner { slots: Vec::new() }),
        }
    }

    /// `lookup(n)`: linear scan under the device lock; on hit,
    /// moves the unit to the list head. Takes the write lock unconditionally
    /// since a hit always mutates list order, matching "this is the only
    /// write mutation performed under a read-style lookup; callers must hold
    /// the device lock exclusively".
    pub fn lookup(&self, number: u32) -> Option<Arc<UnitSlot>> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let pos = inner.slots.iter().position(|s| s.number == number)?;
        let slot = inner.slots.remove(pos);
        inner.slots.insert(0, slot.clone());
        Some(slot)
    }

    /// Like `lookup` but does not reorder the list; used by read-mostly
    /// paths (snapshotting, admission comparisons) that don't want to
    /// perturb MRU order on every call.
    pub fn peek(&self, number: u32) -> Option<Arc<UnitSlot>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.slots.iter().find(|s| s.number == number).cloned()
    }

    /// `allocate_next()`: reuses a unit that is running but
    /// currently empty and idle, else returns `max+1`, with overflow
    /// rejected.
    pub fn allocate_next(&self) -> Option<u32> {
        let inner = self.inner.read().expect("registry lock poisoned");
        for slot in &inner.slots {
            let unit = slot.unit.lock().expect("unit lock poisoned");
            if unit.state == UnitState::RunningEmpty {
                return Some(slot.number);
            }
        }
        drop(inner);

        let inner = self.inner.read().expect("registry lock poisoned");
        let max = inner.slots.iter().map(|s| s.number).max();
        match max {
            None => Some(0),
            Some(n) => n.checked_add(1),
        }
    }

    /// Insert a brand-new slot for `number`. Called only by `start_unit` once
    /// `allocate_next`/an explicit number has been chosen and no existing
    /// slot was found for it.
    pub fn insert(&self, number: u32, unit: Unit) -> Arc<UnitSlot> {
        let slot = Arc::new(UnitSlot {
            number,
            unit: Arc::new(Mutex::new(unit)),
            worker: Mutex::new(None),
        });
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.slots.insert(0, slot.clone());
        slot
    }

    /// `iter_snapshot()`: a consistent ordered list for reporting.
    /// Ordered by ascending unit number, independent of MRU position, since
    /// reports should be stable regardless of access pattern.
    pub fn iter_snapshot(&self) -> Vec<Arc<UnitSlot>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut slots: Vec<Arc<UnitSlot>> = inner.slots.clone();
        slots.sort_by_key(|s| s.number);
        slots
    }

    /// Run `f` against every unit other than `exclude`, each under its own
    /// per-unit lock held only for the duration of the call -- the access
    /// pattern the volume-collision and duplicate-disk comparisons need.
    pub fn for_each_other_unit(&self, exclude: u32, mut f: impl FnMut(u32, &Unit)) {
        let inner = self.inner.read().expect("registry lock poisoned");
        for slot in inner.slots.iter().filter(|s| s.number != exclude) {
            let unit = slot.unit.lock().expect("unit lock poisoned");
            f(slot.number, &unit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_bumps_to_front() {
        let reg = UnitRegistry::new();
        reg.insert(0, Unit::new(0));
        reg.insert(1, Unit::new(1));
        reg.insert(2, Unit::new(2));
        // insert order puts 2 at front already; look up 0 and confirm it
        // moves to front.
        assert!(reg.lookup(0).is_some());
        let snapshot = reg.iter_snapshot();
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn allocate_next_reuses_empty_running_unit() {
        let reg = UnitRegistry::new();
        let slot = reg.insert(0, Unit::new(0));
        slot.unit.lock().unwrap().state = UnitState::RunningEmpty;
        reg.insert(1, Unit::new(1));
        assert_eq!(reg.allocate_next(), Some(0));
    }

    #[test]
    fn allocate_next_returns_max_plus_one_when_none_free() {
        let reg = UnitRegistry::new();
        reg.insert(0, Unit::new(0));
        reg.insert(3, Unit::new(3));
        assert_eq!(reg.allocate_next(), Some(4));
    }

    #[test]
    fn allocate_next_on_empty_registry_returns_zero() {
        let reg = UnitRegistry::new();
        assert_eq!(reg.allocate_next(), Some(0));
    }

    #[test]
    fn for_each_other_unit_excludes_the_given_number() {
        let reg = UnitRegistry::new();
        reg.insert(0, Unit::new(0));
        reg.insert(1, Unit::new(1));
        let mut seen = Vec::new();
        reg.for_each_other_unit(0, |n, _| seen.push(n));
        assert_eq!(seen, vec![1]);
    }
}
