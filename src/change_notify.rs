/*
    trackfile

    --------------------------------------------------------------------------

    src/change_notify.rs

    The change-interrupt subscriber list. "add-change-interrupt"
    registers a request that is retained until a matching
    "remove-change-interrupt" unlinks it; on insert/eject every listed
    subscriber is signaled after the triggering reply has been delivered.
    Modeled as a publish list of opaque tokens -- the implementation must not
    assume a callback can allocate or block, so firing a subscriber is just
    invoking a `Fn` the caller supplied up front.
*/

use std::sync::Arc;

/// An opaque handle identifying one registered change-interrupt request.
/// Equality is by identity (the `Arc` pointer): remove-change-interrupt
/// unregisters by this identity, not by comparing callback contents.
#[derive(Clone)]
pub struct ChangeSubscription {
    id: usize,
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl ChangeSubscription {
    pub fn new(id: usize, callback: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self { id, callback }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    fn fire(&self) {
        (self.callback)();
    }
}

impl std::fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSubscription").field("id", &self.id).finish()
    }
}

/// Per-unit list of registered change-interrupt subscribers.
#[derive(Debug, Default)]
pub struct ChangeNotifyList {
    subscribers: Vec<ChangeSubscription>,
}

impl ChangeNotifyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never replies: the request is retained until a matching
    /// remove-change-interrupt with the same request unlinks it.
    pub fn add(&mut self, subscription: ChangeSubscription) {
        self.subscribers.push(subscription);
    }

    /// Unregisters a subscriber by pointer identity.
    /// Returns true if a matching subscriber was found and removed.
    pub fn remove(&mut self, id: usize) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id() != id);
        self.subscribers.len() != before
    }

    /// Fire every registered subscriber. Callers must only invoke this after
    /// delivering the reply to the operation that triggered the change:
    /// change notifications are always fired after the triggering reply and
    /// are never retried.
    pub fn fire_all(&self) {
        for subscriber in &self.subscribers {
            subscriber.fire();
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
