use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::model::Post;

/// Callback receiving the ordered feed snapshot after every change.
pub type SnapshotHandler = Arc<dyn Fn(&[Post]) + Send + Sync>;

/// Handle for a snapshot subscription, returned by `CacheRepository::subscribe()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registered snapshot handlers.
///
/// Handlers run synchronously on the notifying task, after internal locks
/// have been released, so a handler may read the repository again.
pub(crate) struct Observers {
    handlers: RwLock<Vec<(SubscriptionId, SnapshotHandler)>>,
    next_id: AtomicU64,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&[Post]) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub(crate) fn notify(&self, snapshot: &[Post]) {
        let handlers: Vec<SnapshotHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(snapshot);
        }
    }
}
