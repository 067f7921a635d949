//! Ordered capture listeners

use crate::error::ListenerError;
use crate::payload::CaptureRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Callback invoked once per coordinated capture
pub type Listener = Arc<dyn Fn(&CaptureRecord) -> Result<(), ListenerError> + Send + Sync>;

struct Entry {
    id: u64,
    listener: Listener,
}

type Entries = RwLock<Vec<Entry>>;

/// Append-only list of listeners, notified in registration order.
pub struct ListenerRegistry {
    entries: Arc<Entries>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Append a listener. The same callback may be registered more than once.
    pub fn register<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&CaptureRecord) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Entry {
                id,
                listener: Arc::new(listener),
            });

        ListenerHandle {
            id,
            entries: Arc::downgrade(&self.entries),
        }
    }

    /// Call every listener registered when the broadcast starts.
    ///
    /// Stops at the first failing listener and returns its error.
    pub fn broadcast(&self, record: &CaptureRecord) -> Result<(), ListenerError> {
        let snapshot: Vec<Listener> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| Arc::clone(&entry.listener))
            .collect();

        for listener in snapshot {
            listener(record)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Returned by [`ListenerRegistry::register`].
///
/// Dropping the handle keeps the listener registered.
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    entries: Weak<Entries>,
}

impl ListenerHandle {
    /// Remove the listener. Returns false if it was already gone.
    pub fn unregister(self) -> bool {
        let Some(entries) = self.entries.upgrade() else {
            return false;
        };
        let mut entries = entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|entry| entry.id != self.id);
        entries.len() != before
    }
}
