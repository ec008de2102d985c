//! Clipboard change observers.
//!
//! Subscribers register a channel sink and get an [`ObserverId`] back; the
//! registry never holds anything but the sink, so a subscriber and the service
//! never own each other.  Sinks whose receiver was dropped are pruned on the
//! next notification.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use pasteboard_core::{PasteResult, PasteboardError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Which changes an observer wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverKind {
    /// Changes made on this device.
    Local,
    /// Payloads arriving from other devices.
    Remote,
    All,
}

impl ObserverKind {
    fn wants(self, is_remote: bool) -> bool {
        match self {
            ObserverKind::Local => !is_remote,
            ObserverKind::Remote => is_remote,
            ObserverKind::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Copy,
    Paste,
    Clear,
}

/// One clipboard change delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteboardEvent {
    pub kind: EventKind,
    pub user_id: u32,
    pub is_remote: bool,
    /// Bundle name of the app that caused the event.
    pub bundle_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

#[derive(Debug)]
struct ObserverEntry {
    pid: u32,
    kind: ObserverKind,
    sink: mpsc::Sender<PasteboardEvent>,
}

/// Registry of observer sinks keyed by id.
#[derive(Debug)]
pub struct ObserverRegistry {
    entries: Mutex<HashMap<ObserverId, ObserverEntry>>,
    next_id: AtomicU64,
    max_per_pid: usize,
}

impl ObserverRegistry {
    pub fn new(max_per_pid: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_per_pid,
        }
    }

    /// Registers `sink` for changes of `kind` on behalf of `pid`.
    ///
    /// # Errors
    ///
    /// [`PasteboardError::AddObserverFailed`] when `pid` already has the
    /// maximum number of live observers or the sink is already closed.
    pub fn subscribe(
        &self,
        pid: u32,
        kind: ObserverKind,
        sink: mpsc::Sender<PasteboardEvent>,
    ) -> PasteResult<ObserverId> {
        if sink.is_closed() {
            return Err(PasteboardError::AddObserverFailed);
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, e| !e.sink.is_closed());
        let owned = entries.values().filter(|e| e.pid == pid).count();
        if owned >= self.max_per_pid {
            warn!(pid, owned, max = self.max_per_pid, "observer limit reached");
            return Err(PasteboardError::AddObserverFailed);
        }
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entries.insert(id, ObserverEntry { pid, kind, sink });
        debug!(pid, ?kind, id = id.0, "observer subscribed");
        Ok(id)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Removes every observer registered by `pid`.
    pub fn remove_pid(&self, pid: u32) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| e.pid != pid);
        before - entries.len()
    }

    pub fn count_for_pid(&self, pid: u32) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| e.pid == pid)
            .count()
    }

    /// Delivers `event` to every interested observer without blocking.
    ///
    /// Returns the number of sinks that accepted the event.
    pub fn notify(&self, event: &PasteboardEvent) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        entries.retain(|id, entry| {
            if !entry.kind.wants(event.is_remote) {
                return !entry.sink.is_closed();
            }
            match entry.sink.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(id = id.0, "observer queue full, event dropped");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(id = id.0, "observer gone, pruning");
                    false
                }
            }
        });
        delivered
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
