//! De-duplication of remote payload fetches.
//!
//! Several readers on this device may paste the same remote clipboard at the
//! same time.  Each change event is identified by `(device_id, seq_id)`; the
//! first reader for a key starts the one and only network fetch, everyone
//! else subscribes to its result.  The task context is removed as soon as the
//! fetch completes, fails or times out.
//!
//! # How waiters share one result (for beginners)
//!
//! The task context is a `tokio::sync::watch` channel holding
//! `Option<result>`.  It starts as `None`; the fetch task stores `Some(..)`
//! once and every subscribed receiver wakes up and clones it.  Dropping the
//! sender without a value (see [`RemoteTaskRegistry::clear_remote_data_task`])
//! releases all waiters with a failure.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pasteboard_core::protocol::messages::DistributedEvent;
use pasteboard_core::{PasteResult, PasteboardError};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Result shared by every waiter of one remote task.
pub type SharedFetch = PasteResult<Arc<Vec<u8>>>;

/// The network fetch backing one task.
pub type FetchFuture = Pin<Box<dyn Future<Output = PasteResult<Vec<u8>>> + Send + 'static>>;

/// Identity of one remote change event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub device_id: String,
    pub seq_id: u64,
}

impl From<&DistributedEvent> for TaskKey {
    fn from(event: &DistributedEvent) -> Self {
        Self {
            device_id: event.device_id.clone(),
            seq_id: event.seq_id,
        }
    }
}

type TaskMap = HashMap<TaskKey, watch::Sender<Option<SharedFetch>>>;

/// In-flight remote fetches keyed by event.
#[derive(Debug)]
pub struct RemoteTaskRegistry {
    tasks: Arc<Mutex<TaskMap>>,
    timeout: Duration,
}

impl RemoteTaskRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Waits for the payload behind `event`, starting the fetch only if no
    /// other waiter has.
    ///
    /// `fetch` is called at most once per key while a task is in flight.
    ///
    /// # Errors
    ///
    /// Whatever the fetch returns, or [`PasteboardError::RemoteDataFailed`]
    /// on timeout or when the task is cleared.
    pub async fn wait_remote_data<F>(&self, event: &DistributedEvent, fetch: F) -> SharedFetch
    where
        F: FnOnce() -> FetchFuture,
    {
        let key = TaskKey::from(event);
        let mut rx = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            match tasks.get(&key) {
                Some(tx) => {
                    debug!(device = %key.device_id, seq = key.seq_id, "joining in-flight remote task");
                    tx.subscribe()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    tasks.insert(key.clone(), tx);
                    self.spawn_fetch(key, fetch());
                    rx
                }
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(PasteboardError::RemoteDataFailed))
    }

    fn spawn_fetch(&self, key: TaskKey, fetch: FetchFuture) {
        let tasks = Arc::clone(&self.tasks);
        let timeout = self.timeout;
        debug!(device = %key.device_id, seq = key.seq_id, "remote fetch started");
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, fetch).await {
                Ok(result) => result.map(Arc::new),
                Err(_) => {
                    warn!(device = %key.device_id, seq = key.seq_id, "remote fetch timed out");
                    Err(PasteboardError::RemoteDataFailed)
                }
            };
            debug!(
                device = %key.device_id,
                seq = key.seq_id,
                ok = result.is_ok(),
                "remote fetch finished"
            );
            let tx = tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
            if let Some(tx) = tx {
                tx.send_replace(Some(result));
            }
        });
    }

    /// Drops the task for `event`, releasing its waiters with a failure.
    ///
    /// Returns `true` if a task was in flight.
    pub fn clear_remote_data_task(&self, event: &DistributedEvent) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&TaskKey::from(event))
            .is_some()
    }

    pub fn pending(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
