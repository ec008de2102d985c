//! Point-to-point link bookkeeping.
//!
//! One link record per peer network id.  The first caller for a network id
//! spawns the establishment task; every caller (identified by pid) then waits
//! on the record's `watch` channel until the link reports success or failure,
//! bounded by a wait derived from the expected transfer size.
//!
//! Closing a link removes the record and wakes every waiter with a failure.
//! A process that exits is removed from all records; a connected link with no
//! remaining holders is torn down.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pasteboard_core::{PasteResult, PasteboardError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::application::ports::LinkTransport;

/// How long a caller waits for a link to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkWaitPolicy {
    pub min_wait: Duration,
    /// Assumed throughput; `0` disables size-based stretching.
    pub baseline_bytes_per_sec: u64,
}

impl LinkWaitPolicy {
    /// `max(min_wait, expected_bytes / baseline)`.
    pub fn wait_for(&self, expected_bytes: u64) -> Duration {
        if self.baseline_bytes_per_sec == 0 {
            return self.min_wait;
        }
        let transfer = Duration::from_millis(
            expected_bytes.saturating_mul(1000) / self.baseline_bytes_per_sec,
        );
        self.min_wait.max(transfer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Failed,
}

#[derive(Debug)]
struct LinkRecord {
    generation: u64,
    state: watch::Sender<LinkState>,
    holders: HashSet<u32>,
}

#[derive(Debug, Default)]
struct LinkTable {
    records: HashMap<String, LinkRecord>,
    next_generation: u64,
}

/// Link records keyed by peer network id.
pub struct P2pLinkManager {
    transport: Arc<dyn LinkTransport>,
    table: Arc<Mutex<LinkTable>>,
    policy: LinkWaitPolicy,
}

fn lock(table: &Mutex<LinkTable>) -> MutexGuard<'_, LinkTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

impl P2pLinkManager {
    pub fn new(transport: Arc<dyn LinkTransport>, policy: LinkWaitPolicy) -> Self {
        Self {
            transport,
            table: Arc::new(Mutex::new(LinkTable::default())),
            policy,
        }
    }

    pub fn policy(&self) -> LinkWaitPolicy {
        self.policy
    }

    /// Opens (or joins) the link to `network_id` on behalf of `pid`.
    ///
    /// # Errors
    ///
    /// [`PasteboardError::RemoteDataFailed`] if establishment fails, the link
    /// is closed while waiting, or the wait expires.
    pub async fn establish_p2p_link(
        &self,
        network_id: &str,
        pid: u32,
        expected_bytes: u64,
    ) -> PasteResult<()> {
        let mut rx = {
            let mut table = lock(&self.table);
            if !table.records.contains_key(network_id) {
                table.next_generation += 1;
                let generation = table.next_generation;
                let (tx, _) = watch::channel(LinkState::Connecting);
                table.records.insert(
                    network_id.to_string(),
                    LinkRecord {
                        generation,
                        state: tx,
                        holders: HashSet::new(),
                    },
                );
                self.spawn_establish(network_id.to_string(), generation);
            }
            match table.records.get_mut(network_id) {
                Some(record) => {
                    record.holders.insert(pid);
                    record.state.subscribe()
                }
                None => return Err(PasteboardError::RemoteDataFailed),
            }
        };

        let wait = self.policy.wait_for(expected_bytes);
        let outcome = tokio::time::timeout(wait, rx.wait_for(|s| *s != LinkState::Connecting))
            .await
            .map(|r| r.map(|state| *state));
        match outcome {
            Ok(Ok(LinkState::Connected)) => Ok(()),
            Ok(Ok(_)) | Ok(Err(_)) => {
                debug!(network_id, pid, "p2p link unavailable");
                Err(PasteboardError::RemoteDataFailed)
            }
            Err(_) => {
                warn!(network_id, pid, wait_ms = wait.as_millis() as u64, "p2p link wait expired");
                self.release_holder(network_id, pid);
                Err(PasteboardError::RemoteDataFailed)
            }
        }
    }

    fn spawn_establish(&self, network_id: String, generation: u64) {
        let transport = Arc::clone(&self.transport);
        let table = Arc::clone(&self.table);
        info!(network_id = %network_id, "opening p2p link");
        tokio::spawn(async move {
            let result = transport.open_link(&network_id).await;
            let still_wanted = {
                let mut table = lock(&table);
                let current = table
                    .records
                    .get(&network_id)
                    .filter(|r| r.generation == generation)
                    .is_some();
                if current {
                    if result.is_ok() {
                        if let Some(record) = table.records.get(&network_id) {
                            record.state.send_replace(LinkState::Connected);
                        }
                    } else if let Some(record) = table.records.remove(&network_id) {
                        record.state.send_replace(LinkState::Failed);
                    }
                }
                current
            };
            match (result, still_wanted) {
                (Ok(()), true) => info!(network_id = %network_id, "p2p link established"),
                (Ok(()), false) => {
                    debug!(network_id = %network_id, "p2p link closed before it came up");
                    transport.close_link(&network_id).await;
                }
                (Err(e), _) => warn!(network_id = %network_id, error = %e, "p2p link failed"),
            }
        });
    }

    /// Tears the link down and fails every pending waiter.
    pub async fn close_p2p_link(&self, network_id: &str) {
        let record = lock(&self.table).records.remove(network_id);
        if let Some(record) = record {
            let was_connected = *record.state.borrow() == LinkState::Connected;
            record.state.send_replace(LinkState::Failed);
            if was_connected {
                self.transport.close_link(network_id).await;
            }
            info!(network_id, "p2p link closed");
        }
    }

    fn release_holder(&self, network_id: &str, pid: u32) {
        if let Some(record) = lock(&self.table).records.get_mut(network_id) {
            record.holders.remove(&pid);
        }
    }

    /// Drops `pid` from every link and closes connected links nobody holds.
    ///
    /// Returns the network ids that were closed.
    pub async fn on_process_died(&self, pid: u32) -> Vec<String> {
        let idle: Vec<String> = {
            let mut table = lock(&self.table);
            table
                .records
                .iter_mut()
                .filter_map(|(id, record)| {
                    let held = record.holders.remove(&pid);
                    let idle = record.holders.is_empty()
                        && *record.state.borrow() == LinkState::Connected;
                    (held && idle).then(|| id.clone())
                })
                .collect()
        };
        for network_id in &idle {
            self.close_p2p_link(network_id).await;
        }
        idle
    }

    pub fn link_state(&self, network_id: &str) -> Option<LinkState> {
        lock(&self.table)
            .records
            .get(network_id)
            .map(|r| *r.state.borrow())
    }

    pub fn holders(&self, network_id: &str) -> usize {
        lock(&self.table)
            .records
            .get(network_id)
            .map(|r| r.holders.len())
            .unwrap_or(0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockLinkTransport;
    use async_trait::async_trait;
    use pasteboard_core::protocol::messages::DistributedEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A transport whose links never come up.
    struct HangingTransport;

    #[async_trait]
    impl LinkTransport for HangingTransport {
        async fn open_link(&self, _network_id: &str) -> PasteResult<()> {
            std::future::pending().await
        }

        async fn close_link(&self, _network_id: &str) {}

        async fn fetch_event(&self, _event: &DistributedEvent) -> PasteResult<Vec<u8>> {
            Err(PasteboardError::RemoteDataFailed)
        }

        async fn fetch_entry(
            &self,
            _event: &DistributedEvent,
            _record_id: u32,
            _utd_id: &str,
        ) -> PasteResult<Vec<u8>> {
            Err(PasteboardError::RemoteDataFailed)
        }
    }

    fn policy(min_wait: Duration) -> LinkWaitPolicy {
        LinkWaitPolicy {
            min_wait,
            baseline_bytes_per_sec: 1024,
        }
    }

    #[test]
    fn test_wait_is_at_least_the_minimum() {
        let p = policy(Duration::from_secs(30));
        assert_eq!(p.wait_for(0), Duration::from_secs(30));
        assert_eq!(p.wait_for(1024 * 10), Duration::from_secs(30));
    }

    #[test]
    fn test_wait_stretches_with_payload_size() {
        let p = policy(Duration::from_secs(1));
        assert_eq!(p.wait_for(1024 * 90), Duration::from_secs(90));
    }

    #[test]
    fn test_zero_baseline_uses_minimum() {
        let p = LinkWaitPolicy {
            min_wait: Duration::from_millis(5),
            baseline_bytes_per_sec: 0,
        };
        assert_eq!(p.wait_for(u64::MAX), Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_establishment() {
        // Arrange
        let opens = Arc::new(AtomicUsize::new(0));
        let mut transport = MockLinkTransport::new();
        let counter = Arc::clone(&opens);
        transport.expect_open_link().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let links = P2pLinkManager::new(Arc::new(transport), policy(Duration::from_secs(5)));

        // Act
        let (a, b) = tokio::join!(
            links.establish_p2p_link("net-b", 10, 100),
            links.establish_p2p_link("net-b", 11, 100),
        );

        // Assert
        assert_eq!(a, Ok(()));
        assert_eq!(b, Ok(()));
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(links.link_state("net-b"), Some(LinkState::Connected));
        assert_eq!(links.holders("net-b"), 2);
    }

    #[tokio::test]
    async fn test_failed_establishment_fails_waiters_and_forgets_record() {
        let mut transport = MockLinkTransport::new();
        transport
            .expect_open_link()
            .returning(|_| Err(PasteboardError::RemoteDataFailed));
        let links = P2pLinkManager::new(Arc::new(transport), policy(Duration::from_secs(5)));

        let result = links.establish_p2p_link("net-b", 10, 0).await;

        assert_eq!(result, Err(PasteboardError::RemoteDataFailed));
        assert_eq!(links.link_state("net-b"), None);
    }

    #[tokio::test]
    async fn test_process_death_closes_idle_link() {
        // Arrange
        let mut transport = MockLinkTransport::new();
        transport.expect_open_link().returning(|_| Ok(()));
        transport.expect_close_link().times(1).returning(|_| ());
        let links = P2pLinkManager::new(Arc::new(transport), policy(Duration::from_secs(5)));
        links.establish_p2p_link("net-b", 10, 0).await.unwrap();
        links.establish_p2p_link("net-b", 11, 0).await.unwrap();

        // Act
        let first = links.on_process_died(10).await;
        let second = links.on_process_died(11).await;

        // Assert
        assert!(first.is_empty(), "link still held by pid 11");
        assert_eq!(second, vec!["net-b".to_string()]);
        assert_eq!(links.link_state("net-b"), None);
    }

    #[tokio::test]
    async fn test_close_releases_pending_waiters_immediately() {
        // Arrange
        let links = Arc::new(P2pLinkManager::new(
            Arc::new(HangingTransport),
            policy(Duration::from_secs(3600)),
        ));
        let waiter = {
            let links = Arc::clone(&links);
            tokio::spawn(async move { links.establish_p2p_link("net-b", 10, 0).await })
        };
        while links.holders("net-b") == 0 {
            tokio::task::yield_now().await;
        }

        // Act
        links.close_p2p_link("net-b").await;
        let result = waiter.await.unwrap();

        // Assert
        assert_eq!(result, Err(PasteboardError::RemoteDataFailed));
        assert_eq!(links.link_state("net-b"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_bounded_by_policy() {
        let links = P2pLinkManager::new(Arc::new(HangingTransport), policy(Duration::from_secs(30)));

        let result = links.establish_p2p_link("net-b", 10, 0).await;

        assert_eq!(result, Err(PasteboardError::RemoteDataFailed));
        assert_eq!(links.holders("net-b"), 0);
        assert_eq!(links.link_state("net-b"), Some(LinkState::Connecting));
    }
}
