//! Peer-to-peer change announcements.
//!
//! Each device pushes a [`DistributedEvent`] to every known peer when its
//! clipboard changes and keeps an inbox of the newest event per
//! `(user_id, device_id)` it has received.  Withdrawing sends a tombstone:
//! an event whose expiration is not after its timestamp, which removes the
//! sender's entry from every inbox it reaches.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use pasteboard_core::protocol::messages::DistributedEvent;
use pasteboard_core::PasteResult;
use tracing::{debug, warn};

use super::peer_link::TcpLinkTransport;
use crate::application::ports::{DeviceService, SyncBackend};
use crate::application::remote::now_ms;

/// Default bound on delivering one event to one peer.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(3);

/// [`SyncBackend`] that pushes events over the peer link.
pub struct PeerSyncBackend {
    transport: Arc<TcpLinkTransport>,
    device: Arc<dyn DeviceService>,
    inbox: RwLock<HashMap<(u32, String), DistributedEvent>>,
    publish_timeout: Duration,
}

impl PeerSyncBackend {
    pub fn new(transport: Arc<TcpLinkTransport>, device: Arc<dyn DeviceService>) -> Self {
        Self {
            transport,
            device,
            inbox: RwLock::new(HashMap::new()),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Records an event received from a peer.
    ///
    /// Returns `true` if the inbox changed.  Events from this device and
    /// events older than the stored one for the same sender are ignored.
    pub fn accept(&self, event: DistributedEvent) -> bool {
        if event.device_id == self.device.local_network_id() {
            return false;
        }
        let key = (event.user_id, event.device_id.clone());
        let mut inbox = self.inbox.write().unwrap_or_else(PoisonError::into_inner);
        let newer = inbox
            .get(&key)
            .map_or(true, |held| (event.timestamp_ms, event.seq_id) >= (held.timestamp_ms, held.seq_id));
        if !newer {
            debug!(device = %event.device_id, seq = event.seq_id, "stale peer event ignored");
            return false;
        }
        if is_tombstone(&event) {
            debug!(device = %event.device_id, user_id = event.user_id, "peer withdrew its event");
            return inbox.remove(&key).is_some();
        }
        debug!(device = %event.device_id, user_id = event.user_id, seq = event.seq_id, "peer event received");
        inbox.insert(key, event);
        true
    }

    /// Delivers `event` to every peer on its own task.
    fn broadcast(&self, event: DistributedEvent) {
        for network_id in self.device.get_network_ids() {
            let transport = Arc::clone(&self.transport);
            let event = event.clone();
            let timeout = self.publish_timeout;
            tokio::spawn(async move {
                match tokio::time::timeout(timeout, transport.send_event(&network_id, &event)).await {
                    Ok(Ok(())) => debug!(network_id = %network_id, seq = event.seq_id, "event delivered"),
                    Ok(Err(e)) => warn!(network_id = %network_id, error = %e, "event delivery failed"),
                    Err(_) => warn!(network_id = %network_id, "event delivery timed out"),
                }
            });
        }
    }
}

fn is_tombstone(event: &DistributedEvent) -> bool {
    event.expiration_ms <= event.timestamp_ms
}

#[async_trait]
impl SyncBackend for PeerSyncBackend {
    async fn publish(&self, event: DistributedEvent) -> PasteResult<()> {
        self.broadcast(event);
        Ok(())
    }

    async fn latest_event(&self, user_id: u32) -> Option<DistributedEvent> {
        self.inbox
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((user, _), _)| *user == user_id)
            .map(|(_, event)| event)
            .max_by_key(|event| (event.timestamp_ms, event.seq_id))
            .cloned()
    }

    async fn clear(&self, user_id: u32) {
        let now = now_ms();
        self.broadcast(DistributedEvent {
            device_id: self.device.local_network_id(),
            user_id,
            seq_id: 0,
            timestamp_ms: now,
            expiration_ms: now,
            data_len: 0,
            is_delay: false,
            mime_types: Vec::new(),
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::collaborators::StaticDeviceService;

    fn backend() -> PeerSyncBackend {
        let device: Arc<dyn DeviceService> = Arc::new(StaticDeviceService::new("net-a", "Desk", &[]));
        PeerSyncBackend::new(Arc::new(TcpLinkTransport::new(Arc::clone(&device))), device)
    }

    fn event(device: &str, seq_id: u64, timestamp_ms: u64) -> DistributedEvent {
        DistributedEvent {
            device_id: device.to_string(),
            user_id: 100,
            seq_id,
            timestamp_ms,
            expiration_ms: timestamp_ms + 60_000,
            data_len: 10,
            is_delay: false,
            mime_types: vec!["text/plain".to_string()],
        }
    }

    #[tokio::test]
    async fn test_latest_event_is_newest_across_peers() {
        // Arrange
        let sync = backend();
        sync.accept(event("net-b", 1, 1_000));
        sync.accept(event("net-c", 1, 2_000));

        // Act
        let latest = sync.latest_event(100).await;

        // Assert
        assert_eq!(latest.map(|e| e.device_id), Some("net-c".to_string()));
        assert!(sync.latest_event(101).await.is_none());
    }

    #[tokio::test]
    async fn test_own_and_stale_events_are_ignored() {
        let sync = backend();

        assert!(!sync.accept(event("net-a", 1, 1_000)));
        assert!(sync.accept(event("net-b", 2, 2_000)));
        assert!(!sync.accept(event("net-b", 1, 1_000)));
        assert_eq!(sync.latest_event(100).await.map(|e| e.seq_id), Some(2));
    }

    #[tokio::test]
    async fn test_tombstone_removes_sender_entry() {
        // Arrange
        let sync = backend();
        sync.accept(event("net-b", 1, 1_000));
        sync.accept(event("net-c", 4, 2_000));
        let mut tombstone = event("net-c", 0, 3_000);
        tombstone.expiration_ms = tombstone.timestamp_ms;

        // Act
        let changed = sync.accept(tombstone);

        // Assert
        assert!(changed);
        assert_eq!(
            sync.latest_event(100).await.map(|e| e.device_id),
            Some("net-b".to_string())
        );
    }

    #[tokio::test]
    async fn test_publish_without_peers_succeeds() {
        let sync = backend();
        assert!(sync.publish(event("net-a", 1, 1_000)).await.is_ok());
        sync.clear(100).await;
    }
}
