//! Remote sync coordinator.
//!
//! Glues the sync backend (change announcements), the P2P link manager and
//! the remote task registry together:
//!
//! ```text
//! publish:  local set ──► make_event ──► SyncBackend::publish
//! consume:  SyncBackend::latest_event ──► establish link ──► de-duplicated fetch ──► decode
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pasteboard_core::model::decode_paste_data;
use pasteboard_core::protocol::codec::current_timestamp_us;
use pasteboard_core::protocol::messages::DistributedEvent;
use pasteboard_core::protocol::SequenceCounter;
use pasteboard_core::{PasteData, PasteResult, PasteboardError};
use tracing::{debug, warn};

use super::p2p::{LinkWaitPolicy, P2pLinkManager};
use super::tasks::{FetchFuture, RemoteTaskRegistry};
use crate::application::ports::{DeviceService, LinkTransport, SyncBackend};

/// Tuning values for cross-device traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteSettings {
    pub task_timeout: Duration,
    pub link_wait: LinkWaitPolicy,
    pub event_ttl: Duration,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(3),
            link_wait: LinkWaitPolicy {
                min_wait: Duration::from_secs(30),
                baseline_bytes_per_sec: 30 * 1024 * 1024,
            },
            event_ttl: Duration::from_secs(3600),
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// First sequence id of this run.  Seeded from the wall clock in
/// microseconds so peers that remember the last id they saw from this device
/// keep accepting its events after a restart.
fn first_sequence_id() -> u64 {
    current_timestamp_us().max(1)
}

/// Cross-device publish and fetch.
pub struct RemoteSyncCoordinator {
    backend: Option<Arc<dyn SyncBackend>>,
    transport: Arc<dyn LinkTransport>,
    device: Arc<dyn DeviceService>,
    links: P2pLinkManager,
    tasks: RemoteTaskRegistry,
    seq: SequenceCounter,
    settings: RemoteSettings,
}

impl RemoteSyncCoordinator {
    pub fn new(
        backend: Option<Arc<dyn SyncBackend>>,
        transport: Arc<dyn LinkTransport>,
        device: Arc<dyn DeviceService>,
        settings: RemoteSettings,
    ) -> Self {
        Self {
            backend,
            links: P2pLinkManager::new(Arc::clone(&transport), settings.link_wait),
            tasks: RemoteTaskRegistry::new(settings.task_timeout),
            transport,
            device,
            seq: SequenceCounter::starting_at(first_sequence_id()),
            settings,
        }
    }

    pub fn links(&self) -> &P2pLinkManager {
        &self.links
    }

    pub fn tasks(&self) -> &RemoteTaskRegistry {
        &self.tasks
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> PasteResult<&Arc<dyn SyncBackend>> {
        self.backend.as_ref().ok_or(PasteboardError::PluginIsNull)
    }

    pub fn local_network_id(&self) -> String {
        self.device.local_network_id()
    }

    // ── Publish side ──────────────────────────────────────────────────────────

    /// Builds the announcement for a payload this device is about to publish.
    pub fn make_event(&self, user_id: u32, data: &PasteData, encoded_len: usize) -> DistributedEvent {
        let timestamp_ms = now_ms();
        DistributedEvent {
            device_id: self.device.local_network_id(),
            user_id,
            seq_id: self.seq.next(),
            timestamp_ms,
            expiration_ms: timestamp_ms.saturating_add(self.settings.event_ttl.as_millis() as u64),
            data_len: encoded_len as u64,
            is_delay: data.is_delay_data() || data.records().iter().any(|r| r.is_delay_record()),
            mime_types: data.mime_types(),
        }
    }

    /// # Errors
    ///
    /// [`PasteboardError::PluginIsNull`] when no backend is configured.
    pub async fn publish(&self, event: DistributedEvent) -> PasteResult<()> {
        let backend = self.backend()?;
        debug!(user_id = event.user_id, seq = event.seq_id, "publishing clipboard event");
        backend.publish(event).await
    }

    /// Withdraws this device's announcement for `user_id`.
    pub async fn withdraw(&self, user_id: u32) -> PasteResult<()> {
        self.backend()?.clear(user_id).await;
        Ok(())
    }

    // ── Consume side ──────────────────────────────────────────────────────────

    /// Newest unexpired event announced by another device for `user_id`.
    ///
    /// # Errors
    ///
    /// [`PasteboardError::PluginIsNull`] when no backend is configured.
    pub async fn latest_remote_event(&self, user_id: u32) -> PasteResult<Option<DistributedEvent>> {
        let backend = self.backend()?;
        let local = self.device.local_network_id();
        let now = now_ms();
        Ok(backend
            .latest_event(user_id)
            .await
            .filter(|e| e.device_id != local && e.expiration_ms > now))
    }

    /// Downloads and decodes the payload behind `event` on behalf of `pid`.
    ///
    /// Concurrent callers for the same event share one fetch.
    pub async fn fetch_remote_data(&self, event: &DistributedEvent, pid: u32) -> PasteResult<PasteData> {
        self.links
            .establish_p2p_link(&event.device_id, pid, event.data_len)
            .await?;

        let transport = Arc::clone(&self.transport);
        let owned = event.clone();
        let bytes = self
            .tasks
            .wait_remote_data(event, move || -> FetchFuture {
                Box::pin(async move { transport.fetch_event(&owned).await })
            })
            .await?;

        let mut data = decode_paste_data(&bytes).map_err(|e| {
            warn!(error = %e, device = %event.device_id, "remote payload did not decode");
            PasteboardError::Serialization
        })?;
        data.props_mut().is_remote = true;
        data.props_mut().device_id = event.device_id.clone();
        Ok(data)
    }

    /// Downloads one delayed entry as a transient payload.
    ///
    /// # Errors
    ///
    /// [`PasteboardError::RemoteDataFailed`] on link failure, timeout or a
    /// reply that does not decode.
    pub async fn fetch_remote_entry(
        &self,
        event: &DistributedEvent,
        pid: u32,
        record_id: u32,
        utd_id: &str,
    ) -> PasteResult<PasteData> {
        self.links
            .establish_p2p_link(&event.device_id, pid, event.data_len)
            .await?;
        let bytes = tokio::time::timeout(
            self.settings.task_timeout,
            self.transport.fetch_entry(event, record_id, utd_id),
        )
        .await
        .map_err(|_| {
            warn!(device = %event.device_id, record_id, utd_id, "remote entry fetch timed out");
            PasteboardError::RemoteDataFailed
        })?
        .map_err(|e| {
            debug!(error = %e, "remote entry fetch failed");
            PasteboardError::RemoteDataFailed
        })?;
        decode_paste_data(&bytes).map_err(|e| {
            warn!(error = %e, "remote entry did not decode");
            PasteboardError::RemoteDataFailed
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
