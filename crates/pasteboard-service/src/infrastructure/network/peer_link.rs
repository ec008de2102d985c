//! Device-to-device link over TCP.
//!
//! # Outbound: [`TcpLinkTransport`]
//!
//! One request, one reply.  Idle connections are pooled per peer; a request
//! takes its connection out of the pool and only puts it back once the reply
//! has been read in full.  A request abandoned mid-way (for example by a
//! fetch timeout) therefore drops its connection instead of leaving a
//! half-read reply behind for the next caller.
//!
//! # Inbound: [`PeerLinkServer`]
//!
//! ```text
//! FetchEvent   ──► serve_peer_event  ──► PeerData | Status(err)
//! FetchEntry   ──► serve_peer_entry  ──► PeerData | Status(err)
//! PublishEvent ──► PeerSyncBackend   ──► Status
//! Ping         ──────────────────────► Pong
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use pasteboard_core::protocol::messages::{DistributedEvent, FetchEntryRequest, FetchEventRequest};
use pasteboard_core::protocol::SequenceCounter;
use pasteboard_core::{PasteMessage, PasteResult, PasteboardError, E_OK};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::framing::{read_frame, write_frame, FrameError};
use super::peer_sync::PeerSyncBackend;
use crate::application::ports::{DeviceService, LinkTransport};
use crate::application::service::PasteboardService;

/// Default bound on establishing a TCP connection to a peer.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ── Outbound transport ────────────────────────────────────────────────────────

/// [`LinkTransport`] that reaches peers at the addresses the device service
/// reports.
pub struct TcpLinkTransport {
    device: Arc<dyn DeviceService>,
    idle: Mutex<HashMap<String, TcpStream>>,
    seq: SequenceCounter,
    connect_timeout: Duration,
}

impl TcpLinkTransport {
    pub fn new(device: Arc<dyn DeviceService>) -> Self {
        Self::with_connect_timeout(device, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(device: Arc<dyn DeviceService>, connect_timeout: Duration) -> Self {
        Self {
            device,
            idle: Mutex::new(HashMap::new()),
            seq: SequenceCounter::new(),
            connect_timeout,
        }
    }

    /// Number of pooled idle connections.
    pub fn idle_links(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn take_idle(&self, network_id: &str) -> Option<TcpStream> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(network_id)
    }

    fn put_idle(&self, network_id: &str, stream: TcpStream) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(network_id.to_string(), stream);
    }

    async fn connect(&self, network_id: &str) -> PasteResult<TcpStream> {
        let Some(addr) = self.device.peer_address(network_id) else {
            debug!(network_id, "no address known for peer");
            return Err(PasteboardError::RemoteDataFailed);
        };
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                warn!(network_id, %addr, "connect to peer timed out");
                PasteboardError::RemoteDataFailed
            })?
            .map_err(|e| {
                warn!(network_id, %addr, error = %e, "connect to peer failed");
                PasteboardError::RemoteDataFailed
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not disable Nagle");
        }
        Ok(stream)
    }

    async fn exchange(
        &self,
        stream: &mut TcpStream,
        request: &PasteMessage,
    ) -> Result<PasteMessage, FrameError> {
        write_frame(stream, request, &self.seq).await?;
        read_frame(stream).await?.ok_or(FrameError::Closed)
    }

    /// Sends `request` to `network_id` and returns the reply frame.
    ///
    /// A pooled connection that turns out to be dead is replaced by a fresh
    /// one once.
    async fn round_trip(
        &self,
        network_id: &str,
        request: &PasteMessage,
    ) -> PasteResult<PasteMessage> {
        if let Some(mut stream) = self.take_idle(network_id) {
            match self.exchange(&mut stream, request).await {
                Ok(reply) => {
                    self.put_idle(network_id, stream);
                    return Ok(reply);
                }
                Err(e) => debug!(network_id, error = %e, "pooled peer connection failed; reconnecting"),
            }
        }

        let mut stream = self.connect(network_id).await?;
        let reply = self.exchange(&mut stream, request).await.map_err(|e| {
            warn!(network_id, error = %e, "peer exchange failed");
            PasteboardError::RemoteDataFailed
        })?;
        self.put_idle(network_id, stream);
        Ok(reply)
    }

    /// Requests bytes that come back as `PeerData`.
    async fn fetch(&self, network_id: &str, request: PasteMessage) -> PasteResult<Vec<u8>> {
        match self.round_trip(network_id, &request).await? {
            PasteMessage::PeerData(bytes) => Ok(bytes),
            PasteMessage::Status(code) => {
                debug!(network_id, code, "peer refused fetch");
                Err(PasteboardError::from_code(code).unwrap_or(PasteboardError::RemoteDataFailed))
            }
            other => {
                warn!(network_id, reply = ?other.message_type(), "unexpected reply to fetch");
                Err(PasteboardError::RemoteDataFailed)
            }
        }
    }

    /// Pushes a change event to `network_id`.
    ///
    /// # Errors
    ///
    /// [`PasteboardError::RemoteDataFailed`] if the peer is unreachable or
    /// does not acknowledge the event.
    pub async fn send_event(&self, network_id: &str, event: &DistributedEvent) -> PasteResult<()> {
        match self
            .round_trip(network_id, &PasteMessage::PublishEvent(event.clone()))
            .await?
        {
            PasteMessage::Status(E_OK) => Ok(()),
            other => {
                debug!(network_id, reply = ?other, "peer did not accept event");
                Err(PasteboardError::RemoteDataFailed)
            }
        }
    }
}

#[async_trait]
impl LinkTransport for TcpLinkTransport {
    async fn open_link(&self, network_id: &str) -> PasteResult<()> {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(network_id);
        if pooled {
            return Ok(());
        }
        let stream = self.connect(network_id).await?;
        info!(network_id, "peer link open");
        self.put_idle(network_id, stream);
        Ok(())
    }

    async fn close_link(&self, network_id: &str) {
        if self.take_idle(network_id).is_some() {
            info!(network_id, "peer link closed");
        }
    }

    async fn fetch_event(&self, event: &DistributedEvent) -> PasteResult<Vec<u8>> {
        self.fetch(
            &event.device_id,
            PasteMessage::FetchEvent(FetchEventRequest {
                user_id: event.user_id,
                seq_id: event.seq_id,
            }),
        )
        .await
    }

    async fn fetch_entry(
        &self,
        event: &DistributedEvent,
        record_id: u32,
        utd_id: &str,
    ) -> PasteResult<Vec<u8>> {
        self.fetch(
            &event.device_id,
            PasteMessage::FetchEntry(FetchEntryRequest {
                user_id: event.user_id,
                seq_id: event.seq_id,
                record_id,
                utd_id: utd_id.to_string(),
            }),
        )
        .await
    }
}

// ── Inbound server ────────────────────────────────────────────────────────────

/// Answers fetches and event pushes from other devices.
pub struct PeerLinkServer {
    service: Arc<PasteboardService>,
    inbox: Option<Arc<PeerSyncBackend>>,
}

impl PeerLinkServer {
    pub fn new(service: Arc<PasteboardService>, inbox: Option<Arc<PeerSyncBackend>>) -> Self {
        Self { service, inbox }
    }

    /// Accepts peers on `listener` until `running` is cleared.
    pub async fn run(self: Arc<Self>, listener: TcpListener, running: Arc<AtomicBool>) {
        super::accept_loop(listener, running, "peer-link", move |stream, addr, conn_id| {
            let this = Arc::clone(&self);
            async move {
                match this.serve_connection(stream, conn_id).await {
                    Ok(()) => debug!(%conn_id, %addr, "peer disconnected"),
                    Err(e) => warn!(%conn_id, %addr, error = %e, "peer connection dropped"),
                }
            }
        })
        .await;
    }

    /// Answers requests on one connection until the peer closes it.
    pub async fn serve_connection<S>(&self, stream: S, conn_id: Uuid) -> Result<(), FrameError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let seq = SequenceCounter::new();
        while let Some(request) = read_frame(&mut reader).await? {
            debug!(%conn_id, request = ?request.message_type(), "peer request");
            let reply = self.handle(request).await;
            write_frame(&mut writer, &reply, &seq).await?;
        }
        Ok(())
    }

    /// Produces the reply frame for one peer request.
    pub async fn handle(&self, request: PasteMessage) -> PasteMessage {
        let result = match request {
            PasteMessage::FetchEvent(r) => self.service.serve_peer_event(r.user_id, r.seq_id),
            PasteMessage::FetchEntry(r) => {
                self.service
                    .serve_peer_entry(r.user_id, r.seq_id, r.record_id, &r.utd_id)
                    .await
            }
            PasteMessage::PublishEvent(event) => {
                return match &self.inbox {
                    Some(inbox) => {
                        inbox.accept(event);
                        PasteMessage::Status(E_OK)
                    }
                    None => PasteMessage::Status(PasteboardError::PluginIsNull.code()),
                };
            }
            PasteMessage::Ping(n) => return PasteMessage::Pong(n),
            other => {
                debug!(request = ?other.message_type(), "not a peer request");
                Err(PasteboardError::InvalidParam)
            }
        };
        match result {
            Ok(bytes) => PasteMessage::PeerData(bytes),
            Err(e) => PasteMessage::Status(e.code()),
        }
    }
}

/// Address the peer link server binds for `port`.
pub fn peer_bind_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], port))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::SyncBackend;
    use crate::infrastructure::assembly::{assemble, Assembly};
    use crate::infrastructure::collaborators::StaticDeviceService;
    use crate::infrastructure::storage::config::{PeerEntry, ServiceConfig};
    use pasteboard_core::model::decode_paste_data;
    use pasteboard_core::{CallerInfo, PasteData};
    use std::sync::atomic::Ordering;

    const WRITER: CallerInfo = CallerInfo { token_id: 5, pid: 6 };

    fn config(network_id: &str) -> ServiceConfig {
        let mut cfg = ServiceConfig::default();
        cfg.identity.network_id = network_id.to_string();
        cfg
    }

    /// Starts `assembly`'s peer server on an ephemeral port.
    async fn serve(assembly: &Assembly) -> (SocketAddr, Arc<AtomicBool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let running = Arc::new(AtomicBool::new(true));
        tokio::spawn(Arc::clone(&assembly.peer_server).run(listener, Arc::clone(&running)));
        (addr, running)
    }

    fn transport_to(network_id: &str, addr: SocketAddr) -> TcpLinkTransport {
        let device = StaticDeviceService::new(
            "net-b",
            "Laptop",
            &[PeerEntry {
                network_id: network_id.to_string(),
                name: "Desk".to_string(),
                address: addr.to_string(),
            }],
        );
        TcpLinkTransport::new(Arc::new(device))
    }

    fn event_for(seq_id: u64) -> DistributedEvent {
        DistributedEvent {
            device_id: "net-a".to_string(),
            user_id: 100,
            seq_id,
            timestamp_ms: 1,
            expiration_ms: u64::MAX,
            data_len: 0,
            is_delay: false,
            mime_types: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_fetch_event_downloads_published_snapshot() {
        // Arrange
        let desk = assemble(&config("net-a"));
        desk.service
            .set_paste_data(WRITER, PasteData::with_text("from desk"), None)
            .await
            .unwrap();
        let (addr, running) = serve(&desk).await;
        let transport = transport_to("net-a", addr);

        // Act
        transport.open_link("net-a").await.unwrap();
        let bytes = transport.fetch_event(&event_for(1)).await.unwrap();

        // Assert
        let data = decode_paste_data(&bytes).unwrap();
        assert_eq!(data.primary_text(), Some("from desk"));
        assert_eq!(transport.idle_links(), 1, "connection returns to the pool");
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_fetch_event_for_unknown_sequence_reports_peer_status() {
        let desk = assemble(&config("net-a"));
        let (addr, running) = serve(&desk).await;
        let transport = transport_to("net-a", addr);

        let result = transport.fetch_event(&event_for(99)).await;

        assert_eq!(result, Err(PasteboardError::NoData));
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_send_event_lands_in_peer_inbox() {
        // Arrange
        let desk = assemble(&config("net-a"));
        let (addr, running) = serve(&desk).await;
        let transport = transport_to("net-a", addr);
        let mut event = event_for(3);
        event.device_id = "net-b".to_string();

        // Act
        transport.send_event("net-a", &event).await.unwrap();

        // Assert
        let latest = desk.sync.latest_event(100).await;
        assert_eq!(latest, Some(event));
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_open_link_to_unknown_peer_fails() {
        let transport = TcpLinkTransport::new(Arc::new(StaticDeviceService::new("net-b", "Laptop", &[])));

        let result = transport.open_link("net-z").await;

        assert_eq!(result, Err(PasteboardError::RemoteDataFailed));
    }

    #[tokio::test]
    async fn test_close_link_drops_pooled_connection() {
        let desk = assemble(&config("net-a"));
        let (addr, running) = serve(&desk).await;
        let transport = transport_to("net-a", addr);
        transport.open_link("net-a").await.unwrap();

        transport.close_link("net-a").await;

        assert_eq!(transport.idle_links(), 0);
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_handle_answers_ping_and_rejects_ipc_requests() {
        let desk = assemble(&config("net-a"));

        assert_eq!(desk.peer_server.handle(PasteMessage::Ping(7)).await, PasteMessage::Pong(7));
        assert_eq!(
            desk.peer_server.handle(PasteMessage::GetChangeCount(WRITER)).await,
            PasteMessage::Status(PasteboardError::InvalidParam.code())
        );
    }
}
