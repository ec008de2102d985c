//! Network infrastructure for the pasteboard daemon.
//!
//! # Sockets (for beginners)
//!
//! The daemon listens on two TCP ports:
//!
//! | Listener          | Default bind        | Traffic                                       |
//! |-------------------|---------------------|-----------------------------------------------|
//! | IPC server        | `127.0.0.1:24810`   | Local apps: set/get/query requests             |
//! | Peer link server  | `0.0.0.0:24811`     | Other devices: change events, payload fetches  |
//!
//! Both speak the same framed protocol from `pasteboard_core::protocol`.
//!
//! # Sub-modules
//!
//! - **`framing`**    – Frame and fragment-run I/O over async streams.
//! - **`ipc_server`** – Local request/reply loop driving the dispatch table.
//! - **`peer_link`**  – Outbound [`LinkTransport`](crate::application::ports::LinkTransport)
//!   over TCP and the inbound server that answers peers.
//! - **`peer_sync`**  – [`SyncBackend`](crate::application::ports::SyncBackend)
//!   that pushes change events to peers and remembers theirs.

pub mod framing;
pub mod ipc_server;
pub mod peer_link;
pub mod peer_sync;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How often an idle accept loop re-checks the running flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Error type for listener setup.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Binds a TCP listener on `addr`.
///
/// # Errors
///
/// [`NetworkError::BindFailed`] if the address is in use or not local.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, NetworkError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| NetworkError::BindFailed { addr, source })
}

/// Accepts connections until `running` is cleared, handing each one to
/// `handler` on its own task together with a fresh connection id.
pub async fn accept_loop<F, Fut>(
    listener: TcpListener,
    running: Arc<AtomicBool>,
    name: &'static str,
    handler: F,
) where
    F: Fn(TcpStream, SocketAddr, Uuid) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(listener = name, %addr, "listening");
    }
    while running.load(Ordering::Relaxed) {
        let (stream, addr) = match tokio::time::timeout(ACCEPT_POLL, listener.accept()).await {
            Err(_) => continue,
            Ok(Err(e)) => {
                warn!(listener = name, error = %e, "accept failed");
                continue;
            }
            Ok(Ok(pair)) => pair,
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not disable Nagle");
        }
        let conn_id = Uuid::new_v4();
        debug!(listener = name, %conn_id, %addr, "connection accepted");
        tokio::spawn(handler(stream, addr, conn_id));
    }
    info!(listener = name, "stopped accepting");
}
