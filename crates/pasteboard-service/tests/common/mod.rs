//! Shared fixtures for the integration tests.
//!
//! Builds real daemons (configuration-backed collaborators, TCP peer link)
//! on ephemeral loopback ports.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pasteboard_core::CallerInfo;
use pasteboard_service::infrastructure::assembly::{assemble, Assembly};
use pasteboard_service::infrastructure::network::ipc_server::IpcServer;
use pasteboard_service::infrastructure::storage::config::{PeerEntry, ServiceConfig};
use tokio::net::TcpListener;

/// Unlisted token: default user, read permission granted.
pub const CALLER: CallerInfo = CallerInfo {
    token_id: 0x5005,
    pid: 4242,
};

/// One running daemon.
pub struct Node {
    pub assembly: Assembly,
    pub peer_addr: SocketAddr,
    running: Arc<AtomicBool>,
}

impl Node {
    /// Serves IPC on an ephemeral port and returns its address.
    pub async fn serve_ipc(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(IpcServer::new(Arc::clone(&self.assembly.dispatcher)));
        tokio::spawn(server.run(listener, Arc::clone(&self.running)));
        addr
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

pub fn config(network_id: &str, device_name: &str) -> ServiceConfig {
    let mut cfg = ServiceConfig::default();
    cfg.identity.network_id = network_id.to_string();
    cfg.identity.device_name = device_name.to_string();
    cfg.remote.p2p_min_wait_ms = 2_000;
    cfg
}

fn peer(network_id: &str, name: &str, addr: SocketAddr) -> PeerEntry {
    PeerEntry {
        network_id: network_id.to_string(),
        name: name.to_string(),
        address: addr.to_string(),
    }
}

async fn start(mut cfg: ServiceConfig, listener: TcpListener, peers: Vec<PeerEntry>) -> Node {
    cfg.peers = peers;
    let peer_addr = listener.local_addr().unwrap();
    let assembly = assemble(&cfg);
    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(Arc::clone(&assembly.peer_server).run(listener, Arc::clone(&running)));
    Node {
        assembly,
        peer_addr,
        running,
    }
}

/// Two daemons, "Desk" (`net-a`) and "Laptop" (`net-b`), that know each other.
pub async fn pair_with(desk: ServiceConfig, laptop: ServiceConfig) -> (Node, Node) {
    let desk_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let laptop_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let desk_addr = desk_listener.local_addr().unwrap();
    let laptop_addr = laptop_listener.local_addr().unwrap();

    let a = start(desk, desk_listener, vec![peer("net-b", "Laptop", laptop_addr)]).await;
    let b = start(laptop, laptop_listener, vec![peer("net-a", "Desk", desk_addr)]).await;
    (a, b)
}

pub async fn pair() -> (Node, Node) {
    pair_with(config("net-a", "Desk"), config("net-b", "Laptop")).await
}

/// Polls `check` until it holds or three seconds pass.
pub async fn eventually<F, Fut>(check: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..60 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
