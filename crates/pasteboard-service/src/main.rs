//! Pasteboard daemon entry point.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load ServiceConfig          -- --config, else the platform config file
//!  └─ assemble()                  -- collaborators, peer link, sync backend, service
//!  └─ start tasks
//!       ├─ IpcServer              (local clients)
//!       ├─ PeerLinkServer         (other devices)
//!       └─ aging sweep            (evicts expired payloads)
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pasteboard_service::infrastructure::assembly::assemble;
use pasteboard_service::infrastructure::network::ipc_server::{ipc_bind_addr, IpcServer};
use pasteboard_service::infrastructure::network::peer_link::peer_bind_addr;
use pasteboard_service::infrastructure::network::bind;
use pasteboard_service::infrastructure::storage::config::{load_config, load_config_from};

/// System-wide clipboard daemon.
#[derive(Debug, Parser)]
#[command(name = "pasteboardd", version, about)]
struct Args {
    /// Configuration file; defaults to the platform config directory.
    #[arg(long, env = "PASTEBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Address the IPC server binds, overriding `[ipc] bind_address`.
    #[arg(long, env = "PASTEBOARD_BIND")]
    bind: Option<String>,

    /// IPC port, overriding `[ipc] port`.
    #[arg(long, env = "PASTEBOARD_PORT")]
    port: Option<u16>,

    /// Peer link port, overriding `[remote] peer_port`.
    #[arg(long, env = "PASTEBOARD_PEER_PORT")]
    peer_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .context("loading configuration")?;
    if let Some(bind) = args.bind {
        config.ipc.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.ipc.port = port;
    }
    if let Some(port) = args.peer_port {
        config.remote.peer_port = port;
    }

    // Structured logging.  `RUST_LOG` wins over the configured level.
    let default_level = config.service.log_level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!(
        network_id = %config.identity.network_id,
        peers = config.peers.len(),
        "pasteboard daemon starting"
    );

    let assembly = assemble(&config);

    // Shutdown flag shared across all background services.
    let running = Arc::new(AtomicBool::new(true));

    // ── IPC server ────────────────────────────────────────────────────────────
    let ipc_addr = ipc_bind_addr(&config.ipc.bind_address, config.ipc.port)
        .map_err(anyhow::Error::msg)?;
    let ipc_listener = bind(ipc_addr).await?;
    let ipc = Arc::new(IpcServer::new(Arc::clone(&assembly.dispatcher)));
    tokio::spawn(ipc.run(ipc_listener, Arc::clone(&running)));

    // ── Peer link server ──────────────────────────────────────────────────────
    if config.remote.disallow_distributed {
        info!("cross-device sync disabled; peer link server not started");
    } else {
        match bind(peer_bind_addr(config.remote.peer_port)).await {
            Ok(listener) => {
                tokio::spawn(
                    Arc::clone(&assembly.peer_server).run(listener, Arc::clone(&running)),
                );
            }
            Err(e) => error!("peer link server unavailable: {e}"),
        }
    }

    // ── Aging sweep ───────────────────────────────────────────────────────────
    let sweep_interval = config.service.aging_sweep_interval();
    let service = Arc::clone(&assembly.service);
    let running_sweep = Arc::clone(&running);
    tokio::spawn(async move {
        while running_sweep.load(Ordering::Relaxed) {
            tokio::time::sleep(sweep_interval).await;
            let evicted = service.sweep_aged_data();
            if evicted > 0 {
                info!(evicted, "aged clipboard payloads evicted");
            }
        }
    });

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!(%ipc_addr, "pasteboard daemon ready.  Press Ctrl-C to exit.");

    loop {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if !running.load(Ordering::Relaxed) {
            break;
        }
    }

    info!("pasteboard daemon stopped");
    Ok(())
}
