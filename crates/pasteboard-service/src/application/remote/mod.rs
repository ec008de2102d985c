//! Cross-device synchronisation.
//!
//! - **`p2p`**   – Link records per peer network id, with bounded waits.
//! - **`tasks`** – One outstanding fetch per `(device_id, seq_id)`.
//! - **`sync`**  – Publishes local changes and pulls remote ones.

pub mod p2p;
pub mod sync;
pub mod tasks;

pub use p2p::{LinkState, LinkWaitPolicy, P2pLinkManager};
pub use sync::{now_ms, RemoteSettings, RemoteSyncCoordinator};
pub use tasks::{FetchFuture, RemoteTaskRegistry, TaskKey};
