//! Application layer of the pasteboard service.
//!
//! # What lives here? (for beginners)
//!
//! Everything that decides *what* happens to a clipboard payload: who may
//! read it, when it expires, how lazy entries get their values and how
//! changes travel between devices.  None of it opens a socket or a file.
//! Collaborators (token checks, device discovery, the peer transport) are
//! reached through the traits in [`ports`], so tests swap them for doubles
//! and the daemon plugs in the adapters from `infrastructure`.
//!
//! # Sub-modules
//!
//! - **`ports`**     – Collaborator traits and the permission names.
//! - **`store`**     – Per-user payload, copy time, change counter, input
//!   method pid and published snapshot.
//! - **`gate`**      – Screen status, share options and read permission.
//! - **`delay`**     – Request/reply RPC to a producer's delay getter.
//! - **`resolver`**  – Materialises unresolved entries, locally or from a peer.
//! - **`remote`**    – P2P links, fetch de-duplication, publish and pull.
//! - **`observers`** – Change notifications to channel sinks.
//! - **`service`**   – The service context tying all of the above together.
//! - **`dispatch`**  – Opcode to handler table used by the IPC server.

pub mod delay;
pub mod dispatch;
pub mod gate;
pub mod observers;
pub mod ports;
pub mod remote;
pub mod resolver;
pub mod service;
pub mod store;
