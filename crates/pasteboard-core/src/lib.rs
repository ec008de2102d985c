//! # pasteboard-core
//!
//! Shared library for the pasteboard service containing the clipboard record
//! model, its binary codec, the payload transfer layer and the wire protocol
//! spoken over IPC and between peer daemons.
//!
//! This crate is used by both the daemon and the client.  It has no
//! dependency on sockets or async runtimes; the only OS resource it touches
//! is the anonymous spool file behind a [`transfer::SharedRegion`].
//!
//! # Architecture overview (for beginners)
//!
//! The pasteboard is a system-wide clipboard.  A *producer* process copies a
//! [`PasteData`] into the daemon, and *consumer* processes (possibly on other
//! devices) paste it back out.
//!
//! - **`model`** – What a clipboard payload looks like: records, typed
//!   entries (text, HTML, URI, want, pixel map, custom bytes), and the policy
//!   attributes stamped on it (share option, screen status, origin).
//!
//! - **`transfer`** – How a payload crosses a process boundary: inline for
//!   small payloads, through a shared region with strict size checks for
//!   large ones.
//!
//! - **`protocol`** – How requests and replies travel: a 24-byte header plus
//!   a typed payload, decoded back into [`PasteMessage`] on the other end.
//!
//! - **`error`** – The [`PasteboardError`] taxonomy every operation returns.

pub mod error;
pub mod model;
pub mod protocol;
pub mod transfer;

// Re-export the most-used types at the crate root so callers can write
// `pasteboard_core::PasteData` instead of `pasteboard_core::model::paste_data::PasteData`.
pub use error::{PasteResult, PasteboardError, E_OK};
pub use model::{
    EntryValue, PasteData, PasteDataEntry, PasteDataProperty, PasteRecord, ScreenStatus,
    ShareOption,
};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::{CallerInfo, PasteMessage};
