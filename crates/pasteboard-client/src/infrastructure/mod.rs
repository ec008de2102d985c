//! Infrastructure layer for the client.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `pasteboard_core`, but MUST NOT be imported by the `application` layer.
//!
//! - **`network`** – TCP connection to the daemon's IPC listener, with the
//!   framing and fragment handling needed for large payloads.

pub mod network;
