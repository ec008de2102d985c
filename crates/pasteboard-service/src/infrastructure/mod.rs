//! Infrastructure layer of the pasteboard daemon.
//!
//! Contains the OS-facing adapters: TCP listeners and the peer transport,
//! the configuration file, and the configuration-backed collaborators.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `pasteboard_core`, but MUST NOT be imported by the `application` layer.

pub mod assembly;
pub mod collaborators;
pub mod network;
pub mod storage;
