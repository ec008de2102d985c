//! pasteboard-service library entry point.
//!
//! Re-exports the module tree so that integration tests in `tests/` and the
//! `pasteboardd` binary share it.

pub mod application;
pub mod infrastructure;
