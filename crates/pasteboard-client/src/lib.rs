//! pasteboard-client library entry point.
//!
//! Re-exports the module tree shared by the `pbctl` binary and the
//! integration tests in `tests/`.
//!
//! # What does the client do? (for beginners)
//!
//! Applications never touch the clipboard store directly.  They open a TCP
//! connection to the pasteboard daemon and send it requests: "here is what
//! the user copied", "what is on the clipboard now?", "is it from another
//! device?".  [`infrastructure::network::PasteboardClient`] speaks that
//! protocol, and the [`application::commands`] module turns command-line
//! subcommands into requests.

/// Application layer: the daemon port and the CLI use cases.
pub mod application;

/// Infrastructure layer: the TCP client.
pub mod infrastructure;
