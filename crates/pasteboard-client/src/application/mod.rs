//! Application layer of the client.
//!
//! - **`port`**     – The [`port::PasteboardPort`] trait the use cases talk
//!   to, and the client error type.
//! - **`commands`** – One use case per `pbctl` subcommand plus output
//!   rendering (plain text or JSON).

pub mod commands;
pub mod port;
