//! Adapters for the collaborator ports in [`crate::application::ports`].
//!
//! - **`memory`** – Token, bundle, device and focus services answered from
//!   the configuration file and in-process state.
//!
//! The peer transport and sync backend live in `network`, next to the
//! sockets they drive.

pub mod memory;

pub use memory::{ConfigBundleService, ConfigTokenService, FocusTracker, StaticDeviceService};
