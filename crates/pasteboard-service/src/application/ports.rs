//! Collaborator seams the clipboard core depends on.
//!
//! Everything the service needs from the outside world (token verification,
//! app metadata, device discovery, focus, the peer transport and the sync
//! backend) is reached through one of these traits.  Concrete adapters live
//! in `infrastructure`; tests inject doubles.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use pasteboard_core::protocol::messages::DistributedEvent;
use pasteboard_core::PasteResult;

/// Permission that lets a token read the clipboard without being focused.
pub const READ_PASTEBOARD_PERMISSION: &str = "pasteboard.permission.READ";

/// Permission required for the administrator share-option operations.
pub const MANAGE_SHARE_OPTION_PERMISSION: &str = "pasteboard.permission.MANAGE_SHARE_OPTION";

// ── Token service ─────────────────────────────────────────────────────────────

/// Kind of process a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenType {
    /// An installed application.
    #[default]
    Hap,
    /// A system process.
    Native,
    Shell,
}

/// What the token service knows about one access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub bundle_name: String,
    pub user_id: u32,
    pub token_type: TokenType,
    pub app_index: i32,
}

/// Access-token verification.
#[cfg_attr(test, mockall::automock)]
pub trait TokenService: Send + Sync {
    /// `true` if `token_id` has been granted `permission`.
    fn verify_token(&self, token_id: u32, permission: &str) -> bool;

    /// Looks up the owner of `token_id`.
    fn get_token_info(&self, token_id: u32) -> Option<TokenInfo>;
}

// ── Bundle service ────────────────────────────────────────────────────────────

/// Application metadata.  The service tolerates this being absent.
#[cfg_attr(test, mockall::automock)]
pub trait BundleService: Send + Sync {
    /// Display label of the application owning `token_id`.
    fn get_app_label(&self, token_id: u32) -> Option<String>;
}

// ── Device discovery ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceType {
    #[default]
    Phone,
    Tablet,
    Pc,
    Unknown,
}

/// Trusted-device discovery.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceService: Send + Sync {
    /// Network ids of every trusted peer that is currently online.
    fn get_network_ids(&self) -> Vec<String>;

    /// Network id of this device.
    fn local_network_id(&self) -> String;

    fn local_device_name(&self) -> String;

    fn get_local_device_type(&self) -> DeviceType;

    fn get_remote_device_name(&self, network_id: &str) -> Option<String>;

    /// Address of the peer's link server.
    fn peer_address(&self, network_id: &str) -> Option<SocketAddr>;
}

// ── Ability / focus service ───────────────────────────────────────────────────

/// Request to start an out-of-process UI component.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AbilityIntent {
    pub bundle_name: String,
    pub ability_name: String,
    pub params: BTreeMap<String, String>,
}

/// Window focus and UI launching.
#[cfg_attr(test, mockall::automock)]
pub trait AbilityService: Send + Sync {
    /// `true` if `token_id` owns the focused window.
    fn is_focused_app(&self, token_id: u32) -> bool;

    /// `true` if `token_id` is a UI extension embedded in the focused window.
    fn check_ui_extension_is_focused(&self, token_id: u32) -> bool;

    /// Starts the ability described by `intent`; `0` means success.
    fn start_ability(&self, intent: &AbilityIntent) -> i32;
}

// ── Peer transport ────────────────────────────────────────────────────────────

/// Point-to-point transport to other devices.
///
/// `fetch_event` and `fetch_entry` assume the link to `event.device_id` has
/// been opened with [`LinkTransport::open_link`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkTransport: Send + Sync {
    async fn open_link(&self, network_id: &str) -> PasteResult<()>;

    async fn close_link(&self, network_id: &str);

    /// Downloads the encoded payload behind `event`.
    async fn fetch_event(&self, event: &DistributedEvent) -> PasteResult<Vec<u8>>;

    /// Downloads one delayed entry as an encoded transient payload whose first
    /// record carries the requested value.
    async fn fetch_entry(
        &self,
        event: &DistributedEvent,
        record_id: u32,
        utd_id: &str,
    ) -> PasteResult<Vec<u8>>;
}

// ── Sync backend ──────────────────────────────────────────────────────────────

/// Publishes and consumes clipboard change events across devices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// Announces a local change to every peer.
    async fn publish(&self, event: DistributedEvent) -> PasteResult<()>;

    /// Most recent event announced by any peer for `user_id`.
    async fn latest_event(&self, user_id: u32) -> Option<DistributedEvent>;

    /// Withdraws this device's event for `user_id`.
    async fn clear(&self, user_id: u32);
}
