//! Collaborators backed by the configuration file and in-process state.
//!
//! A desktop host has no access-token service, app registry or window
//! manager hook the daemon could query, so these adapters answer from the
//! `[[apps]]`, `[identity]` and `[[peers]]` sections instead.  Focus is
//! pushed in from outside through [`FocusTracker`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::application::ports::{
    AbilityIntent, AbilityService, BundleService, DeviceService, DeviceType, TokenInfo,
    TokenService, TokenType, READ_PASTEBOARD_PERMISSION,
};
use crate::infrastructure::storage::config::{AppEntry, PeerEntry, ServiceConfig};

// ── Tokens ────────────────────────────────────────────────────────────────────

/// Token lookups against the `[[apps]]` table.
///
/// Tokens that are not listed belong to the default user and are treated as
/// native processes; they hold the read permission when
/// `grant_unlisted_read` is set.
#[derive(Debug, Clone)]
pub struct ConfigTokenService {
    apps: HashMap<u32, AppEntry>,
    default_user_id: u32,
    grant_unlisted_read: bool,
}

impl ConfigTokenService {
    pub fn new(apps: &[AppEntry], default_user_id: u32, grant_unlisted_read: bool) -> Self {
        Self {
            apps: apps.iter().map(|a| (a.token_id, a.clone())).collect(),
            default_user_id,
            grant_unlisted_read,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            &config.apps,
            config.identity.default_user_id,
            config.identity.grant_unlisted_read,
        )
    }
}

impl TokenService for ConfigTokenService {
    fn verify_token(&self, token_id: u32, permission: &str) -> bool {
        match self.apps.get(&token_id) {
            Some(app) => app.permissions.iter().any(|p| p == permission),
            None => self.grant_unlisted_read && permission == READ_PASTEBOARD_PERMISSION,
        }
    }

    fn get_token_info(&self, token_id: u32) -> Option<TokenInfo> {
        let info = match self.apps.get(&token_id) {
            Some(app) => TokenInfo {
                bundle_name: app.bundle_name.clone(),
                user_id: app.user_id,
                token_type: TokenType::Hap,
                app_index: app.app_index,
            },
            None => TokenInfo {
                bundle_name: format!("native.{token_id}"),
                user_id: self.default_user_id,
                token_type: TokenType::Native,
                app_index: 0,
            },
        };
        Some(info)
    }
}

// ── Bundles ───────────────────────────────────────────────────────────────────

/// App labels from the `[[apps]]` table.
#[derive(Debug, Clone, Default)]
pub struct ConfigBundleService {
    labels: HashMap<u32, String>,
}

impl ConfigBundleService {
    pub fn new(apps: &[AppEntry]) -> Self {
        Self {
            labels: apps
                .iter()
                .filter_map(|a| a.label.clone().map(|l| (a.token_id, l)))
                .collect(),
        }
    }
}

impl BundleService for ConfigBundleService {
    fn get_app_label(&self, token_id: u32) -> Option<String> {
        self.labels.get(&token_id).cloned()
    }
}

// ── Devices ───────────────────────────────────────────────────────────────────

/// This device's identity plus the statically configured peers.
///
/// Every configured peer is reported online; a peer that is actually down
/// surfaces as a link failure when it is first used.
#[derive(Debug, Clone)]
pub struct StaticDeviceService {
    network_id: String,
    device_name: String,
    peers: BTreeMap<String, PeerEntry>,
}

impl StaticDeviceService {
    pub fn new(network_id: impl Into<String>, device_name: impl Into<String>, peers: &[PeerEntry]) -> Self {
        Self {
            network_id: network_id.into(),
            device_name: device_name.into(),
            peers: peers
                .iter()
                .map(|p| (p.network_id.clone(), p.clone()))
                .collect(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.identity.network_id.clone(),
            config.identity.device_name.clone(),
            &config.peers,
        )
    }
}

impl DeviceService for StaticDeviceService {
    fn get_network_ids(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    fn local_network_id(&self) -> String {
        self.network_id.clone()
    }

    fn local_device_name(&self) -> String {
        self.device_name.clone()
    }

    fn get_local_device_type(&self) -> DeviceType {
        DeviceType::Pc
    }

    fn get_remote_device_name(&self, network_id: &str) -> Option<String> {
        self.peers.get(network_id).map(|p| p.name.clone())
    }

    fn peer_address(&self, network_id: &str) -> Option<SocketAddr> {
        let peer = self.peers.get(network_id)?;
        if let Ok(addr) = peer.address.parse::<SocketAddr>() {
            return Some(addr);
        }
        match peer.address.to_socket_addrs() {
            Ok(mut addrs) => addrs.next(),
            Err(e) => {
                warn!(network_id, address = %peer.address, error = %e, "peer address does not resolve");
                None
            }
        }
    }
}

// ── Focus ─────────────────────────────────────────────────────────────────────

/// Focus state pushed in by the host session plus a record of started
/// abilities.
///
/// Starting an ability only logs the intent; the configured start result
/// (default `0`) is returned to the caller.
#[derive(Debug, Default)]
pub struct FocusTracker {
    focused: Mutex<Option<u32>>,
    ui_extensions: Mutex<HashSet<u32>>,
    start_result: AtomicI32,
    started: Mutex<Vec<AbilityIntent>>,
}

impl FocusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `token_id` as the owner of the focused window.
    pub fn set_focused(&self, token_id: Option<u32>) {
        *self.focused.lock().unwrap_or_else(PoisonError::into_inner) = token_id;
    }

    /// Registers `token_id` as a UI extension inside the focused window.
    pub fn add_ui_extension(&self, token_id: u32) {
        self.ui_extensions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token_id);
    }

    pub fn remove_ui_extension(&self, token_id: u32) {
        self.ui_extensions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&token_id);
    }

    pub fn set_start_result(&self, code: i32) {
        self.start_result.store(code, Ordering::Relaxed);
    }

    /// Every intent passed to `start_ability`, oldest first.
    pub fn started(&self) -> Vec<AbilityIntent> {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AbilityService for FocusTracker {
    fn is_focused_app(&self, token_id: u32) -> bool {
        *self.focused.lock().unwrap_or_else(PoisonError::into_inner) == Some(token_id)
    }

    fn check_ui_extension_is_focused(&self, token_id: u32) -> bool {
        self.focused
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
            && self
                .ui_extensions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&token_id)
    }

    fn start_ability(&self, intent: &AbilityIntent) -> i32 {
        info!(
            bundle = %intent.bundle_name,
            ability = %intent.ability_name,
            "starting ability"
        );
        debug!(params = ?intent.params, "ability parameters");
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(intent.clone());
        self.start_result.load(Ordering::Relaxed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
