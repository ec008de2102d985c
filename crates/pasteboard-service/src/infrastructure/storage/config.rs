//! TOML-based configuration for the pasteboard daemon.
//!
//! Reads `ServiceConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\Pasteboard\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/pasteboard/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/Pasteboard/config.toml`
//!
//! A missing file is not an error: the daemon starts with defaults.
//!
//! ```toml
//! [service]
//! aged_window_ms = 3600000
//! log_level = "info"
//!
//! [remote]
//! disallow_distributed = false
//! peer_port = 24811
//!
//! [ipc]
//! bind_address = "127.0.0.1"
//! port = 24810
//!
//! [[peers]]
//! network_id = "net-livingroom"
//! name = "Living room tablet"
//! address = "192.168.1.40:24811"
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so a config written by an
//! older daemon (or a partial one written by hand) still loads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::remote::{LinkWaitPolicy, RemoteSettings};
use crate::application::service::ServiceSettings;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level daemon configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub remote: RemoteSection,
    #[serde(default)]
    pub ipc: IpcSection,
    #[serde(default)]
    pub identity: IdentitySection,
    /// Statically known peer devices.
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
    /// Statically registered application tokens.
    #[serde(default)]
    pub apps: Vec<AppEntry>,
}

/// Clipboard policy and housekeeping settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// A payload older than this is evicted on the next read or sweep.
    #[serde(default = "default_aged_window_ms")]
    pub aged_window_ms: u64,
    #[serde(default = "default_aging_sweep_interval_ms")]
    pub aging_sweep_interval_ms: u64,
    /// Upper bound on one delay getter round trip.
    #[serde(default = "default_local_delay_timeout_ms")]
    pub local_delay_timeout_ms: u64,
    #[serde(default = "default_max_observers_per_pid")]
    pub max_observers_per_pid: usize,
    #[serde(default = "default_max_global_share_options")]
    pub max_global_share_options: usize,
}

/// Cross-device synchronisation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteSection {
    /// Upper bound on one remote payload or entry fetch.
    #[serde(default = "default_remote_task_timeout_ms")]
    pub remote_task_timeout_ms: u64,
    /// Shortest time a caller waits for a P2P link to come up.
    #[serde(default = "default_p2p_min_wait_ms")]
    pub p2p_min_wait_ms: u64,
    /// Assumed link throughput used to stretch the wait for large payloads.
    #[serde(default = "default_p2p_baseline_bytes_per_sec")]
    pub p2p_baseline_bytes_per_sec: u64,
    /// Administrator switch that turns all cross-device traffic off.
    #[serde(default)]
    pub disallow_distributed: bool,
    /// TCP port the peer link server listens on.
    #[serde(default = "default_peer_port")]
    pub peer_port: u16,
    /// Lifetime of a published change event.
    #[serde(default = "default_event_ttl_ms")]
    pub event_ttl_ms: u64,
}

/// Local IPC endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpcSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_ipc_port")]
    pub port: u16,
}

/// How this device identifies itself to peers and local callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentitySection {
    #[serde(default = "default_network_id")]
    pub network_id: String,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// User id assigned to tokens that are not listed under `[[apps]]`.
    #[serde(default = "default_user_id")]
    pub default_user_id: u32,
    /// Unlisted tokens hold the read permission.
    #[serde(default = "default_true")]
    pub grant_unlisted_read: bool,
}

/// A trusted peer device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerEntry {
    pub network_id: String,
    pub name: String,
    /// `host:port` of the peer's link server.
    pub address: String,
}

/// A registered application token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppEntry {
    pub token_id: u32,
    pub bundle_name: String,
    #[serde(default = "default_user_id")]
    pub user_id: u32,
    #[serde(default)]
    pub app_index: i32,
    /// Human readable label reported by `GetDataSource`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_aged_window_ms() -> u64 {
    60 * 60 * 1000
}
fn default_aging_sweep_interval_ms() -> u64 {
    60 * 1000
}
fn default_local_delay_timeout_ms() -> u64 {
    2_000
}
fn default_max_observers_per_pid() -> usize {
    10
}
fn default_max_global_share_options() -> usize {
    2_000
}
fn default_remote_task_timeout_ms() -> u64 {
    3_000
}
fn default_p2p_min_wait_ms() -> u64 {
    30_000
}
fn default_p2p_baseline_bytes_per_sec() -> u64 {
    30 * 1024 * 1024
}
fn default_peer_port() -> u16 {
    24811
}
fn default_event_ttl_ms() -> u64 {
    60 * 60 * 1000
}
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_ipc_port() -> u16 {
    24810
}
fn default_network_id() -> String {
    "local".to_string()
}
fn default_device_name() -> String {
    "This device".to_string()
}
fn default_user_id() -> u32 {
    100
}
fn default_true() -> bool {
    true
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            aged_window_ms: default_aged_window_ms(),
            aging_sweep_interval_ms: default_aging_sweep_interval_ms(),
            local_delay_timeout_ms: default_local_delay_timeout_ms(),
            max_observers_per_pid: default_max_observers_per_pid(),
            max_global_share_options: default_max_global_share_options(),
        }
    }
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            remote_task_timeout_ms: default_remote_task_timeout_ms(),
            p2p_min_wait_ms: default_p2p_min_wait_ms(),
            p2p_baseline_bytes_per_sec: default_p2p_baseline_bytes_per_sec(),
            disallow_distributed: false,
            peer_port: default_peer_port(),
            event_ttl_ms: default_event_ttl_ms(),
        }
    }
}

impl Default for IpcSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_ipc_port(),
        }
    }
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            network_id: default_network_id(),
            device_name: default_device_name(),
            default_user_id: default_user_id(),
            grant_unlisted_read: default_true(),
        }
    }
}

impl ServiceSection {
    pub fn aged_window(&self) -> Duration {
        Duration::from_millis(self.aged_window_ms)
    }

    pub fn aging_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.aging_sweep_interval_ms)
    }

    pub fn local_delay_timeout(&self) -> Duration {
        Duration::from_millis(self.local_delay_timeout_ms)
    }
}

impl RemoteSection {
    pub fn remote_task_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_task_timeout_ms)
    }

    pub fn p2p_min_wait(&self) -> Duration {
        Duration::from_millis(self.p2p_min_wait_ms)
    }

    pub fn event_ttl(&self) -> Duration {
        Duration::from_millis(self.event_ttl_ms)
    }
}

impl ServiceConfig {
    /// Runtime settings for [`crate::application::service::PasteboardService`].
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            aged_window: self.service.aged_window(),
            local_delay_timeout: self.service.local_delay_timeout(),
            max_observers_per_pid: self.service.max_observers_per_pid,
            max_global_share_options: self.service.max_global_share_options,
            disallow_distributed: self.remote.disallow_distributed,
            remote: RemoteSettings {
                task_timeout: self.remote.remote_task_timeout(),
                link_wait: LinkWaitPolicy {
                    min_wait: self.remote.p2p_min_wait(),
                    baseline_bytes_per_sec: self.remote.p2p_baseline_bytes_per_sec,
                },
                event_ttl: self.remote.event_ttl(),
            },
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `ServiceConfig` from the platform config file, returning defaults if
/// the file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<ServiceConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `ServiceConfig` from an explicit path, returning defaults if the
/// file does not exist.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_from(path: &Path) -> Result<ServiceConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: ServiceConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServiceConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating the parent directory when needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &ServiceConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config directory including the `Pasteboard` leaf.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Pasteboard"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("pasteboard"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Pasteboard")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_config_default_has_expected_policy_values() {
        // Arrange / Act
        let cfg = ServiceConfig::default();

        // Assert
        assert_eq!(cfg.service.aged_window(), Duration::from_secs(3600));
        assert_eq!(cfg.service.local_delay_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.service.max_observers_per_pid, 10);
        assert_eq!(cfg.service.max_global_share_options, 2000);
        assert_eq!(cfg.remote.remote_task_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.remote.p2p_min_wait(), Duration::from_secs(30));
        assert_eq!(cfg.remote.p2p_baseline_bytes_per_sec, 30 * 1024 * 1024);
    }

    #[test]
    fn test_service_settings_follow_config_sections() {
        // Arrange
        let mut cfg = ServiceConfig::default();
        cfg.service.aged_window_ms = 1_500;
        cfg.remote.p2p_min_wait_ms = 250;
        cfg.remote.disallow_distributed = true;

        // Act
        let settings = cfg.service_settings();

        // Assert
        assert_eq!(settings.aged_window, Duration::from_millis(1_500));
        assert_eq!(settings.remote.link_wait.min_wait, Duration::from_millis(250));
        assert_eq!(settings.remote.task_timeout, Duration::from_secs(3));
        assert!(settings.disallow_distributed);
    }

    #[test]
    fn test_service_config_default_has_expected_ports() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.ipc.port, 24810);
        assert_eq!(cfg.ipc.bind_address, "127.0.0.1");
        assert_eq!(cfg.remote.peer_port, 24811);
    }

    #[test]
    fn test_service_config_serializes_and_deserializes_round_trip() {
        // Arrange
        let mut cfg = ServiceConfig::default();
        cfg.service.aged_window_ms = 5_000;
        cfg.remote.disallow_distributed = true;
        cfg.peers.push(PeerEntry {
            network_id: "net-b".to_string(),
            name: "Laptop".to_string(),
            address: "10.0.0.2:24811".to_string(),
        });
        cfg.apps.push(AppEntry {
            token_id: 0x1001,
            bundle_name: "com.example.notes".to_string(),
            user_id: 100,
            app_index: 0,
            label: Some("Notes".to_string()),
            permissions: vec!["pasteboard.permission.READ".to_string()],
        });

        // Act
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: ServiceConfig = toml::from_str(&toml_str).expect("deserialize");

        // Assert
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_app_entry_without_label_omits_it() {
        let mut cfg = ServiceConfig::default();
        cfg.apps.push(AppEntry {
            token_id: 7,
            bundle_name: "com.example.bare".to_string(),
            user_id: 100,
            app_index: 0,
            label: None,
            permissions: Vec::new(),
        });

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");

        assert!(!toml_str.contains("label"), "None label must be omitted");
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: ServiceConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ServiceConfig::default());
    }

    #[test]
    fn test_deserialize_partial_remote_overrides_defaults() {
        // Arrange
        let toml_str = r#"
[remote]
p2p_min_wait_ms = 500
"#;

        // Act
        let cfg: ServiceConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.remote.p2p_min_wait(), Duration::from_millis(500));
        assert_eq!(cfg.remote.remote_task_timeout_ms, 3_000);
        assert_eq!(cfg.service.log_level, "info");
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<ServiceConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_from_missing_file_returns_defaults() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");

        let cfg = load_config_from(&path).expect("missing file is not an error");

        assert_eq!(cfg, ServiceConfig::default());
    }

    #[test]
    fn test_save_and_load_config_round_trip_via_temp_dir() {
        // Arrange
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = ServiceConfig::default();
        cfg.ipc.port = 12345;
        cfg.service.log_level = "debug".to_string();

        // Act
        save_config_to(&cfg, &path).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded.ipc.port, 12345);
        assert_eq!(loaded.service.log_level, "debug");
    }

    #[test]
    fn test_load_config_from_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[service\nlog_level = ").expect("write");

        let result = load_config_from(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("config.toml"),
                "config file must be named config.toml, got {path:?}"
            );
        }
    }
}
