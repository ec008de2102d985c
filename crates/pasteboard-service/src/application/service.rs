//! PasteboardService: the service context every request handler runs against.
//!
//! One instance is built at startup and shared (`Arc`) by the IPC server, the
//! peer link server and the background aging sweep.  It owns all per-user and
//! per-device state; nothing lives in globals.
//!
//! # Set path
//!
//! ```text
//! caller ──► token lookup ──► validate ──► admin share option ──► stamp identity
//!        ──► store.save ──► change count ──► Copy observers ──► publish to peers
//! ```
//!
//! # Get path
//!
//! ```text
//! caller ──► read permission ──► newer remote event? fetch + install
//!        ──► aging ──► validity + per-app policy ──► reader copy
//!        ──► delay/remote resolution on the copy ──► Paste observers
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use pasteboard_core::model::encode_paste_data;
use pasteboard_core::protocol::messages::DistributedEvent;
use pasteboard_core::transfer::{self, RegionTracker, SharedRegion, TransferPayload};
use pasteboard_core::{
    CallerInfo, PasteData, PasteDataEntry, PasteRecord, PasteResult, PasteboardError,
    ScreenStatus, ShareOption,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::delay::{DelayGetterHandle, DEFAULT_DELAY_TIMEOUT};
use super::gate::PermissionGate;
use super::observers::{EventKind, ObserverId, ObserverKind, ObserverRegistry, PasteboardEvent};
use super::ports::{
    AbilityIntent, AbilityService, BundleService, DeviceService, LinkTransport, SyncBackend,
    TokenInfo, TokenService,
};
use super::remote::{now_ms, RemoteSettings, RemoteSyncCoordinator};
use super::resolver::{self, RemoteSource, ResolveContext};
use super::store::{ClipboardStore, CurrentPayload, DistributedSnapshot};

/// Bundle that hosts the out-of-process progress UI.
pub const PROGRESS_BUNDLE_NAME: &str = "com.pasteboard.progress";
/// Ability started by [`PasteboardService::show_progress`].
pub const PROGRESS_ABILITY_NAME: &str = "PasteboardProgressAbility";

/// Tunables of the service context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub aged_window: Duration,
    pub local_delay_timeout: Duration,
    pub max_observers_per_pid: usize,
    pub max_global_share_options: usize,
    pub disallow_distributed: bool,
    pub remote: RemoteSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            aged_window: Duration::from_secs(3600),
            local_delay_timeout: DEFAULT_DELAY_TIMEOUT,
            max_observers_per_pid: 10,
            max_global_share_options: 2000,
            disallow_distributed: false,
            remote: RemoteSettings::default(),
        }
    }
}

/// Collaborators injected into the service.
pub struct ServiceDeps {
    pub tokens: Arc<dyn TokenService>,
    /// Absent bundle service is a soft failure: labels fall back to bundle names.
    pub bundle: Option<Arc<dyn BundleService>>,
    pub device: Arc<dyn DeviceService>,
    pub ability: Arc<dyn AbilityService>,
    pub transport: Arc<dyn LinkTransport>,
    /// `None` disables cross-device sync.
    pub sync: Option<Arc<dyn SyncBackend>>,
}

/// The service context.
pub struct PasteboardService {
    store: ClipboardStore,
    gate: PermissionGate,
    observers: ObserverRegistry,
    remote: RemoteSyncCoordinator,
    tokens: Arc<dyn TokenService>,
    bundle: Option<Arc<dyn BundleService>>,
    device: Arc<dyn DeviceService>,
    ability: Arc<dyn AbilityService>,
    regions: RegionTracker,
    settings: ServiceSettings,
}

impl PasteboardService {
    pub fn new(deps: ServiceDeps, settings: ServiceSettings) -> Self {
        Self {
            store: ClipboardStore::new(settings.aged_window),
            gate: PermissionGate::new(
                settings.max_global_share_options,
                settings.disallow_distributed,
            ),
            observers: ObserverRegistry::new(settings.max_observers_per_pid),
            remote: RemoteSyncCoordinator::new(
                deps.sync,
                deps.transport,
                Arc::clone(&deps.device),
                settings.remote,
            ),
            tokens: deps.tokens,
            bundle: deps.bundle,
            device: deps.device,
            ability: deps.ability,
            regions: RegionTracker::new(),
            settings,
        }
    }

    pub fn store(&self) -> &ClipboardStore {
        &self.store
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    pub fn remote(&self) -> &RemoteSyncCoordinator {
        &self.remote
    }

    /// Tracks the shared regions this service creates for large replies.
    pub fn regions(&self) -> &RegionTracker {
        &self.regions
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Looks the caller's token up.
    ///
    /// # Errors
    ///
    /// [`PasteboardError::PermissionVerification`] for unknown tokens.
    fn resolve_caller(&self, caller: CallerInfo) -> PasteResult<TokenInfo> {
        self.tokens.get_token_info(caller.token_id).ok_or_else(|| {
            debug!(token_id = caller.token_id, "unknown token");
            PasteboardError::PermissionVerification
        })
    }

    fn notify(&self, kind: EventKind, user_id: u32, is_remote: bool, bundle_name: &str) {
        let delivered = self.observers.notify(&PasteboardEvent {
            kind,
            user_id,
            is_remote,
            bundle_name: bundle_name.to_string(),
        });
        debug!(?kind, user_id, delivered, "observers notified");
    }

    // ── Set path ──────────────────────────────────────────────────────────────

    /// Replaces the caller's user clipboard with `data`.
    ///
    /// A delayed payload must come with the producer's delay getter.
    ///
    /// # Errors
    ///
    /// - [`PasteboardError::PermissionVerification`] for unknown tokens.
    /// - [`PasteboardError::InvalidData`] for an empty non-delayed payload.
    /// - [`PasteboardError::InvalidParam`] for too many records, a delayed
    ///   payload without a getter, or a payload bound to another token.
    pub async fn set_paste_data(
        &self,
        caller: CallerInfo,
        mut data: PasteData,
        delay_getter: Option<DelayGetterHandle>,
    ) -> PasteResult<()> {
        let info = self.resolve_caller(caller)?;
        data.validate()?;
        if is_delayed(&data) && delay_getter.is_none() {
            warn!(token_id = caller.token_id, "delayed payload without a delay getter");
            return Err(PasteboardError::InvalidParam);
        }

        if let Some(option) = self.gate.global_share_option(caller.token_id) {
            debug!(token_id = caller.token_id, ?option, "administrator share option applied");
            data.set_share_option(option);
        }
        data.bind_token(caller.token_id)?;
        data.set_origin_authority(info.bundle_name.clone(), info.app_index);
        {
            let props = data.props_mut();
            props.screen_status = self.gate.screen_status();
            props.timestamp_ms = now_ms();
            props.is_remote = false;
            props.device_id = self.device.local_network_id();
        }

        let getter = delay_getter.map(|g| g.with_timeout(self.settings.local_delay_timeout));
        let stored = self.store.save(info.user_id, data, getter);
        let count = self.store.increase_change_count(info.user_id);
        info!(
            user_id = info.user_id,
            data_id = stored.data_id(),
            records = stored.record_count(),
            change_count = count,
            "clipboard set"
        );
        self.notify(EventKind::Copy, info.user_id, false, &info.bundle_name);
        self.publish_to_peers(info.user_id, &stored).await;
        Ok(())
    }

    /// [`Self::set_paste_data`] for a payload that arrived on the transfer
    /// layer (inline bytes or a shared region).
    ///
    /// # Errors
    ///
    /// Transfer errors (`InvalidParam`, `InvalidDataSize`, `Serialization`),
    /// [`PasteboardError::InvalidData`] when the payload holds nothing, then
    /// everything [`Self::set_paste_data`] returns.
    pub async fn set_paste_data_from_transfer(
        &self,
        caller: CallerInfo,
        region: Option<&mut SharedRegion>,
        declared_size: i64,
        inline: &[u8],
    ) -> PasteResult<()> {
        let (data, has_data) = transfer::write_paste_data(region, declared_size, inline)?;
        if !has_data {
            return Err(PasteboardError::InvalidData);
        }
        self.set_paste_data(caller, data, None).await
    }

    fn should_publish(&self, data: &PasteData) -> bool {
        data.share_option() == ShareOption::CrossDevice
            && !data.props().local_only
            && !self.gate.is_disallow_distributed()
            && self.remote.has_backend()
    }

    /// Publishes a distributed snapshot of `stored`, or withdraws the
    /// previous announcement when the payload must stay on this device.
    async fn publish_to_peers(&self, user_id: u32, stored: &Arc<PasteData>) {
        if !self.remote.has_backend() {
            return;
        }
        if !self.should_publish(stored) {
            if let Err(e) = self.remote.withdraw(user_id).await {
                debug!(error = %e, user_id, "withdraw failed");
            }
            return;
        }

        let mut distributed = (**stored).clone();
        distributed.generate_distributed_uri(&self.remote.local_network_id());
        let encoded_len = encode_paste_data(&distributed).len();
        let event = self.remote.make_event(user_id, &distributed, encoded_len);
        self.store.set_published(
            user_id,
            DistributedSnapshot {
                event: event.clone(),
                data: Arc::new(distributed),
            },
        );
        if let Err(e) = self.remote.publish(event).await {
            warn!(error = %e, user_id, "publishing clipboard to peers failed");
        }
    }

    // ── Get path ──────────────────────────────────────────────────────────────

    /// The newest peer event this user has not consumed yet.
    async fn pending_remote_event(&self, user_id: u32) -> Option<DistributedEvent> {
        if self.gate.is_disallow_distributed() || !self.remote.has_backend() {
            return None;
        }
        let event = match self.remote.latest_remote_event(user_id).await {
            Ok(Some(event)) => event,
            Ok(None) => return None,
            Err(e) => {
                debug!(error = %e, "remote event lookup failed");
                return None;
            }
        };
        if self.store.last_remote_event(user_id).as_ref() == Some(&event) {
            return None;
        }
        if let Some(current) = self.store.current(user_id) {
            if event.timestamp_ms < current.props().timestamp_ms {
                self.store.mark_remote_consumed(user_id, event);
                return None;
            }
        }
        Some(event)
    }

    /// Fetches and installs a newer peer payload, if there is one.
    async fn sync_remote_data(&self, user_id: u32, pid: u32) -> PasteResult<()> {
        let Some(event) = self.pending_remote_event(user_id).await else {
            return Ok(());
        };
        info!(user_id, device = %event.device_id, seq = event.seq_id, "pulling remote clipboard");
        let data = self.remote.fetch_remote_data(&event, pid).await?;
        if let Some(installed) = self.store.install_remote(user_id, data, event) {
            self.store.increase_change_count(user_id);
            let (bundle_name, _) = installed.origin_authority();
            self.notify(EventKind::Copy, user_id, true, bundle_name);
        }
        Ok(())
    }

    /// Runs the read checks and returns the stored payload with the getter
    /// and remote event that belong to it.
    async fn readable_payload(&self, caller: CallerInfo, info: &TokenInfo) -> PasteResult<CurrentPayload> {
        let user_id = info.user_id;
        self.gate.check_read_permission(
            caller,
            self.store.input_method_pid(user_id),
            self.tokens.as_ref(),
            self.ability.as_ref(),
        )?;
        self.sync_remote_data(user_id, caller.pid).await?;

        if self.store.is_data_aged(user_id) && self.store.clear_aged_data(user_id) {
            return Err(PasteboardError::DataExpired);
        }
        let current = self.store.current_payload(user_id);
        self.gate
            .has_paste_permission(current.as_ref().map(|c| c.data.as_ref()), caller.token_id)?;
        current.ok_or(PasteboardError::DataExpired)
    }

    /// Materialises a whole-payload delay copy or clones the stored payload.
    async fn reader_copy(&self, current: &CurrentPayload) -> PasteResult<PasteData> {
        let stored = current.data.as_ref();
        if stored.is_delay_data() && !stored.is_remote() {
            resolver::resolve_whole_payload(stored, current.delay_getter.as_ref()).await
        } else {
            Ok(stored.clone())
        }
    }

    /// Returns the caller's copy of the current payload with every basic
    /// entry resolved.
    ///
    /// # Errors
    ///
    /// - [`PasteboardError::PermissionVerification`]: unknown token, or no
    ///   read permission, focus or input-method ownership.
    /// - [`PasteboardError::DataExpired`]: no payload, or aged out.
    /// - [`PasteboardError::CrossBorder`]: screen status or share option.
    /// - Resolution errors from the delay getter or the peer.
    pub async fn get_paste_data(&self, caller: CallerInfo) -> PasteResult<PasteData> {
        let info = self.resolve_caller(caller)?;
        let current = self.readable_payload(caller, &info).await?;
        let mut copy = self.reader_copy(&current).await?;

        let ctx = self.resolve_context(
            &copy,
            current.delay_getter.as_ref(),
            current.remote_event.as_ref(),
            caller.pid,
        );
        resolver::resolve_basic_entries(&mut copy, &ctx).await?;

        debug!(
            user_id = info.user_id,
            data_id = copy.data_id(),
            token_id = caller.token_id,
            "clipboard read"
        );
        self.notify(EventKind::Paste, info.user_id, copy.is_remote(), &info.bundle_name);
        Ok(copy)
    }

    /// [`Self::get_paste_data`] encoded for the transfer layer.
    pub async fn get_paste_data_transfer(&self, caller: CallerInfo) -> PasteResult<TransferPayload> {
        let data = self.get_paste_data(caller).await?;
        transfer::prepare_transfer(&data, Some(&self.regions))
    }

    fn resolve_context<'a>(
        &'a self,
        data: &PasteData,
        getter: Option<&'a DelayGetterHandle>,
        event: Option<&'a DistributedEvent>,
        pid: u32,
    ) -> ResolveContext<'a> {
        let remote = match (data.is_remote(), event) {
            (true, Some(event)) => Some(RemoteSource {
                coordinator: &self.remote,
                event,
                pid,
            }),
            _ => None,
        };
        ResolveContext {
            delay_getter: getter,
            remote,
        }
    }

    /// Returns one resolved entry of the current payload.
    ///
    /// # Errors
    ///
    /// [`PasteboardError::NoData`] when `data_id` no longer names the current
    /// payload, plus everything [`Self::get_paste_data`] returns.
    pub async fn get_record_value_by_type(
        &self,
        caller: CallerInfo,
        data_id: u32,
        record_id: u32,
        utd_id: &str,
    ) -> PasteResult<PasteDataEntry> {
        let info = self.resolve_caller(caller)?;
        let current = self.readable_payload(caller, &info).await?;
        if current.data.data_id() != data_id {
            debug!(requested = data_id, current = current.data.data_id(), "stale data id");
            return Err(PasteboardError::NoData);
        }
        let mut copy = self.reader_copy(&current).await?;

        let ctx = self.resolve_context(
            &copy,
            current.delay_getter.as_ref(),
            current.remote_event.as_ref(),
            caller.pid,
        );
        resolver::resolve_entry(&mut copy, record_id, utd_id, &ctx).await?;
        copy.entry(record_id, utd_id)
            .cloned()
            .ok_or(PasteboardError::GetEntryValueFailed)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// MIME types the caller could paste right now, including a newer peer
    /// payload that has not been pulled yet.
    async fn visible_mime_types(&self, caller: CallerInfo) -> Option<Vec<String>> {
        if self.gate.is_screen_locked() {
            return None;
        }
        let info = self.resolve_caller(caller).ok()?;
        if let Some(event) = self.pending_remote_event(info.user_id).await {
            return Some(event.mime_types);
        }
        if self.store.is_data_aged(info.user_id) {
            return None;
        }
        let current = self.store.current(info.user_id);
        self.gate
            .is_data_valid(current.as_deref(), caller.token_id)
            .ok()?;
        current.map(|data| data.mime_types())
    }

    /// `false` while the screen is locked, whatever is stored.
    pub async fn has_paste_data(&self, caller: CallerInfo) -> bool {
        self.visible_mime_types(caller).await.is_some()
    }

    pub async fn has_data_type(&self, caller: CallerInfo, mime_type: &str) -> bool {
        self.visible_mime_types(caller)
            .await
            .map(|types| types.iter().any(|t| t == mime_type))
            .unwrap_or(false)
    }

    /// Empty while the screen is locked.
    pub async fn get_mime_types(&self, caller: CallerInfo) -> Vec<String> {
        self.visible_mime_types(caller).await.unwrap_or_default()
    }

    pub fn get_change_count(&self, caller: CallerInfo) -> PasteResult<u32> {
        let info = self.resolve_caller(caller)?;
        Ok(self.store.change_count(info.user_id))
    }

    pub fn is_remote_data(&self, caller: CallerInfo) -> PasteResult<bool> {
        let info = self.resolve_caller(caller)?;
        Ok(self
            .store
            .current(info.user_id)
            .map(|data| data.is_remote())
            .unwrap_or(false))
    }

    /// Display label of the app that wrote the current payload.
    ///
    /// Remote payloads report the origin bundle name from the peer.
    pub fn get_data_source(&self, caller: CallerInfo) -> PasteResult<String> {
        let info = self.resolve_caller(caller)?;
        let data = self.store.current(info.user_id).ok_or(PasteboardError::NoData)?;
        let (bundle_name, _) = data.origin_authority();
        if data.is_remote() {
            return Ok(bundle_name.to_string());
        }
        let label = self
            .bundle
            .as_ref()
            .and_then(|bundle| bundle.get_app_label(data.token_id()));
        Ok(label.unwrap_or_else(|| bundle_name.to_string()))
    }

    /// Name of the device the current payload came from.
    pub fn get_remote_device_name(&self, caller: CallerInfo) -> PasteResult<String> {
        let info = self.resolve_caller(caller)?;
        let data = self.store.current(info.user_id).ok_or(PasteboardError::NoData)?;
        if !data.is_remote() {
            return Ok(self.device.local_device_name());
        }
        let device_id = &data.props().device_id;
        Ok(self
            .device
            .get_remote_device_name(device_id)
            .unwrap_or_else(|| device_id.clone()))
    }

    // ── Clear ─────────────────────────────────────────────────────────────────

    /// Removes the caller's user clipboard.  Clearing an empty clipboard is a
    /// no-op.
    pub async fn clear(&self, caller: CallerInfo) -> PasteResult<()> {
        let info = self.resolve_caller(caller)?;
        if !self.store.clear(info.user_id) {
            debug!(user_id = info.user_id, "clear on empty clipboard");
            return Ok(());
        }
        self.store.increase_change_count(info.user_id);
        info!(user_id = info.user_id, "clipboard cleared");
        self.notify(EventKind::Clear, info.user_id, false, &info.bundle_name);
        if self.remote.has_backend() {
            if let Err(e) = self.remote.withdraw(info.user_id).await {
                debug!(error = %e, "withdraw failed");
            }
        }
        Ok(())
    }

    // ── Share options ─────────────────────────────────────────────────────────

    pub fn set_global_share_options(
        &self,
        caller: CallerInfo,
        options: &[(u32, ShareOption)],
    ) -> PasteResult<()> {
        self.gate.check_manage_permission(caller, self.tokens.as_ref())?;
        self.gate.set_global_share_options(options)?;
        info!(count = options.len(), "global share options set");
        Ok(())
    }

    pub fn remove_global_share_options(&self, caller: CallerInfo, tokens: &[u32]) -> PasteResult<()> {
        self.gate.check_manage_permission(caller, self.tokens.as_ref())?;
        let removed = self.gate.remove_global_share_options(tokens);
        info!(removed, "global share options removed");
        Ok(())
    }

    /// Overrides for `tokens`, or all overrides when `tokens` is empty.
    pub fn get_global_share_options(
        &self,
        caller: CallerInfo,
        tokens: &[u32],
    ) -> PasteResult<Vec<(u32, ShareOption)>> {
        self.gate.check_manage_permission(caller, self.tokens.as_ref())?;
        Ok(self.gate.global_share_options(tokens))
    }

    pub fn set_app_share_options(&self, caller: CallerInfo, option: ShareOption) -> PasteResult<()> {
        self.resolve_caller(caller)?;
        self.gate.set_app_share_options(caller.token_id, option)
    }

    pub fn remove_app_share_options(&self, caller: CallerInfo) -> PasteResult<()> {
        self.resolve_caller(caller)?;
        self.gate.remove_app_share_options(caller.token_id);
        Ok(())
    }

    // ── Observers ─────────────────────────────────────────────────────────────

    pub fn subscribe(
        &self,
        pid: u32,
        kind: ObserverKind,
        sink: mpsc::Sender<PasteboardEvent>,
    ) -> PasteResult<ObserverId> {
        self.observers.subscribe(pid, kind, sink)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    // ── Progress UI ───────────────────────────────────────────────────────────

    /// Starts the progress UI on behalf of the focused app.
    ///
    /// # Errors
    ///
    /// [`PasteboardError::PermissionVerification`] for an unfocused caller;
    /// [`PasteboardError::ProgressStartError`] when the ability fails to start.
    pub fn show_progress(&self, caller: CallerInfo, progress_key: &str) -> PasteResult<()> {
        if !self.ability.is_focused_app(caller.token_id) {
            debug!(token_id = caller.token_id, "progress requested by unfocused caller");
            return Err(PasteboardError::PermissionVerification);
        }
        let intent = AbilityIntent {
            bundle_name: PROGRESS_BUNDLE_NAME.to_string(),
            ability_name: PROGRESS_ABILITY_NAME.to_string(),
            params: BTreeMap::from([
                ("progressKey".to_string(), progress_key.to_string()),
                ("tokenId".to_string(), caller.token_id.to_string()),
            ]),
        };
        let code = self.ability.start_ability(&intent);
        if code != 0 {
            warn!(code, "progress ability failed to start");
            return Err(PasteboardError::ProgressStartError);
        }
        Ok(())
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    pub fn on_user_switched(&self, user_id: u32) {
        self.store.on_user_switched(user_id);
    }

    pub async fn on_user_removed(&self, user_id: u32) {
        self.store.remove_user(user_id);
        if self.remote.has_backend() {
            if let Err(e) = self.remote.withdraw(user_id).await {
                debug!(error = %e, "withdraw failed");
            }
        }
    }

    pub fn set_screen_status(&self, status: ScreenStatus) {
        self.gate.set_screen_status(status);
    }

    pub fn set_input_method_pid(&self, user_id: u32, pid: Option<u32>) {
        self.store.set_input_method_pid(user_id, pid);
    }

    /// Releases everything `pid` held: observers, input-method ownership and
    /// P2P link holds.
    pub async fn on_process_died(&self, pid: u32) {
        let observers = self.observers.remove_pid(pid);
        self.store.release_input_method_pid(pid);
        let closed = self.remote.links().on_process_died(pid).await;
        info!(pid, observers, links_closed = closed.len(), "process resources released");
    }

    // ── Aging ─────────────────────────────────────────────────────────────────

    pub fn is_data_aged(&self, user_id: u32) -> bool {
        self.store.is_data_aged(user_id)
    }

    pub fn clear_aged_data(&self, user_id: u32) -> bool {
        self.store.clear_aged_data(user_id)
    }

    /// Evicts aged payloads of every user; returns how many were evicted.
    pub fn sweep_aged_data(&self) -> usize {
        self.store
            .user_ids()
            .into_iter()
            .filter(|user_id| self.store.current(*user_id).is_some())
            .filter(|user_id| self.store.clear_aged_data(*user_id))
            .count()
    }

    // ── Peer serving ──────────────────────────────────────────────────────────

    /// Encoded snapshot this device published as `(user_id, seq_id)`.
    ///
    /// # Errors
    ///
    /// [`PasteboardError::NoData`] if that snapshot is no longer current.
    pub fn serve_peer_event(&self, user_id: u32, seq_id: u64) -> PasteResult<Vec<u8>> {
        let snapshot = self
            .store
            .published(user_id, seq_id)
            .ok_or(PasteboardError::NoData)?;
        debug!(user_id, seq_id, "serving published payload to peer");
        Ok(encode_paste_data(&snapshot.data))
    }

    /// Resolves one entry of a published snapshot for a peer.
    ///
    /// The reply is an encoded transient payload whose first record carries
    /// the entry; for HTML referencing files, the snapshot's file URI records
    /// follow it.
    pub async fn serve_peer_entry(
        &self,
        user_id: u32,
        seq_id: u64,
        record_id: u32,
        utd_id: &str,
    ) -> PasteResult<Vec<u8>> {
        let snapshot = self
            .store
            .published(user_id, seq_id)
            .ok_or(PasteboardError::NoData)?;
        let mut data = (*snapshot.data).clone();

        let getter = self
            .store
            .current_payload(user_id)
            .filter(|current| current.data.data_id() == data.data_id())
            .and_then(|current| current.delay_getter);
        let ctx = ResolveContext {
            delay_getter: getter.as_ref(),
            remote: None,
        };
        resolver::resolve_entry(&mut data, record_id, utd_id, &ctx).await?;

        let record = data
            .record_by_id(record_id)
            .ok_or(PasteboardError::NoData)?
            .clone();
        let with_files = record.references_files();
        let mut transient = PasteData::new();
        transient.add_record(record)?;
        if with_files && utd_id == pasteboard_core::model::mime::utd::HTML {
            for file in data
                .records()
                .iter()
                .filter(|r| r.record_id() != record_id && r.primary_uri().is_some())
            {
                transient.add_record(file.clone())?;
            }
        }
        debug!(user_id, seq_id, record_id, utd_id, "serving entry to peer");
        Ok(encode_paste_data(&transient))
    }
}

fn is_delayed(data: &PasteData) -> bool {
    data.is_delay_data() || data.records().iter().any(PasteRecord::is_delay_record)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
