//! Permission & validity gate.
//!
//! Every read passes through here before any payload bytes leave the store.
//! The gate owns the policy tables (administrator share options, per-app
//! share options, screen status, the distribution switch) and answers with a
//! definitive `Ok(())` or a typed [`PasteboardError`].
//!
//! # Screen status (for beginners)
//!
//! A payload remembers the screen state it was copied in.  States are ordered
//! `Default < Locked < Unlocked`; a payload can be read whenever the current
//! state is at least as privileged as the one it was written in.  Text copied
//! on an unlocked device therefore cannot be pasted from the lock screen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use pasteboard_core::{CallerInfo, PasteData, PasteResult, PasteboardError, ScreenStatus, ShareOption};
use tracing::{debug, info, warn};

use super::ports::{
    AbilityService, TokenService, MANAGE_SHARE_OPTION_PERMISSION, READ_PASTEBOARD_PERMISSION,
};

/// Policy tables and read checks.
#[derive(Debug)]
pub struct PermissionGate {
    screen_status: RwLock<ScreenStatus>,
    global_share: RwLock<HashMap<u32, ShareOption>>,
    app_share: RwLock<HashMap<u32, ShareOption>>,
    max_global_share_options: usize,
    disallow_distributed: AtomicBool,
}

impl PermissionGate {
    pub fn new(max_global_share_options: usize, disallow_distributed: bool) -> Self {
        Self {
            screen_status: RwLock::new(ScreenStatus::Unlocked),
            global_share: RwLock::new(HashMap::new()),
            app_share: RwLock::new(HashMap::new()),
            max_global_share_options,
            disallow_distributed: AtomicBool::new(disallow_distributed),
        }
    }

    // ── Validity ──────────────────────────────────────────────────────────────

    /// Screen-status and share-option check of a stored payload.
    ///
    /// # Errors
    ///
    /// - [`PasteboardError::DataExpired`] when there is no payload.
    /// - [`PasteboardError::CrossBorder`] when the reader may not see it.
    pub fn is_data_valid(&self, data: Option<&PasteData>, token_id: u32) -> PasteResult<()> {
        let Some(data) = data else {
            return Err(PasteboardError::DataExpired);
        };

        if data.share_option() == ShareOption::InApp {
            if data.token_id() == token_id {
                return Ok(());
            }
            debug!(token_id, owner = data.token_id(), "in-app data read by another token");
            return Err(PasteboardError::CrossBorder);
        }

        let current = self.screen_status();
        if data.props().screen_status > current {
            debug!(
                written = ?data.props().screen_status,
                current = ?current,
                "screen status does not allow this read"
            );
            return Err(PasteboardError::CrossBorder);
        }

        if data.is_remote() && data.share_option() != ShareOption::CrossDevice {
            return Err(PasteboardError::CrossBorder);
        }
        Ok(())
    }

    /// [`Self::is_data_valid`] plus the per-app and administrator policies.
    pub fn has_paste_permission(&self, data: Option<&PasteData>, token_id: u32) -> PasteResult<()> {
        self.is_data_valid(data, token_id)?;
        let Some(data) = data else {
            return Err(PasteboardError::DataExpired);
        };

        if self.app_share_option(token_id) == Some(ShareOption::InApp) && data.token_id() != token_id
        {
            debug!(token_id, "reader restricted to its own in-app data");
            return Err(PasteboardError::CrossBorder);
        }
        if data.is_remote() && self.is_disallow_distributed() {
            debug!(token_id, "remote data hidden by distribution policy");
            return Err(PasteboardError::CrossBorder);
        }
        Ok(())
    }

    /// The caller may read if it holds the read permission, owns the focused
    /// window or UI extension, or is the user's input method.
    pub fn check_read_permission(
        &self,
        caller: CallerInfo,
        ime_pid: Option<u32>,
        tokens: &dyn TokenService,
        ability: &dyn AbilityService,
    ) -> PasteResult<()> {
        let granted = tokens.verify_token(caller.token_id, READ_PASTEBOARD_PERMISSION)
            || ability.is_focused_app(caller.token_id)
            || ability.check_ui_extension_is_focused(caller.token_id)
            || ime_pid == Some(caller.pid);
        if granted {
            Ok(())
        } else {
            debug!(token_id = caller.token_id, pid = caller.pid, "read permission denied");
            Err(PasteboardError::PermissionVerification)
        }
    }

    pub fn check_manage_permission(
        &self,
        caller: CallerInfo,
        tokens: &dyn TokenService,
    ) -> PasteResult<()> {
        if tokens.verify_token(caller.token_id, MANAGE_SHARE_OPTION_PERMISSION) {
            Ok(())
        } else {
            debug!(token_id = caller.token_id, "manage permission denied");
            Err(PasteboardError::PermissionVerification)
        }
    }

    // ── Screen status ─────────────────────────────────────────────────────────

    pub fn screen_status(&self) -> ScreenStatus {
        *self.screen_status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_screen_status(&self, status: ScreenStatus) {
        *self.screen_status.write().unwrap_or_else(PoisonError::into_inner) = status;
        info!(?status, "screen status changed");
    }

    pub fn is_screen_locked(&self) -> bool {
        self.screen_status() == ScreenStatus::Locked
    }

    // ── Administrator share options ───────────────────────────────────────────

    /// Adds or replaces administrator overrides.
    ///
    /// # Errors
    ///
    /// [`PasteboardError::InvalidParam`] if the table would exceed its
    /// maximum size; nothing is applied in that case.
    pub fn set_global_share_options(&self, options: &[(u32, ShareOption)]) -> PasteResult<()> {
        let mut table = self.global_share.write().unwrap_or_else(PoisonError::into_inner);
        let added = options
            .iter()
            .filter(|(token, _)| !table.contains_key(token))
            .map(|(token, _)| *token)
            .collect::<std::collections::HashSet<_>>()
            .len();
        if table.len() + added > self.max_global_share_options {
            warn!(
                current = table.len(),
                added,
                max = self.max_global_share_options,
                "global share option table is full"
            );
            return Err(PasteboardError::InvalidParam);
        }
        for (token, option) in options {
            table.insert(*token, *option);
        }
        Ok(())
    }

    pub fn remove_global_share_options(&self, tokens: &[u32]) -> usize {
        let mut table = self.global_share.write().unwrap_or_else(PoisonError::into_inner);
        tokens.iter().filter(|t| table.remove(t).is_some()).count()
    }

    /// Overrides for `tokens`, or every override when `tokens` is empty.
    pub fn global_share_options(&self, tokens: &[u32]) -> Vec<(u32, ShareOption)> {
        let table = self.global_share.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<(u32, ShareOption)> = if tokens.is_empty() {
            table.iter().map(|(t, o)| (*t, *o)).collect()
        } else {
            tokens
                .iter()
                .filter_map(|t| table.get(t).map(|o| (*t, *o)))
                .collect()
        };
        out.sort_unstable_by_key(|(t, _)| *t);
        out
    }

    pub fn global_share_option(&self, token_id: u32) -> Option<ShareOption> {
        self.global_share
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&token_id)
            .copied()
    }

    // ── Per-app share options ─────────────────────────────────────────────────

    /// Restricts an app to reading its own data.
    ///
    /// # Errors
    ///
    /// [`PasteboardError::InvalidParam`] for any option other than `InApp`, or
    /// if a different option is already recorded.
    pub fn set_app_share_options(&self, token_id: u32, option: ShareOption) -> PasteResult<()> {
        if option != ShareOption::InApp {
            return Err(PasteboardError::InvalidParam);
        }
        let mut table = self.app_share.write().unwrap_or_else(PoisonError::into_inner);
        match table.get(&token_id) {
            Some(existing) if *existing != option => Err(PasteboardError::InvalidParam),
            _ => {
                table.insert(token_id, option);
                Ok(())
            }
        }
    }

    pub fn remove_app_share_options(&self, token_id: u32) -> bool {
        self.app_share
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&token_id)
            .is_some()
    }

    pub fn app_share_option(&self, token_id: u32) -> Option<ShareOption> {
        self.app_share
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&token_id)
            .copied()
    }

    // ── Distribution switch ───────────────────────────────────────────────────

    pub fn is_disallow_distributed(&self) -> bool {
        self.disallow_distributed.load(Ordering::Acquire)
    }

    pub fn set_disallow_distributed(&self, disallow: bool) {
        self.disallow_distributed.store(disallow, Ordering::Release);
        info!(disallow, "distribution policy changed");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
