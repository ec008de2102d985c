//! The full clipboard payload produced by one "set" operation.

use serde::{Deserialize, Serialize};

use super::entry::{EntryValue, PasteDataEntry};
use super::record::PasteRecord;
use crate::error::{PasteResult, PasteboardError};

/// Maximum number of records a single payload may hold.
pub const MAX_RECORD_COUNT: usize = 512;

/// Query parameter appended to file URIs shipped to another device.
const NETWORK_ID_PARAM: &str = "networkid=";

// ── Policy enums ──────────────────────────────────────────────────────────────

/// Who may read a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ShareOption {
    /// Only the writing token.
    InApp = 0,
    /// Any app on this device.
    LocalDevice = 1,
    /// Any app on this device and on trusted peer devices.
    #[default]
    CrossDevice = 2,
}

impl TryFrom<u8> for ShareOption {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(ShareOption::InApp),
            1 => Ok(ShareOption::LocalDevice),
            2 => Ok(ShareOption::CrossDevice),
            _ => Err(()),
        }
    }
}

/// Screen state recorded when the payload was written.
///
/// Ordered by confidentiality: a payload can be read in a state at least as
/// privileged as the one it was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ScreenStatus {
    #[default]
    Default = 0,
    Locked = 1,
    Unlocked = 2,
}

impl TryFrom<u8> for ScreenStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(ScreenStatus::Default),
            1 => Ok(ScreenStatus::Locked),
            2 => Ok(ScreenStatus::Unlocked),
            _ => Err(()),
        }
    }
}

// ── Properties ────────────────────────────────────────────────────────────────

/// Free-form payload attributes.  Identity attributes (origin authority and
/// token id) live on [`PasteData`] itself so their invariants hold.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PasteDataProperty {
    pub tag: String,
    /// Milliseconds since the Unix epoch at set time.
    pub timestamp_ms: u64,
    pub share_option: ShareOption,
    pub screen_status: ScreenStatus,
    /// Received from another device.
    pub is_remote: bool,
    /// The whole payload is materialised by the producer's delay getter.
    pub is_delay_data: bool,
    /// Never published to other devices.
    pub local_only: bool,
    /// Copied through the unified-data interface; a whole-payload delay
    /// getter is asked for the unified form.
    pub is_unified_data: bool,
    /// Per-user sequence number stamped by the service, starts at 1.
    pub data_id: u32,
    /// Total size of files referenced by delayed HTML or URI records.
    pub file_size: i64,
    /// Network id of the source device for remote payloads.
    pub device_id: String,
}

// ── PasteData ─────────────────────────────────────────────────────────────────

/// An ordered collection of records plus ownership and policy attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PasteData {
    records: Vec<PasteRecord>,
    bundle_name: String,
    app_index: i32,
    token_id: u32,
    next_record_id: u32,
    props: PasteDataProperty,
}

impl PasteData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for a single plain-text record.
    pub fn with_text(text: impl Into<String>) -> Self {
        let mut data = Self::new();
        // A fresh payload always has room for one record.
        let _ = data.add_record(PasteRecord::plain_text(text));
        data
    }

    /// A whole-payload delayed placeholder advertising the given UTD ids.
    pub fn delayed<I, S>(utd_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut data = Self::new();
        let _ = data.add_record(PasteRecord::delayed(utd_ids));
        data.props.is_delay_data = true;
        data
    }

    /// Reassembles a decoded payload without renumbering its records.
    pub(crate) fn restore(
        records: Vec<PasteRecord>,
        bundle_name: String,
        app_index: i32,
        token_id: u32,
        props: PasteDataProperty,
    ) -> Self {
        let next_record_id = records.iter().map(PasteRecord::record_id).max().unwrap_or(0);
        Self {
            records,
            bundle_name,
            app_index,
            token_id,
            next_record_id,
            props,
        }
    }

    /// Appends a record, assigning the next record id (starting at 1).
    ///
    /// # Errors
    ///
    /// [`PasteboardError::InvalidParam`] once [`MAX_RECORD_COUNT`] records
    /// are present.
    pub fn add_record(&mut self, mut record: PasteRecord) -> PasteResult<u32> {
        if self.records.len() >= MAX_RECORD_COUNT {
            return Err(PasteboardError::InvalidParam);
        }
        self.next_record_id += 1;
        let id = self.next_record_id;
        record.set_record_id(id);
        record.refresh_mime_type();
        self.records.push(record);
        Ok(id)
    }

    pub fn records(&self) -> &[PasteRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [PasteRecord] {
        &mut self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record_at(&self, index: usize) -> Option<&PasteRecord> {
        self.records.get(index)
    }

    pub fn record_by_id(&self, record_id: u32) -> Option<&PasteRecord> {
        self.records.iter().find(|r| r.record_id() == record_id)
    }

    pub fn record_by_id_mut(&mut self, record_id: u32) -> Option<&mut PasteRecord> {
        self.records.iter_mut().find(|r| r.record_id() == record_id)
    }

    /// Looks up a single entry by record id and UTD id.
    pub fn entry(&self, record_id: u32, utd_id: &str) -> Option<&PasteDataEntry> {
        self.record_by_id(record_id)?.get_entry(utd_id)
    }

    /// Fills in a previously unresolved entry.  Returns `false` when the
    /// record or entry does not exist.
    pub fn set_entry_value(&mut self, record_id: u32, utd_id: &str, value: EntryValue) -> bool {
        self.record_by_id_mut(record_id)
            .map(|r| r.replace_value(utd_id, value))
            .unwrap_or(false)
    }

    /// Ordered union of every record's MIME types.
    pub fn mime_types(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for mime in self.records.iter().flat_map(PasteRecord::mime_types) {
            if !out.contains(&mime) {
                out.push(mime);
            }
        }
        out
    }

    pub fn has_mime_type(&self, mime_type: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.get_entry_by_mime(mime_type).is_some())
    }

    pub fn primary_text(&self) -> Option<&str> {
        self.records.iter().find_map(PasteRecord::primary_text)
    }

    pub fn primary_html(&self) -> Option<&str> {
        self.records.iter().find_map(PasteRecord::primary_html)
    }

    pub fn primary_uri(&self) -> Option<&str> {
        self.records.iter().find_map(PasteRecord::effective_uri)
    }

    pub fn has_unresolved_entries(&self) -> bool {
        self.records.iter().any(PasteRecord::has_unresolved_entries)
    }

    /// Rough size of all resolved values.
    pub fn byte_len(&self) -> usize {
        self.records.iter().map(PasteRecord::byte_len).sum()
    }

    // ── Identity ──────────────────────────────────────────────────────────

    /// `(bundle_name, app_index)` of the writer.
    pub fn origin_authority(&self) -> (&str, i32) {
        (&self.bundle_name, self.app_index)
    }

    /// Sets both halves of the origin authority together.
    pub fn set_origin_authority(&mut self, bundle_name: impl Into<String>, app_index: i32) {
        self.bundle_name = bundle_name.into();
        self.app_index = app_index;
    }

    /// Token id of the writer, `0` while unbound.
    pub fn token_id(&self) -> u32 {
        self.token_id
    }

    /// Binds the writer's token id.
    ///
    /// # Errors
    ///
    /// [`PasteboardError::InvalidParam`] if a different token is already bound.
    pub fn bind_token(&mut self, token_id: u32) -> PasteResult<()> {
        if self.token_id != 0 && self.token_id != token_id {
            return Err(PasteboardError::InvalidParam);
        }
        self.token_id = token_id;
        Ok(())
    }

    // ── Properties ────────────────────────────────────────────────────────

    pub fn props(&self) -> &PasteDataProperty {
        &self.props
    }

    pub fn props_mut(&mut self) -> &mut PasteDataProperty {
        &mut self.props
    }

    pub fn share_option(&self) -> ShareOption {
        self.props.share_option
    }

    pub fn set_share_option(&mut self, option: ShareOption) {
        self.props.share_option = option;
    }

    pub fn is_remote(&self) -> bool {
        self.props.is_remote
    }

    pub fn is_delay_data(&self) -> bool {
        self.props.is_delay_data
    }

    pub fn data_id(&self) -> u32 {
        self.props.data_id
    }

    /// A payload must carry at least one record unless it is delay data.
    pub fn validate(&self) -> PasteResult<()> {
        if self.records.is_empty() && !self.props.is_delay_data {
            return Err(PasteboardError::InvalidData);
        }
        if self.records.len() > MAX_RECORD_COUNT {
            return Err(PasteboardError::InvalidParam);
        }
        Ok(())
    }

    /// Rewrites every local file URI into the form a peer device can open.
    ///
    /// Records whose URI is already converted are skipped, so repeated calls
    /// are no-ops.  Record order is never changed.  Returns the number of
    /// records converted by this call.
    pub fn generate_distributed_uri(&mut self, network_id: &str) -> usize {
        let mut converted = 0;
        for record in &mut self.records {
            if record.converted_uri().is_some() {
                continue;
            }
            let Some(uri) = record.primary_uri() else {
                continue;
            };
            if !uri.starts_with("file://") || uri.contains(NETWORK_ID_PARAM) {
                continue;
            }
            let sep = if uri.contains('?') { '&' } else { '?' };
            let distributed = format!("{uri}{sep}{NETWORK_ID_PARAM}{network_id}");
            record.set_converted_uri(Some(distributed));
            converted += 1;
        }
        converted
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
