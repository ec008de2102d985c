//! One clipboard slot: an ordered set of typed entries.

use serde::{Deserialize, Serialize};

use super::entry::{EntryValue, PasteDataEntry, PixelMap, Want};
use super::mime::{self, utd, MIMETYPE_OCTET_STREAM};

/// A record inside a [`PasteData`](super::PasteData).
///
/// Entries are keyed by UTD id; adding a second entry with the same UTD id
/// replaces the first, so there is exactly one primary value per legacy type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteRecord {
    record_id: u32,
    mime_type: String,
    entries: Vec<PasteDataEntry>,
    /// Entries of this record are materialised on demand.
    delay_record: bool,
    /// Rich HTML that references local files which must travel with it.
    references_files: bool,
    /// Distributed-addressable form of the URI entry, set before the
    /// payload is shipped to another device.
    converted_uri: Option<String>,
}

impl Default for PasteRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl PasteRecord {
    /// Creates an empty record.  Its effective MIME type is octet-stream until
    /// an entry is added.
    pub fn new() -> Self {
        Self {
            record_id: 0,
            mime_type: MIMETYPE_OCTET_STREAM.to_string(),
            entries: Vec::new(),
            delay_record: false,
            references_files: false,
            converted_uri: None,
        }
    }

    pub fn with_entry(entry: PasteDataEntry) -> Self {
        let mut record = Self::new();
        record.add_entry(entry);
        record
    }

    pub fn plain_text(text: impl Into<String>) -> Self {
        Self::with_entry(PasteDataEntry::text(text))
    }

    pub fn html(html: impl Into<String>) -> Self {
        Self::with_entry(PasteDataEntry::html(html))
    }

    pub fn uri(uri: impl Into<String>) -> Self {
        Self::with_entry(PasteDataEntry::uri(uri))
    }

    pub fn want(want: Want) -> Self {
        Self::with_entry(PasteDataEntry::want(want))
    }

    pub fn pixel_map(pixel_map: PixelMap) -> Self {
        Self::with_entry(PasteDataEntry::pixel_map(pixel_map))
    }

    pub fn custom(type_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::with_entry(PasteDataEntry::custom(type_id, bytes))
    }

    /// A delayed record advertising the given UTD ids with no values yet.
    pub fn delayed<I, S>(utd_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut record = Self::new();
        for id in utd_ids {
            record.add_entry(PasteDataEntry::unresolved(id));
        }
        record.delay_record = true;
        record
    }

    pub(crate) fn restore(
        record_id: u32,
        entries: Vec<PasteDataEntry>,
        delay_record: bool,
        references_files: bool,
        converted_uri: Option<String>,
    ) -> Self {
        let mut record = Self {
            record_id,
            mime_type: MIMETYPE_OCTET_STREAM.to_string(),
            entries,
            delay_record,
            references_files,
            converted_uri,
        };
        record.set_record_id(record_id);
        record.refresh_mime_type();
        record
    }

    /// Adds or replaces the entry with the same UTD id and refreshes the
    /// effective MIME type.
    pub fn add_entry(&mut self, mut entry: PasteDataEntry) {
        entry.set_record_id(self.record_id);
        match self
            .entries
            .iter_mut()
            .find(|e| e.utd_id() == entry.utd_id())
        {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
        self.refresh_mime_type();
    }

    /// The effective MIME type is that of the first entry.
    pub fn refresh_mime_type(&mut self) {
        self.mime_type = self
            .entries
            .first()
            .map(|e| e.mime_type().to_string())
            .unwrap_or_else(|| MIMETYPE_OCTET_STREAM.to_string());
    }

    pub fn record_id(&self) -> u32 {
        self.record_id
    }

    pub(crate) fn set_record_id(&mut self, record_id: u32) {
        self.record_id = record_id;
        for entry in &mut self.entries {
            entry.set_record_id(record_id);
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// MIME types of all entries, de-duplicated, in entry order.
    pub fn mime_types(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !out.iter().any(|m| m == entry.mime_type()) {
                out.push(entry.mime_type().to_string());
            }
        }
        out
    }

    pub fn entries(&self) -> &[PasteDataEntry] {
        &self.entries
    }

    pub fn get_entry(&self, utd_id: &str) -> Option<&PasteDataEntry> {
        self.entries.iter().find(|e| e.utd_id() == utd_id)
    }

    pub fn get_entry_mut(&mut self, utd_id: &str) -> Option<&mut PasteDataEntry> {
        self.entries.iter_mut().find(|e| e.utd_id() == utd_id)
    }

    /// Looks an entry up by MIME type instead of UTD id.
    pub fn get_entry_by_mime(&self, mime_type: &str) -> Option<&PasteDataEntry> {
        self.get_entry(mime::utd_for_mime(mime_type))
    }

    pub fn is_delay_record(&self) -> bool {
        self.delay_record
    }

    pub fn set_delay_record(&mut self, delay: bool) {
        self.delay_record = delay;
    }

    pub fn references_files(&self) -> bool {
        self.references_files
    }

    pub fn set_references_files(&mut self, references_files: bool) {
        self.references_files = references_files;
    }

    pub fn converted_uri(&self) -> Option<&str> {
        self.converted_uri.as_deref()
    }

    pub fn set_converted_uri(&mut self, uri: Option<String>) {
        self.converted_uri = uri;
    }

    /// Returns `true` if any entry still lacks a value.
    pub fn has_unresolved_entries(&self) -> bool {
        self.entries.iter().any(PasteDataEntry::is_unresolved)
    }

    pub fn primary_text(&self) -> Option<&str> {
        self.get_entry(utd::PLAIN_TEXT).and_then(PasteDataEntry::as_text)
    }

    pub fn primary_html(&self) -> Option<&str> {
        self.get_entry(utd::HTML).and_then(PasteDataEntry::as_html)
    }

    /// The original URI as produced by the writer.
    pub fn primary_uri(&self) -> Option<&str> {
        self.get_entry(utd::FILE_URI).and_then(PasteDataEntry::as_uri)
    }

    /// The URI a reader should open: the converted form when present.
    pub fn effective_uri(&self) -> Option<&str> {
        self.converted_uri().or_else(|| self.primary_uri())
    }

    pub fn primary_want(&self) -> Option<&Want> {
        self.get_entry(utd::WANT).and_then(PasteDataEntry::as_want)
    }

    pub fn primary_pixel_map(&self) -> Option<&PixelMap> {
        self.get_entry(utd::PIXEL_MAP).and_then(PasteDataEntry::as_pixel_map)
    }

    /// Rough payload size of all resolved entries.
    pub fn byte_len(&self) -> usize {
        self.entries.iter().map(|e| e.value().byte_len()).sum()
    }

    pub(crate) fn replace_value(&mut self, utd_id: &str, value: EntryValue) -> bool {
        match self.get_entry_mut(utd_id) {
            Some(entry) => {
                entry.set_value(value);
                true
            }
            None => false,
        }
    }
}
