//! A single typed value inside a [`PasteRecord`](super::PasteRecord).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::mime::{self, utd};

/// Structured "want" value: an action plus string parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Want {
    pub action: String,
    pub params: BTreeMap<String, String>,
}

/// Raw RGBA pixel map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelMap {
    pub width: u32,
    pub height: u32,
    /// `width * height * 4` bytes, row-major RGBA.
    pub pixels: Vec<u8>,
}

/// The value held by an entry.
///
/// `Empty` means the entry is a placeholder waiting for resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EntryValue {
    #[default]
    Empty,
    Text(String),
    Html(String),
    Uri(String),
    Want(Want),
    PixelMap(PixelMap),
    Bytes(Vec<u8>),
}

impl EntryValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, EntryValue::Empty)
    }

    /// Approximate in-memory size, used for P2P wait estimates.
    pub fn byte_len(&self) -> usize {
        match self {
            EntryValue::Empty => 0,
            EntryValue::Text(s) | EntryValue::Html(s) | EntryValue::Uri(s) => s.len(),
            EntryValue::Want(w) => {
                w.action.len() + w.params.iter().map(|(k, v)| k.len() + v.len()).sum::<usize>()
            }
            EntryValue::PixelMap(p) => p.pixels.len(),
            EntryValue::Bytes(b) => b.len(),
        }
    }
}

/// One typed value in a record.
///
/// An entry is *unresolved* when it carries a UTD id and its owning record id
/// but no value.  The service must attempt resolution before handing such an
/// entry to a reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteDataEntry {
    utd_id: String,
    mime_type: String,
    record_id: u32,
    value: EntryValue,
}

impl PasteDataEntry {
    /// Creates a resolved entry.  The MIME type is derived from the UTD id.
    pub fn new(utd_id: impl Into<String>, value: EntryValue) -> Self {
        let utd_id = utd_id.into();
        let mime_type = mime::mime_for_utd(&utd_id).to_string();
        Self {
            utd_id,
            mime_type,
            record_id: 0,
            value,
        }
    }

    /// Creates a placeholder entry for the given UTD id.
    pub fn unresolved(utd_id: impl Into<String>) -> Self {
        Self::new(utd_id, EntryValue::Empty)
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::new(utd::PLAIN_TEXT, EntryValue::Text(s.into()))
    }

    pub fn html(s: impl Into<String>) -> Self {
        Self::new(utd::HTML, EntryValue::Html(s.into()))
    }

    pub fn uri(s: impl Into<String>) -> Self {
        Self::new(utd::FILE_URI, EntryValue::Uri(s.into()))
    }

    pub fn want(w: Want) -> Self {
        Self::new(utd::WANT, EntryValue::Want(w))
    }

    pub fn pixel_map(p: PixelMap) -> Self {
        Self::new(utd::PIXEL_MAP, EntryValue::PixelMap(p))
    }

    /// Opaque bytes under a caller-chosen type identifier.
    pub fn custom(type_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        let type_id = type_id.into();
        let utd_id = mime::utd_for_mime(&type_id).to_string();
        Self::new(utd_id, EntryValue::Bytes(bytes))
    }

    pub fn utd_id(&self) -> &str {
        &self.utd_id
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn record_id(&self) -> u32 {
        self.record_id
    }

    pub(crate) fn set_record_id(&mut self, record_id: u32) {
        self.record_id = record_id;
    }

    pub fn value(&self) -> &EntryValue {
        &self.value
    }

    pub fn set_value(&mut self, value: EntryValue) {
        self.value = value;
    }

    pub fn is_unresolved(&self) -> bool {
        self.value.is_empty()
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            EntryValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_html(&self) -> Option<&str> {
        match &self.value {
            EntryValue::Html(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_uri(&self) -> Option<&str> {
        match &self.value {
            EntryValue::Uri(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_want(&self) -> Option<&Want> {
        match &self.value {
            EntryValue::Want(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_pixel_map(&self) -> Option<&PixelMap> {
        match &self.value {
            EntryValue::PixelMap(p) => Some(p),
            _ => None,
        }
    }
}
