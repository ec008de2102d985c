//! Binary encoding of [`PasteData`] and single entries.
//!
//! Layout (all integers big-endian, strings and blobs `u32`-length-prefixed):
//!
//! ```text
//! magic "PBD" + format version (1)
//! props:   tag, timestamp_ms:u64, share_option:u8, screen_status:u8,
//!          flags:u8 (remote|delay_data|local_only|unified_data), data_id:u32,
//!          file_size:i64, device_id, bundle_name, app_index:i32, token_id:u32
//! records: count:u32, then per record
//!          record_id:u32, flags:u8 (delay_record|references_files),
//!          converted_uri (optional), entry count:u32, entries...
//! entry:   utd_id, value tag:u8, value payload
//! ```
//!
//! The MIME type of an entry is derived from its UTD id and is not stored.

use std::collections::BTreeMap;

use super::entry::{EntryValue, PasteDataEntry, PixelMap, Want};
use super::paste_data::{PasteData, PasteDataProperty, ScreenStatus, ShareOption, MAX_RECORD_COUNT};
use super::record::PasteRecord;
use crate::protocol::codec::ProtocolError;
use crate::protocol::wire::{self, WireReader};

const MAGIC: &[u8; 3] = b"PBD";
const FORMAT_VERSION: u8 = 1;

const FLAG_REMOTE: u8 = 0x01;
const FLAG_DELAY_DATA: u8 = 0x02;
const FLAG_LOCAL_ONLY: u8 = 0x04;
const FLAG_UNIFIED_DATA: u8 = 0x08;

const FLAG_DELAY_RECORD: u8 = 0x01;
const FLAG_REFERENCES_FILES: u8 = 0x02;

// Value tags.
const TAG_EMPTY: u8 = 0x00;
const TAG_TEXT: u8 = 0x01;
const TAG_HTML: u8 = 0x02;
const TAG_URI: u8 = 0x03;
const TAG_WANT: u8 = 0x04;
const TAG_PIXEL_MAP: u8 = 0x05;
const TAG_BYTES: u8 = 0x06;

// ── Public API ────────────────────────────────────────────────────────────────

/// Serialises a payload into bytes.
pub fn encode_paste_data(data: &PasteData) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + data.byte_len());
    buf.extend_from_slice(MAGIC);
    buf.push(FORMAT_VERSION);
    encode_props(&mut buf, data);

    wire::write_u32(&mut buf, data.record_count() as u32);
    for record in data.records() {
        encode_record(&mut buf, record);
    }
    buf
}

/// Parses bytes produced by [`encode_paste_data`].
///
/// # Errors
///
/// Returns [`ProtocolError`] for a bad magic, unknown version, truncated or
/// trailing bytes, or out-of-range enum values.
pub fn decode_paste_data(bytes: &[u8]) -> Result<PasteData, ProtocolError> {
    let mut r = WireReader::new(bytes);

    let mut magic = [0u8; 3];
    for b in &mut magic {
        *b = r.read_u8("PasteData.magic")?;
    }
    if &magic != MAGIC {
        return Err(ProtocolError::MalformedPayload("bad PasteData magic".into()));
    }
    let version = r.read_u8("PasteData.version")?;
    if version != FORMAT_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let (props, bundle_name, app_index, token_id) = decode_props(&mut r)?;

    let count = r.read_count(9, "PasteData.records")?;
    if count > MAX_RECORD_COUNT {
        return Err(ProtocolError::MalformedPayload(format!(
            "record count {count} exceeds {MAX_RECORD_COUNT}"
        )));
    }
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(decode_record(&mut r)?);
    }

    if !r.is_empty() {
        return Err(ProtocolError::MalformedPayload(format!(
            "{} trailing bytes after PasteData",
            r.remaining()
        )));
    }

    Ok(PasteData::restore(records, bundle_name, app_index, token_id, props))
}

/// Serialises one entry (used for single-entry peer fetches and
/// `GetRecordValueByType` replies).
pub fn encode_entry(entry: &PasteDataEntry) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + entry.value().byte_len());
    wire::write_u32(&mut buf, entry.record_id());
    encode_entry_body(&mut buf, entry);
    buf
}

/// Parses bytes produced by [`encode_entry`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_entry(bytes: &[u8]) -> Result<PasteDataEntry, ProtocolError> {
    let mut r = WireReader::new(bytes);
    let record_id = r.read_u32("Entry.record_id")?;
    let mut entry = decode_entry_body(&mut r)?;
    entry.set_record_id(record_id);
    if !r.is_empty() {
        return Err(ProtocolError::MalformedPayload("trailing bytes after entry".into()));
    }
    Ok(entry)
}

// ── Encoding helpers ──────────────────────────────────────────────────────────

fn encode_props(buf: &mut Vec<u8>, data: &PasteData) {
    let p = data.props();
    wire::write_string(buf, &p.tag);
    wire::write_u64(buf, p.timestamp_ms);
    wire::write_u8(buf, p.share_option as u8);
    wire::write_u8(buf, p.screen_status as u8);

    let mut flags = 0u8;
    if p.is_remote {
        flags |= FLAG_REMOTE;
    }
    if p.is_delay_data {
        flags |= FLAG_DELAY_DATA;
    }
    if p.local_only {
        flags |= FLAG_LOCAL_ONLY;
    }
    if p.is_unified_data {
        flags |= FLAG_UNIFIED_DATA;
    }
    wire::write_u8(buf, flags);
    wire::write_u32(buf, p.data_id);
    wire::write_i64(buf, p.file_size);
    wire::write_string(buf, &p.device_id);

    let (bundle_name, app_index) = data.origin_authority();
    wire::write_string(buf, bundle_name);
    wire::write_i32(buf, app_index);
    wire::write_u32(buf, data.token_id());
}

fn encode_record(buf: &mut Vec<u8>, record: &PasteRecord) {
    wire::write_u32(buf, record.record_id());
    let mut flags = 0u8;
    if record.is_delay_record() {
        flags |= FLAG_DELAY_RECORD;
    }
    if record.references_files() {
        flags |= FLAG_REFERENCES_FILES;
    }
    wire::write_u8(buf, flags);
    wire::write_opt_string(buf, record.converted_uri());
    wire::write_u32(buf, record.entries().len() as u32);
    for entry in record.entries() {
        encode_entry_body(buf, entry);
    }
}

fn encode_entry_body(buf: &mut Vec<u8>, entry: &PasteDataEntry) {
    wire::write_string(buf, entry.utd_id());
    match entry.value() {
        EntryValue::Empty => wire::write_u8(buf, TAG_EMPTY),
        EntryValue::Text(s) => {
            wire::write_u8(buf, TAG_TEXT);
            wire::write_string(buf, s);
        }
        EntryValue::Html(s) => {
            wire::write_u8(buf, TAG_HTML);
            wire::write_string(buf, s);
        }
        EntryValue::Uri(s) => {
            wire::write_u8(buf, TAG_URI);
            wire::write_string(buf, s);
        }
        EntryValue::Want(w) => {
            wire::write_u8(buf, TAG_WANT);
            wire::write_string(buf, &w.action);
            wire::write_u32(buf, w.params.len() as u32);
            for (k, v) in &w.params {
                wire::write_string(buf, k);
                wire::write_string(buf, v);
            }
        }
        EntryValue::PixelMap(p) => {
            wire::write_u8(buf, TAG_PIXEL_MAP);
            wire::write_u32(buf, p.width);
            wire::write_u32(buf, p.height);
            wire::write_bytes(buf, &p.pixels);
        }
        EntryValue::Bytes(b) => {
            wire::write_u8(buf, TAG_BYTES);
            wire::write_bytes(buf, b);
        }
    }
}

// ── Decoding helpers ──────────────────────────────────────────────────────────

fn decode_props(
    r: &mut WireReader<'_>,
) -> Result<(PasteDataProperty, String, i32, u32), ProtocolError> {
    let tag = r.read_string("props.tag")?;
    let timestamp_ms = r.read_u64("props.timestamp_ms")?;
    let share_byte = r.read_u8("props.share_option")?;
    let share_option = ShareOption::try_from(share_byte).map_err(|_| {
        ProtocolError::MalformedPayload(format!("unknown share option: {share_byte}"))
    })?;
    let screen_byte = r.read_u8("props.screen_status")?;
    let screen_status = ScreenStatus::try_from(screen_byte).map_err(|_| {
        ProtocolError::MalformedPayload(format!("unknown screen status: {screen_byte}"))
    })?;
    let flags = r.read_u8("props.flags")?;
    let data_id = r.read_u32("props.data_id")?;
    let file_size = r.read_i64("props.file_size")?;
    let device_id = r.read_string("props.device_id")?;
    let bundle_name = r.read_string("props.bundle_name")?;
    let app_index = r.read_i32("props.app_index")?;
    let token_id = r.read_u32("props.token_id")?;

    let props = PasteDataProperty {
        tag,
        timestamp_ms,
        share_option,
        screen_status,
        is_remote: flags & FLAG_REMOTE != 0,
        is_delay_data: flags & FLAG_DELAY_DATA != 0,
        local_only: flags & FLAG_LOCAL_ONLY != 0,
        is_unified_data: flags & FLAG_UNIFIED_DATA != 0,
        data_id,
        file_size,
        device_id,
    };
    Ok((props, bundle_name, app_index, token_id))
}

fn decode_record(r: &mut WireReader<'_>) -> Result<PasteRecord, ProtocolError> {
    let record_id = r.read_u32("record.id")?;
    let flags = r.read_u8("record.flags")?;
    let converted_uri = r.read_opt_string("record.converted_uri")?;
    let count = r.read_count(5, "record.entries")?;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(decode_entry_body(r)?);
    }
    Ok(PasteRecord::restore(
        record_id,
        entries,
        flags & FLAG_DELAY_RECORD != 0,
        flags & FLAG_REFERENCES_FILES != 0,
        converted_uri,
    ))
}

fn decode_entry_body(r: &mut WireReader<'_>) -> Result<PasteDataEntry, ProtocolError> {
    let utd_id = r.read_string("entry.utd_id")?;
    let tag = r.read_u8("entry.tag")?;
    let value = match tag {
        TAG_EMPTY => EntryValue::Empty,
        TAG_TEXT => EntryValue::Text(r.read_string("entry.text")?),
        TAG_HTML => EntryValue::Html(r.read_string("entry.html")?),
        TAG_URI => EntryValue::Uri(r.read_string("entry.uri")?),
        TAG_WANT => {
            let action = r.read_string("want.action")?;
            let n = r.read_count(8, "want.params")?;
            let mut params = BTreeMap::new();
            for _ in 0..n {
                let k = r.read_string("want.key")?;
                let v = r.read_string("want.value")?;
                params.insert(k, v);
            }
            EntryValue::Want(Want { action, params })
        }
        TAG_PIXEL_MAP => {
            let width = r.read_u32("pixel_map.width")?;
            let height = r.read_u32("pixel_map.height")?;
            let pixels = r.read_bytes("pixel_map.pixels")?;
            EntryValue::PixelMap(PixelMap {
                width,
                height,
                pixels,
            })
        }
        TAG_BYTES => EntryValue::Bytes(r.read_bytes("entry.bytes")?),
        other => {
            return Err(ProtocolError::MalformedPayload(format!(
                "unknown entry value tag: 0x{other:02X}"
            )))
        }
    };
    Ok(PasteDataEntry::new(utd_id, value))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mime::utd;

    fn sample() -> PasteData {
        let mut data = PasteData::new();
        data.add_record(PasteRecord::plain_text("hello")).unwrap();
        let mut html = PasteRecord::html("<img src=\"file:///a.png\">");
        html.set_references_files(true);
        data.add_record(html).unwrap();
        data.add_record(PasteRecord::uri("file:///docs/a.txt")).unwrap();
        let mut params = BTreeMap::new();
        params.insert("k".to_string(), "v".to_string());
        data.add_record(PasteRecord::want(Want {
            action: "open".into(),
            params,
        }))
        .unwrap();
        data.add_record(PasteRecord::pixel_map(PixelMap {
            width: 1,
            height: 1,
            pixels: vec![1, 2, 3, 4],
        }))
        .unwrap();
        data.add_record(PasteRecord::delayed([utd::HTML])).unwrap();
        data.set_origin_authority("com.example.editor", 2);
        data.bind_token(0xABCD).unwrap();
        let props = data.props_mut();
        props.tag = "drag".into();
        props.data_id = 7;
        props.file_size = 4096;
        props.share_option = ShareOption::LocalDevice;
        props.screen_status = ScreenStatus::Unlocked;
        props.local_only = true;
        props.is_unified_data = true;
        data.generate_distributed_uri("net-1");
        data
    }

    #[test]
    fn test_paste_data_survives_encoding() {
        // Arrange
        let original = sample();

        // Act
        let bytes = encode_paste_data(&original);
        let decoded = decode_paste_data(&bytes).unwrap();

        // Assert
        assert_eq!(decoded, original);
        assert_eq!(decoded.origin_authority(), ("com.example.editor", 2));
        assert_eq!(decoded.records()[2].effective_uri(), Some("file:///docs/a.txt?networkid=net-1"));
    }

    #[test]
    fn test_decoded_payload_continues_record_numbering() {
        let mut decoded = decode_paste_data(&encode_paste_data(&sample())).unwrap();
        let next = decoded.add_record(PasteRecord::plain_text("more")).unwrap();
        assert_eq!(next, 7);
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let bytes = encode_paste_data(&sample());
        for cut in [0, 3, 10, bytes.len() / 2, bytes.len() - 1] {
            assert!(decode_paste_data(&bytes[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut bytes = encode_paste_data(&sample());
        bytes.push(0);
        assert!(decode_paste_data(&bytes).is_err());
    }

    #[test]
    fn test_bad_magic_and_version() {
        let mut bytes = encode_paste_data(&PasteData::with_text("x"));
        bytes[3] = 9;
        assert_eq!(decode_paste_data(&bytes), Err(ProtocolError::UnsupportedVersion(9)));
        bytes[0] = b'X';
        assert!(matches!(
            decode_paste_data(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_single_entry_keeps_record_id() {
        let data = sample();
        let entry = data.entry(2, utd::HTML).unwrap();

        let decoded = decode_entry(&encode_entry(entry)).unwrap();

        assert_eq!(decoded.record_id(), 2);
        assert_eq!(&decoded, entry);
    }
}
