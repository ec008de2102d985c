//! Binary codec for encoding and decoding pasteboard protocol messages.
//!
//! Wire format:
//! ```text
//! [version:1][msg_type:1][reserved:2][payload_len:4][seq:8][timestamp_us:8][payload:N]
//! ```
//! Total header size: 24 bytes. All multi-byte integers are big-endian.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::error::PasteboardError;
use crate::model::ShareOption;
use crate::protocol::messages::{
    AppShareOptionRequest, CallerInfo, DistributedEvent, FetchEntryRequest, FetchEventRequest,
    GlobalShareOptionRequest, HasDataTypeRequest, MessageHeader, MessageType, PasteDataReply,
    PasteMessage, PayloadFragment, RecordValueRequest, SetPasteDataRequest, ShowProgressRequest,
    TokenListRequest, HEADER_SIZE, MAX_FRAME_PAYLOAD, PROTOCOL_VERSION,
};
use crate::protocol::wire::{self, WireReader};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed (field value out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded payload length field does not match the actual data available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// The payload is larger than a single frame may carry.
    #[error("frame payload of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
}

impl From<ProtocolError> for PasteboardError {
    fn from(_: ProtocolError) -> Self {
        PasteboardError::Serialization
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`PasteMessage`] into a byte vector including the 24-byte header.
///
/// The sequence number is **not** set by this function – pass a pre-incremented
/// value from a [`crate::protocol::SequenceCounter`].
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the payload exceeds
/// [`MAX_FRAME_PAYLOAD`].
///
/// # Examples
///
/// ```rust
/// use pasteboard_core::protocol::{encode_message, decode_message};
/// use pasteboard_core::protocol::messages::PasteMessage;
///
/// let msg = PasteMessage::Ping(42);
/// let bytes = encode_message(&msg, 0, 0).unwrap();
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(
    msg: &PasteMessage,
    sequence_number: u64,
    timestamp_us: u64,
) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(msg);
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }
    let payload_len = payload.len() as u32;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());

    // Header: version (1) + msg_type (1) + reserved (2) + payload_len (4) +
    //         seq (8) + timestamp_us (8) = 24 bytes
    buf.push(PROTOCOL_VERSION);
    buf.push(msg.message_type() as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(&sequence_number.to_be_bytes());
    buf.extend_from_slice(&timestamp_us.to_be_bytes());

    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Encodes a [`PasteMessage`] using the current system time as the timestamp.
///
/// # Errors
///
/// Returns [`ProtocolError`] if serialization fails.
pub fn encode_message_now(
    msg: &PasteMessage,
    sequence_number: u64,
) -> Result<Vec<u8>, ProtocolError> {
    encode_message(msg, sequence_number, current_timestamp_us())
}

/// Microseconds since the Unix epoch, `0` if the clock is before it.
pub fn current_timestamp_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Parses the fixed 24-byte header.
///
/// Stream readers call this on the first [`HEADER_SIZE`] bytes to learn how
/// many payload bytes to read next.
///
/// # Errors
///
/// Returns [`ProtocolError`] for a short buffer, unknown version or type, or
/// a payload length above [`MAX_FRAME_PAYLOAD`].
pub fn decode_header(bytes: &[u8]) -> Result<MessageHeader, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let msg_type_byte = bytes[1];
    let message_type = MessageType::try_from(msg_type_byte)
        .map_err(|_| ProtocolError::UnknownMessageType(msg_type_byte))?;

    // bytes[2..4] are reserved – ignored on decode

    let mut r = WireReader::new(&bytes[4..HEADER_SIZE]);
    let payload_length = r.read_u32("header.payload_len")?;
    let sequence_number = r.read_u64("header.seq")?;
    let timestamp_us = r.read_u64("header.timestamp")?;

    if payload_length as usize > MAX_FRAME_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge(payload_length as usize));
    }

    Ok(MessageHeader {
        version,
        message_type,
        payload_length,
        sequence_number,
        timestamp_us,
    })
}

/// Decodes one [`PasteMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed
/// (header + payload), so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_message(bytes: &[u8]) -> Result<(PasteMessage, usize), ProtocolError> {
    let header = decode_header(bytes)?;
    let payload_len = header.payload_length as usize;

    let total_needed = HEADER_SIZE + payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: payload_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }

    let payload = &bytes[HEADER_SIZE..total_needed];
    let msg = decode_payload(header.message_type, payload)?;
    Ok((msg, total_needed))
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &PasteMessage) -> Vec<u8> {
    let mut buf = Vec::new();
    match msg {
        PasteMessage::SetPasteData(m) => {
            encode_caller(&mut buf, &m.caller);
            wire::write_i64(&mut buf, m.declared_size);
            wire::write_bytes(&mut buf, &m.inline);
        }
        PasteMessage::GetPasteData(c)
        | PasteMessage::HasPasteData(c)
        | PasteMessage::GetMimeTypes(c)
        | PasteMessage::Clear(c)
        | PasteMessage::GetChangeCount(c)
        | PasteMessage::IsRemoteData(c)
        | PasteMessage::GetDataSource(c)
        | PasteMessage::GetRemoteDeviceName(c)
        | PasteMessage::RemoveAppShareOptions(c) => encode_caller(&mut buf, c),
        PasteMessage::HasDataType(m) => {
            encode_caller(&mut buf, &m.caller);
            wire::write_string(&mut buf, &m.mime_type);
        }
        PasteMessage::GetRecordValueByType(m) => {
            encode_caller(&mut buf, &m.caller);
            wire::write_u32(&mut buf, m.data_id);
            wire::write_u32(&mut buf, m.record_id);
            wire::write_string(&mut buf, &m.utd_id);
        }
        PasteMessage::SetGlobalShareOption(m) => {
            encode_caller(&mut buf, &m.caller);
            encode_share_options(&mut buf, &m.options);
        }
        PasteMessage::RemoveGlobalShareOption(m) | PasteMessage::GetGlobalShareOption(m) => {
            encode_caller(&mut buf, &m.caller);
            wire::write_u32(&mut buf, m.tokens.len() as u32);
            for token in &m.tokens {
                wire::write_u32(&mut buf, *token);
            }
        }
        PasteMessage::SetAppShareOptions(m) => {
            encode_caller(&mut buf, &m.caller);
            wire::write_u8(&mut buf, m.option as u8);
        }
        PasteMessage::ShowProgress(m) => {
            encode_caller(&mut buf, &m.caller);
            wire::write_string(&mut buf, &m.progress_key);
        }
        PasteMessage::PayloadFragment(m) => {
            wire::write_bytes(&mut buf, &m.data);
            wire::write_bool(&mut buf, m.has_more_fragments);
        }
        PasteMessage::Ping(token) | PasteMessage::Pong(token) => wire::write_u64(&mut buf, *token),
        PasteMessage::Status(code) => wire::write_u32(&mut buf, *code),
        PasteMessage::PasteDataReply(m) => {
            wire::write_i64(&mut buf, m.declared_size);
            wire::write_bytes(&mut buf, &m.inline);
        }
        PasteMessage::BoolReply(v) => wire::write_bool(&mut buf, *v),
        PasteMessage::MimeTypesReply(types) => {
            wire::write_u32(&mut buf, types.len() as u32);
            for t in types {
                wire::write_string(&mut buf, t);
            }
        }
        PasteMessage::CountReply(n) => wire::write_u32(&mut buf, *n),
        PasteMessage::TextReply(s) => wire::write_string(&mut buf, s),
        PasteMessage::EntryReply(bytes) | PasteMessage::PeerData(bytes) => {
            wire::write_bytes(&mut buf, bytes)
        }
        PasteMessage::ShareOptionsReply(options) => encode_share_options(&mut buf, options),
        PasteMessage::FetchEvent(m) => {
            wire::write_u32(&mut buf, m.user_id);
            wire::write_u64(&mut buf, m.seq_id);
        }
        PasteMessage::FetchEntry(m) => {
            wire::write_u32(&mut buf, m.user_id);
            wire::write_u64(&mut buf, m.seq_id);
            wire::write_u32(&mut buf, m.record_id);
            wire::write_string(&mut buf, &m.utd_id);
        }
        PasteMessage::PublishEvent(e) => {
            wire::write_string(&mut buf, &e.device_id);
            wire::write_u32(&mut buf, e.user_id);
            wire::write_u64(&mut buf, e.seq_id);
            wire::write_u64(&mut buf, e.timestamp_ms);
            wire::write_u64(&mut buf, e.expiration_ms);
            wire::write_u64(&mut buf, e.data_len);
            wire::write_bool(&mut buf, e.is_delay);
            wire::write_u32(&mut buf, e.mime_types.len() as u32);
            for m in &e.mime_types {
                wire::write_string(&mut buf, m);
            }
        }
    }
    buf
}

fn encode_caller(buf: &mut Vec<u8>, caller: &CallerInfo) {
    wire::write_u32(buf, caller.token_id);
    wire::write_u32(buf, caller.pid);
}

fn encode_share_options(buf: &mut Vec<u8>, options: &[(u32, ShareOption)]) {
    wire::write_u32(buf, options.len() as u32);
    for (token, option) in options {
        wire::write_u32(buf, *token);
        wire::write_u8(buf, *option as u8);
    }
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<PasteMessage, ProtocolError> {
    let mut r = WireReader::new(payload);
    let msg = match msg_type {
        MessageType::SetPasteData => PasteMessage::SetPasteData(SetPasteDataRequest {
            caller: decode_caller(&mut r)?,
            declared_size: r.read_i64("SetPasteData.declared_size")?,
            inline: r.read_bytes("SetPasteData.inline")?,
        }),
        MessageType::GetPasteData => PasteMessage::GetPasteData(decode_caller(&mut r)?),
        MessageType::HasPasteData => PasteMessage::HasPasteData(decode_caller(&mut r)?),
        MessageType::HasDataType => PasteMessage::HasDataType(HasDataTypeRequest {
            caller: decode_caller(&mut r)?,
            mime_type: r.read_string("HasDataType.mime_type")?,
        }),
        MessageType::GetMimeTypes => PasteMessage::GetMimeTypes(decode_caller(&mut r)?),
        MessageType::Clear => PasteMessage::Clear(decode_caller(&mut r)?),
        MessageType::GetChangeCount => PasteMessage::GetChangeCount(decode_caller(&mut r)?),
        MessageType::IsRemoteData => PasteMessage::IsRemoteData(decode_caller(&mut r)?),
        MessageType::GetDataSource => PasteMessage::GetDataSource(decode_caller(&mut r)?),
        MessageType::GetRemoteDeviceName => {
            PasteMessage::GetRemoteDeviceName(decode_caller(&mut r)?)
        }
        MessageType::GetRecordValueByType => {
            PasteMessage::GetRecordValueByType(RecordValueRequest {
                caller: decode_caller(&mut r)?,
                data_id: r.read_u32("RecordValue.data_id")?,
                record_id: r.read_u32("RecordValue.record_id")?,
                utd_id: r.read_string("RecordValue.utd_id")?,
            })
        }
        MessageType::SetGlobalShareOption => {
            PasteMessage::SetGlobalShareOption(GlobalShareOptionRequest {
                caller: decode_caller(&mut r)?,
                options: decode_share_options(&mut r)?,
            })
        }
        MessageType::RemoveGlobalShareOption => {
            PasteMessage::RemoveGlobalShareOption(decode_token_list(&mut r)?)
        }
        MessageType::GetGlobalShareOption => {
            PasteMessage::GetGlobalShareOption(decode_token_list(&mut r)?)
        }
        MessageType::SetAppShareOptions => {
            let caller = decode_caller(&mut r)?;
            let option = decode_share_option(&mut r)?;
            PasteMessage::SetAppShareOptions(AppShareOptionRequest { caller, option })
        }
        MessageType::RemoveAppShareOptions => {
            PasteMessage::RemoveAppShareOptions(decode_caller(&mut r)?)
        }
        MessageType::ShowProgress => PasteMessage::ShowProgress(ShowProgressRequest {
            caller: decode_caller(&mut r)?,
            progress_key: r.read_string("ShowProgress.key")?,
        }),
        MessageType::PayloadFragment => PasteMessage::PayloadFragment(PayloadFragment {
            data: r.read_bytes("Fragment.data")?,
            has_more_fragments: r.read_bool("Fragment.has_more")?,
        }),
        MessageType::Ping => PasteMessage::Ping(r.read_u64("Ping")?),
        MessageType::Pong => PasteMessage::Pong(r.read_u64("Pong")?),
        MessageType::Status => PasteMessage::Status(r.read_u32("Status")?),
        MessageType::PasteDataReply => PasteMessage::PasteDataReply(PasteDataReply {
            declared_size: r.read_i64("PasteDataReply.declared_size")?,
            inline: r.read_bytes("PasteDataReply.inline")?,
        }),
        MessageType::BoolReply => PasteMessage::BoolReply(r.read_bool("BoolReply")?),
        MessageType::MimeTypesReply => {
            let n = r.read_count(4, "MimeTypes")?;
            let mut types = Vec::with_capacity(n);
            for _ in 0..n {
                types.push(r.read_string("MimeTypes.item")?);
            }
            PasteMessage::MimeTypesReply(types)
        }
        MessageType::CountReply => PasteMessage::CountReply(r.read_u32("CountReply")?),
        MessageType::TextReply => PasteMessage::TextReply(r.read_string("TextReply")?),
        MessageType::EntryReply => PasteMessage::EntryReply(r.read_bytes("EntryReply")?),
        MessageType::ShareOptionsReply => {
            PasteMessage::ShareOptionsReply(decode_share_options(&mut r)?)
        }
        MessageType::FetchEvent => PasteMessage::FetchEvent(FetchEventRequest {
            user_id: r.read_u32("FetchEvent.user_id")?,
            seq_id: r.read_u64("FetchEvent.seq_id")?,
        }),
        MessageType::FetchEntry => PasteMessage::FetchEntry(FetchEntryRequest {
            user_id: r.read_u32("FetchEntry.user_id")?,
            seq_id: r.read_u64("FetchEntry.seq_id")?,
            record_id: r.read_u32("FetchEntry.record_id")?,
            utd_id: r.read_string("FetchEntry.utd_id")?,
        }),
        MessageType::PeerData => PasteMessage::PeerData(r.read_bytes("PeerData")?),
        MessageType::PublishEvent => PasteMessage::PublishEvent(decode_event(&mut r)?),
    };

    if !r.is_empty() {
        return Err(ProtocolError::MalformedPayload(format!(
            "{:?}: {} trailing bytes",
            msg_type,
            r.remaining()
        )));
    }
    Ok(msg)
}

fn decode_event(r: &mut WireReader<'_>) -> Result<DistributedEvent, ProtocolError> {
    let device_id = r.read_string("event.device_id")?;
    let user_id = r.read_u32("event.user_id")?;
    let seq_id = r.read_u64("event.seq_id")?;
    let timestamp_ms = r.read_u64("event.timestamp_ms")?;
    let expiration_ms = r.read_u64("event.expiration_ms")?;
    let data_len = r.read_u64("event.data_len")?;
    let is_delay = r.read_bool("event.is_delay")?;
    let n = r.read_count(4, "event.mime_types")?;
    let mut mime_types = Vec::with_capacity(n);
    for _ in 0..n {
        mime_types.push(r.read_string("event.mime_type")?);
    }
    Ok(DistributedEvent {
        device_id,
        user_id,
        seq_id,
        timestamp_ms,
        expiration_ms,
        data_len,
        is_delay,
        mime_types,
    })
}

fn decode_caller(r: &mut WireReader<'_>) -> Result<CallerInfo, ProtocolError> {
    Ok(CallerInfo {
        token_id: r.read_u32("caller.token_id")?,
        pid: r.read_u32("caller.pid")?,
    })
}

fn decode_share_option(r: &mut WireReader<'_>) -> Result<ShareOption, ProtocolError> {
    let byte = r.read_u8("share_option")?;
    ShareOption::try_from(byte)
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown share option: {byte}")))
}

fn decode_share_options(
    r: &mut WireReader<'_>,
) -> Result<Vec<(u32, ShareOption)>, ProtocolError> {
    let n = r.read_count(5, "share_options")?;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let token = r.read_u32("share_options.token")?;
        out.push((token, decode_share_option(r)?));
    }
    Ok(out)
}

fn decode_token_list(r: &mut WireReader<'_>) -> Result<TokenListRequest, ProtocolError> {
    let caller = decode_caller(r)?;
    let n = r.read_count(4, "tokens")?;
    let mut tokens = Vec::with_capacity(n);
    for _ in 0..n {
        tokens.push(r.read_u32("tokens.item")?);
    }
    Ok(TokenListRequest { caller, tokens })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
