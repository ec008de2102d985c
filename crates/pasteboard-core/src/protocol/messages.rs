//! All pasteboard wire message types.
//!
//! Two channels share one frame format:
//!
//! - **IPC** (client process ⇄ local daemon): requests carry the caller's
//!   identity ([`CallerInfo`]) and are answered by exactly one reply message
//!   (`Status` on failure).
//! - **Peer link** (daemon ⇄ daemon): remote payload and entry fetches.

use serde::{Deserialize, Serialize};

use crate::model::ShareOption;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Total size of the common message header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Largest payload a single frame may carry.
///
/// IPC payloads above the inline threshold are split into
/// [`PayloadFragment`]s, so only peer-link frames ever come close.
pub const MAX_FRAME_PAYLOAD: usize = 160 * 1024 * 1024;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // IPC requests (0x01–0x3F)
    SetPasteData = 0x01,
    GetPasteData = 0x02,
    HasPasteData = 0x03,
    HasDataType = 0x04,
    GetMimeTypes = 0x05,
    Clear = 0x06,
    GetChangeCount = 0x07,
    IsRemoteData = 0x08,
    GetDataSource = 0x09,
    GetRemoteDeviceName = 0x0A,
    GetRecordValueByType = 0x0B,
    SetGlobalShareOption = 0x0C,
    RemoveGlobalShareOption = 0x0D,
    GetGlobalShareOption = 0x0E,
    SetAppShareOptions = 0x0F,
    RemoveAppShareOptions = 0x10,
    ShowProgress = 0x11,
    PayloadFragment = 0x20,
    Ping = 0x21,
    Pong = 0x22,
    // IPC replies (0x40–0x7F)
    Status = 0x40,
    PasteDataReply = 0x41,
    BoolReply = 0x42,
    MimeTypesReply = 0x43,
    CountReply = 0x44,
    TextReply = 0x45,
    EntryReply = 0x46,
    ShareOptionsReply = 0x47,
    // Peer link (0x80–0x8F)
    FetchEvent = 0x80,
    FetchEntry = 0x81,
    PeerData = 0x82,
    PublishEvent = 0x83,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::SetPasteData),
            0x02 => Ok(MessageType::GetPasteData),
            0x03 => Ok(MessageType::HasPasteData),
            0x04 => Ok(MessageType::HasDataType),
            0x05 => Ok(MessageType::GetMimeTypes),
            0x06 => Ok(MessageType::Clear),
            0x07 => Ok(MessageType::GetChangeCount),
            0x08 => Ok(MessageType::IsRemoteData),
            0x09 => Ok(MessageType::GetDataSource),
            0x0A => Ok(MessageType::GetRemoteDeviceName),
            0x0B => Ok(MessageType::GetRecordValueByType),
            0x0C => Ok(MessageType::SetGlobalShareOption),
            0x0D => Ok(MessageType::RemoveGlobalShareOption),
            0x0E => Ok(MessageType::GetGlobalShareOption),
            0x0F => Ok(MessageType::SetAppShareOptions),
            0x10 => Ok(MessageType::RemoveAppShareOptions),
            0x11 => Ok(MessageType::ShowProgress),
            0x20 => Ok(MessageType::PayloadFragment),
            0x21 => Ok(MessageType::Ping),
            0x22 => Ok(MessageType::Pong),
            0x40 => Ok(MessageType::Status),
            0x41 => Ok(MessageType::PasteDataReply),
            0x42 => Ok(MessageType::BoolReply),
            0x43 => Ok(MessageType::MimeTypesReply),
            0x44 => Ok(MessageType::CountReply),
            0x45 => Ok(MessageType::TextReply),
            0x46 => Ok(MessageType::EntryReply),
            0x47 => Ok(MessageType::ShareOptionsReply),
            0x80 => Ok(MessageType::FetchEvent),
            0x81 => Ok(MessageType::FetchEntry),
            0x82 => Ok(MessageType::PeerData),
            0x83 => Ok(MessageType::PublishEvent),
            _ => Err(()),
        }
    }
}

// ── Common message header ─────────────────────────────────────────────────────

/// 24-byte header prepended to every message on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Protocol version; always [`PROTOCOL_VERSION`].
    pub version: u8,
    /// Identifies the payload type.
    pub message_type: MessageType,
    /// Length of the payload in bytes (not including this header).
    pub payload_length: u32,
    /// Monotonically increasing per-connection counter.
    pub sequence_number: u64,
    /// Microseconds since Unix epoch at time of generation.
    pub timestamp_us: u64,
}

// ── Payload structs ───────────────────────────────────────────────────────────

/// Identity of the process issuing an IPC request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CallerInfo {
    pub token_id: u32,
    pub pid: u32,
}

/// SET_PASTE_DATA (0x01).
///
/// When `declared_size` exceeds the inline threshold `inline` is empty and
/// the encoded payload follows as [`PayloadFragment`] frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPasteDataRequest {
    pub caller: CallerInfo,
    pub declared_size: i64,
    pub inline: Vec<u8>,
}

/// HAS_DATA_TYPE (0x04).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HasDataTypeRequest {
    pub caller: CallerInfo,
    pub mime_type: String,
}

/// GET_RECORD_VALUE_BY_TYPE (0x0B).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordValueRequest {
    pub caller: CallerInfo,
    pub data_id: u32,
    pub record_id: u32,
    pub utd_id: String,
}

/// SET_GLOBAL_SHARE_OPTION (0x0C).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalShareOptionRequest {
    pub caller: CallerInfo,
    pub options: Vec<(u32, ShareOption)>,
}

/// REMOVE_/GET_GLOBAL_SHARE_OPTION (0x0D, 0x0E).  An empty token list on GET
/// means "all".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenListRequest {
    pub caller: CallerInfo,
    pub tokens: Vec<u32>,
}

/// SET_APP_SHARE_OPTIONS (0x0F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppShareOptionRequest {
    pub caller: CallerInfo,
    pub option: ShareOption,
}

/// SHOW_PROGRESS (0x11).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowProgressRequest {
    pub caller: CallerInfo,
    pub progress_key: String,
}

/// PAYLOAD_FRAGMENT (0x20): one slice of a large payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadFragment {
    pub data: Vec<u8>,
    /// `true` if more fragments follow.
    pub has_more_fragments: bool,
}

/// PASTE_DATA_REPLY (0x41).  Same inline/fragment rule as
/// [`SetPasteDataRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteDataReply {
    pub declared_size: i64,
    pub inline: Vec<u8>,
}

/// FETCH_EVENT (0x80): ask a peer for the payload behind a change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchEventRequest {
    pub user_id: u32,
    pub seq_id: u64,
}

/// FETCH_ENTRY (0x81): ask a peer for one delayed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchEntryRequest {
    pub user_id: u32,
    pub seq_id: u64,
    pub record_id: u32,
    pub utd_id: String,
}

/// A clipboard change announced to peer devices.
///
/// Identified by `(device_id, seq_id)`; the payload itself stays on the
/// source device until a peer fetches it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistributedEvent {
    /// Network id of the device that owns the payload.
    pub device_id: String,
    pub user_id: u32,
    pub seq_id: u64,
    /// Milliseconds since the Unix epoch when the payload was set.
    pub timestamp_ms: u64,
    /// Milliseconds since the Unix epoch after which the event is stale.
    pub expiration_ms: u64,
    /// Encoded size of the payload, used to size link wait timeouts.
    pub data_len: u64,
    /// The payload carries delayed records.
    pub is_delay: bool,
    pub mime_types: Vec<String>,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All messages exchanged over IPC and the peer link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasteMessage {
    SetPasteData(SetPasteDataRequest),
    GetPasteData(CallerInfo),
    HasPasteData(CallerInfo),
    HasDataType(HasDataTypeRequest),
    GetMimeTypes(CallerInfo),
    Clear(CallerInfo),
    GetChangeCount(CallerInfo),
    IsRemoteData(CallerInfo),
    GetDataSource(CallerInfo),
    GetRemoteDeviceName(CallerInfo),
    GetRecordValueByType(RecordValueRequest),
    SetGlobalShareOption(GlobalShareOptionRequest),
    RemoveGlobalShareOption(TokenListRequest),
    GetGlobalShareOption(TokenListRequest),
    SetAppShareOptions(AppShareOptionRequest),
    RemoveAppShareOptions(CallerInfo),
    ShowProgress(ShowProgressRequest),
    PayloadFragment(PayloadFragment),
    Ping(u64),
    Pong(u64),
    /// Bare status reply: `0` for success, otherwise a `PasteboardError` code.
    Status(u32),
    PasteDataReply(PasteDataReply),
    BoolReply(bool),
    MimeTypesReply(Vec<String>),
    CountReply(u32),
    TextReply(String),
    /// An entry encoded with `model::encode_entry`.
    EntryReply(Vec<u8>),
    ShareOptionsReply(Vec<(u32, ShareOption)>),
    FetchEvent(FetchEventRequest),
    FetchEntry(FetchEntryRequest),
    /// Raw bytes answering a peer fetch.
    PeerData(Vec<u8>),
    PublishEvent(DistributedEvent),
}

impl PasteMessage {
    /// Returns the wire type code for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            PasteMessage::SetPasteData(_) => MessageType::SetPasteData,
            PasteMessage::GetPasteData(_) => MessageType::GetPasteData,
            PasteMessage::HasPasteData(_) => MessageType::HasPasteData,
            PasteMessage::HasDataType(_) => MessageType::HasDataType,
            PasteMessage::GetMimeTypes(_) => MessageType::GetMimeTypes,
            PasteMessage::Clear(_) => MessageType::Clear,
            PasteMessage::GetChangeCount(_) => MessageType::GetChangeCount,
            PasteMessage::IsRemoteData(_) => MessageType::IsRemoteData,
            PasteMessage::GetDataSource(_) => MessageType::GetDataSource,
            PasteMessage::GetRemoteDeviceName(_) => MessageType::GetRemoteDeviceName,
            PasteMessage::GetRecordValueByType(_) => MessageType::GetRecordValueByType,
            PasteMessage::SetGlobalShareOption(_) => MessageType::SetGlobalShareOption,
            PasteMessage::RemoveGlobalShareOption(_) => MessageType::RemoveGlobalShareOption,
            PasteMessage::GetGlobalShareOption(_) => MessageType::GetGlobalShareOption,
            PasteMessage::SetAppShareOptions(_) => MessageType::SetAppShareOptions,
            PasteMessage::RemoveAppShareOptions(_) => MessageType::RemoveAppShareOptions,
            PasteMessage::ShowProgress(_) => MessageType::ShowProgress,
            PasteMessage::PayloadFragment(_) => MessageType::PayloadFragment,
            PasteMessage::Ping(_) => MessageType::Ping,
            PasteMessage::Pong(_) => MessageType::Pong,
            PasteMessage::Status(_) => MessageType::Status,
            PasteMessage::PasteDataReply(_) => MessageType::PasteDataReply,
            PasteMessage::BoolReply(_) => MessageType::BoolReply,
            PasteMessage::MimeTypesReply(_) => MessageType::MimeTypesReply,
            PasteMessage::CountReply(_) => MessageType::CountReply,
            PasteMessage::TextReply(_) => MessageType::TextReply,
            PasteMessage::EntryReply(_) => MessageType::EntryReply,
            PasteMessage::ShareOptionsReply(_) => MessageType::ShareOptionsReply,
            PasteMessage::FetchEvent(_) => MessageType::FetchEvent,
            PasteMessage::FetchEntry(_) => MessageType::FetchEntry,
            PasteMessage::PeerData(_) => MessageType::PeerData,
            PasteMessage::PublishEvent(_) => MessageType::PublishEvent,
        }
    }

    /// The caller identity carried by an IPC request, if any.
    pub fn caller(&self) -> Option<CallerInfo> {
        match self {
            PasteMessage::SetPasteData(m) => Some(m.caller),
            PasteMessage::GetPasteData(c)
            | PasteMessage::HasPasteData(c)
            | PasteMessage::GetMimeTypes(c)
            | PasteMessage::Clear(c)
            | PasteMessage::GetChangeCount(c)
            | PasteMessage::IsRemoteData(c)
            | PasteMessage::GetDataSource(c)
            | PasteMessage::GetRemoteDeviceName(c)
            | PasteMessage::RemoveAppShareOptions(c) => Some(*c),
            PasteMessage::HasDataType(m) => Some(m.caller),
            PasteMessage::GetRecordValueByType(m) => Some(m.caller),
            PasteMessage::SetGlobalShareOption(m) => Some(m.caller),
            PasteMessage::RemoveGlobalShareOption(m) | PasteMessage::GetGlobalShareOption(m) => {
                Some(m.caller)
            }
            PasteMessage::SetAppShareOptions(m) => Some(m.caller),
            PasteMessage::ShowProgress(m) => Some(m.caller),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_message_type_code_round_trips_through_try_from() {
        let all = [
            MessageType::SetPasteData,
            MessageType::GetPasteData,
            MessageType::ShowProgress,
            MessageType::PayloadFragment,
            MessageType::Status,
            MessageType::ShareOptionsReply,
            MessageType::FetchEvent,
            MessageType::PeerData,
        ];
        for t in all {
            assert_eq!(MessageType::try_from(t as u8), Ok(t));
        }
        assert_eq!(MessageType::try_from(0xFF), Err(()));
    }

    #[test]
    fn test_caller_is_present_only_on_ipc_requests() {
        let caller = CallerInfo { token_id: 5, pid: 77 };
        assert_eq!(PasteMessage::Clear(caller).caller(), Some(caller));
        assert_eq!(PasteMessage::Status(0).caller(), None);
        assert_eq!(
            PasteMessage::FetchEvent(FetchEventRequest { user_id: 100, seq_id: 1 }).caller(),
            None
        );
    }
}
