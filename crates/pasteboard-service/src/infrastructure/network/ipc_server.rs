//! Local IPC endpoint.
//!
//! # Connection loop (for beginners)
//!
//! Each accepted connection runs one strictly sequential loop:
//!
//! ```text
//! read request frame
//!   └─ SetPasteData above the inline threshold?
//!        └─ spool the following PayloadFragment run into a SharedRegion
//! dispatch ──► Reply or error
//! write reply frame (Status(code) for errors)
//!   └─ PasteDataReply above the inline threshold?
//!        └─ follow it with a PayloadFragment run
//! ```
//!
//! When a connection closes, every pid seen on it is treated as a dead
//! process so its observers, link holds and input-method registration are
//! released.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use pasteboard_core::model::encode_entry;
use pasteboard_core::protocol::messages::PasteDataReply;
use pasteboard_core::protocol::SequenceCounter;
use pasteboard_core::transfer::{SharedRegion, INLINE_THRESHOLD};
use pasteboard_core::{PasteMessage, PasteResult, PasteboardError, E_OK};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::framing::{read_fragments, read_frame, write_fragments, write_frame, FrameError};
use crate::application::dispatch::{Dispatcher, Reply, Request};

/// Serves local clients against a [`Dispatcher`].
pub struct IpcServer {
    dispatcher: Arc<Dispatcher>,
}

impl IpcServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Accepts clients on `listener` until `running` is cleared.
    pub async fn run(self: Arc<Self>, listener: TcpListener, running: Arc<AtomicBool>) {
        super::accept_loop(listener, running, "ipc", move |stream, addr, conn_id| {
            let this = Arc::clone(&self);
            async move {
                info!(%conn_id, %addr, "IPC client connected");
                match this.serve_connection(stream, conn_id).await {
                    Ok(()) => info!(%conn_id, "IPC client disconnected"),
                    Err(e) => warn!(%conn_id, error = %e, "IPC connection dropped"),
                }
            }
        })
        .await;
    }

    /// Runs the request/reply loop on one connection until the client closes
    /// it or the framing breaks.
    pub async fn serve_connection<S>(&self, stream: S, conn_id: Uuid) -> Result<(), FrameError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let seq = SequenceCounter::new();
        let mut pids = HashSet::new();

        let outcome = loop {
            let message = match read_frame(&mut reader).await {
                Ok(Some(message)) => message,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            if let Some(caller) = message.caller() {
                pids.insert(caller.pid);
            }
            debug!(%conn_id, request = ?message.message_type(), "IPC request");

            let request = match self.take_request(message, &mut reader).await {
                Ok(request) => request,
                Err(e) => break Err(e),
            };
            let reply = match request {
                Ok(request) => self.dispatcher.dispatch(request).await,
                Err(e) => Err(e),
            };
            if let Err(e) = write_reply(&mut writer, reply, &seq).await {
                break Err(e);
            }
        };

        for pid in pids {
            self.dispatcher.service().on_process_died(pid).await;
        }
        outcome
    }

    /// Completes a request frame, reading the fragment run a large
    /// `SetPasteData` announces.
    ///
    /// The outer error breaks the connection; the inner one is replied to.
    async fn take_request<R>(
        &self,
        message: PasteMessage,
        reader: &mut R,
    ) -> Result<PasteResult<Request>, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        let declared = match &message {
            PasteMessage::SetPasteData(m) if m.declared_size > INLINE_THRESHOLD as i64 => {
                m.declared_size
            }
            _ => return Ok(Ok(Request::new(message))),
        };

        let region = SharedRegion::create_tracked(self.dispatcher.service().regions());
        let mut region = match region {
            Ok(region) => region,
            Err(e) => {
                warn!(error = %e, "could not create shared region; discarding payload");
                read_fragments(reader, &mut std::io::sink()).await?;
                return Ok(Err(PasteboardError::InvalidData));
            }
        };
        let received = read_fragments(reader, &mut region).await?;
        debug!(declared, received, "payload spooled to shared region");
        if let Err(e) = region.rewind() {
            warn!(error = %e, "could not rewind shared region");
            return Ok(Err(PasteboardError::InvalidData));
        }
        Ok(Ok(Request::with_region(message, region)))
    }
}

/// Writes the frames answering one request.
async fn write_reply<W>(
    writer: &mut W,
    reply: PasteResult<Reply>,
    seq: &SequenceCounter,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let payload = match reply {
        Ok(Reply::PasteData(payload)) => payload,
        other => return write_frame(writer, &reply_message(other), seq).await,
    };

    let declared_size = payload.declared_size();
    let inline = payload.is_inline();
    let bytes = match payload.into_bytes() {
        Ok(bytes) => bytes,
        Err(e) => return write_frame(writer, &PasteMessage::Status(e.code()), seq).await,
    };
    if inline {
        let reply = PasteMessage::PasteDataReply(PasteDataReply {
            declared_size,
            inline: bytes,
        });
        return write_frame(writer, &reply, seq).await;
    }

    let head = PasteMessage::PasteDataReply(PasteDataReply {
        declared_size,
        inline: Vec::new(),
    });
    write_frame(writer, &head, seq).await?;
    write_fragments(writer, &bytes, seq).await
}

/// Wire form of every reply except a payload.
pub fn reply_message(reply: PasteResult<Reply>) -> PasteMessage {
    match reply {
        Err(e) => PasteMessage::Status(e.code()),
        Ok(Reply::Done) => PasteMessage::Status(E_OK),
        Ok(Reply::Bool(value)) => PasteMessage::BoolReply(value),
        Ok(Reply::Count(count)) => PasteMessage::CountReply(count),
        Ok(Reply::Text(text)) => PasteMessage::TextReply(text),
        Ok(Reply::MimeTypes(types)) => PasteMessage::MimeTypesReply(types),
        Ok(Reply::Entry(entry)) => PasteMessage::EntryReply(encode_entry(&entry)),
        Ok(Reply::ShareOptions(options)) => PasteMessage::ShareOptionsReply(options),
        Ok(Reply::Pong(n)) => PasteMessage::Pong(n),
        Ok(Reply::PasteData(payload)) => match payload.into_bytes() {
            Ok(inline) => PasteMessage::PasteDataReply(PasteDataReply {
                declared_size: inline.len() as i64,
                inline,
            }),
            Err(e) => PasteMessage::Status(e.code()),
        },
    }
}

/// Address the IPC server binds for the configured host and port.
///
/// # Errors
///
/// Returns the parse error text when `bind_address` is not an IP address.
pub fn ipc_bind_addr(bind_address: &str, port: u16) -> Result<SocketAddr, String> {
    bind_address
        .parse::<std::net::IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .map_err(|e| format!("invalid IPC bind address {bind_address:?}: {e}"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::assembly::{assemble, Assembly};
    use crate::infrastructure::network::framing::FRAGMENT_SIZE;
    use crate::infrastructure::storage::config::ServiceConfig;
    use pasteboard_core::model::{decode_entry, decode_paste_data, encode_paste_data};
    use pasteboard_core::protocol::messages::{RecordValueRequest, SetPasteDataRequest};
    use pasteboard_core::{CallerInfo, PasteData, PasteRecord};
    use tokio::io::DuplexStream;

    const CALLER: CallerInfo = CallerInfo { token_id: 5, pid: 6 };

    struct Harness {
        assembly: Assembly,
        client: DuplexStream,
        seq: SequenceCounter,
    }

    fn harness() -> Harness {
        let assembly = assemble(&ServiceConfig::default());
        let server = Arc::new(IpcServer::new(Arc::clone(&assembly.dispatcher)));
        let (client, server_end) = tokio::io::duplex(FRAGMENT_SIZE * 4);
        tokio::spawn(async move { server.serve_connection(server_end, Uuid::new_v4()).await });
        Harness {
            assembly,
            client,
            seq: SequenceCounter::new(),
        }
    }

    impl Harness {
        async fn call(&mut self, msg: PasteMessage) -> PasteMessage {
            write_frame(&mut self.client, &msg, &self.seq).await.unwrap();
            read_frame(&mut self.client).await.unwrap().unwrap()
        }

        async fn set(&mut self, data: &PasteData) -> PasteMessage {
            let bytes = encode_paste_data(data);
            let declared_size = bytes.len() as i64;
            if bytes.len() <= INLINE_THRESHOLD {
                return self
                    .call(PasteMessage::SetPasteData(SetPasteDataRequest {
                        caller: CALLER,
                        declared_size,
                        inline: bytes,
                    }))
                    .await;
            }
            let head = PasteMessage::SetPasteData(SetPasteDataRequest {
                caller: CALLER,
                declared_size,
                inline: Vec::new(),
            });
            write_frame(&mut self.client, &head, &self.seq).await.unwrap();
            write_fragments(&mut self.client, &bytes, &self.seq).await.unwrap();
            read_frame(&mut self.client).await.unwrap().unwrap()
        }

        async fn get(&mut self) -> PasteData {
            let reply = self.call(PasteMessage::GetPasteData(CALLER)).await;
            let PasteMessage::PasteDataReply(head) = reply else {
                panic!("unexpected reply {reply:?}");
            };
            let bytes = if head.declared_size as usize <= INLINE_THRESHOLD {
                head.inline
            } else {
                let mut sink = Vec::new();
                read_fragments(&mut self.client, &mut sink).await.unwrap();
                sink
            };
            assert_eq!(bytes.len() as i64, head.declared_size);
            decode_paste_data(&bytes).unwrap()
        }
    }

    fn large_text(len: usize) -> String {
        "0123456789abcdef".chars().cycle().take(len).collect()
    }

    #[tokio::test]
    async fn test_small_set_and_get_travel_inline() {
        // Arrange
        let mut h = harness();

        // Act
        let status = h.set(&PasteData::with_text("inline")).await;
        let read = h.get().await;

        // Assert
        assert_eq!(status, PasteMessage::Status(E_OK));
        assert_eq!(read.primary_text(), Some("inline"));
        assert_eq!(h.assembly.service.regions().created(), 0);
    }

    #[tokio::test]
    async fn test_large_set_and_get_travel_as_fragments() {
        // Arrange
        let mut h = harness();
        let text = large_text(INLINE_THRESHOLD * 3);

        // Act
        let status = h.set(&PasteData::with_text(&text)).await;
        let read = h.get().await;

        // Assert
        assert_eq!(status, PasteMessage::Status(E_OK));
        assert_eq!(read.primary_text(), Some(text.as_str()));
        assert!(h.assembly.service.regions().created() >= 2);
    }

    #[tokio::test]
    async fn test_short_fragment_run_is_invalid_data_size() {
        // Arrange
        let mut h = harness();
        let bytes = encode_paste_data(&PasteData::with_text(&large_text(INLINE_THRESHOLD * 2)));
        let head = PasteMessage::SetPasteData(SetPasteDataRequest {
            caller: CALLER,
            declared_size: bytes.len() as i64 + 10,
            inline: Vec::new(),
        });

        // Act
        write_frame(&mut h.client, &head, &h.seq).await.unwrap();
        write_fragments(&mut h.client, &bytes, &h.seq).await.unwrap();
        let reply = read_frame(&mut h.client).await.unwrap().unwrap();

        // Assert
        assert_eq!(
            reply,
            PasteMessage::Status(PasteboardError::InvalidDataSize.code())
        );
        assert_eq!(h.call(PasteMessage::GetChangeCount(CALLER)).await, PasteMessage::CountReply(0));
    }

    #[tokio::test]
    async fn test_errors_come_back_as_status_codes() {
        let mut h = harness();

        let reply = h.call(PasteMessage::GetPasteData(CALLER)).await;

        assert_eq!(reply, PasteMessage::Status(PasteboardError::DataExpired.code()));
    }

    #[tokio::test]
    async fn test_queries_and_ping_share_one_connection() {
        // Arrange
        let mut h = harness();
        h.set(&PasteData::with_text("q")).await;

        // Act / Assert
        assert_eq!(h.call(PasteMessage::Ping(9)).await, PasteMessage::Pong(9));
        assert_eq!(h.call(PasteMessage::HasPasteData(CALLER)).await, PasteMessage::BoolReply(true));
        assert_eq!(
            h.call(PasteMessage::GetMimeTypes(CALLER)).await,
            PasteMessage::MimeTypesReply(vec!["text/plain".to_string()])
        );
        assert_eq!(h.call(PasteMessage::GetChangeCount(CALLER)).await, PasteMessage::CountReply(1));
    }

    #[tokio::test]
    async fn test_record_value_reply_carries_encoded_entry() {
        // Arrange
        let mut h = harness();
        let mut data = PasteData::new();
        data.add_record(PasteRecord::plain_text("entry")).unwrap();
        h.set(&data).await;
        let stored = h.get().await;
        let record_id = stored.records()[0].record_id();

        // Act
        let reply = h
            .call(PasteMessage::GetRecordValueByType(RecordValueRequest {
                caller: CALLER,
                data_id: stored.data_id(),
                record_id,
                utd_id: pasteboard_core::model::mime::utd::PLAIN_TEXT.to_string(),
            }))
            .await;

        // Assert
        let PasteMessage::EntryReply(bytes) = reply else {
            panic!("unexpected reply {reply:?}");
        };
        let entry = decode_entry(&bytes).unwrap();
        assert_eq!(entry.as_text(), Some("entry"));
    }

    #[test]
    fn test_reply_message_maps_done_to_ok_status() {
        assert_eq!(reply_message(Ok(Reply::Done)), PasteMessage::Status(E_OK));
        assert_eq!(
            reply_message(Err(PasteboardError::NoData)),
            PasteMessage::Status(PasteboardError::NoData.code())
        );
    }

    #[test]
    fn test_ipc_bind_addr_rejects_host_names() {
        assert_eq!(
            ipc_bind_addr("127.0.0.1", 24810).unwrap(),
            "127.0.0.1:24810".parse::<SocketAddr>().unwrap()
        );
        assert!(ipc_bind_addr("localhost", 24810).is_err());
    }
}
