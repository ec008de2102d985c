//! TCP connection from a client process to the pasteboard daemon.
//!
//! One [`PasteboardClient`] owns one stream and issues one request at a time:
//! write the request frame, then read frames until the reply is complete.
//!
//! Payloads larger than [`INLINE_THRESHOLD`] never travel inside the request
//! or reply frame itself.  The frame declares the size and leaves its inline
//! bytes empty, and the bytes follow as a run of `PayloadFragment` frames
//! ending with one whose `has_more_fragments` flag is clear.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use pasteboard_core::model::codec::{decode_paste_data, encode_paste_data};
use pasteboard_core::protocol::codec::{current_timestamp_us, decode_header};
use pasteboard_core::protocol::messages::{
    HasDataTypeRequest, PasteDataReply, PayloadFragment, SetPasteDataRequest, HEADER_SIZE,
};
use pasteboard_core::protocol::SequenceCounter;
use pasteboard_core::transfer::{INLINE_THRESHOLD, MAX_DECLARED_SIZE};
use pasteboard_core::{
    decode_message, encode_message, CallerInfo, PasteData, PasteMessage, PasteboardError, E_OK,
};
use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::application::port::{ClientError, PasteboardPort};

/// Bytes carried by one uploaded `PayloadFragment` frame.
pub const FRAGMENT_SIZE: usize = 64 * 1024;

/// Configuration for a client connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Address of the daemon's IPC listener.
    pub server_addr: SocketAddr,
    /// Identity stamped on every request.
    pub caller: CallerInfo,
    /// Upper bound on one request/reply exchange.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 24810)),
            caller: CallerInfo {
                token_id: 0,
                pid: std::process::id(),
            },
            timeout: Duration::from_secs(10),
        }
    }
}

/// Request/reply connection to the daemon.
pub struct PasteboardClient<S = TcpStream> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    caller: CallerInfo,
    seq: SequenceCounter,
    timeout: Duration,
}

impl PasteboardClient<TcpStream> {
    /// Connects to the daemon at `config.server_addr`.
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectFailed`] if the TCP connection cannot be made
    /// within the configured timeout.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let addr = config.server_addr;
        let stream = match tokio::time::timeout(config.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ClientError::ConnectFailed { addr, source }),
            Err(_) => {
                return Err(ClientError::ConnectFailed {
                    addr,
                    source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };
        stream.set_nodelay(true)?;
        info!("connected to pasteboard daemon at {addr}");
        Ok(Self::from_stream(stream, config.caller).with_timeout(config.timeout))
    }
}

impl<S> PasteboardClient<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    /// Wraps an already-open stream.
    pub fn from_stream(stream: S, caller: CallerInfo) -> Self {
        let (reader, writer) = split(stream);
        Self {
            reader,
            writer,
            caller,
            seq: SequenceCounter::new(),
            timeout: ClientConfig::default().timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn caller(&self) -> CallerInfo {
        self.caller
    }

    // ── Frame I/O ────────────────────────────────────────────────────────────

    async fn send(&mut self, msg: &PasteMessage) -> Result<(), ClientError> {
        let bytes = encode_message(msg, self.seq.next(), current_timestamp_us())
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<PasteMessage, ClientError> {
        let mut header_buf = vec![0u8; HEADER_SIZE];
        self.reader
            .read_exact(&mut header_buf)
            .await
            .map_err(closed_on_eof)?;

        let header =
            decode_header(&header_buf).map_err(|e| ClientError::Protocol(e.to_string()))?;
        let payload_len = header.payload_length as usize;

        let mut full_msg = header_buf;
        full_msg.resize(HEADER_SIZE + payload_len, 0);
        if payload_len > 0 {
            self.reader
                .read_exact(&mut full_msg[HEADER_SIZE..])
                .await
                .map_err(closed_on_eof)?;
        }

        let (msg, _) =
            decode_message(&full_msg).map_err(|e| ClientError::Protocol(e.to_string()))?;
        debug!(message_type = ?msg.message_type(), "reply received");
        Ok(msg)
    }

    async fn upload(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        let mut chunks = bytes.chunks(FRAGMENT_SIZE).peekable();
        while let Some(chunk) = chunks.next() {
            let fragment = PasteMessage::PayloadFragment(PayloadFragment {
                data: chunk.to_vec(),
                has_more_fragments: chunks.peek().is_some(),
            });
            self.send(&fragment).await?;
        }
        Ok(())
    }

    async fn download(&mut self, declared_size: usize) -> Result<Vec<u8>, ClientError> {
        let mut bytes = Vec::with_capacity(declared_size);
        loop {
            match self.receive().await? {
                PasteMessage::PayloadFragment(fragment) => {
                    bytes.extend_from_slice(&fragment.data);
                    if bytes.len() > declared_size {
                        return Err(ClientError::Service(PasteboardError::InvalidDataSize));
                    }
                    if !fragment.has_more_fragments {
                        break;
                    }
                }
                other => return Err(ClientError::UnexpectedReply(other.message_type())),
            }
        }
        if bytes.len() != declared_size {
            return Err(ClientError::Service(PasteboardError::InvalidDataSize));
        }
        Ok(bytes)
    }

    /// Sends `msg` and waits for the reply frame, bounded by the timeout.
    async fn call(&mut self, msg: PasteMessage) -> Result<PasteMessage, ClientError> {
        let timeout = self.timeout;
        let exchange = async {
            self.send(&msg).await?;
            self.receive().await
        };
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| timed_out())?
    }

    async fn expect_done(&mut self, msg: PasteMessage) -> Result<(), ClientError> {
        match self.call(msg).await? {
            PasteMessage::Status(code) => status_result(code),
            other => Err(unexpected(other)),
        }
    }

    async fn expect_bool(&mut self, msg: PasteMessage) -> Result<bool, ClientError> {
        match self.call(msg).await? {
            PasteMessage::BoolReply(flag) => Ok(flag),
            other => Err(unexpected(other)),
        }
    }

    async fn expect_text(&mut self, msg: PasteMessage) -> Result<String, ClientError> {
        match self.call(msg).await? {
            PasteMessage::TextReply(text) => Ok(text),
            other => Err(unexpected(other)),
        }
    }

    async fn read_paste_reply(&mut self, head: PasteDataReply) -> Result<Vec<u8>, ClientError> {
        if head.declared_size < 0 || head.declared_size > MAX_DECLARED_SIZE {
            return Err(ClientError::Service(PasteboardError::InvalidParam));
        }
        let declared_size = head.declared_size as usize;
        if declared_size <= INLINE_THRESHOLD {
            if head.inline.len() != declared_size {
                return Err(ClientError::Service(PasteboardError::InvalidDataSize));
            }
            return Ok(head.inline);
        }
        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.download(declared_size))
            .await
            .map_err(|_| timed_out())?
    }
}

fn closed_on_eof(e: std::io::Error) -> ClientError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ClientError::Closed
    } else {
        ClientError::Io(e)
    }
}

fn timed_out() -> ClientError {
    ClientError::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        "daemon did not answer in time",
    ))
}

/// Maps a status frame to the call result.
fn status_result(code: u32) -> Result<(), ClientError> {
    if code == E_OK {
        return Ok(());
    }
    match PasteboardError::from_code(code) {
        Some(err) => Err(ClientError::Service(err)),
        None => Err(ClientError::Protocol(format!("unknown status code {code}"))),
    }
}

/// Any reply other than the expected one; a non-OK status is a service error.
fn unexpected(reply: PasteMessage) -> ClientError {
    match reply {
        PasteMessage::Status(code) => match status_result(code) {
            Err(e) => e,
            Ok(()) => ClientError::UnexpectedReply(reply.message_type()),
        },
        other => ClientError::UnexpectedReply(other.message_type()),
    }
}

#[async_trait]
impl<S> PasteboardPort for PasteboardClient<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    async fn set_paste_data(&mut self, data: &PasteData) -> Result<(), ClientError> {
        let bytes = encode_paste_data(data);
        let declared_size = bytes.len() as i64;
        let caller = self.caller;
        if bytes.len() <= INLINE_THRESHOLD {
            return self
                .expect_done(PasteMessage::SetPasteData(SetPasteDataRequest {
                    caller,
                    declared_size,
                    inline: bytes,
                }))
                .await;
        }

        debug!(declared_size, "uploading payload as fragments");
        let timeout = self.timeout;
        let exchange = async {
            self.send(&PasteMessage::SetPasteData(SetPasteDataRequest {
                caller,
                declared_size,
                inline: Vec::new(),
            }))
            .await?;
            self.upload(&bytes).await?;
            self.receive().await
        };
        match tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| timed_out())??
        {
            PasteMessage::Status(code) => status_result(code),
            other => Err(unexpected(other)),
        }
    }

    async fn get_paste_data(&mut self) -> Result<PasteData, ClientError> {
        let head = match self.call(PasteMessage::GetPasteData(self.caller)).await? {
            PasteMessage::PasteDataReply(head) => head,
            other => return Err(unexpected(other)),
        };
        let bytes = self.read_paste_reply(head).await?;
        decode_paste_data(&bytes).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    async fn has_paste_data(&mut self) -> Result<bool, ClientError> {
        self.expect_bool(PasteMessage::HasPasteData(self.caller)).await
    }

    async fn has_data_type(&mut self, mime_type: &str) -> Result<bool, ClientError> {
        let request = PasteMessage::HasDataType(HasDataTypeRequest {
            caller: self.caller,
            mime_type: mime_type.to_string(),
        });
        self.expect_bool(request).await
    }

    async fn get_mime_types(&mut self) -> Result<Vec<String>, ClientError> {
        match self.call(PasteMessage::GetMimeTypes(self.caller)).await? {
            PasteMessage::MimeTypesReply(types) => Ok(types),
            other => Err(unexpected(other)),
        }
    }

    async fn clear(&mut self) -> Result<(), ClientError> {
        self.expect_done(PasteMessage::Clear(self.caller)).await
    }

    async fn get_change_count(&mut self) -> Result<u32, ClientError> {
        match self.call(PasteMessage::GetChangeCount(self.caller)).await? {
            PasteMessage::CountReply(count) => Ok(count),
            other => Err(unexpected(other)),
        }
    }

    async fn is_remote_data(&mut self) -> Result<bool, ClientError> {
        self.expect_bool(PasteMessage::IsRemoteData(self.caller)).await
    }

    async fn get_data_source(&mut self) -> Result<String, ClientError> {
        self.expect_text(PasteMessage::GetDataSource(self.caller)).await
    }

    async fn get_remote_device_name(&mut self) -> Result<String, ClientError> {
        self.expect_text(PasteMessage::GetRemoteDeviceName(self.caller))
            .await
    }

    async fn ping(&mut self, nonce: u64) -> Result<u64, ClientError> {
        match self.call(PasteMessage::Ping(nonce)).await? {
            PasteMessage::Pong(echoed) => Ok(echoed),
            other => Err(unexpected(other)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};

    /// Minimal daemon side of a duplex pipe: reads one frame at a time.
    struct FakeDaemon {
        stream: DuplexStream,
        seq: SequenceCounter,
    }

    impl FakeDaemon {
        async fn read(&mut self) -> PasteMessage {
            let mut header = vec![0u8; HEADER_SIZE];
            self.stream.read_exact(&mut header).await.unwrap();
            let len = decode_header(&header).unwrap().payload_length as usize;
            header.resize(HEADER_SIZE + len, 0);
            self.stream.read_exact(&mut header[HEADER_SIZE..]).await.unwrap();
            decode_message(&header).unwrap().0
        }

        async fn write(&mut self, msg: PasteMessage) {
            let bytes = encode_message(&msg, self.seq.next(), current_timestamp_us()).unwrap();
            self.stream.write_all(&bytes).await.unwrap();
        }
    }

    fn pair() -> (PasteboardClient<DuplexStream>, FakeDaemon) {
        let (client_side, daemon_side) = duplex(1024 * 1024);
        let caller = CallerInfo {
            token_id: 7,
            pid: 70,
        };
        (
            PasteboardClient::from_stream(client_side, caller),
            FakeDaemon {
                stream: daemon_side,
                seq: SequenceCounter::new(),
            },
        )
    }

    fn large_text() -> String {
        "z".repeat(INLINE_THRESHOLD * 2 + 17)
    }

    #[test]
    fn test_client_config_default_targets_local_ipc_port() {
        // Arrange / Act
        let cfg = ClientConfig::default();

        // Assert
        assert_eq!(cfg.server_addr.port(), 24810);
        assert!(cfg.server_addr.ip().is_loopback());
        assert_eq!(cfg.caller.pid, std::process::id());
    }

    #[tokio::test]
    async fn test_small_set_travels_inline_with_caller() {
        // Arrange
        let (mut client, mut daemon) = pair();
        let server = tokio::spawn(async move {
            let request = daemon.read().await;
            daemon.write(PasteMessage::Status(E_OK)).await;
            request
        });

        // Act
        client
            .set_paste_data(&PasteData::with_text("hi"))
            .await
            .unwrap();

        // Assert
        let PasteMessage::SetPasteData(request) = server.await.unwrap() else {
            panic!("expected SetPasteData");
        };
        assert_eq!(request.caller.token_id, 7);
        assert_eq!(request.inline.len() as i64, request.declared_size);
    }

    #[tokio::test]
    async fn test_large_set_is_followed_by_fragments() {
        // Arrange
        let (mut client, mut daemon) = pair();
        let server = tokio::spawn(async move {
            let PasteMessage::SetPasteData(head) = daemon.read().await else {
                panic!("expected SetPasteData");
            };
            let mut received = Vec::new();
            loop {
                let PasteMessage::PayloadFragment(f) = daemon.read().await else {
                    panic!("expected fragment");
                };
                received.extend(f.data);
                if !f.has_more_fragments {
                    break;
                }
            }
            daemon.write(PasteMessage::Status(E_OK)).await;
            (head, received)
        });

        // Act
        client
            .set_paste_data(&PasteData::with_text(large_text()))
            .await
            .unwrap();

        // Assert
        let (head, received) = server.await.unwrap();
        assert!(head.inline.is_empty());
        assert_eq!(received.len() as i64, head.declared_size);
        let decoded = decode_paste_data(&received).unwrap();
        assert_eq!(decoded.primary_text(), Some(large_text().as_str()));
    }

    #[tokio::test]
    async fn test_large_get_reassembles_fragments() {
        // Arrange
        let (mut client, mut daemon) = pair();
        let bytes = encode_paste_data(&PasteData::with_text(large_text()));
        tokio::spawn(async move {
            let _ = daemon.read().await;
            daemon
                .write(PasteMessage::PasteDataReply(PasteDataReply {
                    declared_size: bytes.len() as i64,
                    inline: Vec::new(),
                }))
                .await;
            let mut chunks = bytes.chunks(FRAGMENT_SIZE).peekable();
            while let Some(chunk) = chunks.next() {
                daemon
                    .write(PasteMessage::PayloadFragment(PayloadFragment {
                        data: chunk.to_vec(),
                        has_more_fragments: chunks.peek().is_some(),
                    }))
                    .await;
            }
        });

        // Act
        let data = client.get_paste_data().await.unwrap();

        // Assert
        assert_eq!(data.primary_text(), Some(large_text().as_str()));
    }

    #[tokio::test]
    async fn test_error_status_maps_to_service_error() {
        let (mut client, mut daemon) = pair();
        tokio::spawn(async move {
            let _ = daemon.read().await;
            daemon
                .write(PasteMessage::Status(PasteboardError::NoData.code()))
                .await;
        });

        let result = client.get_paste_data().await;

        assert!(matches!(
            result,
            Err(ClientError::Service(PasteboardError::NoData))
        ));
    }

    #[tokio::test]
    async fn test_wrong_reply_kind_is_unexpected() {
        let (mut client, mut daemon) = pair();
        tokio::spawn(async move {
            let _ = daemon.read().await;
            daemon.write(PasteMessage::CountReply(3)).await;
        });

        let result = client.has_paste_data().await;

        assert!(matches!(result, Err(ClientError::UnexpectedReply(_))));
    }

    #[tokio::test]
    async fn test_daemon_hanging_up_is_closed() {
        let (mut client, mut daemon) = pair();
        tokio::spawn(async move {
            let _ = daemon.read().await;
            drop(daemon);
        });

        let result = client.get_change_count().await;

        assert!(matches!(result, Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn test_silent_daemon_times_out() {
        // Arrange
        let (client, mut daemon) = pair();
        let mut client = client.with_timeout(Duration::from_millis(50));
        let _server = tokio::spawn(async move {
            let _ = daemon.read().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        // Act
        let result = client.ping(1).await;

        // Assert
        assert!(matches!(result, Err(ClientError::Io(e)) if e.kind() == std::io::ErrorKind::TimedOut));
    }

    #[test]
    fn test_status_result_maps_unknown_code_to_protocol_error() {
        assert!(status_result(E_OK).is_ok());
        assert!(matches!(status_result(9_999), Err(ClientError::Protocol(_))));
    }
}
