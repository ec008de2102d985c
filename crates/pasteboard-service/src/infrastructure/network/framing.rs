//! Length-prefixed frame I/O over any async byte stream.
//!
//! Every frame is the 24-byte header followed by `payload_len` bytes, where
//! `payload_len` sits at header bytes 4..8 (big-endian).  Readers therefore
//! read the header first, learn the payload length from it and then read
//! exactly that many bytes.
//!
//! Payloads above the inline threshold travel as a run of
//! [`PasteMessage::PayloadFragment`] frames after the request or reply that
//! declared their size; [`write_fragments`] and [`read_fragments`] handle
//! that run.

use std::io::Write;

use pasteboard_core::protocol::codec::{current_timestamp_us, decode_header};
use pasteboard_core::protocol::messages::{PayloadFragment, HEADER_SIZE};
use pasteboard_core::protocol::SequenceCounter;
use pasteboard_core::transfer::MAX_DECLARED_SIZE;
use pasteboard_core::{decode_message, encode_message, PasteMessage, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bytes carried by one `PayloadFragment` frame.
pub const FRAGMENT_SIZE: usize = 64 * 1024;

/// Errors raised while moving frames over a stream.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The peer closed the stream in the middle of a frame or fragment run.
    #[error("connection closed")]
    Closed,
    /// A fragment run was interrupted by another frame type.
    #[error("expected a payload fragment, got {0:?}")]
    UnexpectedFrame(pasteboard_core::protocol::messages::MessageType),
    /// A fragment run grew past the largest payload the service accepts.
    #[error("fragmented payload exceeds {0} bytes")]
    TooLarge(usize),
}

/// Reads one frame.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly between frames.
///
/// # Errors
///
/// [`FrameError::Closed`] if the stream ends mid-frame, [`FrameError::Io`]
/// for other read failures and [`FrameError::Protocol`] for a malformed
/// header or payload.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<PasteMessage>, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header_buf = vec![0u8; HEADER_SIZE];
    if let Err(e) = reader.read_exact(&mut header_buf).await {
        return if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Ok(None)
        } else {
            Err(FrameError::Io(e))
        };
    }

    let header = decode_header(&header_buf)?;
    let payload_len = header.payload_length as usize;

    let mut full_msg = header_buf;
    full_msg.resize(HEADER_SIZE + payload_len, 0);
    if payload_len > 0 {
        reader
            .read_exact(&mut full_msg[HEADER_SIZE..])
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => FrameError::Closed,
                _ => FrameError::Io(e),
            })?;
    }

    let (msg, _) = decode_message(&full_msg)?;
    Ok(Some(msg))
}

/// Encodes `msg` with the next sequence number and writes it.
///
/// # Errors
///
/// [`FrameError::Protocol`] if the message is too large to frame,
/// [`FrameError::Io`] if the write fails.
pub async fn write_frame<W>(
    writer: &mut W,
    msg: &PasteMessage,
    seq: &SequenceCounter,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = encode_message(msg, seq.next(), current_timestamp_us())?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Writes `bytes` as a run of `PayloadFragment` frames.
///
/// An empty buffer still produces one final fragment so the reader always
/// sees the end of the run.
pub async fn write_fragments<W>(
    writer: &mut W,
    bytes: &[u8],
    seq: &SequenceCounter,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut chunks = bytes.chunks(FRAGMENT_SIZE).peekable();
    if chunks.peek().is_none() {
        let last = PasteMessage::PayloadFragment(PayloadFragment {
            data: Vec::new(),
            has_more_fragments: false,
        });
        return write_frame(writer, &last, seq).await;
    }
    while let Some(chunk) = chunks.next() {
        let fragment = PasteMessage::PayloadFragment(PayloadFragment {
            data: chunk.to_vec(),
            has_more_fragments: chunks.peek().is_some(),
        });
        write_frame(writer, &fragment, seq).await?;
    }
    Ok(())
}

/// Reads a run of `PayloadFragment` frames into `dest` until the final one.
///
/// Returns the number of bytes written.  Whether the total matches the size
/// the sender declared is for the caller to check.
///
/// # Errors
///
/// [`FrameError::UnexpectedFrame`] if another frame type interrupts the run,
/// [`FrameError::TooLarge`] once the run passes the largest accepted payload,
/// [`FrameError::Closed`] if the stream ends first.
pub async fn read_fragments<R, D>(reader: &mut R, dest: &mut D) -> Result<usize, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
    D: Write + ?Sized,
{
    let limit = MAX_DECLARED_SIZE as usize + FRAGMENT_SIZE;
    let mut total = 0usize;
    loop {
        let Some(msg) = read_frame(reader).await? else {
            return Err(FrameError::Closed);
        };
        let PasteMessage::PayloadFragment(fragment) = msg else {
            return Err(FrameError::UnexpectedFrame(msg.message_type()));
        };
        total += fragment.data.len();
        if total > limit {
            return Err(FrameError::TooLarge(limit));
        }
        dest.write_all(&fragment.data)?;
        if !fragment.has_more_fragments {
            return Ok(total);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pasteboard_core::protocol::messages::MessageType;
    use pasteboard_core::CallerInfo;

    #[tokio::test]
    async fn test_frame_survives_a_duplex_stream() {
        // Arrange
        let (mut a, mut b) = tokio::io::duplex(1024);
        let seq = SequenceCounter::new();
        let msg = PasteMessage::GetChangeCount(CallerInfo {
            token_id: 7,
            pid: 8,
        });

        // Act
        write_frame(&mut a, &msg, &seq).await.unwrap();
        let received = read_frame(&mut b).await.unwrap();

        // Assert
        assert_eq!(received, Some(msg));
    }

    #[tokio::test]
    async fn test_read_frame_handles_split_reads() {
        // Arrange: header and payload arrive in uneven pieces
        let msg = PasteMessage::MimeTypesReply(vec!["text/plain".into(), "text/html".into()]);
        let bytes = encode_message(&msg, 3, 0).unwrap();
        let mut stream = tokio_test::io::Builder::new()
            .read(&bytes[..5])
            .read(&bytes[5..HEADER_SIZE + 3])
            .read(&bytes[HEADER_SIZE + 3..])
            .build();

        // Act
        let received = read_frame(&mut stream).await.unwrap();

        // Assert
        assert_eq!(received, Some(msg));
    }

    #[tokio::test]
    async fn test_read_frame_returns_none_on_clean_close() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);

        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_reports_truncated_payload_as_closed() {
        // Arrange: a valid header promising more payload than is sent
        let bytes = encode_message(&PasteMessage::TextReply("hello".into()), 0, 0).unwrap();
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_all(&bytes[..bytes.len() - 2]).await.unwrap();
        drop(a);

        // Act
        let result = read_frame(&mut b).await;

        // Assert
        assert!(matches!(result, Err(FrameError::Closed)));
    }

    #[tokio::test]
    async fn test_fragments_reassemble_in_order() {
        // Arrange
        let payload: Vec<u8> = (0..(FRAGMENT_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let (mut a, mut b) = tokio::io::duplex(FRAGMENT_SIZE * 4);
        let seq = SequenceCounter::new();

        // Act
        let writer = async {
            write_fragments(&mut a, &payload, &seq).await.unwrap();
        };
        let mut sink = Vec::new();
        let reader = read_fragments(&mut b, &mut sink);
        let ((), read) = tokio::join!(writer, reader);

        // Assert
        assert_eq!(read.unwrap(), payload.len());
        assert_eq!(sink, payload);
    }

    #[tokio::test]
    async fn test_empty_fragment_run_is_one_final_frame() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let seq = SequenceCounter::new();

        write_fragments(&mut a, &[], &seq).await.unwrap();
        let mut sink = Vec::new();
        let read = read_fragments(&mut b, &mut sink).await.unwrap();

        assert_eq!(read, 0);
        assert_eq!(seq.current(), 1);
    }

    #[tokio::test]
    async fn test_fragment_run_rejects_foreign_frame() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let seq = SequenceCounter::new();
        write_frame(&mut a, &PasteMessage::Ping(1), &seq).await.unwrap();

        let mut sink = Vec::new();
        let result = read_fragments(&mut b, &mut sink).await;

        assert!(matches!(
            result,
            Err(FrameError::UnexpectedFrame(MessageType::Ping))
        ));
    }
}
