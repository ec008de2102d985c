//! Payload transfer layer: moves an encoded [`PasteData`] between processes.
//!
//! # Two paths (for beginners)
//!
//! Small payloads (at most [`INLINE_THRESHOLD`] bytes once encoded) travel
//! *inline*, inside the request message itself.  Larger payloads would blow
//! past message-size limits, so the sender writes them into a
//! [`SharedRegion`] (an anonymous, already-unlinked spool file) and only the
//! declared size travels inline.  The receiver reads the region back exactly
//! once and checks that it got precisely the declared number of bytes.
//!
//! A short or long read is always [`PasteboardError::InvalidDataSize`].  The
//! payload is never truncated or padded to fit.
//!
//! # Descriptor ownership
//!
//! A region is closed when its [`SharedRegion`] value is dropped.  The
//! [`RegionTracker`] counts live regions so leak tests can assert that every
//! region created for a request has been released afterwards.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{PasteResult, PasteboardError};
use crate::model::{decode_paste_data, encode_paste_data, PasteData};

/// Encoded payloads up to this many bytes travel inline.
pub const INLINE_THRESHOLD: usize = 32 * 1024;

/// Largest declared size accepted from a producer.
pub const MAX_DECLARED_SIZE: i64 = 128 * 1024 * 1024;

// ── Region bookkeeping ────────────────────────────────────────────────────────

/// Counts shared regions created through it and how many are still open.
#[derive(Debug, Clone, Default)]
pub struct RegionTracker {
    live: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
}

impl RegionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Regions that have been created and not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Total regions ever created through this tracker.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn acquire(&self) {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An anonymous file used to hand a large payload to another party.
///
/// Backed by [`tempfile::tempfile`], so the file has no name on disk and its
/// storage is reclaimed by the OS when the last handle closes.
#[derive(Debug)]
pub struct SharedRegion {
    file: File,
    tracker: Option<RegionTracker>,
}

impl SharedRegion {
    /// Creates an empty, untracked region.
    pub fn create() -> io::Result<Self> {
        Ok(Self {
            file: tempfile::tempfile()?,
            tracker: None,
        })
    }

    /// Creates an empty region counted by `tracker`.
    pub fn create_tracked(tracker: &RegionTracker) -> io::Result<Self> {
        let file = tempfile::tempfile()?;
        tracker.acquire();
        Ok(Self {
            file,
            tracker: Some(tracker.clone()),
        })
    }

    /// Moves the read/write position back to the start.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Current size of the backing file in bytes.
    pub fn len(&self) -> io::Result<u64> {
        self.file.metadata().map(|m| m.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        self.len().map(|n| n == 0)
    }
}

impl Read for SharedRegion {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for SharedRegion {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let Some(tracker) = &self.tracker {
            tracker.release();
        }
    }
}

// ── Write side ────────────────────────────────────────────────────────────────

/// Writes the first `size` bytes of `buffer` into `dest`.
///
/// Returns `false` when `buffer` is absent, `size <= 0`, `size` exceeds the
/// buffer, or the write fails.
pub fn write_raw_data<W: Write + ?Sized>(buffer: Option<&[u8]>, size: i64, dest: &mut W) -> bool {
    let Some(buffer) = buffer else {
        warn!("write_raw_data: buffer is null");
        return false;
    };
    if size <= 0 {
        warn!(size, "write_raw_data: size must be positive");
        return false;
    }
    let size = size as usize;
    if size > buffer.len() {
        warn!(size, available = buffer.len(), "write_raw_data: size exceeds buffer");
        return false;
    }
    match dest.write_all(&buffer[..size]).and_then(|_| dest.flush()) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "write_raw_data: write failed");
            false
        }
    }
}

/// An encoded payload ready to be sent, on whichever path its size selects.
#[derive(Debug)]
pub enum TransferPayload {
    Inline(Vec<u8>),
    Shared { region: SharedRegion, size: usize },
}

impl TransferPayload {
    /// The size announced to the receiver.
    pub fn declared_size(&self) -> i64 {
        match self {
            TransferPayload::Inline(bytes) => bytes.len() as i64,
            TransferPayload::Shared { size, .. } => *size as i64,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, TransferPayload::Inline(_))
    }

    /// Consumes the payload and returns its raw bytes.
    pub fn into_bytes(self) -> PasteResult<Vec<u8>> {
        match self {
            TransferPayload::Inline(bytes) => Ok(bytes),
            TransferPayload::Shared { mut region, size } => {
                read_payload_bytes(Some(&mut region), size as i64, &[])
            }
        }
    }
}

/// Encodes `data` and places it on the inline or shared path.
///
/// # Errors
///
/// [`PasteboardError::InvalidParam`] if the encoding exceeds
/// [`MAX_DECLARED_SIZE`]; [`PasteboardError::InvalidData`] if the shared
/// region cannot be created or written.
pub fn prepare_transfer(
    data: &PasteData,
    tracker: Option<&RegionTracker>,
) -> PasteResult<TransferPayload> {
    prepare_raw_transfer(encode_paste_data(data), tracker)
}

/// Same as [`prepare_transfer`] for bytes that are already encoded.
pub fn prepare_raw_transfer(
    bytes: Vec<u8>,
    tracker: Option<&RegionTracker>,
) -> PasteResult<TransferPayload> {
    if bytes.len() as u64 > MAX_DECLARED_SIZE as u64 {
        warn!(len = bytes.len(), "encoded payload exceeds maximum size");
        return Err(PasteboardError::InvalidParam);
    }
    if bytes.len() <= INLINE_THRESHOLD {
        return Ok(TransferPayload::Inline(bytes));
    }

    let region = match tracker {
        Some(t) => SharedRegion::create_tracked(t),
        None => SharedRegion::create(),
    };
    let mut region = region.map_err(|e| {
        warn!(error = %e, "failed to create shared region");
        PasteboardError::InvalidData
    })?;
    if !write_raw_data(Some(&bytes), bytes.len() as i64, &mut region) {
        return Err(PasteboardError::InvalidData);
    }
    region.rewind().map_err(|_| PasteboardError::InvalidData)?;
    debug!(size = bytes.len(), "payload placed in shared region");
    Ok(TransferPayload::Shared {
        region,
        size: bytes.len(),
    })
}

// ── Read side ─────────────────────────────────────────────────────────────────

/// Obtains exactly `declared_size` payload bytes from the inline buffer or
/// from `region`.
///
/// On the shared path the region is read once from its current position.
///
/// # Errors
///
/// - [`PasteboardError::InvalidParam`]: negative or oversized declaration, or
///   a large declaration with no region.
/// - [`PasteboardError::InvalidDataSize`]: byte count differs from the
///   declaration on either path.
/// - [`PasteboardError::InvalidData`]: the region could not be read.
pub fn read_payload_bytes(
    region: Option<&mut SharedRegion>,
    declared_size: i64,
    inline: &[u8],
) -> PasteResult<Vec<u8>> {
    if !(0..=MAX_DECLARED_SIZE).contains(&declared_size) {
        warn!(declared_size, "declared size out of range");
        return Err(PasteboardError::InvalidParam);
    }
    let declared = declared_size as usize;

    if declared <= INLINE_THRESHOLD {
        if inline.len() != declared {
            warn!(declared, actual = inline.len(), "inline payload size mismatch");
            return Err(PasteboardError::InvalidDataSize);
        }
        return Ok(inline.to_vec());
    }

    let Some(region) = region else {
        warn!(declared, "large payload declared without a shared region");
        return Err(PasteboardError::InvalidParam);
    };

    // One extra byte lets a long region be detected without a second read.
    let mut buf = Vec::with_capacity(declared);
    region
        .take(declared as u64 + 1)
        .read_to_end(&mut buf)
        .map_err(|e| {
            warn!(error = %e, "failed to read shared region");
            PasteboardError::InvalidData
        })?;
    if buf.len() != declared {
        warn!(declared, actual = buf.len(), "shared payload size mismatch");
        return Err(PasteboardError::InvalidDataSize);
    }
    Ok(buf)
}

/// Reads a payload and decodes it into a [`PasteData`].
///
/// Returns the payload plus `has_data`: `true` when it carries at least one
/// record or is whole-payload delay data.
///
/// # Errors
///
/// Everything [`read_payload_bytes`] returns, plus
/// [`PasteboardError::Serialization`] when decoding fails.
pub fn write_paste_data(
    region: Option<&mut SharedRegion>,
    declared_size: i64,
    inline: &[u8],
) -> PasteResult<(PasteData, bool)> {
    let bytes = read_payload_bytes(region, declared_size, inline)?;
    let data = decode_paste_data(&bytes).map_err(|e| {
        warn!(error = %e, "failed to decode paste data");
        PasteboardError::Serialization
    })?;
    let has_data = !data.is_empty() || data.is_delay_data();
    Ok((data, has_data))
}

/// Consumes a [`TransferPayload`], closing its region once read.
pub fn receive_transfer(payload: TransferPayload) -> PasteResult<(PasteData, bool)> {
    match payload {
        TransferPayload::Inline(bytes) => write_paste_data(None, bytes.len() as i64, &bytes),
        TransferPayload::Shared { mut region, size } => {
            write_paste_data(Some(&mut region), size as i64, &[])
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
