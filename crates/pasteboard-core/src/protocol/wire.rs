//! Low-level big-endian read/write helpers shared by the frame codec and the
//! PasteData codec.
//!
//! Strings and byte blobs carry a 4-byte length prefix.  HTML bodies and
//! pixel maps routinely exceed 64 KiB, so the 2-byte prefix used for short
//! identifiers in earlier protocol drafts is not enough here.

use crate::protocol::codec::ProtocolError;

/// Upper bound for any single length-prefixed field.  Prevents a corrupt
/// prefix from triggering a multi-gigabyte allocation.
pub const MAX_FIELD_LEN: usize = 256 * 1024 * 1024;

// ── Writing ───────────────────────────────────────────────────────────────────

pub fn write_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

pub fn write_bool(buf: &mut Vec<u8>, v: bool) {
    buf.push(if v { 0x01 } else { 0x00 });
}

pub fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn write_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn write_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Writes a 4-byte length prefix followed by the raw bytes.
pub fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

/// Writes a 4-byte length prefix followed by the UTF-8 string bytes.
pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_bytes(buf, s.as_bytes());
}

/// Writes a presence byte and, if present, the string.
pub fn write_opt_string(buf: &mut Vec<u8>, s: Option<&str>) {
    match s {
        Some(s) => {
            write_bool(buf, true);
            write_string(buf, s);
        }
        None => write_bool(buf, false),
    }
}

// ── Reading ───────────────────────────────────────────────────────────────────

/// Forward-only cursor over a byte slice.
///
/// Every read checks the remaining length first and reports a
/// [`ProtocolError`] naming the field that was being decoded.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize, context: &str) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::MalformedPayload(format!(
                "{context}: need {n} bytes at offset {}, got {}",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self, context: &str) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, context)?);
        Ok(out)
    }

    pub fn read_u8(&mut self, context: &str) -> Result<u8, ProtocolError> {
        Ok(self.take(1, context)?[0])
    }

    pub fn read_bool(&mut self, context: &str) -> Result<bool, ProtocolError> {
        match self.read_u8(context)? {
            0x00 => Ok(false),
            0x01 => Ok(true),
            other => Err(ProtocolError::MalformedPayload(format!(
                "{context}: invalid boolean byte 0x{other:02X}"
            ))),
        }
    }

    pub fn read_u32(&mut self, context: &str) -> Result<u32, ProtocolError> {
        self.take_array::<4>(context).map(u32::from_be_bytes)
    }

    pub fn read_i32(&mut self, context: &str) -> Result<i32, ProtocolError> {
        self.take_array::<4>(context).map(i32::from_be_bytes)
    }

    pub fn read_u64(&mut self, context: &str) -> Result<u64, ProtocolError> {
        self.take_array::<8>(context).map(u64::from_be_bytes)
    }

    pub fn read_i64(&mut self, context: &str) -> Result<i64, ProtocolError> {
        self.take_array::<8>(context).map(i64::from_be_bytes)
    }

    /// Reads a 4-byte length prefix and then that many bytes.
    pub fn read_bytes(&mut self, context: &str) -> Result<Vec<u8>, ProtocolError> {
        let len = self.read_u32(context)? as usize;
        if len > MAX_FIELD_LEN {
            return Err(ProtocolError::MalformedPayload(format!(
                "{context}: field length {len} exceeds limit"
            )));
        }
        Ok(self.take(len, context)?.to_vec())
    }

    /// Reads a 4-byte length prefix and then that many UTF-8 bytes.
    pub fn read_string(&mut self, context: &str) -> Result<String, ProtocolError> {
        let bytes = self.read_bytes(context)?;
        String::from_utf8(bytes)
            .map_err(|e| ProtocolError::MalformedPayload(format!("{context}: invalid UTF-8: {e}")))
    }

    pub fn read_opt_string(&mut self, context: &str) -> Result<Option<String>, ProtocolError> {
        if self.read_bool(context)? {
            self.read_string(context).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Reads a `u32` count and rejects values that could not possibly fit in
    /// the remaining bytes given `min_item_size` bytes per item.
    pub fn read_count(&mut self, min_item_size: usize, context: &str) -> Result<usize, ProtocolError> {
        let count = self.read_u32(context)? as usize;
        if count.saturating_mul(min_item_size.max(1)) > self.remaining() {
            return Err(ProtocolError::MalformedPayload(format!(
                "{context}: count {count} exceeds remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(count)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_and_integers_read_back_in_order() {
        // Arrange
        let mut buf = Vec::new();
        write_u32(&mut buf, 7);
        write_string(&mut buf, "héllo");
        write_i64(&mut buf, -42);
        write_opt_string(&mut buf, None);

        // Act
        let mut r = WireReader::new(&buf);

        // Assert
        assert_eq!(r.read_u32("a").unwrap(), 7);
        assert_eq!(r.read_string("b").unwrap(), "héllo");
        assert_eq!(r.read_i64("c").unwrap(), -42);
        assert_eq!(r.read_opt_string("d").unwrap(), None);
        assert!(r.is_empty());
    }

    #[test]
    fn test_truncated_string_is_malformed() {
        let mut buf = Vec::new();
        write_string(&mut buf, "truncated");
        buf.truncate(buf.len() - 3);

        let err = WireReader::new(&buf).read_string("field").unwrap_err();

        assert!(matches!(err, ProtocolError::MalformedPayload(_)));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, &[0xFF, 0xFE]);

        let err = WireReader::new(&buf).read_string("field").unwrap_err();

        assert!(matches!(err, ProtocolError::MalformedPayload(_)));
    }

    #[test]
    fn test_invalid_bool_byte_is_rejected() {
        let err = WireReader::new(&[0x07]).read_bool("flag").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPayload(_)));
    }

    #[test]
    fn test_absurd_count_is_rejected_before_allocation() {
        let mut buf = Vec::new();
        write_u32(&mut buf, u32::MAX);

        let err = WireReader::new(&buf).read_count(4, "records").unwrap_err();

        assert!(matches!(err, ProtocolError::MalformedPayload(_)));
    }
}
