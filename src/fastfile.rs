//! Fastfile Binary Codec
//!
//! The private on-disk encoding shared by all cache artifacts. Per-kind
//! converters write one resource payload per file; the composite converter
//! concatenates payloads behind a section-count header (see
//! [`crate::convert::composite`]).
//!
//! Everything is little-endian. Strings and blobs are `u32` length-prefixed.
//! A truncated or garbage artifact produces a [`KilnError::Load`], never a
//! panic; a stale or corrupt cache entry must degrade to "reconvert", not
//! take the process down.

use crate::errors::{KilnError, Result};

/// Magic bytes at the start of every fastfile.
pub const FASTFILE_MAGIC: [u8; 4] = *b"KFF1";

/// Format version, bumped whenever any payload encoding changes. A version
/// mismatch is a load error, which callers treat as "cache missing".
pub const FASTFILE_VERSION: u32 = 2;

// ============================================================================
// Writer
// ============================================================================

/// Append-only encoder over a byte buffer.
#[derive(Default)]
pub struct FastfileWriter {
    buf: Vec<u8>,
}

impl FastfileWriter {
    /// Starts a fastfile with magic and version already written.
    #[must_use]
    pub fn new() -> Self {
        let mut w = Self { buf: Vec::new() };
        w.buf.extend_from_slice(&FASTFILE_MAGIC);
        w.write_u32(FASTFILE_VERSION);
        w
    }

    /// Starts a bare section encoder with no header, for payloads that are
    /// embedded inside another fastfile.
    #[must_use]
    pub fn section() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    /// Appends a raw, already-encoded section without a length prefix.
    pub fn write_section(&mut self, section: &FastfileWriter) {
        self.buf.extend_from_slice(&section.buf);
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Cursor-style decoder over a byte slice.
///
/// The `label` (usually the artifact path or resource name) is carried into
/// every error message so a corrupt cache entry names itself in the log.
pub struct FastfileReader<'a> {
    data: &'a [u8],
    pos: usize,
    label: String,
}

impl<'a> FastfileReader<'a> {
    /// Opens a full fastfile, checking magic and version.
    pub fn new(data: &'a [u8], label: impl Into<String>) -> Result<Self> {
        let mut r = Self {
            data,
            pos: 0,
            label: label.into(),
        };
        let magic = r.take(4)?;
        if magic != FASTFILE_MAGIC {
            return Err(r.corrupt("bad magic"));
        }
        let version = r.read_u32()?;
        if version != FASTFILE_VERSION {
            return Err(r.corrupt(&format!(
                "version mismatch: artifact is v{version}, expected v{FASTFILE_VERSION}"
            )));
        }
        Ok(r)
    }

    /// Opens a bare section with no header.
    #[must_use]
    pub fn section(data: &'a [u8], label: impl Into<String>) -> Self {
        Self {
            data,
            pos: 0,
            label: label.into(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| self.corrupt("length overflow"))?;
        if end > self.data.len() {
            return Err(self.corrupt("truncated"));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn corrupt(&self, message: &str) -> KilnError {
        KilnError::Load {
            name: self.label.clone(),
            message: format!("corrupt fastfile at byte {}: {message}", self.pos),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_str(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.corrupt("string is not UTF-8"))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The not-yet-consumed tail of the input. Used by the composite
    /// converter to splice a validated artifact's payload into a combined
    /// fastfile without re-encoding it.
    #[must_use]
    pub fn remaining_slice(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_primitives() {
        let mut w = FastfileWriter::new();
        w.write_u8(7);
        w.write_u32(123_456);
        w.write_f32(0.25);
        w.write_str("brick");
        w.write_bytes(&[1, 2, 3]);
        let bytes = w.into_bytes();

        let mut r = FastfileReader::new(&bytes, "test").unwrap();
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_u32().unwrap(), 123_456);
        assert_eq!(r.read_f32().unwrap(), 0.25);
        assert_eq!(r.read_str().unwrap(), "brick");
        assert_eq!(r.read_bytes().unwrap(), vec![1, 2, 3]);
        assert!(r.is_exhausted());
    }

    #[test]
    fn truncated_input_is_an_error_not_a_panic() {
        let mut w = FastfileWriter::new();
        w.write_str("a long enough string");
        let mut bytes = w.into_bytes();
        bytes.truncate(bytes.len() - 4);

        let mut r = FastfileReader::new(&bytes, "test").unwrap();
        assert!(r.read_str().is_err());
    }

    #[test]
    fn bad_magic_is_rejected() {
        assert!(FastfileReader::new(b"NOPE\x01\x00\x00\x00", "test").is_err());
    }

    #[test]
    fn absurd_length_prefix_is_rejected() {
        let mut w = FastfileWriter::new();
        w.write_u32(u32::MAX);
        let bytes = w.into_bytes();
        let mut r = FastfileReader::new(&bytes, "test").unwrap();
        assert!(r.read_bytes().is_err());
    }
}
