use std::borrow::Cow;

use plsp_contracts::STRING_SENTINEL;
use serde::{Deserialize, Serialize};

use crate::error::WireError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
}

impl Charset {
    pub fn as_str(self) -> &'static str {
        match self {
            Charset::Utf8 => "utf8",
            Charset::Latin1 => "latin1",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Some(Charset::Utf8),
            "latin1" | "iso-8859-1" | "iso8859-1" => Some(Charset::Latin1),
            _ => None,
        }
    }

    /// Latin-1 has no encoding for code points above U+00FF; those become `?`.
    pub fn encode<'a>(self, s: &'a str) -> Cow<'a, [u8]> {
        match self {
            Charset::Utf8 => Cow::Borrowed(s.as_bytes()),
            Charset::Latin1 => {
                if s.is_ascii() {
                    return Cow::Borrowed(s.as_bytes());
                }
                Cow::Owned(
                    s.chars()
                        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                        .collect(),
                )
            }
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, WireError> {
        match self {
            Charset::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_string)
                .map_err(|_| WireError::InvalidText(self.as_str())),
            Charset::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

fn padding(pos: usize, align: usize) -> usize {
    let rem = pos % align;
    if rem == 0 {
        0
    } else {
        align - rem
    }
}

/// Append-only encoder. One instance is owned by each worker and cleared
/// between requests.
#[derive(Debug, Default)]
pub struct Packer {
    buf: Vec<u8>,
    charset: Charset,
}

impl Packer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_charset(charset: Charset) -> Self {
        Self {
            buf: Vec::with_capacity(1024),
            charset,
        }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn align(&mut self, align: usize) {
        let pad = padding(self.buf.len(), align);
        self.buf.resize(self.buf.len() + pad, 0);
    }

    pub fn pack_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn pack_i16(&mut self, v: i16) {
        self.align(2);
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn pack_i32(&mut self, v: i32) {
        self.align(4);
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn pack_u32(&mut self, v: u32) {
        self.align(4);
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn pack_i64(&mut self, v: i64) {
        self.align(8);
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn pack_f32(&mut self, v: f32) {
        self.align(4);
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn pack_f64(&mut self, v: f64) {
        self.align(8);
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn pack_bool(&mut self, v: bool) {
        self.pack_i32(i32::from(v));
    }

    /// Length-prefixed byte string: a single length byte below 255, otherwise
    /// the sentinel byte followed by an aligned 4-byte length. The position is
    /// re-aligned to 4 after the payload.
    pub fn pack_bytes(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        if bytes.len() < usize::from(STRING_SENTINEL) {
            self.buf.push(bytes.len() as u8);
        } else {
            let len = i32::try_from(bytes.len()).map_err(|_| WireError::TooLong {
                what: "string",
                len: bytes.len(),
            })?;
            self.buf.push(STRING_SENTINEL);
            self.pack_i32(len);
        }
        self.buf.extend_from_slice(bytes);
        self.align(4);
        Ok(())
    }

    pub fn pack_string(&mut self, s: &str) -> Result<(), WireError> {
        let bytes = self.charset.encode(s);
        self.pack_bytes(&bytes)
    }

    /// Element count prefix of a list body.
    pub fn pack_count(&mut self, n: usize) -> Result<(), WireError> {
        let n = i32::try_from(n).map_err(|_| WireError::TooLong {
            what: "element count",
            len: n,
        })?;
        self.pack_i32(n);
        Ok(())
    }

    /// NUL-terminated text with no length prefix, used by ping replies.
    pub fn pack_cstring(&mut self, s: &str) {
        let bytes = self.charset.encode(s);
        self.buf.extend(bytes.iter().copied().filter(|b| *b != 0));
        self.buf.push(0);
        self.align(4);
    }
}

/// Cursor over a received payload. Reading past the end is an error the
/// caller must treat as connection-fatal.
#[derive(Debug)]
pub struct Unpacker<'a> {
    buf: &'a [u8],
    pos: usize,
    charset: Charset,
}

impl<'a> Unpacker<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_charset(buf, Charset::default())
    }

    pub fn with_charset(buf: &'a [u8], charset: Charset) -> Self {
        Self {
            buf,
            pos: 0,
            charset,
        }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Trailing padding may be omitted by the sender at the very end of a
    /// frame, so alignment stops at the buffer end instead of failing.
    pub fn align(&mut self, align: usize) {
        let next = self.pos + padding(self.pos, align);
        self.pos = next.min(self.buf.len());
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        let Some(end) = end else {
            return Err(WireError::Truncated {
                offset: self.pos,
                need: n,
                len: self.buf.len(),
            });
        };
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn unpack_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn unpack_i16(&mut self) -> Result<i16, WireError> {
        self.align(2);
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn unpack_i32(&mut self) -> Result<i32, WireError> {
        self.align(4);
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn unpack_u32(&mut self) -> Result<u32, WireError> {
        self.align(4);
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn unpack_i64(&mut self) -> Result<i64, WireError> {
        self.align(8);
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn unpack_f32(&mut self) -> Result<f32, WireError> {
        self.align(4);
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    pub fn unpack_f64(&mut self) -> Result<f64, WireError> {
        self.align(8);
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    pub fn unpack_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.unpack_i32()? != 0)
    }

    /// Count of repeated elements that follow; negative counts are rejected.
    pub fn unpack_count(&mut self) -> Result<usize, WireError> {
        let n = self.unpack_i32()?;
        usize::try_from(n).map_err(|_| WireError::Malformed(format!("negative count {n}")))
    }

    pub fn unpack_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let first = self.unpack_u8()?;
        let len = if first == STRING_SENTINEL {
            let n = self.unpack_i32()?;
            usize::try_from(n)
                .map_err(|_| WireError::Malformed(format!("negative string length {n}")))?
        } else {
            usize::from(first)
        };
        let out = self.take(len)?;
        self.align(4);
        Ok(out)
    }

    pub fn unpack_string(&mut self) -> Result<String, WireError> {
        let bytes = self.unpack_bytes()?;
        self.charset.decode(bytes)
    }

    pub fn unpack_cstring(&mut self) -> Result<String, WireError> {
        let rest = &self.buf[self.pos..];
        let Some(end) = rest.iter().position(|b| *b == 0) else {
            return Err(WireError::Truncated {
                offset: self.pos,
                need: rest.len() + 1,
                len: self.buf.len(),
            });
        };
        let bytes = self.take(end + 1)?;
        self.align(4);
        self.charset.decode(&bytes[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_pad_to_natural_alignment() {
        let mut p = Packer::new();
        p.pack_u8(7);
        p.pack_i16(-2);
        assert_eq!(p.len(), 4);
        p.pack_u8(1);
        p.pack_i32(42);
        assert_eq!(p.len(), 12);
        p.pack_i64(-1);
        assert_eq!(p.len(), 24);
        p.pack_u8(0);
        p.pack_f64(1.5);
        assert_eq!(p.len(), 40);
        assert_eq!(&p.as_slice()[4..8], &[1, 0, 0, 0]);
        assert_eq!(&p.as_slice()[8..12], &42i32.to_be_bytes());
    }

    #[test]
    fn short_and_long_string_forms() {
        let mut p = Packer::new();
        p.pack_string(&"a".repeat(254)).unwrap();
        assert_eq!(p.as_slice()[0], 254);
        assert_eq!(p.len(), 256);

        p.clear();
        p.pack_string(&"b".repeat(255)).unwrap();
        assert_eq!(p.as_slice()[0], STRING_SENTINEL);
        assert_eq!(&p.as_slice()[4..8], &255i32.to_be_bytes());
        assert_eq!(p.len() % 4, 0);
    }

    #[test]
    fn oversized_counts_fail_instead_of_clamping() {
        let mut p = Packer::new();
        let too_many = i32::MAX as usize + 1;
        assert_eq!(
            p.pack_count(too_many),
            Err(WireError::TooLong {
                what: "element count",
                len: too_many
            })
        );
        assert!(p.is_empty());
        p.pack_count(3).unwrap();
        assert_eq!(p.as_slice(), &3i32.to_be_bytes());
    }

    #[test]
    fn truncated_read_is_fatal() {
        let mut u = Unpacker::new(&[0, 0]);
        let err = u.unpack_i32().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn latin1_replaces_wide_chars() {
        let mut p = Packer::with_charset(Charset::Latin1);
        p.pack_string("caf\u{e9}\u{4e2d}").unwrap();
        let mut u = Unpacker::with_charset(p.as_slice(), Charset::Latin1);
        assert_eq!(u.unpack_string().unwrap(), "caf\u{e9}?");
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut p = Packer::new();
        p.pack_bytes(&[0xC3, 0x28]).unwrap();
        let mut u = Unpacker::new(p.as_slice());
        assert_eq!(u.unpack_string(), Err(WireError::InvalidText("utf8")));
    }

    #[test]
    fn cstrings_are_nul_terminated_and_aligned() {
        let mut p = Packer::new();
        p.pack_cstring("plsp");
        assert_eq!(&p.as_slice()[..5], b"plsp\0");
        assert_eq!(p.len(), 8);
        p.pack_i32(3);
        let mut u = Unpacker::new(p.as_slice());
        assert_eq!(u.unpack_cstring().unwrap(), "plsp");
        assert_eq!(u.unpack_i32().unwrap(), 3);
        assert!(Unpacker::new(b"abc").unpack_cstring().unwrap_err().is_fatal());
    }
}
