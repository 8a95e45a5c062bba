//! Stream primitives for the binary and ASCII formats
//!
//! Binary: little-endian multi-byte values, strings UTF-8 with a u32
//! length prefix. ASCII: whitespace-separated tokens, with strings that
//! may contain whitespace length-prefixed on their own line. Both readers
//! track the byte offset so errors point at the failing position.

use std::io::{Read, Write};

use crate::error::{GeoTessError, GeoTessErrorKind, Result};

/// Refuse string lengths beyond this; anything larger is a corrupt prefix.
const MAX_STRING_LEN: usize = 1 << 28;

/// Little-endian binary reader with offset tracking
pub struct BinReader<'a> {
    inner: &'a mut dyn Read,
    offset: usize,
}

impl<'a> BinReader<'a> {
    pub fn new(inner: &'a mut dyn Read) -> Self {
        Self { inner, offset: 0 }
    }

    /// Byte offset of the next read.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let at = self.offset;
        self.inner
            .read_exact(buf)
            .map_err(|e| GeoTessError::at(GeoTessErrorKind::Io(e), at))?;
        self.offset += buf.len();
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.fill(&mut b)?;
        Ok(b[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let mut b = [0u8; 2];
        self.fill(&mut b)?;
        Ok(i16::from_le_bytes(b))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.fill(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut b = [0u8; 4];
        self.fill(&mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let mut b = [0u8; 8];
        self.fill(&mut b)?;
        Ok(i64::from_le_bytes(b))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let mut b = [0u8; 4];
        self.fill(&mut b)?;
        Ok(f32::from_le_bytes(b))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let mut b = [0u8; 8];
        self.fill(&mut b)?;
        Ok(f64::from_le_bytes(b))
    }

    /// u32-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let at = self.offset;
        let len = self.read_u32()? as usize;
        if len > MAX_STRING_LEN {
            return Err(GeoTessError::at(
                GeoTessErrorKind::MalformedFile(format!("string length {} too large", len)),
                at,
            ));
        }
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        String::from_utf8(buf).map_err(|e| {
            GeoTessError::at(GeoTessErrorKind::InvalidUtf8(e.utf8_error()), at + 4)
        })
    }

    /// Like [`read_string`](Self::read_string) but returns `None` at a
    /// clean end of stream. Used for the optional extension payload.
    pub fn read_opt_string(&mut self) -> Result<Option<String>> {
        let at = self.offset;
        let mut b = [0u8; 4];
        let mut got = 0;
        while got < 4 {
            match self.inner.read(&mut b[got..]) {
                Ok(0) if got == 0 => return Ok(None),
                Ok(0) => {
                    return Err(GeoTessError::at(
                        GeoTessErrorKind::MalformedFile("truncated string length".into()),
                        at,
                    ))
                }
                Ok(n) => got += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(GeoTessError::at(GeoTessErrorKind::Io(e), at)),
            }
        }
        self.offset += 4;
        let len = u32::from_le_bytes(b) as usize;
        if len > MAX_STRING_LEN {
            return Err(GeoTessError::at(
                GeoTessErrorKind::MalformedFile(format!("string length {} too large", len)),
                at,
            ));
        }
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        let s = String::from_utf8(buf).map_err(|e| {
            GeoTessError::at(GeoTessErrorKind::InvalidUtf8(e.utf8_error()), at + 4)
        })?;
        Ok(Some(s))
    }

    /// Raw magic bytes with no length prefix.
    pub fn expect_magic(&mut self, magic: &str) -> Result<()> {
        let at = self.offset;
        let mut buf = vec![0u8; magic.len()];
        self.fill(&mut buf)?;
        if buf != magic.as_bytes() {
            return Err(GeoTessError::at(
                GeoTessErrorKind::MalformedFile(format!(
                    "bad magic, expected {:?} got {:?}",
                    magic,
                    String::from_utf8_lossy(&buf)
                )),
                at,
            ));
        }
        Ok(())
    }
}

/// Little-endian binary writer with offset tracking
pub struct BinWriter<'a> {
    inner: &'a mut dyn Write,
    offset: usize,
}

impl<'a> BinWriter<'a> {
    pub fn new(inner: &'a mut dyn Write) -> Self {
        Self { inner, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        let at = self.offset;
        self.inner
            .write_all(bytes)
            .map_err(|e| GeoTessError::at(GeoTessErrorKind::Io(e), at))?;
        self.offset += bytes.len();
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.put(&[v])
    }

    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        self.put(&[v as u8])
    }

    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        self.put(&v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.put(&v.to_le_bytes())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.put(&v.to_le_bytes())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.put(&v.to_le_bytes())
    }

    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.put(&v.to_le_bytes())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.put(&v.to_le_bytes())
    }

    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_u32(s.len() as u32)?;
        self.put(s.as_bytes())
    }

    pub fn write_magic(&mut self, magic: &str) -> Result<()> {
        self.put(magic.as_bytes())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(GeoTessError::from)
    }
}

/// Token reader for the ASCII format
///
/// Reads the whole stream up front; files in this format are small enough
/// that the simplicity is worth more than streaming.
pub struct AsciiReader {
    text: Vec<u8>,
    pos: usize,
}

impl AsciiReader {
    pub fn new(inner: &mut dyn Read) -> Result<Self> {
        let mut text = Vec::new();
        inner.read_to_end(&mut text)?;
        Ok(Self { text, pos: 0 })
    }

    pub fn from_text(text: impl Into<Vec<u8>>) -> Self {
        Self {
            text: text.into(),
            pos: 0,
        }
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    fn err(&self, msg: impl Into<String>) -> GeoTessError {
        GeoTessError::at(GeoTessErrorKind::MalformedFile(msg.into()), self.pos)
    }

    /// Next whitespace-delimited token. Errors at end of input.
    pub fn next_token(&mut self) -> Result<&str> {
        while self.pos < self.text.len() && self.text[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= self.text.len() {
            return Err(self.err("unexpected end of input"));
        }
        let start = self.pos;
        while self.pos < self.text.len() && !self.text[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        std::str::from_utf8(&self.text[start..self.pos])
            .map_err(|e| GeoTessError::at(GeoTessErrorKind::InvalidUtf8(e), start))
    }

    /// Next token, or `None` at a clean end of input.
    pub fn next_token_opt(&mut self) -> Result<Option<String>> {
        while self.pos < self.text.len() && self.text[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= self.text.len() {
            return Ok(None);
        }
        Ok(Some(self.next_token()?.to_owned()))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let at = self.pos;
        let tok = self.next_token()?.to_owned();
        tok.parse().map_err(|_| {
            GeoTessError::at(
                GeoTessErrorKind::MalformedFile(format!("expected integer, got {:?}", tok)),
                at,
            )
        })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let at = self.pos;
        let v = self.read_u32()?;
        u8::try_from(v).map_err(|_| {
            GeoTessError::at(
                GeoTessErrorKind::MalformedFile(format!("value {} out of u8 range", v)),
                at,
            )
        })
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let at = self.pos;
        let tok = self.next_token()?.to_owned();
        tok.parse().map_err(|_| {
            GeoTessError::at(
                GeoTessErrorKind::MalformedFile(format!("expected integer, got {:?}", tok)),
                at,
            )
        })
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let at = self.pos;
        let tok = self.next_token()?.to_owned();
        tok.parse().map_err(|_| {
            GeoTessError::at(
                GeoTessErrorKind::MalformedFile(format!("expected number, got {:?}", tok)),
                at,
            )
        })
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let at = self.pos;
        let tok = self.next_token()?.to_owned();
        tok.parse().map_err(|_| {
            GeoTessError::at(
                GeoTessErrorKind::MalformedFile(format!("expected number, got {:?}", tok)),
                at,
            )
        })
    }

    /// Length-prefixed string: a line holding the byte count, then exactly
    /// that many bytes starting on the following line.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        if len > MAX_STRING_LEN {
            return Err(self.err(format!("string length {} too large", len)));
        }
        // Consume the rest of the length line.
        while self.pos < self.text.len() && self.text[self.pos] != b'\n' {
            self.pos += 1;
        }
        if self.pos < self.text.len() {
            self.pos += 1;
        }
        if self.pos + len > self.text.len() {
            return Err(self.err("truncated string payload"));
        }
        let s = std::str::from_utf8(&self.text[self.pos..self.pos + len])
            .map_err(|e| GeoTessError::at(GeoTessErrorKind::InvalidUtf8(e), self.pos))?
            .to_owned();
        self.pos += len;
        Ok(s)
    }

    /// A bare token that the format guarantees holds no whitespace
    /// (magic words, type tags, hex ids).
    pub fn read_word(&mut self) -> Result<String> {
        Ok(self.next_token()?.to_owned())
    }

    /// True when only whitespace remains.
    pub fn at_end(&mut self) -> bool {
        while self.pos < self.text.len() && self.text[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        self.pos >= self.text.len()
    }
}

/// Writer for the ASCII format
pub struct AsciiWriter<'a> {
    inner: &'a mut dyn Write,
}

impl<'a> AsciiWriter<'a> {
    pub fn new(inner: &'a mut dyn Write) -> Self {
        Self { inner }
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.inner, "{}", line).map_err(GeoTessError::from)
    }

    /// Space-separated fields on one line.
    pub fn write_fields(&mut self, fields: &[String]) -> Result<()> {
        self.write_line(&fields.join(" "))
    }

    /// Length-prefixed string record: byte count on its own line, then the
    /// raw string, then a newline.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        writeln!(self.inner, "{}", s.len()).map_err(GeoTessError::from)?;
        self.inner.write_all(s.as_bytes()).map_err(GeoTessError::from)?;
        writeln!(self.inner).map_err(GeoTessError::from)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(GeoTessError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_primitives_round_trip() {
        let mut buf = Vec::new();
        {
            let mut w = BinWriter::new(&mut buf);
            w.write_magic("GEOTESSGRID").unwrap();
            w.write_u32(2).unwrap();
            w.write_f64(-1.5e-7).unwrap();
            w.write_string("héllo world").unwrap();
            w.write_i16(-2).unwrap();
        }
        let mut cur = buf.as_slice();
        let mut r = BinReader::new(&mut cur);
        r.expect_magic("GEOTESSGRID").unwrap();
        assert_eq!(r.read_u32().unwrap(), 2);
        assert_eq!(r.read_f64().unwrap(), -1.5e-7);
        assert_eq!(r.read_string().unwrap(), "héllo world");
        assert_eq!(r.read_i16().unwrap(), -2);
        assert_eq!(r.read_opt_string().unwrap(), None);
    }

    #[test]
    fn bad_magic_reports_offset_zero() {
        let data = b"NOTAGRIDFIL".to_vec();
        let mut cur = data.as_slice();
        let mut r = BinReader::new(&mut cur);
        let err = r.expect_magic("GEOTESSGRID").unwrap_err();
        assert_eq!(err.offset, 0);
        assert!(matches!(err.kind, GeoTessErrorKind::MalformedFile(_)));
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut buf = Vec::new();
        {
            let mut w = BinWriter::new(&mut buf);
            w.write_u32(100).unwrap(); // claims a 100-byte string
        }
        buf.extend_from_slice(b"short");
        let mut cur = buf.as_slice();
        let mut r = BinReader::new(&mut cur);
        assert!(r.read_string().is_err());
    }

    #[test]
    fn ascii_tokens_and_strings_round_trip() {
        let mut buf = Vec::new();
        {
            let mut w = AsciiWriter::new(&mut buf);
            w.write_line("GEOTESSMODEL").unwrap();
            w.write_fields(&["3".into(), "0.25".into()]).unwrap();
            w.write_string("two words\nand a newline").unwrap();
            w.write_line("-42").unwrap();
        }
        let mut r = AsciiReader::from_text(buf);
        assert_eq!(r.read_word().unwrap(), "GEOTESSMODEL");
        assert_eq!(r.read_u32().unwrap(), 3);
        assert_eq!(r.read_f64().unwrap(), 0.25);
        assert_eq!(r.read_string().unwrap(), "two words\nand a newline");
        assert_eq!(r.read_i64().unwrap(), -42);
        assert_eq!(r.next_token_opt().unwrap(), None);
    }

    #[test]
    fn float_decimal_printing_round_trips_bits() {
        // The shortest-repr formatter guarantees parse(format(x)) == x.
        for x in [1.0f64 / 3.0, 6371.0, f64::MIN_POSITIVE, 1.0e300] {
            let s = format!("{}", x);
            assert_eq!(s.parse::<f64>().unwrap(), x);
        }
        for x in [0.1f32, 6371.0f32, -1.5e-7f32] {
            let s = format!("{}", x);
            assert_eq!(s.parse::<f32>().unwrap(), x);
        }
    }
}
