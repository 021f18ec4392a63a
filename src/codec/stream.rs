// Mon Feb 2 2026 - Alex

use crate::codec::CodecError;
use memmap2::Mmap;

enum StreamBuf {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl StreamBuf {
    fn as_slice(&self) -> &[u8] {
        match self {
            StreamBuf::Owned(v) => v,
            StreamBuf::Mapped(m) => m,
        }
    }
}

/// Random-access binary stream with a single shared cursor. Fixed-width
/// integers are little-endian. Writing is only supported on owned buffers;
/// a write inside the existing range overwrites in place (used by the
/// address-table backfill), a write at the end appends.
pub struct ByteStream {
    buf: StreamBuf,
    pos: usize,
}

impl ByteStream {
    pub fn new() -> Self {
        Self { buf: StreamBuf::Owned(Vec::new()), pos: 0 }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { buf: StreamBuf::Owned(data), pos: 0 }
    }

    pub fn from_mmap(map: Mmap) -> Self {
        Self { buf: StreamBuf::Mapped(map), pos: 0 }
    }

    pub fn len(&self) -> u64 {
        self.buf.as_slice().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.buf.as_slice().is_empty()
    }

    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    pub fn seek(&mut self, pos: u64) -> Result<(), CodecError> {
        if pos > self.len() {
            return Err(CodecError::SeekOutOfRange(pos, self.len()));
        }
        self.pos = pos as usize;
        Ok(())
    }

    pub fn into_vec(self) -> Vec<u8> {
        match self.buf {
            StreamBuf::Owned(v) => v,
            StreamBuf::Mapped(m) => m.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    // --- reads ---

    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<(), CodecError> {
        let data = self.buf.as_slice();
        let end = self.pos + out.len();
        if end > data.len() {
            return Err(CodecError::UnexpectedEof(self.pos as u64));
        }
        out.copy_from_slice(&data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    /// Variable-length integer: 7 bits per byte, continuation bit on all
    /// but the last byte, least-significant group first.
    pub fn read_varint(&mut self) -> Result<u64, CodecError> {
        let start = self.pos as u64;
        let mut value: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.read_u8()?;
            if shift >= 64 {
                return Err(CodecError::VarintOverflow(start));
            }
            value |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Length-prefixed string: varint byte count, then raw bytes, no
    /// terminator.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let start = self.pos as u64;
        let len = self.read_varint()? as usize;
        let data = self.buf.as_slice();
        // A corrupt length prefix can be anything up to u64::MAX; it must
        // come back as an error, never an overflow.
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= data.len())
            .ok_or(CodecError::UnexpectedEof(self.pos as u64))?;
        let s = std::str::from_utf8(&data[self.pos..end])
            .map_err(|_| CodecError::InvalidUtf8(start))?;
        let s = s.to_string();
        self.pos = end;
        Ok(s)
    }

    /// Booleans packed 8 per byte, least-significant bit first, only as
    /// many trailing bytes as `count` needs.
    pub fn read_packed_bools(&mut self, count: usize) -> Result<Vec<bool>, CodecError> {
        let bytes = count.div_ceil(8);
        let mut out = Vec::with_capacity(count);
        let mut buf = vec![0u8; bytes];
        self.read_exact(&mut buf)?;
        for i in 0..count {
            out.push(buf[i / 8] & (1 << (i % 8)) != 0);
        }
        Ok(out)
    }

    // --- writes ---

    fn write_raw(&mut self, data: &[u8]) -> Result<(), CodecError> {
        let buf = match &mut self.buf {
            StreamBuf::Owned(v) => v,
            StreamBuf::Mapped(_) => return Err(CodecError::ReadOnly),
        };
        let end = self.pos + data.len();
        if end > buf.len() {
            buf.resize(end, 0);
        }
        buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), CodecError> {
        self.write_raw(&[value])
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), CodecError> {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), CodecError> {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_varint(&mut self, mut value: u64) -> Result<(), CodecError> {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.write_u8(byte)?;
            if value == 0 {
                return Ok(());
            }
        }
    }

    pub fn write_string(&mut self, s: &str) -> Result<(), CodecError> {
        self.write_varint(s.len() as u64)?;
        self.write_raw(s.as_bytes())
    }

    pub fn write_packed_bools(&mut self, flags: &[bool]) -> Result<(), CodecError> {
        let mut bytes = vec![0u8; flags.len().div_ceil(8)];
        for (i, &flag) in flags.iter().enumerate() {
            if flag {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        self.write_raw(&bytes)
    }
}

impl Default for ByteStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_widths() {
        let mut s = ByteStream::new();
        for &v in &[0u64, 1, 127, 128, 300, 16383, 16384, u32::MAX as u64, u64::MAX] {
            s.write_varint(v).unwrap();
        }
        s.seek(0).unwrap();
        for &v in &[0u64, 1, 127, 128, 300, 16383, 16384, u32::MAX as u64, u64::MAX] {
            assert_eq!(s.read_varint().unwrap(), v);
        }
        assert_eq!(s.position(), s.len());
    }

    #[test]
    fn test_varint_single_byte_boundary() {
        let mut s = ByteStream::new();
        s.write_varint(127).unwrap();
        assert_eq!(s.len(), 1);
        s.write_varint(128).unwrap();
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn test_string_round_trip() {
        let mut s = ByteStream::new();
        s.write_string("DataModel").unwrap();
        s.write_string("").unwrap();
        s.write_string("ünïcode").unwrap();
        s.seek(0).unwrap();
        assert_eq!(s.read_string().unwrap(), "DataModel");
        assert_eq!(s.read_string().unwrap(), "");
        assert_eq!(s.read_string().unwrap(), "ünïcode");
    }

    #[test]
    fn test_string_with_corrupt_length_prefix_errors() {
        // Length prefix decodes to u64::MAX; the add toward `end` must
        // surface as an EOF error, not wrap around.
        let bytes = vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let mut s = ByteStream::from_vec(bytes);
        assert!(matches!(s.read_string(), Err(CodecError::UnexpectedEof(_))));

        // A merely-too-long prefix errors the same way.
        let mut s = ByteStream::new();
        s.write_varint(100).unwrap();
        s.write_u8(b'x').unwrap();
        s.seek(0).unwrap();
        assert!(matches!(s.read_string(), Err(CodecError::UnexpectedEof(_))));
    }

    #[test]
    fn test_packed_bools_trailing_bytes() {
        let mut s = ByteStream::new();
        let flags = [true, false, false, true, true, false, true, false, true];
        s.write_packed_bools(&flags).unwrap();
        assert_eq!(s.len(), 2);
        s.seek(0).unwrap();
        assert_eq!(s.read_packed_bools(flags.len()).unwrap(), flags);
    }

    #[test]
    fn test_overwrite_in_place() {
        let mut s = ByteStream::new();
        s.write_u32(0).unwrap();
        s.write_u32(7).unwrap();
        s.seek(0).unwrap();
        s.write_u32(42).unwrap();
        s.seek(0).unwrap();
        assert_eq!(s.read_u32().unwrap(), 42);
        assert_eq!(s.read_u32().unwrap(), 7);
    }

    #[test]
    fn test_eof_is_reported() {
        let mut s = ByteStream::from_vec(vec![0x80]);
        assert!(matches!(s.read_u32(), Err(CodecError::UnexpectedEof(_))));
        s.seek(0).unwrap();
        assert!(s.read_varint().is_err());
    }
}
