use crate::error::BinaryError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Cursor over an immutable byte buffer. All multi-byte integers are
/// little-endian; strings are null-terminated UTF-8.
#[derive(Debug, Clone)]
pub struct BinaryReader {
    buffer: Bytes,
}

impl BinaryReader {
    pub fn new(buffer: Bytes) -> Self {
        Self { buffer }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            buffer: Bytes::copy_from_slice(data),
        }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<(), BinaryError> {
        if self.buffer.remaining() < needed {
            return Err(BinaryError::UnexpectedEof {
                needed,
                remaining: self.buffer.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, BinaryError> {
        self.ensure(1)?;
        Ok(self.buffer.get_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8, BinaryError> {
        self.ensure(1)?;
        Ok(self.buffer.get_i8())
    }

    pub fn read_u16(&mut self) -> Result<u16, BinaryError> {
        self.ensure(2)?;
        Ok(self.buffer.get_u16_le())
    }

    pub fn read_i16(&mut self) -> Result<i16, BinaryError> {
        self.ensure(2)?;
        Ok(self.buffer.get_i16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32, BinaryError> {
        self.ensure(4)?;
        Ok(self.buffer.get_u32_le())
    }

    pub fn read_i32(&mut self) -> Result<i32, BinaryError> {
        self.ensure(4)?;
        Ok(self.buffer.get_i32_le())
    }

    pub fn read_u64(&mut self) -> Result<u64, BinaryError> {
        self.ensure(8)?;
        Ok(self.buffer.get_u64_le())
    }

    pub fn read_i64(&mut self) -> Result<i64, BinaryError> {
        self.ensure(8)?;
        Ok(self.buffer.get_i64_le())
    }

    pub fn read_f32(&mut self) -> Result<f32, BinaryError> {
        self.ensure(4)?;
        Ok(self.buffer.get_f32_le())
    }

    pub fn read_f64(&mut self) -> Result<f64, BinaryError> {
        self.ensure(8)?;
        Ok(self.buffer.get_f64_le())
    }

    pub fn read_bool(&mut self) -> Result<bool, BinaryError> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads `len` bytes without copying the underlying storage.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, BinaryError> {
        self.ensure(len)?;
        Ok(self.buffer.copy_to_bytes(len))
    }

    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<(), BinaryError> {
        self.ensure(out.len())?;
        self.buffer.copy_to_slice(out);
        Ok(())
    }

    /// Consumes and returns everything left in the buffer.
    pub fn read_rest(&mut self) -> Bytes {
        let len = self.buffer.remaining();
        self.buffer.copy_to_bytes(len)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), BinaryError> {
        self.ensure(len)?;
        self.buffer.advance(len);
        Ok(())
    }

    /// Reads a null-terminated UTF-8 string, consuming the terminator.
    pub fn read_string(&mut self) -> Result<String, BinaryError> {
        let nul = self
            .buffer
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| BinaryError::InvalidData("Unterminated string".to_string()))?;
        let raw = self.buffer.copy_to_bytes(nul);
        self.buffer.advance(1);
        String::from_utf8(raw.to_vec())
            .map_err(|e| BinaryError::InvalidData(format!("Invalid UTF-8 string: {}", e)))
    }
}

/// Growable output buffer matching `BinaryReader`'s encodings.
#[derive(Debug, Clone, Default)]
pub struct BinaryWriter {
    buffer: BytesMut,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), BinaryError> {
        self.buffer.put_u8(value);
        Ok(())
    }

    pub fn write_i8(&mut self, value: i8) -> Result<(), BinaryError> {
        self.buffer.put_i8(value);
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), BinaryError> {
        self.buffer.put_u16_le(value);
        Ok(())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<(), BinaryError> {
        self.buffer.put_i16_le(value);
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), BinaryError> {
        self.buffer.put_u32_le(value);
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), BinaryError> {
        self.buffer.put_i32_le(value);
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), BinaryError> {
        self.buffer.put_u64_le(value);
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), BinaryError> {
        self.buffer.put_i64_le(value);
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), BinaryError> {
        self.buffer.put_f32_le(value);
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), BinaryError> {
        self.buffer.put_f64_le(value);
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), BinaryError> {
        self.write_u8(value as u8)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), BinaryError> {
        self.buffer.put_slice(data);
        Ok(())
    }

    /// Writes a string followed by its null terminator. The string must not
    /// itself contain a null byte.
    pub fn write_string(&mut self, value: &str) -> Result<(), BinaryError> {
        if value.as_bytes().contains(&0) {
            return Err(BinaryError::InvalidData(
                "String contains an interior null byte".to_string(),
            ));
        }
        self.buffer.put_slice(value.as_bytes());
        self.buffer.put_u8(0);
        Ok(())
    }

    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_roundtrip_little_endian() {
        let mut writer = BinaryWriter::new();
        writer.write_u8(0xab).unwrap();
        writer.write_u16(0x1234).unwrap();
        writer.write_u32(0xdeadbeef).unwrap();
        writer.write_i32(-7).unwrap();
        let encoded = writer.freeze();

        // Spot-check the byte order before reading back.
        assert_eq!(&encoded[1..3], &[0x34, 0x12]);
        assert_eq!(&encoded[3..7], &[0xef, 0xbe, 0xad, 0xde]);

        let mut reader = BinaryReader::new(encoded);
        assert_eq!(reader.read_u8().unwrap(), 0xab);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0xdeadbeef);
        assert_eq!(reader.read_i32().unwrap(), -7);
        assert!(reader.is_empty());
    }

    #[test]
    fn string_is_null_terminated() {
        let mut writer = BinaryWriter::new();
        writer.write_string("Hafen").unwrap();
        writer.write_u16(42).unwrap();
        let encoded = writer.freeze();
        assert_eq!(&encoded[..6], b"Hafen\0");

        let mut reader = BinaryReader::new(encoded);
        assert_eq!(reader.read_string().unwrap(), "Hafen");
        assert_eq!(reader.read_u16().unwrap(), 42);
    }

    #[test]
    fn string_rejects_interior_null() {
        let mut writer = BinaryWriter::new();
        assert!(matches!(
            writer.write_string("a\0b"),
            Err(BinaryError::InvalidData(_))
        ));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let mut reader = BinaryReader::from_slice(b"noterm");
        assert!(matches!(
            reader.read_string(),
            Err(BinaryError::InvalidData(_))
        ));
    }

    #[test]
    fn short_reads_report_eof() {
        let mut reader = BinaryReader::from_slice(&[0x01]);
        assert!(matches!(
            reader.read_u32(),
            Err(BinaryError::UnexpectedEof {
                needed: 4,
                remaining: 1
            })
        ));
    }

    #[test]
    fn read_rest_drains_the_buffer() {
        let mut reader = BinaryReader::from_slice(&[1, 2, 3, 4]);
        reader.read_u8().unwrap();
        assert_eq!(reader.read_rest().as_ref(), &[2, 3, 4]);
        assert!(reader.is_empty());
    }
}
