// ByteReader - bounds-checked little-endian cursor over a borrowed buffer
// All geodata parsers read through this; nothing here knows file formats

use byteorder::{ByteOrder, LittleEndian};

use crate::error::ReadError;
use crate::math::{AaBox, Vec3};

/// A read-only cursor over a byte slice. Every read advances the position
/// and fails with the offset it was at if too few bytes remain. Malformed
/// values (NaN floats and the like) are not this layer's concern.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    /// Current read offset from the start of the buffer
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn check(&self, wanted: usize) -> Result<(), ReadError> {
        if self.pos + wanted > self.data.len() {
            return Err(ReadError {
                offset: self.pos,
                wanted,
                available: self.data.len() - self.pos,
            });
        }
        Ok(())
    }

    /// Advance without reading. Checked: skipping past the end is the same
    /// truncation failure as reading past it.
    pub fn skip(&mut self, count: usize) -> Result<(), ReadError> {
        self.check(count)?;
        self.pos += count;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        self.check(1)?;
        let val = self.data[self.pos];
        self.pos += 1;
        Ok(val)
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        self.check(2)?;
        let val = LittleEndian::read_u16(&self.data[self.pos..]);
        self.pos += 2;
        Ok(val)
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        self.check(4)?;
        let val = LittleEndian::read_u32(&self.data[self.pos..]);
        self.pos += 4;
        Ok(val)
    }

    pub fn read_i32(&mut self) -> Result<i32, ReadError> {
        self.check(4)?;
        let val = LittleEndian::read_i32(&self.data[self.pos..]);
        self.pos += 4;
        Ok(val)
    }

    pub fn read_f32(&mut self) -> Result<f32, ReadError> {
        self.check(4)?;
        let val = LittleEndian::read_f32(&self.data[self.pos..]);
        self.pos += 4;
        Ok(val)
    }

    pub fn read_f64(&mut self) -> Result<f64, ReadError> {
        self.check(8)?;
        let val = LittleEndian::read_f64(&self.data[self.pos..]);
        self.pos += 8;
        Ok(val)
    }

    /// Read exactly `count` bytes as a borrowed slice
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], ReadError> {
        self.check(count)?;
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    /// Read a fixed-length field holding a possibly NUL-padded string.
    /// Content past the first NUL is dropped.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<String, ReadError> {
        let bytes = self.read_bytes(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, ReadError> {
        let x = self.read_f32()?;
        let y = self.read_f32()?;
        let z = self.read_f32()?;
        Ok(Vec3::new(x, y, z))
    }

    /// Read min/max corner pair. No well-formedness check: malformed input
    /// may produce an inverted box and downstream code must tolerate it.
    pub fn read_aabox(&mut self) -> Result<AaBox, ReadError> {
        let min = self.read_vec3()?;
        let max = self.read_vec3()?;
        Ok(AaBox { min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_scalars() {
        let data = [0x2a, 0x01, 0x02, 0xd2, 0x04, 0x00, 0x00];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u8().unwrap(), 0x2a);
        assert_eq!(r.read_u16().unwrap(), 0x0201);
        assert_eq!(r.read_u32().unwrap(), 1234);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_read_f32() {
        let data = 1.5f32.to_le_bytes();
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_f32().unwrap(), 1.5);
    }

    #[test]
    fn test_read_past_end() {
        let data = [1u8, 2];
        let mut r = ByteReader::new(&data);
        r.read_u8().unwrap();
        let err = r.read_u32().unwrap_err();
        assert_eq!(err.offset, 1);
        assert_eq!(err.wanted, 4);
        assert_eq!(err.available, 1);
        // failed read does not advance
        assert_eq!(r.pos(), 1);
    }

    #[test]
    fn test_skip_checked() {
        let data = [0u8; 8];
        let mut r = ByteReader::new(&data);
        r.skip(6).unwrap();
        assert_eq!(r.pos(), 6);
        assert!(r.skip(3).is_err());
        assert_eq!(r.pos(), 6);
        r.skip(2).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn test_fixed_string_nul_strip() {
        let data = *b"Azeroth\0extra321";
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_fixed_string(16).unwrap(), "Azeroth");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_fixed_string_no_nul() {
        let data = *b"Kalimdor";
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_fixed_string(8).unwrap(), "Kalimdor");
    }

    #[test]
    fn test_read_vec3_and_box() {
        let mut data = Vec::new();
        for v in [1.0f32, 2.0, 3.0, -4.0, -5.0, -6.0, 4.0, 5.0, 6.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let mut r = ByteReader::new(&data);
        let v = r.read_vec3().unwrap();
        assert_eq!((v.x, v.y, v.z), (1.0, 2.0, 3.0));
        let b = r.read_aabox().unwrap();
        assert_eq!(b.min.x, -4.0);
        assert_eq!(b.max.z, 6.0);
    }

    #[test]
    fn test_nan_float_is_readable() {
        let data = f32::NAN.to_le_bytes();
        let mut r = ByteReader::new(&data);
        assert!(r.read_f32().unwrap().is_nan());
    }
}
