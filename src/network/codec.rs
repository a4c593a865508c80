//! Field-level encoding of message bodies.
//!
//! All integers are big-endian. Floats travel as their IEEE-754 bit
//! pattern in a `u32`, strings as raw bytes followed by a single NUL.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::msg_type::MsgType;

/// Bytes taken by the frame header: u16 length + u32 type id.
pub const HEADER_SIZE: usize = 6;

/// Largest frame (header included) either side will send or accept.
pub const PACKET_MAX_SIZE: usize = 32768;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("short read: needed {needed} bytes, {available} available")]
    ShortRead { needed: usize, available: usize },

    #[error("string is not NUL-terminated")]
    UnterminatedString,

    #[error("frame too large: {size} bytes (max {PACKET_MAX_SIZE})")]
    TooLarge { size: usize },

    #[error("bad frame header: declared length {declared}, frame holds {actual}")]
    BadHeader { declared: usize, actual: usize },

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: MsgType, got: MsgType },

    #[error("invalid value {value} for field '{field}'")]
    InvalidValue { field: &'static str, value: u64 },
}

/// Position or direction in world space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vector3) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Appends encoded fields to a growable buffer.
#[derive(Debug, Default)]
pub struct MsgWriter {
    buf: BytesMut,
}

impl MsgWriter {
    pub fn new() -> Self {
        Self { buf: BytesMut::with_capacity(64) }
    }

    /// Start a full frame: a length placeholder and the type id.
    /// [`MsgWriter::finish_frame`] patches the length afterwards.
    pub fn with_header(msg_type: MsgType) -> Self {
        let mut w = Self::new();
        w.buf.put_u16(0);
        w.buf.put_u32(msg_type.id());
        w
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.put_i8(v);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(u8::from(v));
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.put_u32(v.to_bits());
    }

    pub fn write_vector3(&mut self, v: &Vector3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    /// Strings are cut at an embedded NUL, the way the peer would read them.
    pub fn write_str(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.buf.put_slice(&bytes[..end]);
        self.buf.put_u8(0);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    /// Patch the length of a frame started with [`MsgWriter::with_header`].
    pub fn finish_frame(mut self) -> Result<Bytes, CodecError> {
        let size = self.buf.len();
        if size > PACKET_MAX_SIZE {
            return Err(CodecError::TooLarge { size });
        }
        // size <= PACKET_MAX_SIZE fits in u16
        self.buf[..2].copy_from_slice(&(size as u16).to_be_bytes());
        Ok(self.buf.freeze())
    }
}

/// Reads encoded fields from a byte slice, front to back.
#[derive(Debug)]
pub struct MsgReader<'a> {
    buf: &'a [u8],
}

impl<'a> MsgReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, needed: usize) -> Result<(), CodecError> {
        if self.buf.remaining() < needed {
            return Err(CodecError::ShortRead { needed, available: self.buf.remaining() });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        self.need(1)?;
        Ok(self.buf.get_i8())
    }

    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_vector3(&mut self) -> Result<Vector3, CodecError> {
        Ok(Vector3 {
            x: self.read_f32()?,
            y: self.read_f32()?,
            z: self.read_f32()?,
        })
    }

    pub fn read_str(&mut self) -> Result<String, CodecError> {
        let nul = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::UnterminatedString)?;
        let s = String::from_utf8_lossy(&self.buf[..nul]).into_owned();
        self.buf.advance(nul + 1);
        Ok(s)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_big_endian() {
        let mut w = MsgWriter::new();
        w.write_u16(0x0102);
        w.write_u32(0x0304_0506);
        w.write_i16(-2);
        assert_eq!(&w.into_bytes()[..], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xff, 0xfe]);
    }

    #[test]
    fn test_float_travels_as_bits() {
        let mut w = MsgWriter::new();
        w.write_f32(1.0);
        assert_eq!(&w.into_bytes()[..], &0x3f80_0000u32.to_be_bytes());
    }

    #[test]
    fn test_string_is_nul_terminated() {
        let mut w = MsgWriter::new();
        w.write_str("ab");
        w.write_str("");
        let bytes = w.into_bytes();
        assert_eq!(&bytes[..], b"ab\0\0");

        let mut r = MsgReader::new(&bytes);
        assert_eq!(r.read_str().unwrap(), "ab");
        assert_eq!(r.read_str().unwrap(), "");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_embedded_nul_truncates() {
        let mut w = MsgWriter::new();
        w.write_str("ab\0cd");
        assert_eq!(&w.into_bytes()[..], b"ab\0");
    }

    #[test]
    fn test_unterminated_string() {
        let mut r = MsgReader::new(b"abc");
        assert!(matches!(r.read_str(), Err(CodecError::UnterminatedString)));
    }

    #[test]
    fn test_short_read_reports_sizes() {
        let mut r = MsgReader::new(&[0x00, 0x01]);
        match r.read_u32() {
            Err(CodecError::ShortRead { needed, available }) => {
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_frame_header_is_patched() {
        let mut w = MsgWriter::with_header(MsgType::from_tag(b"Test"));
        w.write_u8(7);
        let frame = w.finish_frame().unwrap();
        assert_eq!(&frame[..], &[0x00, 0x07, b'T', b'e', b's', b't', 7]);
    }

    #[test]
    fn test_frame_too_large() {
        let mut w = MsgWriter::with_header(MsgType::from_tag(b"Test"));
        w.write_bytes(&vec![0u8; PACKET_MAX_SIZE]);
        assert!(matches!(w.finish_frame(), Err(CodecError::TooLarge { .. })));
    }

    #[test]
    fn test_vector_distance() {
        let a = Vector3::new(0.0, 0.0, 0.0);
        let b = Vector3::new(3.0, 4.0, 0.0);
        assert!((a.distance(&b) - 5.0).abs() < f32::EPSILON);
    }
}
