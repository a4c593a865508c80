//! Test message carrying one field of every encodable type.
//!
//! Both ends can send it to check that their encodings agree.

use crate::network::codec::{CodecError, MsgReader, MsgWriter};
use crate::network::message::Message;
use crate::network::msg_type::MsgType;

#[derive(Debug, Clone, PartialEq)]
pub struct MsgTestDataTypes {
    pub str1: String,
    pub u64: [u64; 3],
    pub u32: [u32; 3],
    pub u16: [u16; 3],
    pub u8: [u8; 3],
    pub str2: String,
    pub s32: [i32; 3],
    pub s16: [i16; 3],
    pub s8: [i8; 3],
    pub str3: String,
    pub c: u8,
    pub b: bool,
    pub f: [f32; 3],
    pub str4: String,
}

impl Default for MsgTestDataTypes {
    /// The fixed probe values.
    fn default() -> Self {
        Self {
            str1: "String 1".to_string(),
            u64: [u64::MAX, 0, 1_234_567_890_123_456_789],
            u32: [u32::MAX, 0, 1_234_567_890],
            u16: [u16::MAX, 0, 12345],
            u8: [u8::MAX, 0, 123],
            str2: "String 2".to_string(),
            s32: [-123_456_789, 0, 123_456_789],
            s16: [-12345, 0, 12345],
            s8: [-123, 0, 123],
            str3: "String 3".to_string(),
            c: b'c',
            b: true,
            f: [-123_456.78, 0.0, 123_456.78],
            str4: "String 4".to_string(),
        }
    }
}

impl Message for MsgTestDataTypes {
    const TYPE: MsgType = MsgType::from_tag(b"Test");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_str(&self.str1);
        self.u64.iter().for_each(|&v| w.write_u64(v));
        self.u32.iter().for_each(|&v| w.write_u32(v));
        self.u16.iter().for_each(|&v| w.write_u16(v));
        self.u8.iter().for_each(|&v| w.write_u8(v));
        w.write_str(&self.str2);
        self.s32.iter().for_each(|&v| w.write_i32(v));
        self.s16.iter().for_each(|&v| w.write_i16(v));
        self.s8.iter().for_each(|&v| w.write_i8(v));
        w.write_str(&self.str3);
        w.write_u8(self.c);
        w.write_bool(self.b);
        self.f.iter().for_each(|&v| w.write_f32(v));
        w.write_str(&self.str4);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            str1: r.read_str()?,
            u64: [r.read_u64()?, r.read_u64()?, r.read_u64()?],
            u32: [r.read_u32()?, r.read_u32()?, r.read_u32()?],
            u16: [r.read_u16()?, r.read_u16()?, r.read_u16()?],
            u8: [r.read_u8()?, r.read_u8()?, r.read_u8()?],
            str2: r.read_str()?,
            s32: [r.read_i32()?, r.read_i32()?, r.read_i32()?],
            s16: [r.read_i16()?, r.read_i16()?, r.read_i16()?],
            s8: [r.read_i8()?, r.read_i8()?, r.read_i8()?],
            str3: r.read_str()?,
            c: r.read_u8()?,
            b: r.read_bool()?,
            f: [r.read_f32()?, r.read_f32()?, r.read_f32()?],
            str4: r.read_str()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_values_survive_the_wire() {
        let msg = MsgTestDataTypes::default();
        let back = MsgTestDataTypes::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.s8[0], -123);
        assert_eq!(back.f[0].to_bits(), (-123_456.78f32).to_bits());
    }

    #[test]
    fn test_probe_frame_length() {
        let frame = MsgTestDataTypes::default().encode().unwrap();
        let strings = 4 * ("String 1".len() + 1);
        let numbers = 3 * (8 + 4 + 2 + 1 + 4 + 2 + 1 + 4) + 2;
        assert_eq!(frame.len(), 6 + strings + numbers);
    }
}
