//! The contract every wire message implements.

use bytes::Bytes;

use super::codec::{CodecError, MsgReader, MsgWriter, HEADER_SIZE};
use super::msg_type::MsgType;

/// A message that can travel in a frame.
///
/// `deserialize_data` must read the fields in exactly the order
/// `serialize_data` wrote them.
pub trait Message: Sized + Send + std::fmt::Debug + 'static {
    const TYPE: MsgType;

    fn serialize_data(&self, w: &mut MsgWriter);

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError>;

    /// Build the whole frame, header included.
    fn encode(&self) -> Result<Bytes, CodecError> {
        let mut w = MsgWriter::with_header(Self::TYPE);
        self.serialize_data(&mut w);
        w.finish_frame()
    }

    /// Parse a whole frame. Unread trailing bytes are logged, not fatal.
    fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let (length, msg_type) = peek_header(frame).ok_or(CodecError::ShortRead {
            needed: HEADER_SIZE,
            available: frame.len(),
        })?;
        if length != frame.len() {
            return Err(CodecError::BadHeader { declared: length, actual: frame.len() });
        }
        if msg_type != Self::TYPE {
            return Err(CodecError::TypeMismatch { expected: Self::TYPE, got: msg_type });
        }

        let mut r = MsgReader::new(&frame[HEADER_SIZE..]);
        let msg = Self::deserialize_data(&mut r)?;
        if r.remaining() > 0 {
            tracing::error!(
                "[net] [decode_leftover] type={} leftover={} length={}",
                Self::TYPE,
                r.remaining(),
                length
            );
        }
        Ok(msg)
    }
}

/// Read the frame length and type from the start of `buf`.
pub fn peek_header(buf: &[u8]) -> Option<(usize, MsgType)> {
    if buf.len() < HEADER_SIZE {
        return None;
    }
    let length = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    let id = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
    Some((length, MsgType::from_id(id)))
}
