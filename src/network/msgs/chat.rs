use crate::network::codec::{CodecError, MsgReader, MsgWriter};
use crate::network::message::Message;
use crate::network::msg_type::MsgType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ChatType {
    #[default]
    System = 1,
    Action = 2,
    Chat = 3,
    Pm = 4,
}

impl ChatType {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(ChatType::System),
            2 => Some(ChatType::Action),
            3 => Some(ChatType::Chat),
            4 => Some(ChatType::Pm),
            _ => None,
        }
    }
}

/// Chat line. An empty `target` means "say to the players around".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgChat {
    pub origin: String,
    pub target: String,
    pub text: String,
    pub chat_type: ChatType,
}

impl MsgChat {
    /// A system line from the server.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            origin: "Server".to_string(),
            target: String::new(),
            text: text.into(),
            chat_type: ChatType::System,
        }
    }
}

impl Message for MsgChat {
    const TYPE: MsgType = MsgType::from_tag(b"Chat");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_str(&self.origin);
        w.write_str(&self.target);
        w.write_str(&self.text);
        w.write_u32(self.chat_type as u32);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        let origin = r.read_str()?;
        let target = r.read_str()?;
        let text = r.read_str()?;
        let raw = r.read_u32()?;
        let chat_type = ChatType::from_u32(raw)
            .ok_or(CodecError::InvalidValue { field: "type", value: u64::from(raw) })?;
        Ok(Self { origin, target, text, chat_type })
    }
}

/// Console command line typed by a player, without the leading slash.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgCommand {
    pub command: String,
}

impl Message for MsgCommand {
    const TYPE: MsgType = MsgType::from_tag(b"Cmmd");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_str(&self.command);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self { command: r.read_str()? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_type_on_wire() {
        let msg = MsgChat {
            origin: "a".into(),
            target: String::new(),
            text: "hi".into(),
            chat_type: ChatType::Pm,
        };
        let frame = msg.encode().unwrap();
        assert_eq!(&frame[frame.len() - 4..], &[0, 0, 0, 4]);
        assert_eq!(MsgChat::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn test_unknown_chat_type_rejected() {
        let mut w = MsgWriter::with_header(MsgChat::TYPE);
        w.write_str("a");
        w.write_str("");
        w.write_str("hi");
        w.write_u32(77);
        let frame = w.finish_frame().unwrap();
        assert!(matches!(
            MsgChat::decode(&frame),
            Err(CodecError::InvalidValue { field: "type", value: 77 })
        ));
    }

    #[test]
    fn test_system_line() {
        let msg = MsgChat::system("hello");
        assert_eq!(msg.origin, "Server");
        assert_eq!(msg.chat_type, ChatType::System);
    }
}
