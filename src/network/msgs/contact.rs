//! Contact (friend / ignore) list messages.

use crate::network::codec::{CodecError, MsgReader, MsgWriter};
use crate::network::message::Message;
use crate::network::msg_type::MsgType;

/// Contact on-line.
pub const CONTACT_CONNECTED: u8 = b'C';
/// Contact off-line.
pub const CONTACT_DISCONNECTED: u8 = b'D';

/// Contact type: friend.
pub const CONTACT_FRIEND: u8 = b'F';
/// Contact type: ignored player.
pub const CONTACT_IGNORE: u8 = b'I';

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgContactStatus {
    pub charname: String,
    pub contact_type: u8,
    pub status: u8,
    pub last_login: String,
    pub comment: String,
}

impl Message for MsgContactStatus {
    const TYPE: MsgType = MsgType::from_tag(b"CtSt");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_str(&self.charname);
        w.write_u8(self.contact_type);
        w.write_u8(self.status);
        w.write_str(&self.last_login);
        w.write_str(&self.comment);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            charname: r.read_str()?,
            contact_type: r.read_u8()?,
            status: r.read_u8()?,
            last_login: r.read_str()?,
            comment: r.read_str()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgContactAdd {
    pub charname: String,
    pub contact_type: u8,
    pub comment: String,
}

impl Message for MsgContactAdd {
    const TYPE: MsgType = MsgType::from_tag(b"CtAd");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_str(&self.charname);
        w.write_u8(self.contact_type);
        w.write_str(&self.comment);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            charname: r.read_str()?,
            contact_type: r.read_u8()?,
            comment: r.read_str()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgContactDel {
    pub charname: String,
}

impl Message for MsgContactDel {
    const TYPE: MsgType = MsgType::from_tag(b"CtDl");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_str(&self.charname);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self { charname: r.read_str()? })
    }
}
