//! Connection, account and character selection messages.

use crate::network::codec::{CodecError, MsgReader, MsgWriter};
use crate::network::message::Message;
use crate::network::msg_type::MsgType;

use super::ResultCode;

/// First message a client sends after the TCP connection is up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgConnect;

impl Message for MsgConnect {
    const TYPE: MsgType = MsgType::from_tag(b"Conn");

    fn serialize_data(&self, _w: &mut MsgWriter) {}

    fn deserialize_data(_r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(MsgConnect)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgConnectReply {
    pub result: ResultCode,
    pub protocol_version: String,
    pub uptime: String,
    pub total_users: u32,
    pub total_chars: u32,
    pub current_players: u32,
}

impl Message for MsgConnectReply {
    const TYPE: MsgType = MsgType::from_tag(b"ConR");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_u32(self.result.0);
        w.write_str(&self.protocol_version);
        w.write_str(&self.uptime);
        w.write_u32(self.total_users);
        w.write_u32(self.total_chars);
        w.write_u32(self.current_players);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            result: ResultCode(r.read_u32()?),
            protocol_version: r.read_str()?,
            uptime: r.read_str()?,
            total_users: r.read_u32()?,
            total_chars: r.read_u32()?,
            current_players: r.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgLogin {
    pub username: String,
    pub pw_md5sum: String,
}

impl Message for MsgLogin {
    const TYPE: MsgType = MsgType::from_tag(b"Logi");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_str(&self.username);
        w.write_str(&self.pw_md5sum);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self { username: r.read_str()?, pw_md5sum: r.read_str()? })
    }
}

/// One entry of the character list sent after a successful login.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharacterSummary {
    pub name: String,
    pub race: String,
    pub gender: String,
    pub player_class: String,
    pub area: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgLoginReply {
    pub result: ResultCode,
    pub characters: Vec<CharacterSummary>,
}

impl Message for MsgLoginReply {
    const TYPE: MsgType = MsgType::from_tag(b"LogR");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_u32(self.result.0);
        w.write_u32(self.characters.len() as u32);
        for c in &self.characters {
            w.write_str(&c.name);
            w.write_str(&c.race);
            w.write_str(&c.gender);
            w.write_str(&c.player_class);
            w.write_str(&c.area);
        }
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        let result = ResultCode(r.read_u32()?);
        let count = r.read_u32()? as usize;
        // every entry takes at least 5 NUL bytes
        if count > r.remaining() / 5 {
            return Err(CodecError::InvalidValue { field: "charNumber", value: count as u64 });
        }
        let mut characters = Vec::with_capacity(count);
        for _ in 0..count {
            characters.push(CharacterSummary {
                name: r.read_str()?,
                race: r.read_str()?,
                gender: r.read_str()?,
                player_class: r.read_str()?,
                area: r.read_str()?,
            });
        }
        Ok(Self { result, characters })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgNewUser {
    pub username: String,
    pub pw_md5sum: String,
    pub email: String,
    pub realname: String,
}

impl Message for MsgNewUser {
    const TYPE: MsgType = MsgType::from_tag(b"NUsr");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_str(&self.username);
        w.write_str(&self.pw_md5sum);
        w.write_str(&self.email);
        w.write_str(&self.realname);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            username: r.read_str()?,
            pw_md5sum: r.read_str()?,
            email: r.read_str()?,
            realname: r.read_str()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgNewUserReply {
    pub result: ResultCode,
}

impl Message for MsgNewUserReply {
    const TYPE: MsgType = MsgType::from_tag(b"NUsR");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_u32(self.result.0);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self { result: ResultCode(r.read_u32()?) })
    }
}

/// Character creation request. Abilities are the points the player
/// distributed before racial adjustments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgNewChar {
    pub charname: String,
    pub race: String,
    pub gender: String,
    pub player_class: String,
    pub ab_con: u8,
    pub ab_str: u8,
    pub ab_dex: u8,
    pub ab_int: u8,
    pub ab_wis: u8,
    pub ab_cha: u8,
}

impl Message for MsgNewChar {
    const TYPE: MsgType = MsgType::from_tag(b"NCha");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_str(&self.charname);
        w.write_str(&self.race);
        w.write_str(&self.gender);
        w.write_str(&self.player_class);
        w.write_u8(self.ab_con);
        w.write_u8(self.ab_str);
        w.write_u8(self.ab_dex);
        w.write_u8(self.ab_int);
        w.write_u8(self.ab_wis);
        w.write_u8(self.ab_cha);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            charname: r.read_str()?,
            race: r.read_str()?,
            gender: r.read_str()?,
            player_class: r.read_str()?,
            ab_con: r.read_u8()?,
            ab_str: r.read_u8()?,
            ab_dex: r.read_u8()?,
            ab_int: r.read_u8()?,
            ab_wis: r.read_u8()?,
            ab_cha: r.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgNewCharReply {
    pub result: ResultCode,
    pub charname: String,
    pub race: String,
    pub gender: String,
    pub player_class: String,
    pub area: String,
}

impl Message for MsgNewCharReply {
    const TYPE: MsgType = MsgType::from_tag(b"NChR");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_u32(self.result.0);
        w.write_str(&self.charname);
        w.write_str(&self.race);
        w.write_str(&self.gender);
        w.write_str(&self.player_class);
        w.write_str(&self.area);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            result: ResultCode(r.read_u32()?),
            charname: r.read_str()?,
            race: r.read_str()?,
            gender: r.read_str()?,
            player_class: r.read_str()?,
            area: r.read_str()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgDelChar {
    pub charname: String,
}

impl Message for MsgDelChar {
    const TYPE: MsgType = MsgType::from_tag(b"DCha");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_str(&self.charname);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self { charname: r.read_str()? })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgDelCharReply {
    pub result: ResultCode,
    pub charname: String,
}

impl Message for MsgDelCharReply {
    const TYPE: MsgType = MsgType::from_tag(b"DChR");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_u32(self.result.0);
        w.write_str(&self.charname);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self { result: ResultCode(r.read_u32()?), charname: r.read_str()? })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgJoin {
    pub charname: String,
}

impl Message for MsgJoin {
    const TYPE: MsgType = MsgType::from_tag(b"Join");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_str(&self.charname);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self { charname: r.read_str()? })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgJoinReply {
    pub result: ResultCode,
}

impl Message for MsgJoinReply {
    const TYPE: MsgType = MsgType::from_tag(b"JoiR");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_u32(self.result.0);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self { result: ResultCode(r.read_u32()?) })
    }
}
