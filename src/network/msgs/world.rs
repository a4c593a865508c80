use crate::network::codec::{CodecError, MsgReader, MsgWriter};
use crate::network::message::Message;
use crate::network::msg_type::MsgType;

/// Game clock update, in minutes since the world started.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgTimeMinute {
    pub gametime: u32,
}

impl Message for MsgTimeMinute {
    const TYPE: MsgType = MsgType::from_tag(b"TmMn");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_u32(self.gametime);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self { gametime: r.read_u32()? })
    }
}

/// Vital statistics of the player's own character.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgPlayerData {
    pub health_max: i16,
    pub health_cur: i16,
    pub magic_max: i16,
    pub magic_cur: i16,
    pub load_max: i16,
    pub load_cur: i16,
    pub stamina: i16,
    pub gold: i32,
    pub level: i32,
    pub ab_con: i16,
    pub ab_str: i16,
    pub ab_dex: i16,
    pub ab_int: i16,
    pub ab_wis: i16,
    pub ab_cha: i16,
}

impl Message for MsgPlayerData {
    const TYPE: MsgType = MsgType::from_tag(b"PlDa");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_i16(self.health_max);
        w.write_i16(self.health_cur);
        w.write_i16(self.magic_max);
        w.write_i16(self.magic_cur);
        w.write_i16(self.load_max);
        w.write_i16(self.load_cur);
        w.write_i16(self.stamina);
        w.write_i32(self.gold);
        w.write_i32(self.level);
        w.write_i16(self.ab_con);
        w.write_i16(self.ab_str);
        w.write_i16(self.ab_dex);
        w.write_i16(self.ab_int);
        w.write_i16(self.ab_wis);
        w.write_i16(self.ab_cha);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            health_max: r.read_i16()?,
            health_cur: r.read_i16()?,
            magic_max: r.read_i16()?,
            magic_cur: r.read_i16()?,
            load_max: r.read_i16()?,
            load_cur: r.read_i16()?,
            stamina: r.read_i16()?,
            gold: r.read_i32()?,
            level: r.read_i32()?,
            ab_con: r.read_i16()?,
            ab_str: r.read_i16()?,
            ab_dex: r.read_i16()?,
            ab_int: r.read_i16()?,
            ab_wis: r.read_i16()?,
            ab_cha: r.read_i16()?,
        })
    }
}
