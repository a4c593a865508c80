//! Entity lifecycle and movement messages.

use crate::network::codec::{CodecError, MsgReader, MsgWriter, Vector3};
use crate::network::message::Message;
use crate::network::msg_type::MsgType;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgEntityCreate {
    pub entity_id: u64,
    pub entity_name: String,
    pub entity_class: String,
    pub mesh_type: String,
    pub mesh_subtype: String,
    pub area: String,
    pub position: Vector3,
    pub rot: f32,
}

impl Message for MsgEntityCreate {
    const TYPE: MsgType = MsgType::from_tag(b"EnCr");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_u64(self.entity_id);
        w.write_str(&self.entity_name);
        w.write_str(&self.entity_class);
        w.write_str(&self.mesh_type);
        w.write_str(&self.mesh_subtype);
        w.write_str(&self.area);
        w.write_vector3(&self.position);
        w.write_f32(self.rot);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            entity_id: r.read_u64()?,
            entity_name: r.read_str()?,
            entity_class: r.read_str()?,
            mesh_type: r.read_str()?,
            mesh_subtype: r.read_str()?,
            area: r.read_str()?,
            position: r.read_vector3()?,
            rot: r.read_f32()?,
        })
    }
}

/// Movement state of an entity: where it is and which keys are held.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgEntityMove {
    pub entity_id: u64,
    pub area: String,
    pub position: Vector3,
    pub direction: Vector3,
    pub direction_speed: f32,
    pub rot: f32,
    pub rot_speed: f32,
    pub mov_fwd: bool,
    pub mov_bwd: bool,
    pub run: bool,
    pub rot_left: bool,
    pub rot_right: bool,
}

impl Message for MsgEntityMove {
    const TYPE: MsgType = MsgType::from_tag(b"EnMv");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_u64(self.entity_id);
        w.write_str(&self.area);
        w.write_vector3(&self.position);
        w.write_vector3(&self.direction);
        w.write_f32(self.direction_speed);
        w.write_f32(self.rot);
        w.write_f32(self.rot_speed);
        w.write_bool(self.mov_fwd);
        w.write_bool(self.mov_bwd);
        w.write_bool(self.run);
        w.write_bool(self.rot_left);
        w.write_bool(self.rot_right);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            entity_id: r.read_u64()?,
            area: r.read_str()?,
            position: r.read_vector3()?,
            direction: r.read_vector3()?,
            direction_speed: r.read_f32()?,
            rot: r.read_f32()?,
            rot_speed: r.read_f32()?,
            mov_fwd: r.read_bool()?,
            mov_bwd: r.read_bool()?,
            run: r.read_bool()?,
            rot_left: r.read_bool()?,
            rot_right: r.read_bool()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MsgEntityDestroy {
    pub entity_id: u64,
}

impl Message for MsgEntityDestroy {
    const TYPE: MsgType = MsgType::from_tag(b"EnDt");

    fn serialize_data(&self, w: &mut MsgWriter) {
        w.write_u64(self.entity_id);
    }

    fn deserialize_data(r: &mut MsgReader<'_>) -> Result<Self, CodecError> {
        Ok(Self { entity_id: r.read_u64()? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_flags_trail_the_floats() {
        let msg = MsgEntityMove {
            entity_id: 42,
            area: "a".into(),
            position: Vector3::new(1.0, 2.0, 3.0),
            mov_fwd: true,
            rot_right: true,
            ..Default::default()
        };
        let frame = msg.encode().unwrap();
        // header + id + "a\0" + 6 floats + 3 floats
        assert_eq!(frame.len(), 6 + 8 + 2 + 24 + 12 + 5);
        assert_eq!(&frame[frame.len() - 5..], &[1, 0, 0, 0, 1]);
        assert_eq!(MsgEntityMove::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn test_create_position_encoding() {
        let msg = MsgEntityCreate {
            entity_id: 1,
            position: Vector3::new(0.5, -1.0, 2.0),
            rot: 3.25,
            ..Default::default()
        };
        let back = MsgEntityCreate::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(back.position, msg.position);
        assert_eq!(back.rot, 3.25);
    }
}
