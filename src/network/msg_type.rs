//! Message type identifiers.
//!
//! Every message kind is identified on the wire by four ASCII characters
//! packed big-endian into a `u32` (`"Logi"` -> `0x4C6F6769`).

use std::fmt;

/// Wire identifier of a message kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MsgType(u32);

impl MsgType {
    /// Build the type from its 4-character tag.
    pub const fn from_tag(tag: &[u8; 4]) -> Self {
        MsgType(u32::from_be_bytes(*tag))
    }

    pub const fn from_id(id: u32) -> Self {
        MsgType(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }

    pub const fn tag(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// The 4-character tag as text. Non-printable bytes are shown as `?`.
    pub fn name(self) -> String {
        self.tag()
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
            .collect()
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl fmt::Debug for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MsgType({} {:#010x})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_packing_is_big_endian() {
        let t = MsgType::from_tag(b"Logi");
        assert_eq!(t.id(), 0x4C6F_6769);
        assert_eq!(t.tag(), *b"Logi");
        assert_eq!(t.name(), "Logi");
    }

    #[test]
    fn test_from_id_matches_tag() {
        assert_eq!(MsgType::from_id(0x436F_6E6E), MsgType::from_tag(b"Conn"));
    }

    #[test]
    fn test_non_printable_name() {
        let t = MsgType::from_id(0x0000_4142);
        assert_eq!(t.name(), "??AB");
        assert_eq!(format!("{}", t), "??AB");
    }
}
