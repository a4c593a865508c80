//! Wire protocol and connection plumbing shared by the server and clients.
//!
//! Frames are `[u16 BE length][u32 BE type][body]`, the length counting the
//! 6-byte header. Bodies are encoded by [`codec`], typed by
//! [`message::Message`], routed by [`factory::MsgHdlFactory`] and queued per
//! connection by [`netlink::Netlink`].

pub mod codec;
pub mod factory;
pub mod message;
pub mod msg_type;
pub mod msgs;
pub mod netlink;
pub mod ping;
pub mod socket;

pub use codec::{CodecError, Vector3, HEADER_SIZE, PACKET_MAX_SIZE};
pub use factory::{FactoryError, MsgHdlFactory};
pub use message::Message;
pub use msg_type::MsgType;
pub use netlink::{LinkEnd, NetError, Netlink};
