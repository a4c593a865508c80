//! Message catalogue shared by the server and its clients.

pub mod chat;
pub mod contact;
pub mod entity;
pub mod login;
pub mod probe;
pub mod world;

pub use chat::{ChatType, MsgChat, MsgCommand};
pub use contact::{MsgContactAdd, MsgContactDel, MsgContactStatus};
pub use entity::{MsgEntityCreate, MsgEntityDestroy, MsgEntityMove};
pub use login::{
    CharacterSummary, MsgConnect, MsgConnectReply, MsgDelChar, MsgDelCharReply, MsgJoin,
    MsgJoinReply, MsgLogin, MsgLoginReply, MsgNewChar, MsgNewCharReply, MsgNewUser,
    MsgNewUserReply,
};
pub use probe::MsgTestDataTypes;
pub use world::{MsgPlayerData, MsgTimeMinute};

use std::fmt;

/// Outcome of a request, `u32` on the wire.
///
/// Codes outside the known set are kept as-is so that replies from newer
/// peers still decode.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResultCode(pub u32);

impl ResultCode {
    pub const SUCCESS: ResultCode = ResultCode(0);
    pub const EBADLOGIN: ResultCode = ResultCode(1);
    pub const EALREADYLOGGED: ResultCode = ResultCode(2);
    pub const EDATABASE: ResultCode = ResultCode(3);
    pub const ECHARCORRUPT: ResultCode = ResultCode(4);
    pub const EUSERALREADYEXIST: ResultCode = ResultCode(5);
    pub const ECHARALREADYEXIST: ResultCode = ResultCode(6);
    pub const EMAXCHARS: ResultCode = ResultCode(7);
    pub const ENEWCHARBADDATA: ResultCode = ResultCode(8);
    pub const ENOSUCHCHAR: ResultCode = ResultCode(9);
    pub const ECREATEFAILED: ResultCode = ResultCode(10);
    pub const EALREADYPLAYING: ResultCode = ResultCode(11);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::SUCCESS => "Success",
            Self::EBADLOGIN => "Wrong login/password",
            Self::EALREADYLOGGED => "Already logged",
            Self::EDATABASE => "Database error (Internal server error)",
            Self::ECHARCORRUPT => "Characters corrupted (Internal server error)",
            Self::EUSERALREADYEXIST => "Username already exists",
            Self::ECHARALREADYEXIST => "Character name already exists",
            Self::EMAXCHARS => "Max number of characters per account reached",
            Self::ENEWCHARBADDATA => "Bad data for new character (race, gender, class, points...)",
            Self::ENOSUCHCHAR => "No such character",
            Self::ECREATEFAILED => "Couldn't create player in the world (Internal server error)",
            Self::EALREADYPLAYING => "Already playing",
            _ => "Unknown error code",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl fmt::Debug for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResultCode({}: {})", self.0, self.description())
    }
}
