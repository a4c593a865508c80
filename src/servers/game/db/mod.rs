//! Persistence for accounts, characters, contacts and the world clock.
//!
//! [`GameStore`] is implemented by [`MemoryStore`] (tests, or no database
//! configured) and [`MySqlStore`].

pub mod memory;
pub mod mysql;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::network::msgs::CharacterSummary;
use crate::network::Vector3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Role value of ordinary player accounts.
pub const ROLE_PLAYER: i32 = 1;
/// Role value of administrator accounts.
pub const ROLE_ADMIN: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub uid: u64,
    pub username: String,
    pub password: String,
    pub roles: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub email: String,
    pub realname: String,
    pub roles: i32,
}

/// Persistent vitals and abilities of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacterStats {
    pub health: i16,
    pub magic: i16,
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

#[derive(Debug, Clone, PartialEq)]
pub struct NewCharacter {
    pub uid: u64,
    pub name: String,
    pub race: String,
    pub gender: String,
    pub player_class: String,
    pub area: String,
    pub position: Vector3,
    pub rot: f32,
    pub stats: CharacterStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterRecord {
    pub cid: u64,
    pub uid: u64,
    pub name: String,
    pub race: String,
    pub gender: String,
    pub player_class: String,
    pub area: String,
    pub position: Vector3,
    pub rot: f32,
    /// Roles of the owning account.
    pub roles: i32,
    pub stats: CharacterStats,
}

/// What is written back when a player leaves the world.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterSave {
    pub cid: u64,
    pub area: String,
    pub position: Vector3,
    pub rot: f32,
    pub health: i16,
    pub magic: i16,
    pub stamina: i16,
    pub gold: i32,
    pub played_secs: u64,
}

/// Minimal view of a character, used to resolve contact names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterBrief {
    pub cid: u64,
    pub name: String,
    pub last_login: String,
}

/// One row of a contact list: `owner_cid` lists `contact_cid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactLink {
    pub owner_cid: u64,
    pub owner_name: String,
    pub contact_cid: u64,
    pub contact_name: String,
    pub contact_type: u8,
    pub comment: String,
    /// Last login of the listed contact.
    pub last_login: String,
}

/// Storage used by the game server. Character lookups by name ignore
/// deleted characters unless stated otherwise.
pub trait GameStore: Send + Sync {
    fn count_accounts(&self) -> BoxFuture<'_, StoreResult<u64>>;

    /// Characters not deleted.
    fn count_characters(&self) -> BoxFuture<'_, StoreResult<u64>>;

    fn find_account<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<AccountRecord>>>;

    fn create_account<'a>(&'a self, account: &'a NewAccount) -> BoxFuture<'a, StoreResult<u64>>;

    /// Stamp last login time and address, bump the login counter.
    fn record_login<'a>(&'a self, uid: u64, ip: &'a str) -> BoxFuture<'a, StoreResult<()>>;

    fn list_characters(&self, uid: u64) -> BoxFuture<'_, StoreResult<Vec<CharacterSummary>>>;

    /// True for any character with this name, deleted ones included.
    fn character_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<bool>>;

    fn count_active_characters(&self, uid: u64) -> BoxFuture<'_, StoreResult<u64>>;

    fn create_character<'a>(&'a self, c: &'a NewCharacter) -> BoxFuture<'a, StoreResult<u64>>;

    /// Mark the account's character deleted. False when it owns no such
    /// active character.
    fn delete_character<'a>(&'a self, uid: u64, name: &'a str) -> BoxFuture<'a, StoreResult<bool>>;

    fn load_character<'a>(
        &'a self,
        uid: u64,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<CharacterRecord>>>;

    fn touch_character_login(&self, cid: u64) -> BoxFuture<'_, StoreResult<()>>;

    fn save_character<'a>(&'a self, save: &'a CharacterSave) -> BoxFuture<'a, StoreResult<()>>;

    fn find_character<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<CharacterBrief>>>;

    /// True when `owner` lists a character by this name, deleted or not.
    fn has_contact<'a>(
        &'a self,
        owner: u64,
        contact_name: &'a str,
    ) -> BoxFuture<'a, StoreResult<bool>>;

    fn add_contact<'a>(
        &'a self,
        owner: u64,
        contact: u64,
        contact_type: u8,
        comment: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>>;

    fn remove_contact(&self, owner: u64, contact: u64) -> BoxFuture<'_, StoreResult<bool>>;

    /// Contacts listed by `owner`, ordered by contact name.
    fn contacts_of(&self, owner: u64) -> BoxFuture<'_, StoreResult<Vec<ContactLink>>>;

    /// Entries of other characters listing `contact`.
    fn watchers_of(&self, contact: u64) -> BoxFuture<'_, StoreResult<Vec<ContactLink>>>;

    fn load_game_time(&self) -> BoxFuture<'_, StoreResult<Option<u32>>>;

    fn save_game_time(&self, minutes: u32) -> BoxFuture<'_, StoreResult<()>>;
}

/// Current local time in the format used for login stamps.
pub fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
