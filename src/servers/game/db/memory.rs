//! In-process store. Nothing survives a restart.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Mutex;

use super::{
    now_stamp, AccountRecord, CharacterBrief, CharacterRecord, CharacterSave, CharacterStats,
    ContactLink, GameStore, NewAccount, NewCharacter, StoreError, StoreResult,
};
use crate::network::msgs::CharacterSummary;
use crate::network::Vector3;

#[derive(Debug, Clone)]
struct Account {
    uid: u64,
    username: String,
    password: String,
    roles: i32,
    last_login: String,
    last_login_ip: String,
    number_logins: u32,
}

#[derive(Debug, Clone)]
struct Character {
    cid: u64,
    uid: u64,
    name: String,
    race: String,
    gender: String,
    player_class: String,
    area: String,
    position: Vector3,
    rot: f32,
    deleted: bool,
    last_login: String,
    number_logins: u32,
    time_playing: u64,
    stats: CharacterStats,
}

#[derive(Debug, Clone)]
struct Contact {
    owner: u64,
    contact: u64,
    contact_type: u8,
    comment: String,
}

#[derive(Debug, Default)]
struct Tables {
    accounts: Vec<Account>,
    characters: Vec<Character>,
    contacts: Vec<Contact>,
    game_time: Option<u32>,
    next_uid: u64,
    next_cid: u64,
}

impl Tables {
    fn character(&self, cid: u64) -> Option<&Character> {
        self.characters.iter().find(|c| c.cid == cid)
    }

    fn link(&self, c: &Contact) -> Option<ContactLink> {
        let owner = self.character(c.owner)?;
        let contact = self.character(c.contact)?;
        Some(ContactLink {
            owner_cid: owner.cid,
            owner_name: owner.name.clone(),
            contact_cid: contact.cid,
            contact_name: contact.name.clone(),
            contact_type: c.contact_type,
            comment: c.comment.clone(),
            last_login: contact.last_login.clone(),
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing: AtomicBool,
    yielding: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail, to exercise database error paths.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Suspend once inside account lookups, as a database round trip would.
    pub fn set_yielding(&self, yielding: bool) {
        self.yielding.store(yielding, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable { reason: "store set to fail".to_string() });
        }
        Ok(())
    }

    /// Seconds played by a character so far.
    pub async fn time_playing(&self, cid: u64) -> Option<u64> {
        self.tables.lock().await.character(cid).map(|c| c.time_playing)
    }

    /// Login counter of an account.
    pub async fn number_logins(&self, username: &str) -> Option<u32> {
        let t = self.tables.lock().await;
        t.accounts.iter().find(|a| a.username == username).map(|a| a.number_logins)
    }
}

impl GameStore for MemoryStore {
    fn count_accounts(&self) -> BoxFuture<'_, StoreResult<u64>> {
        async move {
            self.check()?;
            Ok(self.tables.lock().await.accounts.len() as u64)
        }
        .boxed()
    }

    fn count_characters(&self) -> BoxFuture<'_, StoreResult<u64>> {
        async move {
            self.check()?;
            let t = self.tables.lock().await;
            Ok(t.characters.iter().filter(|c| !c.deleted).count() as u64)
        }
        .boxed()
    }

    fn find_account<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<AccountRecord>>> {
        async move {
            self.check()?;
            if self.yielding.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
            let t = self.tables.lock().await;
            Ok(t.accounts.iter().find(|a| a.username == username).map(|a| AccountRecord {
                uid: a.uid,
                username: a.username.clone(),
                password: a.password.clone(),
                roles: a.roles,
            }))
        }
        .boxed()
    }

    fn create_account<'a>(&'a self, account: &'a NewAccount) -> BoxFuture<'a, StoreResult<u64>> {
        async move {
            self.check()?;
            let mut t = self.tables.lock().await;
            t.next_uid += 1;
            let uid = t.next_uid;
            t.accounts.push(Account {
                uid,
                username: account.username.clone(),
                password: account.password.clone(),
                roles: account.roles,
                last_login: String::new(),
                last_login_ip: String::new(),
                number_logins: 0,
            });
            Ok(uid)
        }
        .boxed()
    }

    fn record_login<'a>(&'a self, uid: u64, ip: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        async move {
            self.check()?;
            let mut t = self.tables.lock().await;
            if let Some(a) = t.accounts.iter_mut().find(|a| a.uid == uid) {
                a.last_login = now_stamp();
                a.last_login_ip = ip.to_string();
                a.number_logins += 1;
            }
            Ok(())
        }
        .boxed()
    }

    fn list_characters(&self, uid: u64) -> BoxFuture<'_, StoreResult<Vec<CharacterSummary>>> {
        async move {
            self.check()?;
            let t = self.tables.lock().await;
            Ok(t.characters
                .iter()
                .filter(|c| c.uid == uid && !c.deleted)
                .map(|c| CharacterSummary {
                    name: c.name.clone(),
                    race: c.race.clone(),
                    gender: c.gender.clone(),
                    player_class: c.player_class.clone(),
                    area: c.area.clone(),
                })
                .collect())
        }
        .boxed()
    }

    fn character_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<bool>> {
        async move {
            self.check()?;
            Ok(self.tables.lock().await.characters.iter().any(|c| c.name == name))
        }
        .boxed()
    }

    fn count_active_characters(&self, uid: u64) -> BoxFuture<'_, StoreResult<u64>> {
        async move {
            self.check()?;
            let t = self.tables.lock().await;
            Ok(t.characters.iter().filter(|c| c.uid == uid && !c.deleted).count() as u64)
        }
        .boxed()
    }

    fn create_character<'a>(&'a self, c: &'a NewCharacter) -> BoxFuture<'a, StoreResult<u64>> {
        async move {
            self.check()?;
            let mut t = self.tables.lock().await;
            t.next_cid += 1;
            let cid = t.next_cid;
            t.characters.push(Character {
                cid,
                uid: c.uid,
                name: c.name.clone(),
                race: c.race.clone(),
                gender: c.gender.clone(),
                player_class: c.player_class.clone(),
                area: c.area.clone(),
                position: c.position,
                rot: c.rot,
                deleted: false,
                last_login: String::new(),
                number_logins: 0,
                time_playing: 0,
                stats: c.stats,
            });
            Ok(cid)
        }
        .boxed()
    }

    fn delete_character<'a>(&'a self, uid: u64, name: &'a str) -> BoxFuture<'a, StoreResult<bool>> {
        async move {
            self.check()?;
            let mut t = self.tables.lock().await;
            match t.characters.iter_mut().find(|c| c.uid == uid && c.name == name && !c.deleted) {
                Some(c) => {
                    c.deleted = true;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        .boxed()
    }

    fn load_character<'a>(
        &'a self,
        uid: u64,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<CharacterRecord>>> {
        async move {
            self.check()?;
            let t = self.tables.lock().await;
            let Some(c) = t.characters.iter().find(|c| c.uid == uid && c.name == name && !c.deleted)
            else {
                return Ok(None);
            };
            let roles = t.accounts.iter().find(|a| a.uid == uid).map(|a| a.roles).unwrap_or(0);
            Ok(Some(CharacterRecord {
                cid: c.cid,
                uid: c.uid,
                name: c.name.clone(),
                race: c.race.clone(),
                gender: c.gender.clone(),
                player_class: c.player_class.clone(),
                area: c.area.clone(),
                position: c.position,
                rot: c.rot,
                roles,
                stats: c.stats,
            }))
        }
        .boxed()
    }

    fn touch_character_login(&self, cid: u64) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            self.check()?;
            let mut t = self.tables.lock().await;
            if let Some(c) = t.characters.iter_mut().find(|c| c.cid == cid) {
                c.last_login = now_stamp();
                c.number_logins += 1;
            }
            Ok(())
        }
        .boxed()
    }

    fn save_character<'a>(&'a self, save: &'a CharacterSave) -> BoxFuture<'a, StoreResult<()>> {
        async move {
            self.check()?;
            let mut t = self.tables.lock().await;
            if let Some(c) = t.characters.iter_mut().find(|c| c.cid == save.cid) {
                c.area = save.area.clone();
                c.position = save.position;
                c.rot = save.rot;
                c.stats.health = save.health;
                c.stats.magic = save.magic;
                c.stats.stamina = save.stamina;
                c.stats.gold = save.gold;
                c.time_playing += save.played_secs;
            }
            Ok(())
        }
        .boxed()
    }

    fn find_character<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<CharacterBrief>>> {
        async move {
            self.check()?;
            let t = self.tables.lock().await;
            Ok(t.characters.iter().find(|c| c.name == name && !c.deleted).map(|c| CharacterBrief {
                cid: c.cid,
                name: c.name.clone(),
                last_login: c.last_login.clone(),
            }))
        }
        .boxed()
    }

    fn has_contact<'a>(
        &'a self,
        owner: u64,
        contact_name: &'a str,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        async move {
            self.check()?;
            let t = self.tables.lock().await;
            Ok(t.contacts
                .iter()
                .filter(|c| c.owner == owner)
                .any(|c| t.character(c.contact).is_some_and(|ch| ch.name == contact_name)))
        }
        .boxed()
    }

    fn add_contact<'a>(
        &'a self,
        owner: u64,
        contact: u64,
        contact_type: u8,
        comment: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>> {
        async move {
            self.check()?;
            self.tables.lock().await.contacts.push(Contact {
                owner,
                contact,
                contact_type,
                comment: comment.to_string(),
            });
            Ok(())
        }
        .boxed()
    }

    fn remove_contact(&self, owner: u64, contact: u64) -> BoxFuture<'_, StoreResult<bool>> {
        async move {
            self.check()?;
            let mut t = self.tables.lock().await;
            let before = t.contacts.len();
            t.contacts.retain(|c| !(c.owner == owner && c.contact == contact));
            Ok(t.contacts.len() != before)
        }
        .boxed()
    }

    fn contacts_of(&self, owner: u64) -> BoxFuture<'_, StoreResult<Vec<ContactLink>>> {
        async move {
            self.check()?;
            let t = self.tables.lock().await;
            let mut links: Vec<ContactLink> =
                t.contacts.iter().filter(|c| c.owner == owner).filter_map(|c| t.link(c)).collect();
            links.sort_by(|a, b| a.contact_name.cmp(&b.contact_name));
            Ok(links)
        }
        .boxed()
    }

    fn watchers_of(&self, contact: u64) -> BoxFuture<'_, StoreResult<Vec<ContactLink>>> {
        async move {
            self.check()?;
            let t = self.tables.lock().await;
            Ok(t.contacts
                .iter()
                .filter(|c| c.contact == contact)
                .filter_map(|c| t.link(c))
                .collect())
        }
        .boxed()
    }

    fn load_game_time(&self) -> BoxFuture<'_, StoreResult<Option<u32>>> {
        async move {
            self.check()?;
            Ok(self.tables.lock().await.game_time)
        }
        .boxed()
    }

    fn save_game_time(&self, minutes: u32) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            self.check()?;
            self.tables.lock().await.game_time = Some(minutes);
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_char(uid: u64, name: &str) -> NewCharacter {
        NewCharacter {
            uid,
            name: name.to_string(),
            race: "human".into(),
            gender: "m".into(),
            player_class: "fighter".into(),
            area: "start".into(),
            position: Vector3::default(),
            rot: 0.0,
            stats: CharacterStats::default(),
        }
    }

    #[tokio::test]
    async fn test_deleted_characters_hidden_but_name_kept() {
        let store = MemoryStore::new();
        let cid = store.create_character(&new_char(1, "Ann")).await.unwrap();
        assert_eq!(store.count_active_characters(1).await.unwrap(), 1);

        assert!(store.delete_character(1, "Ann").await.unwrap());
        assert!(!store.delete_character(1, "Ann").await.unwrap());
        assert_eq!(store.count_active_characters(1).await.unwrap(), 0);
        assert!(store.list_characters(1).await.unwrap().is_empty());
        assert!(store.load_character(1, "Ann").await.unwrap().is_none());
        assert!(store.character_exists("Ann").await.unwrap());
        assert!(store.find_character("Ann").await.unwrap().is_none());
        assert_eq!(store.time_playing(cid).await, Some(0));
    }

    #[tokio::test]
    async fn test_delete_requires_owner() {
        let store = MemoryStore::new();
        store.create_character(&new_char(1, "Ann")).await.unwrap();
        assert!(!store.delete_character(2, "Ann").await.unwrap());
    }

    #[tokio::test]
    async fn test_contacts_sorted_by_name() {
        let store = MemoryStore::new();
        let a = store.create_character(&new_char(1, "Ann")).await.unwrap();
        let z = store.create_character(&new_char(2, "Zed")).await.unwrap();
        let b = store.create_character(&new_char(3, "Bob")).await.unwrap();
        store.add_contact(a, z, b'F', "").await.unwrap();
        store.add_contact(a, b, b'F', "pal").await.unwrap();

        let names: Vec<String> =
            store.contacts_of(a).await.unwrap().into_iter().map(|l| l.contact_name).collect();
        assert_eq!(names, vec!["Bob", "Zed"]);

        let watchers = store.watchers_of(b).await.unwrap();
        assert_eq!(watchers.len(), 1);
        assert_eq!(watchers[0].owner_name, "Ann");
        assert_eq!(watchers[0].comment, "pal");

        assert!(store.remove_contact(a, b).await.unwrap());
        assert!(!store.has_contact(a, "Bob").await.unwrap());
        assert!(store.has_contact(a, "Zed").await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(matches!(store.count_accounts().await, Err(StoreError::Unavailable { .. })));
        store.set_failing(false);
        assert_eq!(store.count_accounts().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_game_time() {
        let store = MemoryStore::new();
        assert_eq!(store.load_game_time().await.unwrap(), None);
        store.save_game_time(90).await.unwrap();
        assert_eq!(store.load_game_time().await.unwrap(), Some(90));
    }
}
