//! Connections, accounts and character selection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::Mutex;

use super::db::{CharacterRecord, CharacterStats, NewAccount, NewCharacter, StoreError, ROLE_PLAYER};
use super::{ConnId, GameState};
use crate::command::PermLevel;
use crate::core::format_uptime;
use crate::network::msgs::{
    MsgConnectReply, MsgDelChar, MsgDelCharReply, MsgEntityCreate, MsgEntityMove, MsgJoin,
    MsgJoinReply, MsgLogin, MsgLoginReply, MsgNewChar, MsgNewCharReply, MsgNewUser,
    MsgNewUserReply, MsgPlayerData, ResultCode,
};

/// Placeholder for names not known yet.
pub const NO_NAME: &str = "<none>";

pub const RACES: [&str; 3] = ["dwarf", "elf", "human"];
pub const GENDERS: [&str; 2] = ["f", "m"];
pub const CLASSES: [&str; 2] = ["fighter", "sorcerer"];

/// Ability points a new character must spend in total.
pub const ABILITY_POINTS_TOTAL: u32 = 78;
pub const ABILITY_MIN: u8 = 3;
pub const ABILITY_MAX: u8 = 18;

/// Light load by strength score 1..=20.
const LIGHT_LOAD: [i16; 20] = [
    3, 6, 10, 13, 16, 20, 23, 26, 30, 33, 38, 43, 50, 58, 66, 76, 86, 100, 116, 133,
];

/// d20 ability modifier.
pub fn ability_modifier(score: i16) -> i16 {
    (score - 10) >> 1
}

/// Maximum light load carried with the given strength.
pub fn light_load(strength: i16) -> i16 {
    let idx = strength.clamp(1, LIGHT_LOAD.len() as i16) - 1;
    LIGHT_LOAD[idx as usize]
}

/// Stats of a freshly created character, racial adjustment applied.
pub fn starting_stats(race: &str, points: [u8; 6]) -> CharacterStats {
    let [con, str_, dex, int, wis, cha] = points.map(i16::from);
    let (con, dex) = match race {
        "elf" => (con - 2, dex + 2),
        "dwarf" => (con + 2, dex - 2),
        _ => (con, dex),
    };
    CharacterStats {
        health: 10 + ability_modifier(con) + ability_modifier(str_),
        magic: 0,
        stamina: 100,
        gold: 0,
        level: 1,
        ab_con: con,
        ab_str: str_,
        ab_dex: dex,
        ab_int: int,
        ab_wis: wis,
        ab_cha: cha,
    }
}

/// True when the points are each within range and add up to the total.
pub fn valid_ability_points(points: [u8; 6]) -> bool {
    let sum: u32 = points.iter().map(|p| u32::from(*p)).sum();
    sum == ABILITY_POINTS_TOTAL && points.iter().all(|p| (ABILITY_MIN..=ABILITY_MAX).contains(p))
}

/// A character in the world.
#[derive(Debug, Clone)]
pub struct PlayerEntity {
    pub id: u64,
    pub name: String,
    pub race: String,
    pub gender: String,
    pub player_class: String,
    /// Last known movement, holding area, position and rotation.
    pub movement: MsgEntityMove,
    pub data: MsgPlayerData,
}

impl PlayerEntity {
    pub fn from_record(rec: &CharacterRecord) -> Self {
        let s = &rec.stats;
        let data = MsgPlayerData {
            health_max: 10 + ability_modifier(s.ab_str) + ability_modifier(s.ab_con),
            health_cur: s.health,
            magic_max: 100,
            magic_cur: s.magic,
            load_max: light_load(s.ab_str),
            load_cur: 0,
            stamina: s.stamina,
            gold: s.gold,
            level: s.level,
            ab_con: s.ab_con,
            ab_str: s.ab_str,
            ab_dex: s.ab_dex,
            ab_int: s.ab_int,
            ab_wis: s.ab_wis,
            ab_cha: s.ab_cha,
        };
        Self {
            id: rec.cid,
            name: rec.name.clone(),
            race: rec.race.clone(),
            gender: rec.gender.clone(),
            player_class: rec.player_class.clone(),
            movement: MsgEntityMove {
                entity_id: rec.cid,
                area: rec.area.clone(),
                position: rec.position,
                rot: rec.rot,
                ..Default::default()
            },
            data,
        }
    }

    pub fn area(&self) -> &str {
        &self.movement.area
    }

    /// Creation message as seen by clients; `class` is "Player" for others
    /// and "MainPlayer" for the owner.
    pub fn create_msg(&self, class: &str) -> MsgEntityCreate {
        MsgEntityCreate {
            entity_id: self.id,
            entity_name: self.name.clone(),
            entity_class: class.to_string(),
            mesh_type: self.race.clone(),
            mesh_subtype: self.gender.clone(),
            area: self.movement.area.clone(),
            position: self.movement.position,
            rot: self.movement.rot,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginData {
    pub conn: ConnId,
    pub peer: SocketAddr,
    pub username: String,
    pub uid: Option<u64>,
    pub charname: String,
    pub cid: Option<u64>,
    pub perm: PermLevel,
    pub playing: bool,
    pub entity: Option<PlayerEntity>,
    pub joined_at: Option<Instant>,
}

impl LoginData {
    fn new(conn: ConnId, peer: SocketAddr) -> Self {
        Self {
            conn,
            peer,
            username: NO_NAME.to_string(),
            uid: None,
            charname: NO_NAME.to_string(),
            cid: None,
            perm: PermLevel::NotSet,
            playing: false,
            entity: None,
            joined_at: None,
        }
    }
}

#[derive(Default)]
pub struct LoginMgr {
    conns: Mutex<HashMap<ConnId, LoginData>>,
}

impl LoginMgr {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) async fn insert(&self, conn: ConnId, peer: SocketAddr) {
        self.conns.lock().await.insert(conn, LoginData::new(conn, peer));
    }

    pub(super) async fn remove(&self, conn: ConnId) -> Option<LoginData> {
        self.conns.lock().await.remove(&conn)
    }

    /// Snapshot of a connection's data.
    pub async fn get(&self, conn: ConnId) -> Option<LoginData> {
        self.conns.lock().await.get(&conn).cloned()
    }

    /// Apply `f` to a connection's data in place.
    pub async fn update<R>(&self, conn: ConnId, f: impl FnOnce(&mut LoginData) -> R) -> Option<R> {
        self.conns.lock().await.get_mut(&conn).map(f)
    }

    pub async fn find_by_name(&self, charname: &str) -> Option<LoginData> {
        let conns = self.conns.lock().await;
        conns.values().find(|d| d.playing && d.charname == charname).cloned()
    }

    pub async fn find_by_entity(&self, id: u64) -> Option<LoginData> {
        let conns = self.conns.lock().await;
        conns.values().find(|d| d.cid == Some(id)).cloned()
    }

    pub async fn is_playing(&self, conn: ConnId) -> bool {
        self.conns.lock().await.get(&conn).is_some_and(|d| d.playing)
    }

    pub async fn connection_count(&self) -> usize {
        self.conns.lock().await.len()
    }

    pub async fn playing_count(&self) -> usize {
        self.conns.lock().await.values().filter(|d| d.playing).count()
    }

    /// Names of the characters in the world, in no particular order.
    pub async fn player_names(&self) -> Vec<String> {
        let conns = self.conns.lock().await;
        conns.values().filter(|d| d.playing).map(|d| d.charname.clone()).collect()
    }

    pub async fn sorted_player_names(&self) -> Vec<String> {
        let mut names = self.player_names().await;
        names.sort();
        names
    }

    /// Reserve `username` for `conn`. Fails when the connection already has
    /// an account, or another connection holds or is logging into it.
    async fn claim_account(&self, conn: ConnId, username: &str) -> Result<LoginData, ResultCode> {
        let mut conns = self.conns.lock().await;
        if conns.values().any(|d| d.username == username) {
            return Err(ResultCode::EALREADYLOGGED);
        }
        let data = conns.get_mut(&conn).ok_or(ResultCode::EBADLOGIN)?;
        if data.uid.is_some() || data.username != NO_NAME {
            return Err(ResultCode::EALREADYLOGGED);
        }
        data.username = username.to_string();
        Ok(data.clone())
    }

    /// Attach the account found for a claimed name. The stored name may
    /// differ in case from the one typed, so it is checked again.
    async fn bind_account(&self, conn: ConnId, username: &str, uid: u64) -> Result<(), ResultCode> {
        let mut conns = self.conns.lock().await;
        if conns.values().any(|d| d.conn != conn && d.username == username) {
            return Err(ResultCode::EALREADYLOGGED);
        }
        let data = conns.get_mut(&conn).ok_or(ResultCode::EBADLOGIN)?;
        data.username = username.to_string();
        data.uid = Some(uid);
        Ok(())
    }

    /// Undo [`claim_account`](Self::claim_account) after a failed login.
    async fn release_account(&self, conn: ConnId) {
        if let Some(d) = self.conns.lock().await.get_mut(&conn) {
            d.username = NO_NAME.to_string();
            d.uid = None;
        }
    }
}

/// Turn a store failure into a result code, logging it.
fn db_failure(what: &str, e: StoreError) -> ResultCode {
    tracing::error!("[login] [db_error] op={} err={}", what, e);
    ResultCode::EDATABASE
}

impl GameState {
    /// Reply to `Conn` with the server statistics.
    pub async fn send_connect_reply(&self, conn: ConnId) {
        let total_users = self.store.count_accounts().await.unwrap_or_else(|e| {
            tracing::error!("[login] [db_error] op=count_accounts err={}", e);
            0
        });
        let total_chars = self.store.count_characters().await.unwrap_or_else(|e| {
            tracing::error!("[login] [db_error] op=count_characters err={}", e);
            0
        });
        let reply = MsgConnectReply {
            result: ResultCode::SUCCESS,
            protocol_version: self.config.network.protocol_version.clone(),
            uptime: format_uptime(self.started_at.elapsed()),
            total_users: total_users as u32,
            total_chars: total_chars as u32,
            current_players: self.login.playing_count().await as u32,
        };
        self.net.send_to_conn(conn, &reply).await;
        tracing::info!("[login] [connect_reply] conn={}", conn);
    }

    pub async fn login(&self, conn: ConnId, msg: MsgLogin) {
        let reply = match self.try_login(conn, &msg).await {
            Ok(characters) => {
                tracing::info!("[login] [success] conn={} user={}", conn, msg.username);
                MsgLoginReply { result: ResultCode::SUCCESS, characters }
            }
            Err(result) => {
                tracing::warn!("[login] [failed] conn={} user={} result={}", conn, msg.username, result);
                MsgLoginReply { result, characters: Vec::new() }
            }
        };
        self.net.send_to_conn(conn, &reply).await;
    }

    async fn try_login(
        &self,
        conn: ConnId,
        msg: &MsgLogin,
    ) -> Result<Vec<crate::network::msgs::CharacterSummary>, ResultCode> {
        let data = self.login.claim_account(conn, &msg.username).await?;
        let result = self.finish_login(conn, &data, msg).await;
        if result.is_err() {
            self.login.release_account(conn).await;
        }
        result
    }

    async fn finish_login(
        &self,
        conn: ConnId,
        data: &LoginData,
        msg: &MsgLogin,
    ) -> Result<Vec<crate::network::msgs::CharacterSummary>, ResultCode> {
        let account = self
            .store
            .find_account(&msg.username)
            .await
            .map_err(|e| db_failure("find_account", e))?
            .ok_or(ResultCode::EBADLOGIN)?;
        if account.password != msg.pw_md5sum {
            return Err(ResultCode::EBADLOGIN);
        }

        self.login.bind_account(conn, &account.username, account.uid).await?;

        self.store
            .record_login(account.uid, &data.peer.ip().to_string())
            .await
            .map_err(|e| db_failure("record_login", e))?;

        let characters = self
            .store
            .list_characters(account.uid)
            .await
            .map_err(|e| db_failure("list_characters", e))?;
        if characters.len() > self.config.characters.max_per_account {
            tracing::error!(
                "[login] [too_many_chars] user={} count={} max={}",
                account.username,
                characters.len(),
                self.config.characters.max_per_account
            );
            return Err(ResultCode::ECHARCORRUPT);
        }
        Ok(characters)
    }

    pub async fn create_user(&self, conn: ConnId, msg: MsgNewUser) {
        let result = match self.try_create_user(&msg).await {
            Ok(uid) => {
                tracing::info!("[login] [user_created] name={} uid={}", msg.username, uid);
                ResultCode::SUCCESS
            }
            Err(result) => {
                tracing::warn!("[login] [user_failed] name={} result={}", msg.username, result);
                result
            }
        };
        self.net.send_to_conn(conn, &MsgNewUserReply { result }).await;
    }

    async fn try_create_user(&self, msg: &MsgNewUser) -> Result<u64, ResultCode> {
        let existing = self
            .store
            .find_account(&msg.username)
            .await
            .map_err(|e| db_failure("find_account", e))?;
        if existing.is_some() {
            return Err(ResultCode::EUSERALREADYEXIST);
        }
        let account = NewAccount {
            username: msg.username.clone(),
            password: msg.pw_md5sum.clone(),
            email: msg.email.clone(),
            realname: msg.realname.clone(),
            roles: ROLE_PLAYER,
        };
        self.store.create_account(&account).await.map_err(|e| db_failure("create_account", e))
    }

    pub async fn create_character(&self, conn: ConnId, msg: MsgNewChar) {
        let mut reply = MsgNewCharReply {
            result: ResultCode::SUCCESS,
            charname: msg.charname.clone(),
            race: msg.race.clone(),
            gender: msg.gender.clone(),
            player_class: msg.player_class.clone(),
            area: String::new(),
        };
        match self.try_create_character(conn, &msg).await {
            Ok(cid) => {
                reply.area = self.config.characters.new_char_area.clone();
                tracing::info!("[login] [char_created] conn={} name={} cid={}", conn, msg.charname, cid);
            }
            Err(result) => {
                tracing::warn!("[login] [char_failed] conn={} name={} result={}", conn, msg.charname, result);
                reply.result = result;
            }
        }
        self.net.send_to_conn(conn, &reply).await;
    }

    async fn try_create_character(&self, conn: ConnId, msg: &MsgNewChar) -> Result<u64, ResultCode> {
        let uid = self.login.get(conn).await.and_then(|d| d.uid).ok_or(ResultCode::EBADLOGIN)?;

        if self.store.character_exists(&msg.charname).await.map_err(|e| db_failure("character_exists", e))? {
            return Err(ResultCode::ECHARALREADYEXIST);
        }
        let active = self
            .store
            .count_active_characters(uid)
            .await
            .map_err(|e| db_failure("count_active_characters", e))?;
        if active >= self.config.characters.max_per_account as u64 {
            return Err(ResultCode::EMAXCHARS);
        }
        if !RACES.contains(&msg.race.as_str())
            || !GENDERS.contains(&msg.gender.as_str())
            || !CLASSES.contains(&msg.player_class.as_str())
        {
            return Err(ResultCode::ENEWCHARBADDATA);
        }
        let points = [msg.ab_con, msg.ab_str, msg.ab_dex, msg.ab_int, msg.ab_wis, msg.ab_cha];
        if !valid_ability_points(points) {
            tracing::debug!("[login] [bad_points] name={} points={:?}", msg.charname, points);
            return Err(ResultCode::ENEWCHARBADDATA);
        }

        let chars = &self.config.characters;
        let new_char = NewCharacter {
            uid,
            name: msg.charname.clone(),
            race: msg.race.clone(),
            gender: msg.gender.clone(),
            player_class: msg.player_class.clone(),
            area: chars.new_char_area.clone(),
            position: chars.new_char_pos.into(),
            rot: 0.0,
            stats: starting_stats(&msg.race, points),
        };
        self.store.create_character(&new_char).await.map_err(|e| db_failure("create_character", e))
    }

    pub async fn delete_character(&self, conn: ConnId, msg: MsgDelChar) {
        let uid = self.login.get(conn).await.and_then(|d| d.uid);
        let result = match uid {
            None => ResultCode::ENOSUCHCHAR,
            Some(uid) => match self.store.delete_character(uid, &msg.charname).await {
                Ok(true) => ResultCode::SUCCESS,
                Ok(false) => ResultCode::ENOSUCHCHAR,
                Err(e) => db_failure("delete_character", e),
            },
        };
        if result.is_success() {
            tracing::info!("[login] [char_deleted] conn={} name={}", conn, msg.charname);
        } else {
            tracing::warn!("[login] [delete_failed] conn={} name={} result={}", conn, msg.charname, result);
        }
        self.net.send_to_conn(conn, &MsgDelCharReply { result, charname: msg.charname }).await;
    }

    pub async fn join_game(&self, conn: ConnId, msg: MsgJoin) {
        match self.try_join(conn, &msg).await {
            Ok(()) => {}
            Err(result) => {
                tracing::warn!("[login] [join_failed] conn={} name={} result={}", conn, msg.charname, result);
                self.net.send_to_conn(conn, &MsgJoinReply { result }).await;
            }
        }
    }

    async fn try_join(&self, conn: ConnId, msg: &MsgJoin) -> Result<(), ResultCode> {
        let data = self.login.get(conn).await.ok_or(ResultCode::EBADLOGIN)?;
        if data.charname != NO_NAME {
            return Err(ResultCode::EALREADYPLAYING);
        }
        let uid = data.uid.ok_or(ResultCode::EBADLOGIN)?;

        let record = self
            .store
            .load_character(uid, &msg.charname)
            .await
            .map_err(|e| db_failure("load_character", e))?
            .ok_or(ResultCode::ENOSUCHCHAR)?;

        let perm = PermLevel::from_roles(record.roles).unwrap_or_else(|| {
            tracing::error!(
                "[login] [bad_roles] char={} roles={} (permission left unset)",
                record.name,
                record.roles
            );
            PermLevel::NotSet
        });

        self.store
            .touch_character_login(record.cid)
            .await
            .map_err(|e| db_failure("touch_character_login", e))?;

        let entity = PlayerEntity::from_record(&record);
        let main = entity.create_msg("MainPlayer");
        let player_data = entity.data.clone();
        self.login
            .update(conn, |d| {
                d.charname = record.name.clone();
                d.cid = Some(record.cid);
                d.perm = perm;
                d.entity = Some(entity);
            })
            .await;

        tracing::info!("[login] [joining] conn={} char={} cid={}", conn, record.name, record.cid);
        self.net.send_to_conn(conn, &main).await;
        self.net.send_to_conn(conn, &MsgJoinReply { result: ResultCode::SUCCESS }).await;
        self.net.send_to_conn(conn, &player_data).await;
        self.add_player(conn).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::network::Message;
    use crate::servers::game::db::{GameStore, MemoryStore};
    use bytes::Bytes;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn peer() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn next<M: Message>(rx: &mut UnboundedReceiver<Bytes>) -> M {
        let frame = rx.try_recv().expect("no frame queued");
        M::decode(&frame).unwrap()
    }

    fn new_char(name: &str, race: &str, points: [u8; 6]) -> MsgNewChar {
        MsgNewChar {
            charname: name.into(),
            race: race.into(),
            gender: "m".into(),
            player_class: "fighter".into(),
            ab_con: points[0],
            ab_str: points[1],
            ab_dex: points[2],
            ab_int: points[3],
            ab_wis: points[4],
            ab_cha: points[5],
        }
    }

    async fn logged_in(state: &GameState, user: &str) -> (ConnId, UnboundedReceiver<Bytes>) {
        let (conn, mut rx) = state.add_connection(peer()).await;
        let account =
            MsgNewUser { username: user.into(), pw_md5sum: "pw".into(), ..Default::default() };
        state.create_user(conn, account).await;
        assert!(next::<MsgNewUserReply>(&mut rx).result.is_success());
        state.login(conn, MsgLogin { username: user.into(), pw_md5sum: "pw".into() }).await;
        assert!(next::<MsgLoginReply>(&mut rx).result.is_success());
        (conn, rx)
    }

    #[test]
    fn test_ability_rules() {
        assert!(valid_ability_points([13; 6]));
        assert!(!valid_ability_points([13, 13, 13, 13, 13, 12]));
        assert!(!valid_ability_points([18, 18, 18, 18, 3, 3]));
        assert!(!valid_ability_points([2, 18, 18, 18, 18, 4]));
        assert!(!valid_ability_points([19, 17, 12, 10, 10, 10]));
    }

    #[test]
    fn test_modifiers_and_load() {
        assert_eq!(ability_modifier(10), 0);
        assert_eq!(ability_modifier(13), 1);
        assert_eq!(ability_modifier(9), -1);
        assert_eq!(ability_modifier(3), -4);
        assert_eq!(light_load(1), 3);
        assert_eq!(light_load(13), 50);
        assert_eq!(light_load(20), 133);
        assert_eq!(light_load(25), 133);
    }

    #[test]
    fn test_racial_adjustment() {
        let elf = starting_stats("elf", [14, 12, 12, 14, 13, 13]);
        assert_eq!((elf.ab_con, elf.ab_dex), (12, 14));
        assert_eq!(elf.health, 10 + 1 + 1);
        let dwarf = starting_stats("dwarf", [14, 12, 12, 14, 13, 13]);
        assert_eq!((dwarf.ab_con, dwarf.ab_dex), (16, 10));
        assert_eq!(dwarf.health, 10 + 3 + 1);
        assert_eq!(dwarf.stamina, 100);
        assert_eq!(dwarf.level, 1);
    }

    #[tokio::test]
    async fn test_connect_reply() {
        let state = GameState::test_only().await.unwrap();
        let (conn, mut rx) = state.add_connection(peer()).await;
        state.send_connect_reply(conn).await;
        let reply: MsgConnectReply = next(&mut rx);
        assert!(reply.result.is_success());
        assert_eq!(reply.protocol_version, state.config.network.protocol_version);
        assert!(reply.uptime.starts_with("0d 0h0m"));
        assert_eq!(reply.total_users, 0);
    }

    #[tokio::test]
    async fn test_bad_login_and_duplicate_user() {
        let state = GameState::test_only().await.unwrap();
        let (conn, mut rx) = logged_in(&state, "anna").await;

        state.login(conn, MsgLogin { username: "anna".into(), pw_md5sum: "pw".into() }).await;
        assert_eq!(next::<MsgLoginReply>(&mut rx).result, ResultCode::EALREADYLOGGED);

        let (other, mut rx2) = state.add_connection(peer()).await;
        state.login(other, MsgLogin { username: "bob".into(), pw_md5sum: "pw".into() }).await;
        assert_eq!(next::<MsgLoginReply>(&mut rx2).result, ResultCode::EBADLOGIN);

        state.create_user(other, MsgNewUser { username: "anna".into(), ..Default::default() }).await;
        assert_eq!(next::<MsgNewUserReply>(&mut rx2).result, ResultCode::EUSERALREADYEXIST);
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let state = GameState::test_only().await.unwrap();
        let (first, _first_rx) = logged_in(&state, "anna").await;
        let (conn, mut rx) = state.add_connection(peer()).await;
        state.login(conn, MsgLogin { username: "anna".into(), pw_md5sum: "nope".into() }).await;
        // account in use takes precedence over the password check
        assert_eq!(next::<MsgLoginReply>(&mut rx).result, ResultCode::EALREADYLOGGED);
        state.remove_connection(first).await;
        state.login(conn, MsgLogin { username: "anna".into(), pw_md5sum: "nope".into() }).await;
        assert_eq!(next::<MsgLoginReply>(&mut rx).result, ResultCode::EBADLOGIN);
    }

    #[tokio::test]
    async fn test_concurrent_logins_claim_the_account_once() {
        let store = Arc::new(MemoryStore::new());
        store.set_yielding(true);
        let state = GameState::new(ServerConfig::default(), store).await.unwrap();
        let (setup, mut setup_rx) = state.add_connection(peer()).await;
        let account =
            MsgNewUser { username: "anna".into(), pw_md5sum: "pw".into(), ..Default::default() };
        state.create_user(setup, account).await;
        assert!(next::<MsgNewUserReply>(&mut setup_rx).result.is_success());

        let (a, mut rx_a) = state.add_connection(peer()).await;
        let (b, mut rx_b) = state.add_connection(peer()).await;
        tokio::join!(
            state.login(a, MsgLogin { username: "anna".into(), pw_md5sum: "pw".into() }),
            state.login(b, MsgLogin { username: "anna".into(), pw_md5sum: "pw".into() }),
        );
        let results =
            [next::<MsgLoginReply>(&mut rx_a).result, next::<MsgLoginReply>(&mut rx_b).result];
        assert_eq!(results.iter().filter(|r| r.is_success()).count(), 1, "{:?}", results);
        assert!(results.contains(&ResultCode::EALREADYLOGGED));
    }

    #[tokio::test]
    async fn test_failed_login_releases_the_account() {
        let store = Arc::new(MemoryStore::new());
        let mut config = ServerConfig::default();
        config.characters.max_per_account = 1;
        let state = GameState::new(config, store.clone()).await.unwrap();
        let (conn, mut rx) = state.add_connection(peer()).await;
        let account =
            MsgNewUser { username: "anna".into(), pw_md5sum: "pw".into(), ..Default::default() };
        state.create_user(conn, account).await;
        assert!(next::<MsgNewUserReply>(&mut rx).result.is_success());
        let uid = store.find_account("anna").await.unwrap().unwrap().uid;
        for name in ["Ann", "Bea"] {
            let c = NewCharacter {
                uid,
                name: name.into(),
                race: "human".into(),
                gender: "f".into(),
                player_class: "fighter".into(),
                area: "start".into(),
                position: Default::default(),
                rot: 0.0,
                stats: CharacterStats::default(),
            };
            store.create_character(&c).await.unwrap();
        }

        state.login(conn, MsgLogin { username: "anna".into(), pw_md5sum: "pw".into() }).await;
        assert_eq!(next::<MsgLoginReply>(&mut rx).result, ResultCode::ECHARCORRUPT);
        let data = state.login.get(conn).await.unwrap();
        assert_eq!(data.uid, None);
        assert_eq!(data.username, NO_NAME);

        state.login(conn, MsgLogin { username: "anna".into(), pw_md5sum: "bad".into() }).await;
        assert_eq!(next::<MsgLoginReply>(&mut rx).result, ResultCode::EBADLOGIN);

        let (other, mut other_rx) = state.add_connection(peer()).await;
        state.login(other, MsgLogin { username: "anna".into(), pw_md5sum: "pw".into() }).await;
        assert_eq!(next::<MsgLoginReply>(&mut other_rx).result, ResultCode::ECHARCORRUPT);
    }

    #[tokio::test]
    async fn test_character_creation_rules() {
        let state = GameState::test_only().await.unwrap();
        let (conn, mut rx) = logged_in(&state, "anna").await;

        state.create_character(conn, new_char("Ann", "human", [13; 6])).await;
        let reply: MsgNewCharReply = next(&mut rx);
        assert!(reply.result.is_success());
        assert_eq!(reply.area, state.config.characters.new_char_area);

        state.create_character(conn, new_char("Ann", "human", [13; 6])).await;
        assert_eq!(next::<MsgNewCharReply>(&mut rx).result, ResultCode::ECHARALREADYEXIST);

        state.create_character(conn, new_char("Orc", "orc", [13; 6])).await;
        assert_eq!(next::<MsgNewCharReply>(&mut rx).result, ResultCode::ENEWCHARBADDATA);

        state.create_character(conn, new_char("Weak", "elf", [13, 13, 13, 13, 13, 12])).await;
        assert_eq!(next::<MsgNewCharReply>(&mut rx).result, ResultCode::ENEWCHARBADDATA);

        for name in ["B", "C", "D"] {
            state.create_character(conn, new_char(name, "dwarf", [13; 6])).await;
            assert!(next::<MsgNewCharReply>(&mut rx).result.is_success());
        }
        state.create_character(conn, new_char("E", "dwarf", [13; 6])).await;
        assert_eq!(next::<MsgNewCharReply>(&mut rx).result, ResultCode::EMAXCHARS);
    }

    #[tokio::test]
    async fn test_create_character_requires_login() {
        let state = GameState::test_only().await.unwrap();
        let (conn, mut rx) = state.add_connection(peer()).await;
        state.create_character(conn, new_char("Ann", "human", [13; 6])).await;
        assert_eq!(next::<MsgNewCharReply>(&mut rx).result, ResultCode::EBADLOGIN);
    }

    #[tokio::test]
    async fn test_delete_and_join() {
        let state = GameState::test_only().await.unwrap();
        let (conn, mut rx) = logged_in(&state, "anna").await;
        state.create_character(conn, new_char("Ann", "elf", [13; 6])).await;
        let _: MsgNewCharReply = next(&mut rx);

        state.delete_character(conn, MsgDelChar { charname: "Nobody".into() }).await;
        assert_eq!(next::<MsgDelCharReply>(&mut rx).result, ResultCode::ENOSUCHCHAR);

        state.join_game(conn, MsgJoin { charname: "Ann".into() }).await;
        let main: MsgEntityCreate = next(&mut rx);
        assert_eq!(main.entity_class, "MainPlayer");
        assert_eq!(main.mesh_type, "elf");
        assert!(next::<MsgJoinReply>(&mut rx).result.is_success());
        let pd: MsgPlayerData = next(&mut rx);
        assert_eq!(pd.magic_max, 100);
        assert_eq!(pd.load_max, light_load(13));
        assert_eq!(pd.ab_con, 11);

        assert!(state.login.is_playing(conn).await);
        assert_eq!(state.login.get(conn).await.unwrap().perm, PermLevel::Player);

        state.join_game(conn, MsgJoin { charname: "Ann".into() }).await;
        let mut result = None;
        while let Ok(frame) = rx.try_recv() {
            if let Ok(r) = MsgJoinReply::decode(&frame) {
                result = Some(r.result);
            }
        }
        assert_eq!(result, Some(ResultCode::EALREADYPLAYING));
    }

    #[tokio::test]
    async fn test_join_unknown_character() {
        let state = GameState::test_only().await.unwrap();
        let (conn, mut rx) = logged_in(&state, "anna").await;
        state.join_game(conn, MsgJoin { charname: "Ghost".into() }).await;
        assert_eq!(next::<MsgJoinReply>(&mut rx).result, ResultCode::ENOSUCHCHAR);
        assert!(!state.login.is_playing(conn).await);
    }
}
