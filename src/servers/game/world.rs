//! Players in the world and what they see of each other.

use std::collections::HashSet;
use std::time::Instant;

use tokio::sync::Mutex;

use super::db::CharacterSave;
use super::{ConnId, GameState};
use crate::network::msgs::{MsgChat, MsgEntityDestroy, MsgEntityMove};

#[derive(Default)]
pub struct WorldMgr {
    /// Playing connections, in join order.
    players: Mutex<Vec<ConnId>>,
    areas: Mutex<HashSet<String>>,
}

impl WorldMgr {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn player_conns(&self) -> Vec<ConnId> {
        self.players.lock().await.clone()
    }

    pub async fn contains(&self, conn: ConnId) -> bool {
        self.players.lock().await.contains(&conn)
    }

    pub async fn player_count(&self) -> usize {
        self.players.lock().await.len()
    }

    /// Mark an area as loaded. False when it already was.
    pub async fn load_area(&self, name: &str) -> bool {
        let loaded = self.areas.lock().await.insert(name.to_string());
        if loaded {
            tracing::info!("[world] [area_loaded] area={}", name);
        } else {
            tracing::warn!("[world] [area_already_loaded] area={}", name);
        }
        loaded
    }

    pub async fn is_area_loaded(&self, name: &str) -> bool {
        self.areas.lock().await.contains(name)
    }
}

impl GameState {
    /// Put a joined character in the world and introduce it to everyone.
    pub async fn add_player(&self, conn: ConnId) {
        let Some(entity) = self
            .login
            .update(conn, |d| {
                d.playing = true;
                d.joined_at = Some(Instant::now());
                d.entity.clone()
            })
            .await
            .flatten()
        else {
            tracing::error!("[world] [add_without_entity] conn={}", conn);
            return;
        };

        // snapshot and insert together so concurrent joins always meet
        let others = {
            let mut players = self.world.players.lock().await;
            let others = players.clone();
            players.push(conn);
            others
        };
        let newcomer = entity.create_msg("Player");
        for other in &others {
            let Some(existing) = self.login.get(*other).await.and_then(|d| d.entity) else {
                continue;
            };
            self.net.send_to_conn(conn, &existing.create_msg("Player")).await;
            self.net.send_to_conn(*other, &newcomer).await;
        }

        self.send_time_to_player(conn).await;
        self.player_status_change(conn, true).await;

        let text = format!("'{}' joining the game (in '{}')", entity.name, entity.area());
        self.net.send_to_list(&others, &MsgChat::system(text)).await;
        tracing::info!(
            "[world] [player_added] conn={} char={} players={}",
            conn,
            entity.name,
            others.len() + 1
        );
    }

    /// Take a character out of the world and save it.
    pub async fn remove_player(&self, conn: ConnId) {
        {
            let mut players = self.world.players.lock().await;
            players.retain(|c| *c != conn);
        }
        let Some((entity, joined_at)) = self
            .login
            .update(conn, |d| {
                d.playing = false;
                (d.entity.take(), d.joined_at.take())
            })
            .await
        else {
            tracing::error!("[world] [remove_unknown] conn={}", conn);
            return;
        };
        let Some(entity) = entity else {
            tracing::error!("[world] [remove_without_entity] conn={}", conn);
            return;
        };

        self.send_to_all_players(&MsgEntityDestroy { entity_id: entity.id }).await;
        self.player_status_change_entity(&entity, false).await;
        let text = format!("'{}' leaving the game (in '{}')", entity.name, entity.area());
        self.send_to_all_players(&MsgChat::system(text)).await;

        let save = CharacterSave {
            cid: entity.id,
            area: entity.movement.area.clone(),
            position: entity.movement.position,
            rot: entity.movement.rot,
            health: entity.data.health_cur,
            magic: entity.data.magic_cur,
            stamina: entity.data.stamina,
            gold: entity.data.gold,
            played_secs: joined_at.map(|t| t.elapsed().as_secs()).unwrap_or(0),
        };
        match self.store.save_character(&save).await {
            Ok(()) => tracing::info!("[world] [player_saved] char={} cid={}", entity.name, entity.id),
            Err(e) => tracing::error!("[world] [save_failed] char={} err={}", entity.name, e),
        }
    }

    /// Store a player's movement and forward it to everyone else. Entity id
    /// and area always come from the server's record.
    pub async fn update_movement(&self, conn: ConnId, mut msg: MsgEntityMove) {
        let forced = self
            .login
            .update(conn, |d| {
                if !d.playing {
                    return None;
                }
                let entity = d.entity.as_mut()?;
                msg.entity_id = entity.id;
                msg.area = entity.movement.area.clone();
                entity.movement = msg.clone();
                Some(msg)
            })
            .await
            .flatten();
        match forced {
            Some(msg) => self.send_to_all_players_but(conn, &msg).await,
            None => tracing::warn!("[world] [move_not_playing] conn={}", conn),
        }
    }

    /// Players within `radius` of `conn`'s position, `conn` included.
    pub async fn nearby_players(&self, conn: ConnId, radius: f32) -> Vec<ConnId> {
        let Some(origin) = self.login.get(conn).await.and_then(|d| d.entity) else {
            return Vec::new();
        };
        let mut near = Vec::new();
        for other in self.world.player_conns().await {
            let Some(e) = self.login.get(other).await.and_then(|d| d.entity) else {
                continue;
            };
            if e.movement.position.distance(&origin.movement.position) <= radius {
                near.push(other);
            }
        }
        near
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::msgs::{MsgEntityCreate, MsgJoin, MsgLogin, MsgNewChar, MsgNewUser};
    use crate::network::{Message, Vector3};
    use bytes::Bytes;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Logged in with a character created, not yet in the world.
    async fn ready(state: &Arc<GameState>, name: &str) -> (ConnId, UnboundedReceiver<Bytes>) {
        let (conn, mut rx) = state.add_connection("127.0.0.1:6000".parse().unwrap()).await;
        let user = format!("user_{}", name);
        state
            .create_user(conn, MsgNewUser { username: user.clone(), pw_md5sum: "x".into(), ..Default::default() })
            .await;
        state.login(conn, MsgLogin { username: user, pw_md5sum: "x".into() }).await;
        state
            .create_character(
                conn,
                MsgNewChar {
                    charname: name.into(),
                    race: "human".into(),
                    gender: "f".into(),
                    player_class: "sorcerer".into(),
                    ab_con: 13,
                    ab_str: 13,
                    ab_dex: 13,
                    ab_int: 13,
                    ab_wis: 13,
                    ab_cha: 13,
                },
            )
            .await;
        while rx.try_recv().is_ok() {}
        (conn, rx)
    }

    async fn join(state: &Arc<GameState>, name: &str) -> (ConnId, UnboundedReceiver<Bytes>) {
        let (conn, mut rx) = ready(state, name).await;
        state.join_game(conn, MsgJoin { charname: name.into() }).await;
        while rx.try_recv().is_ok() {}
        (conn, rx)
    }

    fn drain<M: Message>(rx: &mut UnboundedReceiver<Bytes>) -> Vec<M> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let Ok(m) = M::decode(&frame) {
                out.push(m);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_join_introduces_players() {
        let state = GameState::test_only().await.unwrap();
        let (_a, mut rx_a) = join(&state, "Ann").await;
        let (b, rx_b) = join(&state, "Bob").await;
        drop(rx_b);

        let created: Vec<MsgEntityCreate> = drain(&mut rx_a);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].entity_name, "Bob");
        assert_eq!(created[0].entity_class, "Player");
        assert_eq!(state.world.player_count().await, 2);

        state.remove_player(b).await;
        assert_eq!(state.world.player_count().await, 1);
        assert!(!state.login.is_playing(b).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_meet_each_other() {
        let state = GameState::test_only().await.unwrap();
        let names = ["Ann", "Bob", "Cid", "Dan", "Eve", "Fay"];
        let mut waiting = Vec::new();
        for name in names {
            let (conn, rx) = ready(&state, name).await;
            waiting.push((name, conn, rx));
        }

        let joins: Vec<_> = waiting
            .iter()
            .map(|(name, conn, _)| {
                let state = Arc::clone(&state);
                let (conn, charname) = (*conn, name.to_string());
                tokio::spawn(async move { state.join_game(conn, MsgJoin { charname }).await })
            })
            .collect();
        for j in joins {
            j.await.unwrap();
        }

        for (name, _, rx) in waiting.iter_mut() {
            let created: Vec<MsgEntityCreate> = drain(rx);
            let others = created.iter().filter(|c| c.entity_class == "Player").count();
            assert_eq!(others, names.len() - 1, "{} missed someone", name);
        }
        assert_eq!(state.world.player_count().await, names.len());
    }

    #[tokio::test]
    async fn test_join_and_leave_announcements() {
        let state = GameState::test_only().await.unwrap();
        let (_a, mut rx_a) = join(&state, "Ann").await;
        let (b, _rx_b) = join(&state, "Bob").await;
        let chats: Vec<MsgChat> = drain(&mut rx_a);
        assert!(chats.iter().any(|c| c.text.starts_with("'Bob' joining the game (in '")));

        state.remove_player(b).await;
        let gone: Vec<MsgEntityDestroy> = drain(&mut rx_a);
        assert_eq!(gone.len(), 1);
    }

    #[tokio::test]
    async fn test_movement_is_forced_and_forwarded() {
        let state = GameState::test_only().await.unwrap();
        let (a, _rx_a) = join(&state, "Ann").await;
        let (_b, mut rx_b) = join(&state, "Bob").await;
        let cid = state.login.get(a).await.unwrap().cid.unwrap();

        let mv = MsgEntityMove {
            entity_id: 999,
            area: "elsewhere".into(),
            position: Vector3::new(1.0, 2.0, 3.0),
            run: true,
            ..Default::default()
        };
        state.update_movement(a, mv).await;

        let moves: Vec<MsgEntityMove> = drain(&mut rx_b);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].entity_id, cid);
        assert_eq!(moves[0].area, state.config.characters.new_char_area);
        assert!(moves[0].run);
    }

    #[tokio::test]
    async fn test_nearby_players() {
        let state = GameState::test_only().await.unwrap();
        let (a, _rx_a) = join(&state, "Ann").await;
        let (b, _rx_b) = join(&state, "Bob").await;
        let far = MsgEntityMove { position: Vector3::new(500.0, 0.0, 0.0), ..Default::default() };
        state.update_movement(b, far).await;

        assert_eq!(state.nearby_players(a, 20.0).await, vec![a]);
        assert_eq!(state.nearby_players(a, 1000.0).await.len(), 2);
    }

    #[tokio::test]
    async fn test_load_area_once() {
        let world = WorldMgr::new();
        assert!(world.load_area("tmprotoworld").await);
        assert!(!world.load_area("tmprotoworld").await);
        assert!(world.is_area_loaded("tmprotoworld").await);
    }
}
