//! Outgoing side of the server: one frame channel per connection.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;

use super::{ConnId, GameState};
use crate::network::Message;

/// Encode once for any number of receivers. Oversized messages are logged
/// and dropped.
pub fn encode_or_log<M: Message>(msg: &M) -> Option<Bytes> {
    match msg.encode() {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!("Message '{}' could not be sent ({}), too big?", M::TYPE, e);
            None
        }
    }
}

#[derive(Default)]
pub struct NetworkMgr {
    links: Mutex<HashMap<ConnId, UnboundedSender<Bytes>>>,
}

impl NetworkMgr {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, conn: ConnId, tx: UnboundedSender<Bytes>) {
        self.links.lock().await.insert(conn, tx);
    }

    pub async fn unregister(&self, conn: ConnId) -> bool {
        self.links.lock().await.remove(&conn).is_some()
    }

    pub async fn len(&self) -> usize {
        self.links.lock().await.len()
    }

    /// Drop every sender, which closes the connection tasks.
    pub async fn clear(&self) {
        self.links.lock().await.clear();
    }

    pub async fn send_frame(&self, conn: ConnId, frame: Bytes) -> bool {
        let links = self.links.lock().await;
        match links.get(&conn) {
            Some(tx) => tx.send(frame).is_ok(),
            None => {
                tracing::debug!("[net] [send_no_link] conn={}", conn);
                false
            }
        }
    }

    pub async fn send_to_conn<M: Message>(&self, conn: ConnId, msg: &M) -> bool {
        match encode_or_log(msg) {
            Some(frame) => self.send_frame(conn, frame).await,
            None => false,
        }
    }

    pub async fn send_to_list<M: Message>(&self, conns: &[ConnId], msg: &M) {
        let Some(frame) = encode_or_log(msg) else {
            return;
        };
        let links = self.links.lock().await;
        for conn in conns {
            if let Some(tx) = links.get(conn) {
                let _ = tx.send(frame.clone());
            }
        }
    }

    pub async fn send_to_all_conns<M: Message>(&self, msg: &M) {
        let Some(frame) = encode_or_log(msg) else {
            return;
        };
        for tx in self.links.lock().await.values() {
            let _ = tx.send(frame.clone());
        }
    }
}

impl GameState {
    /// Send to a connection only when it has a character in the world.
    pub async fn send_to_player<M: Message>(&self, conn: ConnId, msg: &M) {
        if self.world.contains(conn).await {
            self.net.send_to_conn(conn, msg).await;
        } else {
            tracing::warn!("[net] [send_not_playing] conn={} type={}", conn, M::TYPE);
        }
    }

    pub async fn send_to_all_players<M: Message>(&self, msg: &M) {
        let players = self.world.player_conns().await;
        self.net.send_to_list(&players, msg).await;
    }

    pub async fn send_to_all_players_but<M: Message>(&self, skip: ConnId, msg: &M) {
        let mut players = self.world.player_conns().await;
        players.retain(|c| *c != skip);
        self.net.send_to_list(&players, msg).await;
    }
}
