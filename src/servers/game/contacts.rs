//! Friend and ignore lists, and on-line notifications about them.

use super::login::PlayerEntity;
use super::{ConnId, GameState};
use crate::network::msgs::contact::{CONTACT_CONNECTED, CONTACT_DISCONNECTED};
use crate::network::msgs::{MsgChat, MsgContactAdd, MsgContactDel, MsgContactStatus};

impl GameState {
    /// Reply to a player with a system line.
    pub async fn send_console_reply(&self, conn: ConnId, text: impl Into<String>) {
        self.send_to_player(conn, &MsgChat::system(text)).await;
    }

    pub async fn add_contact(&self, conn: ConnId, msg: MsgContactAdd) {
        let Some(player) = self.login.get(conn).await.and_then(|d| d.entity) else {
            tracing::error!("[contact] [add_not_playing] conn={}", conn);
            return;
        };
        tracing::info!(
            "[contact] [add_request] char={} contact={} type={} comment='{}'",
            player.name,
            msg.charname,
            msg.contact_type as char,
            msg.comment
        );

        match self.store.has_contact(player.id, &msg.charname).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::warn!("[contact] [duplicate] char={} contact={}", player.name, msg.charname);
                self.send_console_reply(
                    conn,
                    "Add contact failed: You already have this player in your contact list",
                )
                .await;
                return;
            }
            Err(e) => {
                tracing::error!("[contact] [db_error] op=has_contact err={}", e);
                self.send_console_reply(conn, "Add contact failed: There was a DB error trying to add it")
                    .await;
                return;
            }
        }

        let other = match self.store.find_character(&msg.charname).await {
            Ok(Some(other)) => other,
            Ok(None) => {
                tracing::warn!("[contact] [no_such_char] name={}", msg.charname);
                self.send_console_reply(conn, "Add contact failed (bad contact character name).")
                    .await;
                return;
            }
            Err(e) => {
                tracing::error!("[contact] [db_error] op=find_character err={}", e);
                self.send_console_reply(conn, "Add contact failed: There was a DB error trying to add it")
                    .await;
                return;
            }
        };

        if let Err(e) = self.store.add_contact(player.id, other.cid, msg.contact_type, &msg.comment).await {
            tracing::error!("[contact] [db_error] op=add_contact err={}", e);
            self.send_console_reply(conn, "Add contact failed: There was a DB error trying to add it")
                .await;
            return;
        }
        tracing::info!("[contact] [added] char={} contact={}", player.name, other.name);
        self.send_console_reply(conn, "Info: Successfully added contact").await;

        let status = MsgContactStatus {
            charname: other.name.clone(),
            contact_type: msg.contact_type,
            status: CONTACT_DISCONNECTED,
            last_login: other.last_login,
            comment: msg.comment,
        };
        let online = self.login.find_by_name(&other.name).await.is_some();
        self.notify_one_contact(conn, status, online).await;
    }

    pub async fn remove_contact(&self, conn: ConnId, msg: MsgContactDel) {
        let Some(player) = self.login.get(conn).await.and_then(|d| d.entity) else {
            tracing::error!("[contact] [del_not_playing] conn={}", conn);
            return;
        };
        let removed = match self.store.find_character(&msg.charname).await {
            Ok(Some(other)) => self.store.remove_contact(player.id, other.cid).await,
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        };
        match removed {
            Ok(true) => {
                tracing::info!("[contact] [removed] char={} contact={}", player.name, msg.charname);
                self.send_console_reply(conn, "Successfully removed contact").await;
            }
            Ok(false) => {
                tracing::warn!("[contact] [remove_missing] char={} contact={}", player.name, msg.charname);
                self.send_console_reply(conn, "No such player in your contact list").await;
            }
            Err(e) => {
                tracing::error!("[contact] [db_error] op=remove_contact err={}", e);
                self.send_console_reply(conn, "No such player in your contact list").await;
            }
        }
    }

    /// Tell `conn` whether one of its contacts is on-line.
    async fn notify_one_contact(&self, conn: ConnId, mut status: MsgContactStatus, online: bool) {
        status.status = if online { CONTACT_CONNECTED } else { CONTACT_DISCONNECTED };
        let text = format!(
            "Your contact '{}' is {}",
            status.charname,
            if online { "on-line" } else { "off-line" }
        );
        self.send_console_reply(conn, text).await;
        self.send_to_player(conn, &status).await;
    }

    /// A player entered or left the world.
    pub async fn player_status_change(&self, conn: ConnId, connected: bool) {
        let Some(entity) = self.login.get(conn).await.and_then(|d| d.entity) else {
            return;
        };
        if connected {
            self.notify_player_of_contacts(conn, &entity).await;
        }
        self.player_status_change_entity(&entity, connected).await;
    }

    async fn notify_player_of_contacts(&self, conn: ConnId, entity: &PlayerEntity) {
        let links = match self.store.contacts_of(entity.id).await {
            Ok(links) => links,
            Err(e) => {
                tracing::error!("[contact] [db_error] op=contacts_of char={} err={}", entity.name, e);
                return;
            }
        };
        if links.is_empty() {
            tracing::debug!("[contact] [none] char={}", entity.name);
            return;
        }
        let count = links.len();
        for link in links {
            let online = self.login.find_by_name(&link.contact_name).await.is_some();
            let status = MsgContactStatus {
                charname: link.contact_name,
                contact_type: link.contact_type,
                status: CONTACT_DISCONNECTED,
                last_login: link.last_login,
                comment: link.comment,
            };
            self.notify_one_contact(conn, status, online).await;
        }
        tracing::debug!("[contact] [status_sent] char={} contacts={}", entity.name, count);
    }

    /// Tell every playing character listing `entity` about its new status.
    pub(super) async fn player_status_change_entity(&self, entity: &PlayerEntity, connected: bool) {
        let links = match self.store.watchers_of(entity.id).await {
            Ok(links) => links,
            Err(e) => {
                tracing::error!("[contact] [db_error] op=watchers_of char={} err={}", entity.name, e);
                return;
            }
        };
        for link in links {
            let Some(watcher) = self.login.find_by_name(&link.owner_name).await else {
                continue;
            };
            let status = MsgContactStatus {
                charname: entity.name.clone(),
                contact_type: link.contact_type,
                status: CONTACT_DISCONNECTED,
                last_login: link.last_login,
                comment: link.comment,
            };
            self.notify_one_contact(watcher.conn, status, connected).await;
        }
    }
}
