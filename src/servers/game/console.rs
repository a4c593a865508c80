//! Chat routing and console commands, in game and on the server console.

use std::path::Path;

use anyhow::{Context, Result};

use super::{ConnId, GameState};
use crate::command::{CommandOutput, PermLevel};
use crate::network::msgs::{ChatType, MsgChat, MsgCommand};

impl GameState {
    /// Deliver a chat line: to the players around when it has no target,
    /// as a private message otherwise.
    pub async fn process_chat(&self, conn: ConnId, mut msg: MsgChat) {
        let Some(sender) = self.login.get(conn).await.filter(|d| d.playing) else {
            tracing::error!("[chat] [not_playing] conn={}", conn);
            return;
        };
        if msg.text.is_empty() {
            tracing::warn!("[chat] [empty] char={}", sender.charname);
            return;
        }
        msg.origin = sender.charname.clone();

        if msg.target.is_empty() {
            msg.chat_type = ChatType::Chat;
            let near = self.nearby_players(conn, self.config.chat.say_radius).await;
            tracing::debug!("[chat] [say] char={} listeners={}", sender.charname, near.len());
            self.net.send_to_list(&near, &msg).await;
            return;
        }

        msg.chat_type = ChatType::Pm;
        match self.login.find_by_name(&msg.target).await {
            Some(target) => {
                tracing::debug!("[chat] [pm] from={} to={}", sender.charname, msg.target);
                self.send_to_player(target.conn, &msg).await;
            }
            None => {
                tracing::debug!("[chat] [pm_bounced] from={} to={}", sender.charname, msg.target);
                msg.text = format!("{} [player '{}' not found]", msg.text, msg.target);
                msg.target = sender.charname;
                self.send_to_player(conn, &msg).await;
            }
        }
    }

    /// Run a console line at the player's permission level and reply with
    /// the output.
    pub async fn process_command(&self, conn: ConnId, msg: MsgCommand) {
        let Some(player) = self.login.get(conn).await.filter(|d| d.playing) else {
            tracing::error!("[cmd] [not_playing] conn={}", conn);
            return;
        };
        if msg.command.is_empty() {
            tracing::warn!("[cmd] [empty] char={}", player.charname);
            return;
        }
        tracing::info!("[cmd] [player] char={} line='{}'", player.charname, msg.command);
        let out = self.commands.execute(&msg.command, player.perm, self).await;
        if !out.is_empty() {
            self.send_console_reply(conn, out.into_string()).await;
        }
    }

    /// Run a line typed on the server console, at ADMIN level. A leading
    /// `/` is optional.
    pub async fn execute_console_line(&self, line: &str) -> CommandOutput {
        let line = line.trim();
        let line = line.strip_prefix('/').unwrap_or(line);
        self.commands.execute(line, PermLevel::Admin, self).await
    }

    /// Run every non-empty line of `path` as an ADMIN command.
    pub async fn run_startup_script(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let script = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read startup script {}", path.display()))?;
        tracing::info!("[console] [script] path={}", path.display());
        for line in script.lines().map(str::trim).filter(|l| !l.is_empty()) {
            tracing::info!("> {}", line);
            let out = self.execute_console_line(line).await;
            for reply in out.as_str().lines() {
                tracing::info!("{}", reply);
            }
        }
        Ok(())
    }
}
