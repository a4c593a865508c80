//! Headless scripted client.
//!
//! The bot speaks the same protocol as the graphical client. It is driven by
//! console commands (startup script or stdin) and by the `auto` steps, which
//! chain connect, login and join as soon as the previous one succeeds.

pub mod commands;
pub mod handlers;

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use md5::{Digest, Md5};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use crate::command::{CommandMgr, CommandOutput, PermLevel};
use crate::config::BotConfig;
use crate::core::{LogLevelSetter, ServerState};
use crate::network::msgs::{
    CharacterSummary, MsgChat, MsgConnect, MsgContactStatus, MsgLogin, MsgPlayerData,
};
use crate::network::socket;
use crate::network::{LinkEnd, Message, MsgHdlFactory, Netlink};

/// Chat lines kept in [`BotStatus::chat_log`].
pub const CHAT_LOG_LINES: usize = 64;

/// Hash a password the way it travels in `Logi` and `NUsr`.
pub fn password_hash(password: &str) -> String {
    hex::encode(Md5::new().chain_update(password).finalize())
}

/// Steps the bot can take on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoStep {
    Connect,
    Login,
    Join,
}

/// What the bot knows about its session, as told by the server.
#[derive(Debug, Clone, Default)]
pub struct BotStatus {
    pub logged_in: bool,
    pub characters: Vec<CharacterSummary>,
    pub joined: bool,
    /// Entity of our own character once in the world.
    pub entity_id: Option<u64>,
    /// Other entities in sight, by id.
    pub entities: BTreeMap<u64, String>,
    pub game_time: Option<u32>,
    pub player_data: Option<MsgPlayerData>,
    pub contacts: BTreeMap<String, MsgContactStatus>,
    pub chat_log: VecDeque<MsgChat>,
}

impl BotStatus {
    fn reset_session(&mut self) {
        *self = BotStatus { chat_log: std::mem::take(&mut self.chat_log), ..Default::default() };
    }

    pub(crate) fn push_chat(&mut self, msg: MsgChat) {
        if self.chat_log.len() == CHAT_LOG_LINES {
            self.chat_log.pop_front();
        }
        self.chat_log.push_back(msg);
    }
}

struct BotLink {
    id: u64,
    peer: SocketAddr,
    tx: UnboundedSender<Bytes>,
}

pub struct Bot {
    pub config: BotConfig,
    pub factory: MsgHdlFactory<Arc<Bot>>,
    pub commands: CommandMgr<Arc<Bot>>,
    pub lifecycle: ServerState,
    auto_connect: AtomicBool,
    auto_login: AtomicBool,
    auto_join: AtomicBool,
    link: Mutex<Option<BotLink>>,
    status: Mutex<BotStatus>,
    next_link_id: AtomicU64,
    log_level: Option<LogLevelSetter>,
}

impl Bot {
    pub fn new(config: BotConfig) -> Result<Self> {
        let mut factory = MsgHdlFactory::new();
        handlers::register_all(&mut factory)?;
        let mut commands = CommandMgr::new();
        commands::register_all(&mut commands);

        let auto = config.auto;
        Ok(Self {
            config,
            factory,
            commands,
            lifecycle: ServerState::new(),
            auto_connect: AtomicBool::new(auto.connect),
            auto_login: AtomicBool::new(auto.login),
            auto_join: AtomicBool::new(auto.join),
            link: Mutex::new(None),
            status: Mutex::new(BotStatus::default()),
            next_link_id: AtomicU64::new(1),
            log_level: None,
        })
    }

    pub fn with_log_control(mut self, setter: LogLevelSetter) -> Self {
        self.log_level = Some(setter);
        self
    }

    pub fn log_level_setter(&self) -> Option<&LogLevelSetter> {
        self.log_level.as_ref()
    }

    fn auto_flag(&self, step: AutoStep) -> &AtomicBool {
        match step {
            AutoStep::Connect => &self.auto_connect,
            AutoStep::Login => &self.auto_login,
            AutoStep::Join => &self.auto_join,
        }
    }

    pub fn set_auto(&self, step: AutoStep) {
        self.auto_flag(step).store(true, Ordering::SeqCst);
    }

    pub fn auto(&self, step: AutoStep) -> bool {
        self.auto_flag(step).load(Ordering::SeqCst)
    }

    /// Snapshot of the session state.
    pub async fn status(&self) -> BotStatus {
        self.status.lock().await.clone()
    }

    pub(crate) async fn update_status<R>(&self, f: impl FnOnce(&mut BotStatus) -> R) -> R {
        f(&mut *self.status.lock().await)
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_some()
    }

    pub async fn server_addr(&self) -> Option<SocketAddr> {
        self.link.lock().await.as_ref().map(|l| l.peer)
    }

    // ============================================
    // Connection
    // ============================================

    /// Open a connection and send `Conn`. Returns `false` when a
    /// connection is already up.
    pub async fn connect_to_server(bot: &Arc<Self>, host: &str, port: u16) -> Result<bool> {
        if bot.is_connected().await {
            tracing::warn!("Already connected, refusing to connect again");
            return Ok(false);
        }
        let (stream, peer) = socket::connect(host, port)
            .await
            .with_context(|| format!("cannot connect to {}:{}", host, port))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = bot.next_link_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut link = bot.link.lock().await;
            if link.is_some() {
                tracing::warn!("Already connected, refusing to connect again");
                return Ok(false);
            }
            *link = Some(BotLink { id, peer, tx });
        }
        tracing::info!("[bot] [connected] peer={} link={}", peer, id);

        tokio::spawn(Self::run_link(
            Arc::clone(bot),
            id,
            stream,
            peer,
            rx,
            host.to_string(),
            port,
        ));
        bot.send_to_server(&MsgConnect).await;
        Ok(true)
    }

    /// Connect to the host and port of the config file.
    pub async fn connect_to_config(bot: &Arc<Self>) -> Result<bool> {
        let settings = &bot.config.settings;
        Self::connect_to_server(bot, &settings.hostname, settings.port).await
    }

    /// Close the connection on purpose. No reconnection follows.
    pub async fn disconnect(&self) -> bool {
        let Some(link) = self.link.lock().await.take() else {
            return false;
        };
        tracing::info!("[bot] [disconnect] peer={} link={}", link.peer, link.id);
        self.update_status(BotStatus::reset_session).await;
        true
    }

    /// Queue a message for the server.
    pub async fn send_to_server<M: Message>(&self, msg: &M) -> bool {
        let link = self.link.lock().await;
        let Some(link) = link.as_ref() else {
            tracing::error!("No connection, a message was dropped");
            return false;
        };
        let frame = match msg.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Message '{}' could not be sent ({}), too big?", M::TYPE, e);
                return false;
            }
        };
        if link.tx.send(frame).is_err() {
            tracing::error!("Message could not be sent to server");
            return false;
        }
        true
    }

    /// Log in with the account of the config file.
    pub async fn login_with_config(&self) -> bool {
        let settings = &self.config.settings;
        let login = MsgLogin {
            username: settings.user.clone(),
            pw_md5sum: password_hash(&settings.password),
        };
        self.send_to_server(&login).await
    }

    async fn run_link(
        bot: Arc<Self>,
        id: u64,
        stream: TcpStream,
        peer: SocketAddr,
        mut outgoing: UnboundedReceiver<Bytes>,
        host: String,
        port: u16,
    ) {
        let (mut reader, mut writer) = stream.into_split();
        let mut link = Netlink::new(peer);
        let end = link
            .drive(&mut reader, &mut writer, &mut outgoing, &bot.factory, Arc::clone(&bot))
            .await;
        drop(link);

        let lost = match end {
            Ok(LinkEnd::LocalClosed) => false,
            Ok(LinkEnd::PeerClosed) => true,
            Err(e) => {
                tracing::warn!("[bot] [link_error] peer={} err={}", peer, e);
                true
            }
        };
        if !lost {
            return;
        }

        // a newer link may already have replaced this one
        let current = {
            let mut link = bot.link.lock().await;
            let current = link.as_ref().is_some_and(|l| l.id == id);
            if current {
                *link = None;
            }
            current
        };
        if !current {
            tracing::debug!("[bot] [stale_link_closed] id={} peer={}", id, peer);
            return;
        }
        tracing::info!("Connection to server lost");
        bot.update_status(BotStatus::reset_session).await;

        if bot.config.reconnect.enabled && !bot.lifecycle.should_shutdown() {
            Self::reconnect(bot, host, port).await;
        }
    }

    fn reconnect(bot: Arc<Self>, host: String, port: u16) -> BoxFuture<'static, ()> {
        async move {
            let policy = bot.config.reconnect;
            let delay = Duration::from_secs(policy.delay_secs);
            for attempt in 1..=policy.max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = bot.lifecycle.wait_for_shutdown() => return,
                }
                tracing::info!(
                    "[bot] [reconnect] attempt={}/{} addr={}:{}",
                    attempt,
                    policy.max_attempts,
                    host,
                    port
                );
                match Self::connect_to_server(&bot, &host, port).await {
                    Ok(_) => return,
                    Err(e) => {
                        tracing::warn!("[bot] [reconnect_failed] attempt={} err={:#}", attempt, e)
                    }
                }
            }
            tracing::error!("[bot] [reconnect_gave_up] attempts={}", policy.max_attempts);
        }
        .boxed()
    }

    // ============================================
    // Console
    // ============================================

    /// Run one console line. A leading `/` is optional.
    pub async fn execute_line(bot: &Arc<Self>, line: &str) -> CommandOutput {
        let line = line.trim();
        let line = line.strip_prefix('/').unwrap_or(line);
        bot.commands.execute(line, PermLevel::Admin, bot).await
    }

    /// Run every line of a script. Blank lines and `#` comments are skipped.
    pub async fn run_script(bot: &Arc<Self>, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let script = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read startup script {}", path.display()))?;
        tracing::info!("[bot] [script] path={}", path.display());
        for line in script.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            tracing::info!("> {}", line);
            let out = Self::execute_line(bot, line).await;
            for reply in out.as_str().lines() {
                tracing::info!("{}", reply);
            }
        }
        Ok(())
    }

    /// Run the startup script, take the auto connect step and wait until
    /// someone asks the bot to stop.
    pub async fn run(bot: Arc<Self>) -> Result<()> {
        if let Some(script) = bot.config.runtime.startup_script.clone() {
            if let Err(e) = Self::run_script(&bot, &script).await {
                tracing::error!("[bot] [script_failed] err={:#}", e);
            }
        }

        if bot.auto(AutoStep::Connect) && !bot.is_connected().await {
            tracing::info!("Auto connecting...");
            if let Err(e) = Self::connect_to_config(&bot).await {
                tracing::error!("Cannot connect to server: {:#}", e);
                if bot.config.reconnect.enabled {
                    let settings = &bot.config.settings;
                    tokio::spawn(Self::reconnect(
                        Arc::clone(&bot),
                        settings.hostname.clone(),
                        settings.port,
                    ));
                }
            }
        }

        bot.lifecycle.wait_for_shutdown().await;
        bot.disconnect().await;
        tracing::info!("[bot] [stopped]");
        Ok(())
    }
}
