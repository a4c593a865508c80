//! Game server: accounts, characters, the shared world and its clock.
//!
//! One [`GameState`] is shared by every connection task. Each manager owns
//! its own lock and no code path holds two of them at once: data is cloned
//! out, the lock released, then messages are sent.

pub mod commands;
pub mod console;
pub mod contacts;
pub mod db;
pub mod handlers;
pub mod login;
pub mod net;
pub mod time;
pub mod world;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::command::CommandMgr;
use crate::config::ServerConfig;
use crate::core::{LogLevelSetter, ServerState, SERVER_TICK_RATE};
use crate::network::ping::PingServer;
use crate::network::socket::{self, LISTEN_BACKLOG};
use crate::network::{LinkEnd, MsgHdlFactory, Netlink};

use db::{GameStore, MemoryStore};
use login::LoginMgr;
use net::NetworkMgr;
use time::TimeMgr;
use world::WorldMgr;

/// Identifies one client connection for its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Context handed to every message handler.
#[derive(Clone)]
pub struct ConnCtx {
    pub state: Arc<GameState>,
    pub conn: ConnId,
}

pub struct GameState {
    pub config: ServerConfig,
    pub store: Arc<dyn GameStore>,
    pub started_at: Instant,
    pub login: LoginMgr,
    pub world: WorldMgr,
    pub time: TimeMgr,
    pub net: NetworkMgr,
    pub factory: MsgHdlFactory<ConnCtx>,
    pub commands: CommandMgr<GameState>,
    pub lifecycle: ServerState,
    next_conn_id: AtomicU64,
    log_level: Option<LogLevelSetter>,
}

impl GameState {
    /// Build the server state. The game time is read from the store.
    pub async fn new(config: ServerConfig, store: Arc<dyn GameStore>) -> Result<Self> {
        let game_time = store
            .load_game_time()
            .await
            .context("cannot load the game time")?
            .unwrap_or(0);
        tracing::info!("[game] [time_loaded] minutes={}", game_time);

        let mut factory = MsgHdlFactory::new();
        handlers::register_all(&mut factory)?;
        let mut commands = CommandMgr::new();
        commands::register_all(&mut commands);

        Ok(Self {
            config,
            store,
            started_at: Instant::now(),
            login: LoginMgr::new(),
            world: WorldMgr::new(),
            time: TimeMgr::new(game_time),
            net: NetworkMgr::new(),
            factory,
            commands,
            lifecycle: ServerState::new(),
            next_conn_id: AtomicU64::new(1),
            log_level: None,
        })
    }

    /// Let the `loglevel` command change the active filter.
    pub fn with_log_control(mut self, setter: LogLevelSetter) -> Self {
        self.log_level = Some(setter);
        self
    }

    pub fn log_level_setter(&self) -> Option<&LogLevelSetter> {
        self.log_level.as_ref()
    }

    /// State over an empty in-memory store with default settings.
    pub async fn test_only() -> Result<Arc<Self>> {
        let store: Arc<dyn GameStore> = Arc::new(MemoryStore::new());
        Ok(Arc::new(Self::new(ServerConfig::default(), store).await?))
    }

    /// Register a new connection. Frames for it arrive on the returned
    /// receiver.
    pub async fn add_connection(&self, peer: SocketAddr) -> (ConnId, UnboundedReceiver<Bytes>) {
        let conn = ConnId(self.next_conn_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.net.register(conn, tx).await;
        self.login.insert(conn, peer).await;
        tracing::info!("[game] [conn_added] conn={} peer={}", conn, peer);
        (conn, rx)
    }

    /// Forget a connection. A character still in the world is removed and
    /// saved first.
    pub async fn remove_connection(&self, conn: ConnId) {
        if self.login.is_playing(conn).await {
            self.remove_player(conn).await;
        }
        self.net.unregister(conn).await;
        if let Some(data) = self.login.remove(conn).await {
            tracing::info!(
                "[game] [conn_removed] conn={} peer={} user={}",
                conn,
                data.peer,
                data.username
            );
        }
    }

    /// Listen, serve clients and tick until shutdown, then save.
    pub async fn run(state: Arc<Self>) -> Result<()> {
        let net = &state.config.network;
        let listener = socket::listen(&net.address, net.port, LISTEN_BACKLOG)
            .await
            .context("cannot start the game listener")?;
        tracing::info!("[game] [ready] addr={}:{}", net.address, net.port);

        match net.port.checked_sub(1).filter(|p| *p > 0) {
            Some(ping_port) => match PingServer::bind(&net.address, ping_port).await {
                Ok(ping) => {
                    tokio::spawn(ping.run());
                }
                Err(e) => tracing::error!("[game] [ping_failed] port={} err={}", ping_port, e),
            },
            None => tracing::warn!("[game] [ping_skipped] port={}", net.port),
        }

        let accept = tokio::spawn(Self::serve(Arc::clone(&state), listener));
        state.tick_loop().await;
        accept.abort();
        state.finalize().await;
        Ok(())
    }

    /// Accept clients until shutdown is requested.
    pub async fn serve(state: Arc<Self>, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = state.lifecycle.wait_for_shutdown() => return,
            };
            let (stream, peer) = match accepted {
                Ok(a) => a,
                Err(e) => {
                    tracing::error!("[game] [accept_failed] err={}", e);
                    continue;
                }
            };

            let max = state.config.network.max_players;
            if state.login.connection_count().await >= max {
                tracing::warn!("MaxPlayers={} reached, rejecting connection from {}", max, peer);
                drop(stream);
                continue;
            }

            let s = Arc::clone(&state);
            tokio::spawn(async move {
                Self::handle_new_connection(s, stream, peer).await;
            });
        }
    }

    async fn handle_new_connection(state: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        socket::set_nodelay(&stream, peer);
        let (conn, mut outgoing) = state.add_connection(peer).await;
        let (mut reader, mut writer) = stream.into_split();
        let mut link = Netlink::new(peer);
        let ctx = ConnCtx { state: Arc::clone(&state), conn };

        match link.drive(&mut reader, &mut writer, &mut outgoing, &state.factory, ctx).await {
            Ok(LinkEnd::PeerClosed) => tracing::info!("[game] [peer_closed] conn={}", conn),
            Ok(LinkEnd::LocalClosed) => tracing::info!("[game] [link_closed] conn={}", conn),
            Err(e) => tracing::warn!("[game] [conn_error] conn={} err={}", conn, e),
        }
        drop(link);
        state.remove_connection(conn).await;
    }

    async fn tick_loop(&self) {
        let mut ticker = tokio::time::interval(SERVER_TICK_RATE);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last = Instant::now();
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.lifecycle.wait_for_shutdown() => return,
            }
            let now = Instant::now();
            let elapsed = now.duration_since(last).as_millis() as u64;
            last = now;
            self.time_tick(elapsed).await;
        }
    }

    /// Take every player out of the world (saving them), save the clock
    /// and close all links.
    pub async fn finalize(&self) {
        for conn in self.world.player_conns().await {
            self.remove_player(conn).await;
        }
        self.time_finalize().await;
        self.net.clear().await;
        tracing::info!("[game] [finalized]");
    }
}
