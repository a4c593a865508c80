//! TCP transport: listening, accepting and connecting.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};

/// Backlog used by every listener of the server.
pub const LISTEN_BACKLOG: u32 = 8;

/// How long an outgoing connection may take.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("cannot resolve '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{host}' resolved to no address")]
    NoAddress { host: String },

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {addr} timed out")]
    Timeout { addr: SocketAddr },
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, SocketError> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|source| SocketError::Resolve { host: host.to_string(), source })?;
    addrs.next().ok_or_else(|| SocketError::NoAddress { host: host.to_string() })
}

/// Listen on `host:port` with `SO_REUSEADDR` set.
pub async fn listen(host: &str, port: u16, backlog: u32) -> Result<TcpListener, SocketError> {
    let addr = resolve(host, port).await?;
    let socket = (if addr.is_ipv4() { TcpSocket::new_v4() } else { TcpSocket::new_v6() })
        .map_err(|source| SocketError::Bind { addr, source })?;
    socket
        .set_reuseaddr(true)
        .map_err(|source| SocketError::Bind { addr, source })?;
    socket.bind(addr).map_err(|source| SocketError::Bind { addr, source })?;
    let listener = socket
        .listen(backlog)
        .map_err(|source| SocketError::Listen { addr, source })?;
    tracing::debug!("[net] [listen] addr={} backlog={}", addr, backlog);
    Ok(listener)
}

/// Turn off Nagle on a game link. Failures are logged and the link kept.
pub fn set_nodelay(stream: &TcpStream, peer: SocketAddr) -> bool {
    match stream.set_nodelay(true) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("[net] [nodelay_failed] peer={} err={}", peer, e);
            false
        }
    }
}

/// Connect to `host:port`, resolving names, within [`CONNECT_TIMEOUT`].
pub async fn connect(host: &str, port: u16) -> Result<(TcpStream, SocketAddr), SocketError> {
    let addr = resolve(host, port).await?;
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| SocketError::Timeout { addr })?
        .map_err(|source| SocketError::Connect { addr, source })?;
    set_nodelay(&stream, addr);
    tracing::debug!("[net] [connected] addr={}", addr);
    Ok((stream, addr))
}
