//! Latency probes on a side port.
//!
//! A ping is exactly 6 bytes: the server id (u16 BE) chosen by the client
//! and a client timestamp (u32 BE). The server echoes it unchanged, so the
//! client can compute the round trip from the timestamp it gets back.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::socket::{self, SocketError, LISTEN_BACKLOG};

pub const PING_SIZE: usize = 6;

pub fn encode_ping(id: u16, timestamp: u32) -> [u8; PING_SIZE] {
    let mut buf = [0u8; PING_SIZE];
    buf[..2].copy_from_slice(&id.to_be_bytes());
    buf[2..].copy_from_slice(&timestamp.to_be_bytes());
    buf
}

pub fn decode_ping(buf: &[u8]) -> Option<(u16, u32)> {
    if buf.len() != PING_SIZE {
        return None;
    }
    let id = u16::from_be_bytes([buf[0], buf[1]]);
    let ts = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
    Some((id, ts))
}

// ============================================
// Server side
// ============================================

pub struct PingServer {
    listener: TcpListener,
}

impl PingServer {
    pub async fn bind(host: &str, port: u16) -> Result<Self, SocketError> {
        let listener = socket::listen(host, port, LISTEN_BACKLOG).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept ping clients forever, one echo task each.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!("[ping] [ready] addr={}", addr);
        }
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tokio::spawn(echo_client(stream, peer));
                }
                Err(e) => {
                    tracing::warn!("[ping] [accept_failed] err={}", e);
                }
            }
        }
    }
}

async fn echo_client(mut stream: TcpStream, peer: SocketAddr) {
    let mut buf = [0u8; 64];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => {
                tracing::debug!("[ping] [client_gone] peer={}", peer);
                return;
            }
            Ok(n) => n,
        };
        if n != PING_SIZE {
            tracing::debug!("[ping] [bad_request] peer={} len={}", peer, n);
            continue;
        }
        if let Err(e) = stream.write_all(&buf[..PING_SIZE]).await {
            tracing::debug!("[ping] [reply_failed] peer={} err={}", peer, e);
            return;
        }
    }
}

// ============================================
// Client side
// ============================================

/// Latest state of one pinged server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReply {
    pub id: u16,
    pub addr: SocketAddr,
    pub alive: bool,
    /// Timestamp echoed by the last reply, 0 when none arrived.
    pub timestamp: u32,
}

struct PingTarget {
    id: u16,
    addr: SocketAddr,
    stream: Option<TcpStream>,
    timestamp: u32,
}

#[derive(Default)]
pub struct PingClient {
    targets: Vec<PingTarget>,
}

impl PingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_server(&mut self, host: &str, port: u16, id: u16) -> Result<(), SocketError> {
        let (stream, addr) = socket::connect(host, port).await?;
        tracing::info!("[ping] [server_added] host={} port={} id={}", host, port, id);
        self.targets.push(PingTarget { id, addr, stream: Some(stream), timestamp: 0 });
        Ok(())
    }

    pub async fn send_pings(&mut self, timestamp: u32) {
        for t in &mut self.targets {
            let Some(stream) = t.stream.as_mut() else { continue };
            if let Err(e) = stream.write_all(&encode_ping(t.id, timestamp)).await {
                tracing::debug!("[ping] [send_failed] id={} err={}", t.id, e);
            }
        }
    }

    /// Collect whatever replies arrived, without waiting.
    pub fn process_replies(&mut self) {
        let mut buf = [0u8; 64];
        for t in &mut self.targets {
            let Some(stream) = t.stream.as_ref() else { continue };
            match stream.try_read(&mut buf) {
                Ok(0) => {
                    tracing::debug!("[ping] [server_gone] id={} addr={}", t.id, t.addr);
                    t.stream = None;
                }
                Ok(n) => match decode_ping(&buf[..n]) {
                    Some((id, ts)) => {
                        t.timestamp = ts;
                        if id != t.id {
                            tracing::debug!("[ping] [id_mismatch] sent={} got={}", t.id, id);
                        }
                    }
                    None => {
                        tracing::debug!("[ping] [bad_reply] id={} len={}", t.id, n);
                        t.timestamp = 0;
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => t.timestamp = 0,
                Err(e) => {
                    tracing::debug!("[ping] [read_failed] id={} err={}", t.id, e);
                    t.stream = None;
                }
            }
        }
    }

    pub fn replies(&self) -> Vec<PingReply> {
        self.targets
            .iter()
            .map(|t| PingReply { id: t.id, addr: t.addr, alive: t.stream.is_some(), timestamp: t.timestamp })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ping_layout() {
        let buf = encode_ping(0x0102, 0x0304_0506);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6]);
        assert_eq!(decode_ping(&buf), Some((0x0102, 0x0304_0506)));
        assert_eq!(decode_ping(&buf[..5]), None);
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let server = PingServer::bind("127.0.0.1", 0).await.unwrap();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(server.run());

        let mut client = PingClient::new();
        client.add_server("127.0.0.1", port, 7).await.unwrap();
        client.send_pings(123_456).await;

        let mut got = 0;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            client.process_replies();
            got = client.replies()[0].timestamp;
            if got != 0 {
                break;
            }
        }
        assert_eq!(got, 123_456);
        assert!(client.replies()[0].alive);
    }

    #[tokio::test]
    async fn test_bad_request_not_echoed() {
        let server = PingServer::bind("127.0.0.1", 0).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&[1, 2, 3]).await.unwrap();
        let mut buf = [0u8; 8];
        let res = tokio::time::timeout(Duration::from_millis(100), stream.read(&mut buf)).await;
        assert!(res.is_err(), "server must stay silent on a short ping");
    }
}
