//! Per-connection framing and queues.
//!
//! A [`Netlink`] owns the receive work buffer, cut into frames as they
//! complete, and the queue of encoded frames waiting to be written. It does
//! no I/O on its own: callers hand it any `AsyncRead`/`AsyncWrite`, which
//! keeps it testable without sockets.

use std::collections::VecDeque;
use std::net::SocketAddr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;

use super::codec::{CodecError, HEADER_SIZE, PACKET_MAX_SIZE};
use super::factory::{FactoryError, MsgHdlFactory};
use super::message::Message;

/// Size of the receive work buffer.
pub const RECV_BUFFER_SIZE: usize = 2 * PACKET_MAX_SIZE;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("malformed frame from {peer}: declared length {length}")]
    MalformedFrame { peer: SocketAddr, length: usize },

    #[error("receive buffer full for {peer}: {buffered} bytes pending")]
    BufferOverflow { peer: SocketAddr, buffered: usize },

    #[error("message rejected: {0}")]
    Encode(#[from] CodecError),

    #[error("peer {peer} stopped accepting data")]
    WriteZero { peer: SocketAddr },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Traffic counters of one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetlinkStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
}

/// How a driven connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEnd {
    /// The peer closed its side.
    PeerClosed,
    /// Our own outgoing channel was closed, usually a kick or shutdown.
    LocalClosed,
}

#[derive(Debug, Default)]
struct RecvSide {
    buf: BytesMut,
    packets: u64,
    bytes: u64,
}

impl RecvSide {
    async fn read_from<R>(&mut self, peer: SocketAddr, reader: &mut R) -> Result<usize, NetError>
    where
        R: AsyncRead + Unpin,
    {
        let room = RECV_BUFFER_SIZE.saturating_sub(self.buf.len());
        if room == 0 {
            return Err(NetError::BufferOverflow { peer, buffered: self.buf.len() });
        }
        let want = room.min(PACKET_MAX_SIZE);
        self.buf.reserve(want);
        let mut limited = (&mut self.buf).limit(want);
        let n = reader.read_buf(&mut limited).await?;
        self.bytes += n as u64;
        Ok(n)
    }
}

#[derive(Debug, Default)]
struct SendSide {
    queue: VecDeque<Bytes>,
    packets: u64,
    bytes: u64,
}

impl SendSide {
    async fn write_some<W>(&mut self, peer: SocketAddr, writer: &mut W) -> Result<usize, NetError>
    where
        W: AsyncWrite + Unpin,
    {
        let Some(head) = self.queue.front_mut() else {
            return Ok(0);
        };
        let n = writer.write(&head[..]).await?;
        if n == 0 {
            return Err(NetError::WriteZero { peer });
        }
        if n >= head.len() {
            self.queue.pop_front();
        } else {
            head.advance(n);
        }
        self.bytes += n as u64;
        Ok(n)
    }
}

#[derive(Debug)]
pub struct Netlink {
    peer: SocketAddr,
    recv: RecvSide,
    send: SendSide,
}

impl Netlink {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            recv: RecvSide { buf: BytesMut::with_capacity(RECV_BUFFER_SIZE), ..Default::default() },
            send: SendSide::default(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stats(&self) -> NetlinkStats {
        NetlinkStats {
            packets_sent: self.send.packets,
            bytes_sent: self.send.bytes,
            packets_received: self.recv.packets,
            bytes_received: self.recv.bytes,
        }
    }

    // ============================================
    // Receiving
    // ============================================

    /// One read of at most `PACKET_MAX_SIZE` bytes into the work buffer.
    /// Returns the number of bytes read, `0` when the peer closed.
    pub async fn read_from<R>(&mut self, reader: &mut R) -> Result<usize, NetError>
    where
        R: AsyncRead + Unpin,
    {
        self.recv.read_from(self.peer, reader).await
    }

    /// Append already-received bytes to the work buffer.
    pub fn push_received(&mut self, data: &[u8]) -> Result<(), NetError> {
        let buffered = self.recv.buf.len() + data.len();
        if buffered > RECV_BUFFER_SIZE {
            return Err(NetError::BufferOverflow { peer: self.peer, buffered });
        }
        self.recv.buf.extend_from_slice(data);
        self.recv.bytes += data.len() as u64;
        Ok(())
    }

    /// Cut the next complete frame out of the work buffer.
    ///
    /// `Ok(None)` means more data is needed. A declared length outside
    /// `HEADER_SIZE..=PACKET_MAX_SIZE` can never be resynchronised, so it is
    /// reported and the connection must be dropped.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, NetError> {
        let buf = &mut self.recv.buf;
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }
        let length = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        if !(HEADER_SIZE..=PACKET_MAX_SIZE).contains(&length) {
            return Err(NetError::MalformedFrame { peer: self.peer, length });
        }
        if buf.len() < length {
            return Ok(None);
        }
        self.recv.packets += 1;
        Ok(Some(buf.split_to(length).freeze()))
    }

    pub fn bytes_buffered(&self) -> usize {
        self.recv.buf.len()
    }

    // ============================================
    // Sending
    // ============================================

    /// Encode and queue a message. Oversized messages are refused.
    pub fn send_msg<M: Message>(&mut self, msg: &M) -> Result<(), NetError> {
        let frame = msg.encode()?;
        self.queue_frame(frame);
        Ok(())
    }

    /// Queue an already-encoded frame.
    pub fn queue_frame(&mut self, frame: Bytes) {
        if frame.is_empty() {
            return;
        }
        self.send.queue.push_back(frame);
        self.send.packets += 1;
    }

    pub fn has_pending(&self) -> bool {
        !self.send.queue.is_empty()
    }

    pub fn bytes_in_send_queue(&self) -> usize {
        self.send.queue.iter().map(Bytes::len).sum()
    }

    /// Write as much of the queue head as the writer takes in one call.
    /// A partially written head keeps only its unsent tail.
    pub async fn write_some<W>(&mut self, writer: &mut W) -> Result<usize, NetError>
    where
        W: AsyncWrite + Unpin,
    {
        self.send.write_some(self.peer, writer).await
    }

    /// Write until the queue is empty.
    pub async fn flush<W>(&mut self, writer: &mut W) -> Result<(), NetError>
    where
        W: AsyncWrite + Unpin,
    {
        while self.has_pending() {
            self.write_some(writer).await?;
        }
        writer.flush().await?;
        Ok(())
    }

    // ============================================
    // Driving
    // ============================================

    /// Run the connection until either side closes it.
    ///
    /// Frames are dispatched through `factory` one at a time, in arrival
    /// order. Frames arriving on `outgoing` are queued and written as the
    /// socket accepts them.
    pub async fn drive<R, W, C>(
        &mut self,
        reader: &mut R,
        writer: &mut W,
        outgoing: &mut UnboundedReceiver<Bytes>,
        factory: &MsgHdlFactory<C>,
        ctx: C,
    ) -> Result<LinkEnd, NetError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        C: Clone,
    {
        loop {
            let pending = self.has_pending();
            let peer = self.peer;
            tokio::select! {
                read = self.recv.read_from(peer, reader) => {
                    if read? == 0 {
                        return Ok(LinkEnd::PeerClosed);
                    }
                    while let Some(frame) = self.next_frame()? {
                        match factory.handle_stream(&frame, ctx.clone()).await {
                            Ok(_) => {}
                            Err(FactoryError::Handler { msg_type, source }) => {
                                tracing::error!(
                                    "[net] [handler_failed] peer={} type={} err={:#}",
                                    peer, msg_type, source
                                );
                            }
                            // already logged by the factory
                            Err(_) => {}
                        }
                    }
                }
                frame = outgoing.recv() => match frame {
                    Some(frame) => self.queue_frame(frame),
                    None => {
                        self.flush(writer).await?;
                        return Ok(LinkEnd::LocalClosed);
                    }
                },
                written = self.send.write_some(peer, writer), if pending => {
                    written?;
                }
            }
        }
    }
}

impl Drop for Netlink {
    fn drop(&mut self) {
        let s = self.stats();
        let per = |bytes: u64, packets: u64| if packets == 0 { 0 } else { bytes / packets };
        tracing::debug!(
            "[net] [link_stats] peer={} sent={}p/{}b ({}b/p) recv={}p/{}b ({}b/p)",
            self.peer,
            s.packets_sent,
            s.bytes_sent,
            per(s.bytes_sent, s.packets_sent),
            s.packets_received,
            s.bytes_received,
            per(s.bytes_received, s.packets_received)
        );
    }
}
