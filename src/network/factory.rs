//! Registry routing incoming frames to their handlers.
//!
//! Each message type is registered once together with the handler that
//! consumes it. The handler receives the decoded message and a context
//! value (`C`), which is the connection on the server and the bot itself
//! on the client.

use std::collections::HashMap;
use std::future::Future;

use futures::future::BoxFuture;
use thiserror::Error;

use super::codec::{CodecError, HEADER_SIZE};
use super::message::{peek_header, Message};
use super::msg_type::MsgType;

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("message type {msg_type} already registered")]
    Duplicate { msg_type: MsgType },

    #[error("no handler registered for message type {msg_type}")]
    UnknownType { msg_type: MsgType },

    #[error("frame of {len} bytes is shorter than the header")]
    ShortFrame { len: usize },

    #[error("cannot decode {msg_type}: {source}")]
    Decode {
        msg_type: MsgType,
        #[source]
        source: CodecError,
    },

    #[error("handler for {msg_type} failed: {source}")]
    Handler {
        msg_type: MsgType,
        #[source]
        source: anyhow::Error,
    },
}

type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;
type ErasedHandler<C> = dyn Fn(&[u8], C) -> Result<HandlerFuture, CodecError> + Send + Sync;

struct Entry<C> {
    type_name: &'static str,
    handler: Box<ErasedHandler<C>>,
}

pub struct MsgHdlFactory<C> {
    entries: HashMap<MsgType, Entry<C>>,
}

impl<C> Default for MsgHdlFactory<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> MsgHdlFactory<C> {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Register `handler` for messages of type `M`.
    ///
    /// A second registration of the same type is refused and the first one
    /// stays in place.
    pub fn register<M, F, Fut>(&mut self, handler: F) -> Result<(), FactoryError>
    where
        M: Message,
        C: 'static,
        F: Fn(M, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.entries.contains_key(&M::TYPE) {
            tracing::warn!(
                "[net] [factory_duplicate] type={} handler={}",
                M::TYPE,
                std::any::type_name::<M>()
            );
            return Err(FactoryError::Duplicate { msg_type: M::TYPE });
        }

        let erased = move |frame: &[u8], ctx: C| -> Result<HandlerFuture, CodecError> {
            let msg = M::decode(frame)?;
            Ok(Box::pin(handler(msg, ctx)))
        };
        self.entries.insert(
            M::TYPE,
            Entry { type_name: std::any::type_name::<M>(), handler: Box::new(erased) },
        );
        tracing::debug!("[net] [factory_register] type={}", M::TYPE);
        Ok(())
    }

    pub fn is_registered(&self, msg_type: MsgType) -> bool {
        self.entries.contains_key(&msg_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode one complete frame and run its handler to completion.
    pub async fn handle_stream(&self, frame: &[u8], ctx: C) -> Result<MsgType, FactoryError> {
        let (_, msg_type) = peek_header(frame).ok_or(FactoryError::ShortFrame { len: frame.len() })?;

        let Some(entry) = self.entries.get(&msg_type) else {
            tracing::error!(
                "[net] [factory_unknown] type={} id={:#010x} len={}",
                msg_type,
                msg_type.id(),
                frame.len()
            );
            return Err(FactoryError::UnknownType { msg_type });
        };

        let fut = match (entry.handler)(frame, ctx) {
            Ok(fut) => fut,
            Err(source) => {
                tracing::error!(
                    "[net] [factory_decode] type={} msg={} body={} err={}",
                    msg_type,
                    entry.type_name,
                    frame.len().saturating_sub(HEADER_SIZE),
                    source
                );
                return Err(FactoryError::Decode { msg_type, source });
            }
        };

        fut.await.map_err(|source| FactoryError::Handler { msg_type, source })?;
        Ok(msg_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::msgs::{MsgChat, MsgJoin, MsgLogin};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Seen = Arc<Mutex<Vec<String>>>;

    fn factory() -> MsgHdlFactory<Seen> {
        let mut f = MsgHdlFactory::new();
        f.register(|msg: MsgLogin, seen: Seen| async move {
            seen.lock().await.push(format!("login:{}", msg.username));
            Ok::<(), anyhow::Error>(())
        })
        .unwrap();
        f.register(|msg: MsgJoin, _seen: Seen| async move {
            Err::<(), _>(anyhow::anyhow!("cannot join {}", msg.charname))
        })
        .unwrap();
        f
    }

    #[tokio::test]
    async fn test_dispatch_runs_handler_once() {
        let f = factory();
        let seen: Seen = Arc::default();
        let frame = MsgLogin { username: "ann".into(), pw_md5sum: "x".into() }.encode().unwrap();

        let ty = f.handle_stream(&frame, seen.clone()).await.unwrap();
        assert_eq!(ty, MsgLogin::TYPE);
        assert_eq!(*seen.lock().await, vec!["login:ann".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let f = factory();
        let frame = MsgChat::system("x").encode().unwrap();
        let err = f.handle_stream(&frame, Arc::default()).await.unwrap_err();
        assert!(matches!(err, FactoryError::UnknownType { msg_type } if msg_type == MsgChat::TYPE));
    }

    #[tokio::test]
    async fn test_decode_failure_skips_handler() {
        let f = factory();
        let seen: Seen = Arc::default();
        // "Logi" frame with an unterminated string
        let frame = [0u8, 9, b'L', b'o', b'g', b'i', b'a', b'b', b'c'];
        let err = f.handle_stream(&frame, seen.clone()).await.unwrap_err();
        assert!(matches!(err, FactoryError::Decode { .. }));
        assert!(seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_is_reported() {
        let f = factory();
        let frame = MsgJoin { charname: "Bo".into() }.encode().unwrap();
        let err = f.handle_stream(&frame, Arc::default()).await.unwrap_err();
        assert!(matches!(err, FactoryError::Handler { .. }));
        assert!(err.to_string().contains("cannot join Bo"));
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let mut f = factory();
        let res = f.register(|_: MsgLogin, _: Seen| async { Ok::<(), anyhow::Error>(()) });
        assert!(matches!(res, Err(FactoryError::Duplicate { .. })));
        assert_eq!(f.len(), 2);
        assert!(f.is_registered(MsgLogin::TYPE));
    }

    #[tokio::test]
    async fn test_short_frame() {
        let f = factory();
        let err = f.handle_stream(&[0, 1, 2], Arc::default()).await.unwrap_err();
        assert!(matches!(err, FactoryError::ShortFrame { len: 3 }));
    }
}
