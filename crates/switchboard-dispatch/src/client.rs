//! # In-Process Client
//!
//! The consuming side of the routing layer for same-process servers: sends
//! typed requests through the engine, correlates reply frames back to the
//! awaiting caller, and exposes sequential streams. A caller observes exactly
//! the three wire signals (a value, a successful terminator, or an opaque
//! failure) and never handler-internal detail.

use crate::codec::{self, CodecError};
use crate::engine::DispatchEngine;
use crate::transport::{InMemoryTransport, TransportFrame};
use bytes::Bytes;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use switchboard_types::{
    ConnectionContext, CorrelationId, InboundMessage, ReplyFrame, RequestFailure, RouteId,
    SessionId,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tracing::debug;

/// Errors a caller can observe.
#[derive(Debug, Error)]
pub enum CallError {
    /// The server rejected or failed the request. Carries no
    /// handler-internal detail.
    #[error("request failed: {0}")]
    Failed(RequestFailure),

    /// A value failed to encode or decode at the caller side.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The connection went away before the exchange terminated.
    #[error("connection closed before the reply arrived")]
    ConnectionClosed,

    /// The server sent a frame that does not fit the exchange.
    #[error("protocol violation: unexpected reply frame")]
    UnexpectedFrame,
}

/// A caller waiting on a correlation token.
enum Pending {
    Single(oneshot::Sender<ReplyFrame>),
    Sequential(mpsc::UnboundedSender<ReplyFrame>),
}

/// Correlation map from token to waiting caller.
#[derive(Default)]
struct PendingReplies {
    pending: DashMap<CorrelationId, Pending>,
}

impl PendingReplies {
    fn register_single(&self, correlation_id: CorrelationId) -> oneshot::Receiver<ReplyFrame> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(correlation_id, Pending::Single(tx));
        rx
    }

    fn register_sequential(
        &self,
        correlation_id: CorrelationId,
    ) -> mpsc::UnboundedReceiver<ReplyFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending.insert(correlation_id, Pending::Sequential(tx));
        rx
    }

    fn forget(&self, correlation_id: &CorrelationId) {
        self.pending.remove(correlation_id);
    }

    /// Drop every waiting caller; their receivers observe the closed
    /// connection.
    fn abandon_all(&self) {
        self.pending.clear();
    }

    /// Route one frame to its waiting caller. Single exchanges and terminal
    /// sequential frames retire the entry.
    fn complete(&self, correlation_id: CorrelationId, frame: ReplyFrame) -> bool {
        let terminal = !matches!(frame, ReplyFrame::Value(_));
        let is_single = self
            .pending
            .get(&correlation_id)
            .map(|entry| matches!(entry.value(), Pending::Single(_)))
            .unwrap_or(false);

        if terminal || is_single {
            match self.pending.remove(&correlation_id) {
                Some((_, Pending::Single(tx))) => tx.send(frame).is_ok(),
                Some((_, Pending::Sequential(tx))) => tx.send(frame).is_ok(),
                None => false,
            }
        } else {
            match self.pending.get(&correlation_id) {
                Some(entry) => match entry.value() {
                    Pending::Sequential(tx) => tx.send(frame).is_ok(),
                    Pending::Single(_) => false,
                },
                None => false,
            }
        }
    }
}

/// One client connection to an in-process dispatch engine.
pub struct Connection {
    engine: Arc<DispatchEngine>,
    transport: Arc<InMemoryTransport>,
    context: Arc<ConnectionContext>,
    pending: Arc<PendingReplies>,
    listener: JoinHandle<()>,
    closed: AtomicBool,
}

impl Connection {
    /// Open a connection against a running engine.
    ///
    /// `transport` must be the sink the engine was started with.
    pub fn connect(
        engine: Arc<DispatchEngine>,
        transport: Arc<InMemoryTransport>,
        client_pid: i32,
    ) -> Self {
        let context = engine.connection_opened(client_pid);
        let mut frames = transport.attach(context.session_id());
        let pending = Arc::new(PendingReplies::default());

        let listener = tokio::spawn({
            let pending = pending.clone();
            async move {
                while let Some(TransportFrame {
                    correlation_id,
                    frame,
                }) = frames.recv().await
                {
                    let Some(correlation_id) = correlation_id else {
                        debug!("ignoring uncorrelated frame");
                        continue;
                    };
                    if !pending.complete(correlation_id, frame) {
                        debug!(correlation = %correlation_id, "frame for unknown correlation id");
                    }
                }
                // Transport gone: wake every caller still waiting.
                pending.abandon_all();
            }
        });

        Self {
            engine,
            transport,
            context,
            pending,
            listener,
            closed: AtomicBool::new(false),
        }
    }

    /// This connection's identity as the server sees it.
    #[must_use]
    pub fn context(&self) -> &Arc<ConnectionContext> {
        &self.context
    }

    fn session_id(&self) -> SessionId {
        self.context.session_id()
    }

    fn ensure_open(&self) -> Result<(), CallError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CallError::ConnectionClosed);
        }
        Ok(())
    }

    /// Invoke a fire-and-forget route with a payload.
    pub async fn notify<P: Serialize>(&self, route: RouteId, payload: &P) -> Result<(), CallError> {
        self.ensure_open()?;
        let payload = codec::encode(payload)?;
        self.engine
            .handle(InboundMessage::one_way(route, self.session_id(), payload))
            .await;
        Ok(())
    }

    /// Invoke a fire-and-forget route without a payload.
    pub async fn notify_empty(&self, route: RouteId) -> Result<(), CallError> {
        self.ensure_open()?;
        self.engine
            .handle(InboundMessage::one_way(route, self.session_id(), Bytes::new()))
            .await;
        Ok(())
    }

    /// Invoke a single-reply route with a payload and await the reply.
    pub async fn call<P, R>(&self, route: RouteId, payload: &P) -> Result<R, CallError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let payload = codec::encode(payload)?;
        self.call_raw(route, payload).await
    }

    /// Invoke a single-reply route without a payload and await the reply.
    pub async fn call_empty<R: DeserializeOwned>(&self, route: RouteId) -> Result<R, CallError> {
        self.call_raw(route, Bytes::new()).await
    }

    async fn call_raw<R: DeserializeOwned>(
        &self,
        route: RouteId,
        payload: Bytes,
    ) -> Result<R, CallError> {
        self.ensure_open()?;
        let correlation_id = CorrelationId::new();
        let receiver = self.pending.register_single(correlation_id);

        self.engine
            .handle(InboundMessage::expecting_reply(
                route,
                self.session_id(),
                correlation_id,
                payload,
            ))
            .await;

        match receiver.await {
            Ok(ReplyFrame::Value(bytes)) => codec::decode(&bytes).map_err(Into::into),
            Ok(ReplyFrame::Failed(failure)) => Err(CallError::Failed(failure)),
            Ok(ReplyFrame::Finished) => Err(CallError::UnexpectedFrame),
            Err(_) => {
                self.pending.forget(&correlation_id);
                Err(CallError::ConnectionClosed)
            }
        }
    }

    /// Invoke a sequential-reply route with a payload.
    pub async fn call_sequential<P, R>(
        &self,
        route: RouteId,
        payload: &P,
    ) -> Result<SequentialReplies<R>, CallError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let payload = codec::encode(payload)?;
        self.call_sequential_raw(route, payload).await
    }

    /// Invoke a sequential-reply route without a payload.
    pub async fn call_sequential_empty<R: DeserializeOwned>(
        &self,
        route: RouteId,
    ) -> Result<SequentialReplies<R>, CallError> {
        self.call_sequential_raw(route, Bytes::new()).await
    }

    async fn call_sequential_raw<R: DeserializeOwned>(
        &self,
        route: RouteId,
        payload: Bytes,
    ) -> Result<SequentialReplies<R>, CallError> {
        self.ensure_open()?;
        let correlation_id = CorrelationId::new();
        let frames = self.pending.register_sequential(correlation_id);

        self.engine
            .handle(InboundMessage::expecting_sequential_reply(
                route,
                self.session_id(),
                correlation_id,
                payload,
            ))
            .await;

        Ok(SequentialReplies {
            frames,
            done: false,
            _reply: PhantomData,
        })
    }

    /// Close the connection.
    ///
    /// Outstanding server-side reply channels become inert and report
    /// `ConnectionInterrupted`; callers still waiting on this connection
    /// observe [`CallError::ConnectionClosed`]. Idempotent.
    pub fn disconnect(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.engine.connection_closed(self.session_id());
        self.transport.detach(self.session_id());
        self.listener.abort();
        self.pending.abandon_all();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// The consuming end of a sequential reply stream.
///
/// Yields `Some(Ok(value))` per element, then either `None` (the stream
/// finished successfully) or one `Some(Err(..))` followed by `None` (the
/// stream terminated with a failure, or the connection went away).
pub struct SequentialReplies<R> {
    frames: mpsc::UnboundedReceiver<ReplyFrame>,
    done: bool,
    _reply: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned> SequentialReplies<R> {
    /// Receive the next stream event.
    pub async fn next(&mut self) -> Option<Result<R, CallError>> {
        std::future::poll_fn(|cx| self.poll_next_event(cx)).await
    }

    fn poll_next_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<R, CallError>>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.frames.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(ReplyFrame::Value(bytes))) => {
                Poll::Ready(Some(codec::decode(&bytes).map_err(CallError::from)))
            }
            Poll::Ready(Some(ReplyFrame::Finished)) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(ReplyFrame::Failed(failure))) => {
                self.done = true;
                Poll::Ready(Some(Err(CallError::Failed(failure))))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(Some(Err(CallError::ConnectionClosed)))
            }
        }
    }
}

impl<R: DeserializeOwned> Stream for SequentialReplies<R> {
    type Item = Result<R, CallError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.poll_next_event(cx)
    }
}
