//! # Transport Boundary
//!
//! The dispatch engine hands every outbound reply frame to a [`ReplySink`];
//! the transport is responsible for framing and delivery. [`InMemoryTransport`]
//! is the shipped single-process implementation, suitable for same-process
//! servers and for tests; an OS transport adapter implements the same trait.

use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use dashmap::DashMap;
use switchboard_types::{CorrelationId, ReplyFrame, SessionId};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Errors from sending a reply through the transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No receiving side is attached for the session.
    #[error("session {0} is not attached")]
    NotAttached(SessionId),

    /// The receiving side has gone away.
    #[error("session {0} closed")]
    Closed(SessionId),
}

/// One frame as delivered to a client, with its correlation token when the
/// frame answers a specific request.
#[derive(Debug, Clone)]
pub struct TransportFrame {
    /// Correlation token of the request this frame answers; `None` for
    /// uncorrelated server pushes.
    pub correlation_id: Option<CorrelationId>,
    /// The reply frame itself.
    pub frame: ReplyFrame,
}

/// Outbound side of the transport, as seen by the dispatch engine.
///
/// The engine produces already-encoded frames plus routing metadata; the
/// transport owns framing and delivery.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Send a reply frame correlated to a specific request.
    async fn send_reply(
        &self,
        session_id: SessionId,
        correlation_id: CorrelationId,
        frame: ReplyFrame,
    ) -> Result<(), TransportError>;

    /// Send an uncorrelated frame to a connection.
    async fn send_one_way(
        &self,
        session_id: SessionId,
        frame: ReplyFrame,
    ) -> Result<(), TransportError>;
}

/// In-memory transport over per-session channels.
///
/// Suitable for single-process operation; a cross-process deployment swaps in
/// an adapter over the OS IPC primitive.
pub struct InMemoryTransport {
    /// Sender half per attached session.
    sessions: DashMap<SessionId, mpsc::Sender<TransportFrame>>,
    /// Per-session channel capacity.
    capacity: usize,
}

impl InMemoryTransport {
    /// Create a transport with default per-session capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a transport with the given per-session capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            capacity,
        }
    }

    /// Attach the receiving side for a session.
    ///
    /// Frames sent to the session before `attach` are rejected with
    /// [`TransportError::NotAttached`]. Attaching again replaces the previous
    /// receiver.
    pub fn attach(&self, session_id: SessionId) -> mpsc::Receiver<TransportFrame> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.sessions.insert(session_id, tx);
        debug!(session = %session_id, "transport session attached");
        rx
    }

    /// Detach a session; subsequent sends fail.
    pub fn detach(&self, session_id: SessionId) {
        if self.sessions.remove(&session_id).is_some() {
            debug!(session = %session_id, "transport session detached");
        }
    }

    /// Number of currently attached sessions.
    #[must_use]
    pub fn attached_count(&self) -> usize {
        self.sessions.len()
    }

    async fn deliver(
        &self,
        session_id: SessionId,
        frame: TransportFrame,
    ) -> Result<(), TransportError> {
        let sender = self
            .sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or(TransportError::NotAttached(session_id))?;

        sender
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed(session_id))
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplySink for InMemoryTransport {
    async fn send_reply(
        &self,
        session_id: SessionId,
        correlation_id: CorrelationId,
        frame: ReplyFrame,
    ) -> Result<(), TransportError> {
        self.deliver(
            session_id,
            TransportFrame {
                correlation_id: Some(correlation_id),
                frame,
            },
        )
        .await
    }

    async fn send_one_way(
        &self,
        session_id: SessionId,
        frame: ReplyFrame,
    ) -> Result<(), TransportError> {
        self.deliver(
            session_id,
            TransportFrame {
                correlation_id: None,
                frame,
            },
        )
        .await
    }
}
