//! # Inbound Messages and Wire Reply Frames
//!
//! The transport boundary delivers each physical inbound message as exactly
//! one [`InboundMessage`], consumed once by the dispatch engine. Replies
//! travel back as [`ReplyFrame`] values keyed by the correlation token the
//! request carried.

use crate::context::SessionId;
use crate::route::RouteId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Correlation token linking a reply to the request that expects it.
///
/// UUID v7: time-ordered, which keeps correlated log lines sortable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new correlation token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the sender of an inbound message expects back.
///
/// The correlation token exists exactly when a reply is expected, so it lives
/// inside the reply-expecting variants rather than beside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Fire-and-forget; the caller never receives a reply.
    OneWay,
    /// Exactly one reply frame is expected.
    ExpectsReply(CorrelationId),
    /// A stream of reply frames closed by one terminal frame is expected.
    ExpectsSequentialReply(CorrelationId),
}

impl MessageKind {
    /// The correlation token, when a reply is expected.
    #[must_use]
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            MessageKind::OneWay => None,
            MessageKind::ExpectsReply(id) | MessageKind::ExpectsSequentialReply(id) => Some(*id),
        }
    }

    /// Whether any reply is expected.
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        !matches!(self, MessageKind::OneWay)
    }

    /// Short label for log lines and error messages.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::OneWay => "one-way",
            MessageKind::ExpectsReply(_) => "single-reply",
            MessageKind::ExpectsSequentialReply(_) => "sequential-reply",
        }
    }
}

/// One decoded inbound message, produced by the transport boundary and
/// consumed exactly once by the dispatch engine. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The route being invoked.
    pub route: RouteId,
    /// The connection this message arrived on.
    pub session_id: SessionId,
    /// Reply expectation, with the correlation token when one is expected.
    pub kind: MessageKind,
    /// Raw payload bytes, decoded against the route's declared payload type.
    pub payload: Bytes,
}

impl InboundMessage {
    /// A fire-and-forget message.
    #[must_use]
    pub fn one_way(route: RouteId, session_id: SessionId, payload: Bytes) -> Self {
        Self {
            route,
            session_id,
            kind: MessageKind::OneWay,
            payload,
        }
    }

    /// A message expecting exactly one reply.
    #[must_use]
    pub fn expecting_reply(
        route: RouteId,
        session_id: SessionId,
        correlation_id: CorrelationId,
        payload: Bytes,
    ) -> Self {
        Self {
            route,
            session_id,
            kind: MessageKind::ExpectsReply(correlation_id),
            payload,
        }
    }

    /// A message expecting a sequential reply stream.
    #[must_use]
    pub fn expecting_sequential_reply(
        route: RouteId,
        session_id: SessionId,
        correlation_id: CorrelationId,
        payload: Bytes,
    ) -> Self {
        Self {
            route,
            session_id,
            kind: MessageKind::ExpectsSequentialReply(correlation_id),
            payload,
        }
    }
}

/// Category of a failure reply surfaced to the caller.
///
/// Only failures that occur before a handler begins running carry a specific
/// kind; anything that happens inside a handler is collapsed into `Failed` so
/// internal detail never crosses the trust boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// No handler is registered for the requested route.
    UnknownRoute,
    /// The route exists but was invoked with an incompatible reply mode.
    SignatureMismatch,
    /// The payload did not decode against the route's declared type.
    InvalidPayload,
    /// The request failed; no further detail is available to the caller.
    Failed,
}

/// The failure reply a caller observes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Short human-readable message. Never contains handler-internal detail.
    pub message: String,
}

impl RequestFailure {
    /// A failure reply for a pre-handler error.
    #[must_use]
    pub fn from_kind(kind: FailureKind) -> Self {
        let message = match kind {
            FailureKind::UnknownRoute => "unknown route",
            FailureKind::SignatureMismatch => "route invoked with incompatible reply mode",
            FailureKind::InvalidPayload => "payload failed to decode",
            FailureKind::Failed => "request failed",
        };
        Self {
            kind,
            message: message.to_string(),
        }
    }

    /// The deliberately opaque failure sent when a handler fails.
    #[must_use]
    pub fn opaque() -> Self {
        Self::from_kind(FailureKind::Failed)
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// One frame of a reply, as sent across the transport.
///
/// A single-reply exchange carries exactly one `Value` or `Failed` frame. A
/// sequential exchange carries zero or more `Value` frames followed by exactly
/// one `Finished` or `Failed` frame: three distinct wire signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyFrame {
    /// One encoded reply value.
    Value(Bytes),
    /// Successful termination of a sequential stream.
    Finished,
    /// Failure terminator.
    Failed(RequestFailure),
}
