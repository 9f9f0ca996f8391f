//! # Dispatch Error Taxonomy
//!
//! Every failure produced anywhere in dispatch is one [`DispatchError`],
//! forwarded to the configured error handler together with the connection
//! context it concerns. Handler-internal errors are wrapped so that the
//! original value travels to the hook when it can be preserved, while the
//! caller across the trust boundary never sees it.

use crate::context::SessionId;
use crate::message::MessageKind;
use crate::route::{ReplyCardinality, RouteId};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The error a handler body failed with, as delivered to the error handler.
///
/// Availability is decided at construction: a concrete [`std::error::Error`]
/// value is preserved and downcastable; anything else retains a description
/// only. Arbitrary error values are not guaranteed to be transportable, so
/// this is inherently lossy in the `Unavailable` case.
#[derive(Debug, Clone)]
pub enum UnderlyingError {
    /// The original error value, preserved.
    Available(Arc<dyn std::error::Error + Send + Sync>),
    /// Only a description of the original error could be retained.
    Unavailable(String),
}

impl UnderlyingError {
    /// Whether the original error value was preserved.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, UnderlyingError::Available(_))
    }

    /// Downcast the preserved error value, when available.
    #[must_use]
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            UnderlyingError::Available(error) => error.downcast_ref::<E>(),
            UnderlyingError::Unavailable(_) => None,
        }
    }
}

impl fmt::Display for UnderlyingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnderlyingError::Available(error) => write!(f, "{error}"),
            UnderlyingError::Unavailable(description) => write!(f, "{description}"),
        }
    }
}

/// The error type handler bodies return.
///
/// Converts from any `std::error::Error + Send + Sync` value (preserving it)
/// or from a plain description via [`HandlerError::message`].
#[derive(Debug, Clone)]
pub struct HandlerError {
    underlying: UnderlyingError,
}

impl HandlerError {
    /// A handler error that retains a description only.
    pub fn message(description: impl Into<String>) -> Self {
        Self {
            underlying: UnderlyingError::Unavailable(description.into()),
        }
    }

    /// The wrapped error.
    #[must_use]
    pub fn underlying(&self) -> &UnderlyingError {
        &self.underlying
    }

    /// Unwrap into the underlying error for reporting.
    #[must_use]
    pub fn into_underlying(self) -> UnderlyingError {
        self.underlying
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.underlying)
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self {
            underlying: UnderlyingError::Available(Arc::new(error)),
        }
    }
}

/// How a reply channel was misused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMisuseKind {
    /// A second completion of a single-reply channel.
    AlreadyCompleted,
    /// A send on a sequential channel after its terminal event.
    AfterTerminal,
}

impl fmt::Display for ChannelMisuseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMisuseKind::AlreadyCompleted => write!(f, "channel already completed"),
            ChannelMisuseKind::AfterTerminal => write!(f, "send after terminal event"),
        }
    }
}

/// Everything that can go wrong while dispatching one inbound message.
///
/// Terminal for the message it concerns; always forwarded to the error
/// handler. Only `UnknownRoute`, `SignatureMismatch` and `PayloadDecode` are
/// additionally surfaced to the caller as a failure reply; `HandlerFailed` is
/// never sent across the trust boundary.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// No handler is registered for the route.
    #[error("no route registered for `{route}`")]
    UnknownRoute { route: RouteId },

    /// The route's declared cardinality does not match the invocation.
    #[error("route `{route}` declared {declared:?} replies but was invoked as {}", .requested.label())]
    SignatureMismatch {
        route: RouteId,
        declared: ReplyCardinality,
        requested: MessageKind,
    },

    /// The payload did not decode against the route's declared type.
    #[error("payload for `{route}` failed to decode: {detail}")]
    PayloadDecode { route: RouteId, detail: String },

    /// The handler body failed.
    #[error("handler for `{route}` failed: {underlying}")]
    HandlerFailed {
        route: RouteId,
        underlying: UnderlyingError,
    },

    /// A reply value did not encode.
    #[error("reply for `{route}` failed to encode: {detail}")]
    ReplyEncode { route: RouteId, detail: String },

    /// The connection went away with a reply still outstanding.
    #[error("connection {session_id} interrupted with a reply outstanding")]
    ConnectionInterrupted { session_id: SessionId },

    /// A reply channel was driven past its terminal state.
    #[error("reply channel for `{route}` misused: {kind}")]
    ChannelMisuse {
        route: RouteId,
        kind: ChannelMisuseKind,
    },
}

/// Errors from the registration phase.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// A handler is already registered for this identifier, regardless of
    /// signature.
    #[error("route `{route}` is already registered")]
    DuplicateRoute { route: RouteId },
}
