//! # Route Identifiers
//!
//! A route is a named, typed remote operation. Its identifier is an ordered
//! sequence of non-empty name segments; its signature records the payload and
//! reply types declared at registration together with the reply cardinality.

use crate::message::MessageKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from route identifier construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteIdError {
    /// A route needs at least one segment.
    #[error("route identifier has no segments")]
    NoSegments,

    /// Every segment must be non-empty.
    #[error("route segment at index {index} is empty")]
    EmptySegment { index: usize },
}

/// Identifier for a registered route.
///
/// Equality and hashing are segment-wise; immutable once constructed.
/// Displayed as the dot-joined path (e.g. `always.throws`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteId {
    segments: Vec<String>,
}

impl RouteId {
    /// Build a route identifier from name segments.
    ///
    /// Fails if no segments are given or any segment is empty.
    pub fn new<I, S>(segments: I) -> Result<Self, RouteIdError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(RouteIdError::NoSegments);
        }
        for (index, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(RouteIdError::EmptySegment { index });
            }
        }
        Ok(Self { segments })
    }

    /// The ordered name segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// How many replies a route produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCardinality {
    /// Fire-and-forget: the route never replies.
    None,
    /// Exactly one success-or-failure reply.
    Single,
    /// An ordered stream of replies closed by one terminal event.
    Sequential,
}

/// The type signature a route was registered with.
///
/// Captured from the registration generics via [`std::any::type_name`];
/// server-side only, never on the wire. Two registrations with the same
/// segments are a configuration error regardless of signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSignature {
    payload: Option<&'static str>,
    reply: Option<&'static str>,
    cardinality: ReplyCardinality,
}

impl RouteSignature {
    /// Record a signature from the declared payload/reply type names.
    #[must_use]
    pub fn new(
        payload: Option<&'static str>,
        reply: Option<&'static str>,
        cardinality: ReplyCardinality,
    ) -> Self {
        Self {
            payload,
            reply,
            cardinality,
        }
    }

    /// Declared payload type name, if the route takes a payload.
    #[must_use]
    pub fn payload_type(&self) -> Option<&'static str> {
        self.payload
    }

    /// Declared reply type name, if the route replies.
    #[must_use]
    pub fn reply_type(&self) -> Option<&'static str> {
        self.reply
    }

    /// Declared reply cardinality.
    #[must_use]
    pub fn cardinality(&self) -> ReplyCardinality {
        self.cardinality
    }

    /// Whether an inbound message of the given kind may invoke this route.
    ///
    /// One-way invocation is always legal (the reply channel degrades to a
    /// no-op sink); a reply expectation must match the declared cardinality.
    #[must_use]
    pub fn compatible_with(&self, kind: &MessageKind) -> bool {
        match kind {
            MessageKind::OneWay => true,
            MessageKind::ExpectsReply(_) => self.cardinality == ReplyCardinality::Single,
            MessageKind::ExpectsSequentialReply(_) => {
                self.cardinality == ReplyCardinality::Sequential
            }
        }
    }
}
