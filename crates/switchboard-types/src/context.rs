//! # Connection Identity
//!
//! Identity and metadata for one accepted inbound connection. The transport
//! boundary creates a [`ConnectionContext`] when a connection is accepted; the
//! dispatch engine owns it for the connection's lifetime and shares it
//! read-only into every handler invocation on that connection.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque unique token for one connection.
///
/// Globally unique for the lifetime of the server process; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Mint a fresh session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one inbound client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    session_id: SessionId,
    client_pid: i32,
}

impl ConnectionContext {
    /// Sentinel pid carried by the synthetic empty context.
    pub const EMPTY_PID: i32 = -1;

    /// Create the context for a newly accepted connection.
    #[must_use]
    pub fn new(client_pid: i32) -> Self {
        Self {
            session_id: SessionId::new(),
            client_pid,
        }
    }

    /// Synthetic context used when the real one is unavailable at
    /// error-report time.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Self::EMPTY_PID)
    }

    /// The session token for this connection.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Process id of the calling client.
    #[must_use]
    pub fn client_pid(&self) -> i32 {
        self.client_pid
    }
}
