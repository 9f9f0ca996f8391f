//! # Switchboard Dispatch
//!
//! Route dispatch and reply-correlation engine for the typed IPC routing
//! layer.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐  InboundMessage   ┌─────────────────┐   lookup    ┌────────────┐
//! │ Transport│ ────────────────▶ │ Dispatch Engine │ ──────────▶ │  Registry  │
//! └──────────┘                   └─────────────────┘             └────────────┘
//!      ▲                               │ spawn
//!      │        ReplyFrame             ▼
//!      └─────────────────────── handler + ReplyChannel
//! ```
//!
//! Handlers are registered on a [`RouteRegistry`] before the server accepts
//! messages; [`DispatchEngine::start`] consumes the registry, after which the
//! route table is immutable and read without locking. Every failure anywhere
//! in dispatch reaches the single configured error handler; a handler's own
//! error never crosses the trust boundary to the caller.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod client;
pub mod codec;
pub mod engine;
pub mod registry;
pub mod reply;
pub mod transport;

mod handler;
mod hook;

// Re-export main types
pub use client::{CallError, Connection, SequentialReplies};
pub use codec::CodecError;
pub use engine::{DispatchEngine, DispatchStats};
pub use registry::RouteRegistry;
pub use reply::{SequentialReply, SingleReply};
pub use transport::{InMemoryTransport, ReplySink, TransportError, TransportFrame};

/// Per-session buffer for the in-memory transport before backpressure.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
