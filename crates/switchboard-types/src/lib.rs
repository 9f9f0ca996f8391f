//! # Switchboard Shared Types
//!
//! This crate contains the data model shared between the dispatch engine and
//! transport adapters: route identifiers and type signatures, connection
//! identity, the inbound message envelope, wire reply frames, and the dispatch
//! error taxonomy.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: all cross-crate types are defined here.
//! - **Identity from the envelope**: the `ConnectionContext` handed to a
//!   handler is the sole authority on who is calling; payloads never carry
//!   redundant identity fields.
//! - **Three wire signals**: a sequential reply stream terminates with either
//!   `ReplyFrame::Finished` or `ReplyFrame::Failed`, distinct from element
//!   frames, so a client can always tell the three cases apart.

pub mod context;
pub mod errors;
pub mod handle;
pub mod message;
pub mod route;

pub use context::{ConnectionContext, SessionId};
pub use errors::{
    ChannelMisuseKind, DispatchError, HandlerError, RegistrationError, UnderlyingError,
};
pub use handle::TransferHandle;
pub use message::{
    CorrelationId, FailureKind, InboundMessage, MessageKind, ReplyFrame, RequestFailure,
};
pub use route::{ReplyCardinality, RouteId, RouteIdError, RouteSignature};
