//! # Handler Shapes
//!
//! The set of handler shapes is closed (three reply kinds, with payload
//! presence folded into the registration glue), so the registry stores a
//! tagged variant rather than open-ended dynamic dispatch. The glue produced
//! here decodes the payload eagerly against the declared type, so a decode
//! failure surfaces before the handler future is ever constructed.

use crate::codec::{self, CodecError};
use crate::reply::{ReplyState, SequentialReply, SingleReply};
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use switchboard_types::{ConnectionContext, HandlerError};

/// The running body of one handler invocation.
pub(crate) type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;

/// Erased glue for routes without a reply channel.
pub(crate) type OneWayFn =
    Box<dyn Fn(Arc<ConnectionContext>, Bytes) -> Result<HandlerFuture, CodecError> + Send + Sync>;

/// Erased glue for routes driving a reply channel.
pub(crate) type ChannelFn = Box<
    dyn Fn(Arc<ConnectionContext>, Bytes, Arc<ReplyState>) -> Result<HandlerFuture, CodecError>
        + Send
        + Sync,
>;

/// A registered handler, tagged by reply kind.
pub(crate) enum RouteHandler {
    /// Fire-and-forget: no reply channel.
    OneWay(OneWayFn),
    /// Drives a single-reply channel.
    Single(ChannelFn),
    /// Drives a sequential-reply channel.
    Sequential(ChannelFn),
}

pub(crate) fn one_way<F, Fut>(handler: F) -> OneWayFn
where
    F: Fn(Arc<ConnectionContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Box::new(move |context, _payload| {
        let future: HandlerFuture = Box::pin(handler(context));
        Ok(future)
    })
}

pub(crate) fn one_way_with_payload<P, F, Fut>(handler: F) -> OneWayFn
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(Arc<ConnectionContext>, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Box::new(move |context, payload| {
        let message: P = codec::decode(&payload)?;
        let future: HandlerFuture = Box::pin(handler(context, message));
        Ok(future)
    })
}

pub(crate) fn single<R, F, Fut>(handler: F) -> ChannelFn
where
    R: Serialize + Send + 'static,
    F: Fn(Arc<ConnectionContext>, SingleReply<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Box::new(move |context, _payload, state| {
        let future: HandlerFuture = Box::pin(handler(context, SingleReply::new(state)));
        Ok(future)
    })
}

pub(crate) fn single_with_payload<P, R, F, Fut>(handler: F) -> ChannelFn
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(Arc<ConnectionContext>, P, SingleReply<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Box::new(move |context, payload, state| {
        let message: P = codec::decode(&payload)?;
        let future: HandlerFuture = Box::pin(handler(context, message, SingleReply::new(state)));
        Ok(future)
    })
}

pub(crate) fn sequential<R, F, Fut>(handler: F) -> ChannelFn
where
    R: Serialize + Send + 'static,
    F: Fn(Arc<ConnectionContext>, SequentialReply<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Box::new(move |context, _payload, state| {
        let future: HandlerFuture = Box::pin(handler(context, SequentialReply::new(state)));
        Ok(future)
    })
}

pub(crate) fn sequential_with_payload<P, R, F, Fut>(handler: F) -> ChannelFn
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(Arc<ConnectionContext>, P, SequentialReply<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Box::new(move |context, payload, state| {
        let message: P = codec::decode(&payload)?;
        let future: HandlerFuture = Box::pin(handler(context, message, SequentialReply::new(state)));
        Ok(future)
    })
}
