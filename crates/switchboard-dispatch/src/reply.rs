//! # Reply Channels
//!
//! Each reply-expecting inbound message gets exactly one channel, owned by the
//! handler invocation it was constructed for. A single-reply channel accepts
//! one success-or-failure completion; a sequential channel accepts an ordered
//! stream of values and one terminal event. One atomic state per channel is
//! the only synchronization: the first terminal transition wins, whether it
//! comes from the handler or from connection teardown.

use crate::codec;
use crate::hook::ErrorReporter;
use crate::transport::ReplySink;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use switchboard_types::{
    ChannelMisuseKind, ConnectionContext, CorrelationId, DispatchError, FailureKind, HandlerError,
    ReplyFrame, RequestFailure, RouteId,
};
use tracing::debug;

/// Channels still awaiting their terminal event, per connection. Entries are
/// removed when a channel completes and drained on connection teardown.
pub(crate) type OutstandingReplies = Arc<Mutex<HashMap<CorrelationId, Weak<ReplyState>>>>;

const OPEN: u8 = 0;
const COMPLETED: u8 = 1;
const INTERRUPTED: u8 = 2;

/// Outcome of attempting the terminal transition.
enum Terminal {
    /// This caller performed the transition.
    Won,
    /// The channel had already completed: a programming error.
    AlreadyCompleted,
    /// Connection teardown got there first: a silent no-op.
    Interrupted,
}

/// Untyped core shared by both channel flavors.
pub(crate) struct ReplyState {
    route: RouteId,
    context: Arc<ConnectionContext>,
    /// `None` marks the silently-discarding sink bound to one-way messages.
    correlation_id: Option<CorrelationId>,
    state: AtomicU8,
    transport: Arc<dyn ReplySink>,
    reporter: ErrorReporter,
    outstanding: Option<OutstandingReplies>,
}

impl ReplyState {
    /// Channel bound to a reply-expecting message; tracked by the connection
    /// until it reaches a terminal state.
    pub(crate) fn bound(
        route: RouteId,
        context: Arc<ConnectionContext>,
        correlation_id: CorrelationId,
        transport: Arc<dyn ReplySink>,
        reporter: ErrorReporter,
        outstanding: OutstandingReplies,
    ) -> Arc<Self> {
        let state = Arc::new(Self {
            route,
            context,
            correlation_id: Some(correlation_id),
            state: AtomicU8::new(OPEN),
            transport,
            reporter,
            outstanding: Some(outstanding.clone()),
        });
        outstanding
            .lock()
            .insert(correlation_id, Arc::downgrade(&state));
        state
    }

    /// No-op sink for one-way invocations: every send is silently discarded.
    pub(crate) fn noop(
        route: RouteId,
        context: Arc<ConnectionContext>,
        transport: Arc<dyn ReplySink>,
        reporter: ErrorReporter,
    ) -> Arc<Self> {
        Arc::new(Self {
            route,
            context,
            correlation_id: None,
            state: AtomicU8::new(OPEN),
            transport,
            reporter,
            outstanding: None,
        })
    }

    pub(crate) fn route(&self) -> &RouteId {
        &self.route
    }

    pub(crate) fn context(&self) -> &Arc<ConnectionContext> {
        &self.context
    }

    fn is_noop(&self) -> bool {
        self.correlation_id.is_none()
    }

    /// Attempt the handler-side terminal transition, deregistering from the
    /// connection's outstanding set on success.
    fn try_terminal(&self) -> Terminal {
        match self
            .state
            .compare_exchange(OPEN, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.deregister();
                Terminal::Won
            }
            Err(COMPLETED) => Terminal::AlreadyCompleted,
            Err(_) => Terminal::Interrupted,
        }
    }

    fn deregister(&self) {
        if let (Some(outstanding), Some(correlation_id)) =
            (&self.outstanding, self.correlation_id)
        {
            outstanding.lock().remove(&correlation_id);
        }
    }

    /// Connection teardown path: make the channel inert and report once.
    pub(crate) fn interrupt(&self) {
        if self.is_noop() {
            return;
        }
        if self
            .state
            .compare_exchange(OPEN, INTERRUPTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.reporter.report(
                DispatchError::ConnectionInterrupted {
                    session_id: self.context.session_id(),
                },
                self.context.clone(),
            );
        }
    }

    /// Deliver a frame for this channel's correlation token.
    async fn send_frame(&self, frame: ReplyFrame) {
        let Some(correlation_id) = self.correlation_id else {
            return;
        };
        match self
            .transport
            .send_reply(self.context.session_id(), correlation_id, frame)
            .await
        {
            Ok(()) => {
                self.reporter
                    .stats()
                    .replies_sent
                    .fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => {
                debug!(
                    route = %self.route,
                    correlation = %correlation_id,
                    error = %error,
                    "reply could not be delivered"
                );
                self.reporter.report(
                    DispatchError::ConnectionInterrupted {
                        session_id: self.context.session_id(),
                    },
                    self.context.clone(),
                );
            }
        }
    }

    /// Terminate with a failure reply surfaced to the caller. Used for
    /// pre-handler failures (decode) and for the opaque terminator fired when
    /// a handler body errs without completing its channel.
    pub(crate) async fn reject(&self, kind: FailureKind) {
        if self.is_noop() {
            return;
        }
        if let Terminal::Won = self.try_terminal() {
            self.send_frame(ReplyFrame::Failed(RequestFailure::from_kind(kind)))
                .await;
        }
    }

    fn report_misuse(&self, kind: ChannelMisuseKind) {
        self.reporter.report(
            DispatchError::ChannelMisuse {
                route: self.route.clone(),
                kind,
            },
            self.context.clone(),
        );
    }

    fn report_encode_failure(&self, error: codec::CodecError) {
        self.reporter.report(
            DispatchError::ReplyEncode {
                route: self.route.clone(),
                detail: error.to_string(),
            },
            self.context.clone(),
        );
    }

    fn report_handler_failure(&self, error: HandlerError) {
        self.reporter.report(
            DispatchError::HandlerFailed {
                route: self.route.clone(),
                underlying: error.into_underlying(),
            },
            self.context.clone(),
        );
    }
}

/// Channel for a route that replies exactly once.
///
/// `succeed` and `fail` are mutually exclusive and each usable at most once;
/// a second terminal call is reported as channel misuse and never reaches the
/// transport. On the no-op sink bound to a one-way invocation every send is
/// silently discarded.
pub struct SingleReply<R> {
    state: Arc<ReplyState>,
    _reply: PhantomData<fn(R)>,
}

impl<R: Serialize> SingleReply<R> {
    pub(crate) fn new(state: Arc<ReplyState>) -> Self {
        Self {
            state,
            _reply: PhantomData,
        }
    }

    /// Complete the request with a reply value.
    pub async fn succeed(&self, value: R) {
        if self.state.is_noop() {
            return;
        }
        match self.state.try_terminal() {
            Terminal::Won => match codec::encode(&value) {
                Ok(bytes) => self.state.send_frame(ReplyFrame::Value(bytes)).await,
                Err(error) => self.state.report_encode_failure(error),
            },
            Terminal::AlreadyCompleted => {
                self.state.report_misuse(ChannelMisuseKind::AlreadyCompleted);
            }
            Terminal::Interrupted => {}
        }
    }

    /// Complete the request with a failure.
    ///
    /// The caller observes only the opaque failure terminator; the error
    /// itself goes to the error handler.
    pub async fn fail(&self, error: HandlerError) {
        if self.state.is_noop() {
            self.state.report_handler_failure(error);
            return;
        }
        match self.state.try_terminal() {
            Terminal::Won => {
                self.state
                    .send_frame(ReplyFrame::Failed(RequestFailure::opaque()))
                    .await;
                self.state.report_handler_failure(error);
            }
            Terminal::AlreadyCompleted => {
                self.state.report_misuse(ChannelMisuseKind::AlreadyCompleted);
            }
            Terminal::Interrupted => {}
        }
    }
}

/// Channel for a route that replies with an ordered stream.
///
/// Each `success` is encoded and sent as it occurs; exactly one terminal call
/// (`finished` or `failure`) closes the stream. Sends after the terminal
/// event are reported as channel misuse and never delivered.
pub struct SequentialReply<R> {
    state: Arc<ReplyState>,
    _reply: PhantomData<fn(R)>,
}

impl<R: Serialize> SequentialReply<R> {
    pub(crate) fn new(state: Arc<ReplyState>) -> Self {
        Self {
            state,
            _reply: PhantomData,
        }
    }

    /// Send the next element of the stream.
    pub async fn success(&self, value: R) {
        if self.state.is_noop() {
            return;
        }
        match self.state.state.load(Ordering::Acquire) {
            OPEN => match codec::encode(&value) {
                Ok(bytes) => self.state.send_frame(ReplyFrame::Value(bytes)).await,
                Err(error) => self.state.report_encode_failure(error),
            },
            COMPLETED => self.state.report_misuse(ChannelMisuseKind::AfterTerminal),
            _ => {}
        }
    }

    /// Close the stream successfully.
    pub async fn finished(&self) {
        if self.state.is_noop() {
            return;
        }
        match self.state.try_terminal() {
            Terminal::Won => self.state.send_frame(ReplyFrame::Finished).await,
            Terminal::AlreadyCompleted => {
                self.state.report_misuse(ChannelMisuseKind::AfterTerminal);
            }
            Terminal::Interrupted => {}
        }
    }

    /// Close the stream with a failure.
    ///
    /// The caller observes only the opaque failure terminator; the error
    /// itself goes to the error handler.
    pub async fn failure(&self, error: HandlerError) {
        if self.state.is_noop() {
            self.state.report_handler_failure(error);
            return;
        }
        match self.state.try_terminal() {
            Terminal::Won => {
                self.state
                    .send_frame(ReplyFrame::Failed(RequestFailure::opaque()))
                    .await;
                self.state.report_handler_failure(error);
            }
            Terminal::AlreadyCompleted => {
                self.state.report_misuse(ChannelMisuseKind::AfterTerminal);
            }
            Terminal::Interrupted => {}
        }
    }
}
