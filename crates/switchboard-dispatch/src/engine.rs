//! # Dispatch Engine
//!
//! Consumes each inbound message exactly once: resolves the route, verifies
//! the declared signature against the invocation, decodes the payload,
//! constructs the reply channel, and schedules the handler. Failures never
//! propagate to the caller of [`DispatchEngine::handle`]; they are surfaced
//! to the error handler, and, for failures that occur before a handler begins
//! running, as a failure reply to the requesting client.

use crate::handler::RouteHandler;
use crate::hook::ErrorReporter;
use crate::registry::{RouteRegistry, RouteTable};
use crate::reply::ReplyState;
use crate::transport::ReplySink;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use switchboard_types::{
    ConnectionContext, DispatchError, FailureKind, InboundMessage, MessageKind, ReplyFrame,
    RequestFailure, SessionId,
};
use tracing::{debug, info, warn};

/// Counters for the running engine.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Inbound messages received.
    pub received: AtomicU64,
    /// Handler invocations scheduled.
    pub dispatched: AtomicU64,
    /// Reply frames delivered to the transport.
    pub replies_sent: AtomicU64,
    /// Errors forwarded to the error handler.
    pub errors_reported: AtomicU64,
}

/// State held per live connection. Removed exactly on disconnect so the map
/// never leaks entries.
struct ConnectionEntry {
    context: Arc<ConnectionContext>,
    outstanding: crate::reply::OutstandingReplies,
}

/// The route dispatch and reply-correlation engine.
///
/// One instance serves many concurrent connections; each inbound message is
/// an independent unit of work and messages on the same connection may run
/// concurrently. Handlers that suspend hold no worker thread.
pub struct DispatchEngine {
    routes: RouteTable,
    connections: DashMap<SessionId, ConnectionEntry>,
    transport: Arc<dyn ReplySink>,
    reporter: ErrorReporter,
    stats: Arc<DispatchStats>,
}

impl DispatchEngine {
    /// Consume the registry and begin accepting messages.
    ///
    /// Consuming the registry closes the registration phase: no route or
    /// error-handler change is possible once the engine is running.
    pub fn start(registry: RouteRegistry, transport: Arc<dyn ReplySink>) -> Arc<Self> {
        let (routes, error_handler) = registry.into_parts();
        let stats = Arc::new(DispatchStats::default());
        let reporter = ErrorReporter::new(error_handler, stats.clone());
        info!(routes = routes.len(), "dispatch engine started");
        Arc::new(Self {
            routes,
            connections: DashMap::new(),
            transport,
            reporter,
            stats,
        })
    }

    /// Record a newly accepted connection and mint its context.
    ///
    /// Called by the transport boundary when a connection is accepted.
    pub fn connection_opened(&self, client_pid: i32) -> Arc<ConnectionContext> {
        let context = Arc::new(ConnectionContext::new(client_pid));
        self.connections.insert(
            context.session_id(),
            ConnectionEntry {
                context: context.clone(),
                outstanding: Arc::new(Mutex::new(HashMap::new())),
            },
        );
        debug!(session = %context.session_id(), client_pid, "connection opened");
        context
    }

    /// Tear down a connection.
    ///
    /// Every reply channel still outstanding for the connection becomes inert
    /// and reports `ConnectionInterrupted` (first transition wins). Must be
    /// called from within the runtime.
    pub fn connection_closed(&self, session_id: SessionId) {
        let Some((_, entry)) = self.connections.remove(&session_id) else {
            debug!(session = %session_id, "close for unknown session");
            return;
        };
        let outstanding: Vec<Arc<ReplyState>> = entry
            .outstanding
            .lock()
            .drain()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect();
        let interrupted = outstanding.len();
        for state in outstanding {
            state.interrupt();
        }
        debug!(session = %session_id, interrupted, "connection closed");
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Engine counters.
    #[must_use]
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Dispatch one inbound message.
    ///
    /// Returns once the handler invocation has been scheduled (or the message
    /// rejected); never waits for handler completion. Failures are absorbed:
    /// nothing propagates to the caller.
    pub async fn handle(&self, inbound: InboundMessage) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        let InboundMessage {
            route,
            session_id,
            kind,
            payload,
        } = inbound;

        let Some((context, outstanding)) = self
            .connections
            .get(&session_id)
            .map(|entry| (entry.context.clone(), entry.outstanding.clone()))
        else {
            warn!(session = %session_id, route = %route, "message for unknown session dropped");
            self.reporter.report(
                DispatchError::ConnectionInterrupted { session_id },
                Arc::new(ConnectionContext::empty()),
            );
            return;
        };

        let Some(registered) = self.routes.lookup(&route) else {
            self.send_failure(session_id, &kind, FailureKind::UnknownRoute)
                .await;
            self.reporter
                .report(DispatchError::UnknownRoute { route }, context);
            return;
        };

        if !registered.signature.compatible_with(&kind) {
            self.send_failure(session_id, &kind, FailureKind::SignatureMismatch)
                .await;
            self.reporter.report(
                DispatchError::SignatureMismatch {
                    route,
                    declared: registered.signature.cardinality(),
                    requested: kind,
                },
                context,
            );
            return;
        }

        debug!(route = %route, session = %session_id, kind = kind.label(), "dispatching");

        match &registered.handler {
            RouteHandler::OneWay(glue) => match glue(context.clone(), payload) {
                Ok(future) => {
                    self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
                    let reporter = self.reporter.clone();
                    tokio::spawn(async move {
                        if let Err(error) = future.await {
                            reporter.report(
                                DispatchError::HandlerFailed {
                                    route,
                                    underlying: error.into_underlying(),
                                },
                                context,
                            );
                        }
                    });
                }
                Err(error) => {
                    self.reporter.report(
                        DispatchError::PayloadDecode {
                            route,
                            detail: error.to_string(),
                        },
                        context,
                    );
                }
            },
            RouteHandler::Single(glue) | RouteHandler::Sequential(glue) => {
                let state = match kind.correlation_id() {
                    Some(correlation_id) => ReplyState::bound(
                        route.clone(),
                        context.clone(),
                        correlation_id,
                        self.transport.clone(),
                        self.reporter.clone(),
                        outstanding,
                    ),
                    None => ReplyState::noop(
                        route.clone(),
                        context.clone(),
                        self.transport.clone(),
                        self.reporter.clone(),
                    ),
                };
                match glue(context, payload, state.clone()) {
                    Ok(future) => {
                        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
                        let reporter = self.reporter.clone();
                        tokio::spawn(async move {
                            if let Err(error) = future.await {
                                // The caller sees only the opaque terminator;
                                // the error itself goes to the hook.
                                state.reject(FailureKind::Failed).await;
                                reporter.report(
                                    DispatchError::HandlerFailed {
                                        route: state.route().clone(),
                                        underlying: error.into_underlying(),
                                    },
                                    state.context().clone(),
                                );
                            }
                        });
                    }
                    Err(error) => {
                        state.reject(FailureKind::InvalidPayload).await;
                        self.reporter.report(
                            DispatchError::PayloadDecode {
                                route,
                                detail: error.to_string(),
                            },
                            state.context().clone(),
                        );
                    }
                }
            }
        }
    }

    /// Send the failure reply for a pre-handler error, when one is expected.
    async fn send_failure(&self, session_id: SessionId, kind: &MessageKind, failure: FailureKind) {
        let Some(correlation_id) = kind.correlation_id() else {
            return;
        };
        let frame = ReplyFrame::Failed(RequestFailure::from_kind(failure));
        match self
            .transport
            .send_reply(session_id, correlation_id, frame)
            .await
        {
            Ok(()) => {
                self.stats.replies_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => {
                warn!(
                    session = %session_id,
                    correlation = %correlation_id,
                    error = %error,
                    "failure reply could not be delivered"
                );
            }
        }
    }
}
