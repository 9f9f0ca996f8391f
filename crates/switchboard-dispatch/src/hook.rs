//! # Error Handler Hook
//!
//! One configurable sink per server instance for every [`DispatchError`]
//! produced during dispatch. Reporting is fire-and-forget: the hook runs on
//! its own task, the engine never waits for it, and a hook that panics takes
//! down only that task.

use crate::engine::DispatchStats;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use switchboard_types::{ConnectionContext, DispatchError};
use tracing::warn;

/// The configured error handler.
pub(crate) type ErrorHandler =
    Arc<dyn Fn(DispatchError, Arc<ConnectionContext>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap a user closure (sync or async body) into the stored handler shape.
pub(crate) fn wrap_handler<F, Fut>(handler: F) -> ErrorHandler
where
    F: Fn(DispatchError, Arc<ConnectionContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |error, context| Box::pin(handler(error, context)))
}

/// Shared reporting handle carried by the engine and every reply channel.
#[derive(Clone)]
pub(crate) struct ErrorReporter {
    handler: Option<ErrorHandler>,
    stats: Arc<DispatchStats>,
}

impl ErrorReporter {
    pub(crate) fn new(handler: Option<ErrorHandler>, stats: Arc<DispatchStats>) -> Self {
        Self { handler, stats }
    }

    pub(crate) fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Forward one terminal error to the hook.
    ///
    /// Logs unconditionally, then schedules the hook without awaiting it.
    /// Must be called from within a tokio runtime.
    pub(crate) fn report(&self, error: DispatchError, context: Arc<ConnectionContext>) {
        warn!(
            session = %context.session_id(),
            client_pid = context.client_pid(),
            error = %error,
            "dispatch error"
        );
        self.stats
            .errors_reported
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        if let Some(handler) = &self.handler {
            tokio::spawn(handler(error, context));
        }
    }
}
