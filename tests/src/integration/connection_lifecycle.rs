//! # Connection Lifecycle Tests
//!
//! Per-connection identity, teardown semantics, and the race between a late
//! handler completion and connection loss (first transition wins).

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use switchboard_dispatch::{
        CallError, Connection, DispatchEngine, InMemoryTransport, RouteRegistry,
    };
    use switchboard_types::{DispatchError, RouteId, SessionId};
    use tokio::sync::{mpsc, Notify};
    use tokio::time::timeout;

    fn route(segments: &[&str]) -> RouteId {
        RouteId::new(segments.iter().copied()).unwrap()
    }

    fn start(
        configure: impl FnOnce(&mut RouteRegistry),
    ) -> (
        Arc<DispatchEngine>,
        Arc<InMemoryTransport>,
        mpsc::UnboundedReceiver<DispatchError>,
    ) {
        let mut registry = RouteRegistry::new();
        let (tx, errors) = mpsc::unbounded_channel();
        registry.set_error_handler(move |error, _context| {
            let tx = tx.clone();
            async move {
                tx.send(error).ok();
            }
        });
        configure(&mut registry);

        let transport = Arc::new(InMemoryTransport::new());
        let engine = DispatchEngine::start(registry, transport.clone());
        (engine, transport, errors)
    }

    #[tokio::test]
    async fn test_each_connection_sees_its_own_context() {
        let (engine, transport, _errors) = start(|registry| {
            registry
                .register_with_reply::<SessionId, _, _>(
                    route(&["whoami"]),
                    |ctx, reply| async move {
                        reply.succeed(ctx.session_id()).await;
                        Ok(())
                    },
                )
                .unwrap();
        });

        let first = Connection::connect(engine.clone(), transport.clone(), 100);
        let second = Connection::connect(engine.clone(), transport.clone(), 200);
        assert_eq!(engine.connection_count(), 2);

        let first_seen: SessionId = first.call_empty(route(&["whoami"])).await.unwrap();
        let second_seen: SessionId = second.call_empty(route(&["whoami"])).await.unwrap();

        assert_eq!(first_seen, first.context().session_id());
        assert_eq!(second_seen, second.context().session_id());
        assert_ne!(first_seen, second_seen);
        assert_eq!(first.context().client_pid(), 100);
        assert_eq!(second.context().client_pid(), 200);
    }

    #[tokio::test]
    async fn test_late_completion_after_teardown_is_silent() {
        let release = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let release_handler = release.clone();
        let started_handler = started.clone();

        let (engine, transport, mut errors) = start(move |registry| {
            registry
                .register_with_reply::<u64, _, _>(route(&["deferred"]), move |_ctx, reply| {
                    let release = release_handler.clone();
                    let started = started_handler.clone();
                    async move {
                        // Complete from a background task, after the handler
                        // itself has returned.
                        tokio::spawn(async move {
                            started.notify_one();
                            release.notified().await;
                            reply.succeed(9).await;
                        });
                        Ok(())
                    }
                })
                .unwrap();
        });

        let connection = Arc::new(Connection::connect(engine, transport, 100));
        let pending_call = tokio::spawn({
            let connection = connection.clone();
            async move { connection.call_empty::<u64>(route(&["deferred"])).await }
        });

        timeout(Duration::from_millis(500), started.notified())
            .await
            .expect("handler did not start");

        connection.disconnect();

        // Teardown won the race: one interruption report.
        let error = timeout(Duration::from_millis(500), errors.recv())
            .await
            .expect("timeout")
            .expect("report");
        assert!(matches!(error, DispatchError::ConnectionInterrupted { .. }));

        let result = timeout(Duration::from_secs(1), pending_call)
            .await
            .expect("call must resolve on teardown")
            .expect("task");
        assert!(matches!(result, Err(CallError::ConnectionClosed)));

        // The late completion is a no-op: no frame, no misuse report.
        release.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_closes_the_surface() {
        let (engine, transport, _errors) = start(|registry| {
            registry
                .register_with_reply::<u64, _, _>(route(&["echo"]), |_ctx, reply| async move {
                    reply.succeed(1).await;
                    Ok(())
                })
                .unwrap();
        });

        let connection = Connection::connect(engine.clone(), transport, 100);
        assert_eq!(engine.connection_count(), 1);

        connection.disconnect();
        connection.disconnect();
        assert_eq!(engine.connection_count(), 0);

        let result = connection.call_empty::<u64>(route(&["echo"])).await;
        assert!(matches!(result, Err(CallError::ConnectionClosed)));
    }
}
