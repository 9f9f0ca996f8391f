//! # Dispatch Flow Tests
//!
//! End-to-end request/reply flows across the dispatch engine, in-memory
//! transport, and client: success paths, failure surfacing, and the trust
//! boundary around handler errors.

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use switchboard_dispatch::{
        CallError, Connection, DispatchEngine, InMemoryTransport, RouteRegistry,
    };
    use switchboard_types::{DispatchError, FailureKind, RouteId};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    #[derive(Debug, PartialEq)]
    struct ExampleError;

    impl fmt::Display for ExampleError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "complete and utter failure")
        }
    }

    impl std::error::Error for ExampleError {}

    fn route(segments: &[&str]) -> RouteId {
        RouteId::new(segments.iter().copied()).unwrap()
    }

    /// Start an engine with an error-capturing hook and one client connection.
    fn start(
        configure: impl FnOnce(&mut RouteRegistry),
    ) -> (
        Arc<DispatchEngine>,
        Connection,
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
        let connection = Connection::connect(engine.clone(), transport, 4242);
        (engine, connection, errors)
    }

    async fn recv_error(errors: &mut mpsc::UnboundedReceiver<DispatchError>) -> DispatchError {
        timeout(Duration::from_millis(500), errors.recv())
            .await
            .expect("timeout waiting for error report")
            .expect("error report")
    }

    async fn assert_no_more_errors(errors: &mut mpsc::UnboundedReceiver<DispatchError>) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(errors.try_recv().is_err(), "unexpected extra error report");
    }

    // =========================================================================
    // REQUEST / REPLY FLOWS
    // =========================================================================

    #[tokio::test]
    async fn test_call_round_trip() {
        let (_engine, connection, _errors) = start(|registry| {
            registry
                .register_with_payload_and_reply::<String, u64, _, _>(
                    route(&["store", "get"]),
                    |_ctx, key, reply| async move {
                        reply.succeed(key.len() as u64).await;
                        Ok(())
                    },
                )
                .unwrap();
        });

        let value: u64 = connection
            .call(route(&["store", "get"]), &"alpha".to_string())
            .await
            .unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_struct_payload_and_reply_round_trip() {
        use serde::{Deserialize, Serialize};
        use switchboard_types::TransferHandle;

        #[derive(Debug, Serialize, Deserialize)]
        struct OpenFileRequest {
            path: String,
        }

        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct OpenFileReply {
            handle: TransferHandle,
            size: u64,
        }

        let (_engine, connection, _errors) = start(|registry| {
            registry
                .register_with_payload_and_reply::<OpenFileRequest, OpenFileReply, _, _>(
                    route(&["file", "open"]),
                    |_ctx, request, reply| async move {
                        reply
                            .succeed(OpenFileReply {
                                handle: TransferHandle::from_raw(3),
                                size: request.path.len() as u64,
                            })
                            .await;
                        Ok(())
                    },
                )
                .unwrap();
        });

        let reply: OpenFileReply = connection
            .call(
                route(&["file", "open"]),
                &OpenFileRequest {
                    path: "/etc/hosts".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            reply,
            OpenFileReply {
                handle: TransferHandle::from_raw(3),
                size: 10,
            }
        );
    }

    #[tokio::test]
    async fn test_exactly_one_invocation_per_message() {
        let invocations = Arc::new(AtomicU32::new(0));
        let counter = invocations.clone();

        let (_engine, connection, _errors) = start(move |registry| {
            registry
                .register_with_reply::<u64, _, _>(route(&["counted"]), move |_ctx, reply| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::Relaxed);
                        reply.succeed(1).await;
                        Ok(())
                    }
                })
                .unwrap();
        });

        let _: u64 = connection.call_empty(route(&["counted"])).await.unwrap();
        assert_eq!(invocations.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unknown_route_fails_without_hanging() {
        let (_engine, connection, mut errors) = start(|_registry| {});

        let result = timeout(
            Duration::from_millis(500),
            connection.call_empty::<u64>(route(&["not", "registered"])),
        )
        .await
        .expect("unknown route must never hang");

        match result {
            Err(CallError::Failed(failure)) => {
                assert_eq!(failure.kind, FailureKind::UnknownRoute);
            }
            other => panic!("expected failure reply, got {other:?}"),
        }
        assert!(matches!(
            recv_error(&mut errors).await,
            DispatchError::UnknownRoute { .. }
        ));
    }

    // =========================================================================
    // TRUST BOUNDARY
    // =========================================================================

    #[tokio::test]
    async fn test_handler_error_is_opaque_to_caller() {
        let (_engine, connection, mut errors) = start(|registry| {
            registry
                .register_with_reply::<u64, _, _>(route(&["always", "throws"]), |_ctx, _reply| {
                    async { Err(ExampleError.into()) }
                })
                .unwrap();
        });

        match connection.call_empty::<u64>(route(&["always", "throws"])).await {
            Err(CallError::Failed(failure)) => {
                assert_eq!(failure.kind, FailureKind::Failed);
                // The internal error text must not leak.
                assert!(!failure.message.contains("utter failure"));
            }
            other => panic!("expected opaque failure, got {other:?}"),
        }

        match recv_error(&mut errors).await {
            DispatchError::HandlerFailed { underlying, .. } => {
                assert_eq!(underlying.downcast_ref::<ExampleError>(), Some(&ExampleError));
            }
            other => panic!("expected handler failure, got {other:?}"),
        }
    }

    /// Route `always.throws`, no payload, single reply: a one-way invocation
    /// produces zero replies and exactly one handler failure at the hook,
    /// with the thrown error value preserved.
    #[tokio::test]
    async fn test_one_way_invocation_of_throwing_handler() {
        let (engine, connection, mut errors) = start(|registry| {
            registry
                .register_with_reply::<(), _, _>(route(&["always", "throws"]), |_ctx, _reply| {
                    async { Err(ExampleError.into()) }
                })
                .unwrap();
        });

        connection
            .notify_empty(route(&["always", "throws"]))
            .await
            .unwrap();

        match recv_error(&mut errors).await {
            DispatchError::HandlerFailed { underlying, .. } => {
                assert!(underlying.is_available());
                assert_eq!(underlying.downcast_ref::<ExampleError>(), Some(&ExampleError));
            }
            other => panic!("expected handler failure, got {other:?}"),
        }
        assert_no_more_errors(&mut errors).await;
        assert_eq!(engine.stats().replies_sent.load(Ordering::Relaxed), 0);
    }

    // =========================================================================
    // CONCURRENCY
    // =========================================================================

    #[tokio::test]
    async fn test_suspended_handler_does_not_block_other_requests() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();

        let (_engine, connection, mut errors) = start(move |registry| {
            registry
                .register_with_reply::<u64, _, _>(route(&["hangs"]), move |_ctx, _reply| {
                    let started = started_tx.clone();
                    async move {
                        started.send(()).ok();
                        std::future::pending::<()>().await;
                        Ok(())
                    }
                })
                .unwrap();
            registry
                .register_with_reply::<u64, _, _>(route(&["fast"]), |_ctx, reply| async move {
                    reply.succeed(1).await;
                    Ok(())
                })
                .unwrap();
        });

        let connection = Arc::new(connection);
        let hanging_call = tokio::spawn({
            let connection = connection.clone();
            async move { connection.call_empty::<u64>(route(&["hangs"])).await }
        });

        timeout(Duration::from_millis(500), started_rx.recv())
            .await
            .expect("handler did not start")
            .expect("started signal");

        // The suspended handler does not block an independent request on the
        // same connection.
        let fast: u64 = connection.call_empty(route(&["fast"])).await.unwrap();
        assert_eq!(fast, 1);

        // Teardown interrupts the still-pending reply.
        connection.disconnect();

        let result = timeout(Duration::from_secs(1), hanging_call)
            .await
            .expect("pending call must resolve on teardown")
            .expect("task");
        assert!(matches!(result, Err(CallError::ConnectionClosed)));
        assert!(matches!(
            recv_error(&mut errors).await,
            DispatchError::ConnectionInterrupted { .. }
        ));
    }
}
