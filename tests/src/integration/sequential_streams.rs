//! # Sequential Reply Stream Tests
//!
//! A sequential route yields zero or more ordered elements followed by
//! exactly one terminal event; the client distinguishes element, successful
//! termination, and failure termination.

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::Arc;
    use std::time::Duration;

    use switchboard_dispatch::{
        CallError, Connection, DispatchEngine, InMemoryTransport, RouteRegistry,
    };
    use switchboard_types::{ChannelMisuseKind, DispatchError, FailureKind, RouteId};
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

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

    #[tokio::test]
    async fn test_elements_arrive_in_order_then_finished() {
        let (_engine, connection, _errors) = start(|registry| {
            registry
                .register_sequential_with_payload::<u32, u32, _, _>(
                    route(&["count", "up"]),
                    |_ctx, n, reply| async move {
                        for i in 0..n {
                            reply.success(i).await;
                        }
                        reply.finished().await;
                        Ok(())
                    },
                )
                .unwrap();
        });

        let mut stream = connection
            .call_sequential::<u32, u32>(route(&["count", "up"]), &3)
            .await
            .unwrap();

        for expected in 0..3 {
            let item = timeout(Duration::from_millis(500), stream.next())
                .await
                .expect("timeout")
                .expect("element")
                .unwrap();
            assert_eq!(item, expected);
        }
        assert!(stream.next().await.is_none());
        // The stream stays terminated.
        assert!(stream.next().await.is_none());
    }

    /// Route `eventually.throws`, sequential reply of `String`: the handler
    /// fails before sending any element. The client observes zero elements
    /// and a failure terminator; the hook observes exactly one handler
    /// failure with the error value preserved.
    #[tokio::test]
    async fn test_failure_before_any_element() {
        let (_engine, connection, mut errors) = start(|registry| {
            registry
                .register_sequential::<String, _, _>(
                    route(&["eventually", "throws"]),
                    |_ctx, reply| async move {
                        reply.failure(ExampleError.into()).await;
                        Ok(())
                    },
                )
                .unwrap();
        });

        let mut stream = connection
            .call_sequential_empty::<String>(route(&["eventually", "throws"]))
            .await
            .unwrap();

        match timeout(Duration::from_millis(500), stream.next())
            .await
            .expect("timeout")
        {
            Some(Err(CallError::Failed(failure))) => {
                assert_eq!(failure.kind, FailureKind::Failed);
            }
            other => panic!("expected failure terminator, got {other:?}"),
        }
        assert!(stream.next().await.is_none());

        match recv_error(&mut errors).await {
            DispatchError::HandlerFailed { underlying, .. } => {
                assert!(underlying.is_available());
                assert_eq!(underlying.downcast_ref::<ExampleError>(), Some(&ExampleError));
            }
            other => panic!("expected handler failure, got {other:?}"),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(errors.try_recv().is_err(), "expected exactly one report");
    }

    #[tokio::test]
    async fn test_send_after_terminal_is_reported_not_delivered() {
        let (_engine, connection, mut errors) = start(|registry| {
            registry
                .register_sequential::<String, _, _>(
                    route(&["overruns"]),
                    |_ctx, reply| async move {
                        reply.success("only".to_string()).await;
                        reply.finished().await;
                        reply.success("late".to_string()).await;
                        Ok(())
                    },
                )
                .unwrap();
        });

        let mut stream = connection
            .call_sequential_empty::<String>(route(&["overruns"]))
            .await
            .unwrap();

        let first = timeout(Duration::from_millis(500), stream.next())
            .await
            .expect("timeout")
            .expect("element")
            .unwrap();
        assert_eq!(first, "only");
        // The late element was never delivered; the stream ended cleanly.
        assert!(stream.next().await.is_none());

        match recv_error(&mut errors).await {
            DispatchError::ChannelMisuse { kind, .. } => {
                assert_eq!(kind, ChannelMisuseKind::AfterTerminal);
            }
            other => panic!("expected channel misuse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_adapter_collects_all_elements() {
        let (_engine, connection, _errors) = start(|registry| {
            registry
                .register_sequential::<String, _, _>(route(&["letters"]), |_ctx, reply| {
                    async move {
                        for letter in ["a", "b", "c"] {
                            reply.success(letter.to_string()).await;
                        }
                        reply.finished().await;
                        Ok(())
                    }
                })
                .unwrap();
        });

        let stream = connection
            .call_sequential_empty::<String>(route(&["letters"]))
            .await
            .unwrap();

        let collected: Vec<String> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(collected, vec!["a", "b", "c"]);
    }
}
