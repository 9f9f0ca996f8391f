//! # Route Registry
//!
//! The registration-phase surface: routes and the error handler are declared
//! here, before the server accepts messages. Starting the engine consumes the
//! registry, which closes the registration phase by ownership; the route
//! table then behaves as an immutable mapping read concurrently without
//! locking.

use crate::handler::{self, RouteHandler};
use crate::hook::{self, ErrorHandler};
use crate::reply::{SequentialReply, SingleReply};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::type_name;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use switchboard_types::{
    ConnectionContext, DispatchError, HandlerError, RegistrationError, ReplyCardinality, RouteId,
    RouteSignature,
};
use tracing::{debug, warn};

/// One registered route: declared signature plus handler.
pub(crate) struct RegisteredRoute {
    pub(crate) signature: RouteSignature,
    pub(crate) handler: RouteHandler,
}

/// Collects routes and the error handler during the registration phase.
#[derive(Default)]
pub struct RouteRegistry {
    routes: HashMap<RouteId, RegisteredRoute>,
    error_handler: Option<ErrorHandler>,
}

impl RouteRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fire-and-forget route without a payload.
    pub fn register<F, Fut>(&mut self, route: RouteId, handler: F) -> Result<(), RegistrationError>
    where
        F: Fn(Arc<ConnectionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.insert(
            route,
            RouteSignature::new(None, None, ReplyCardinality::None),
            RouteHandler::OneWay(handler::one_way(handler)),
        )
    }

    /// Register a fire-and-forget route taking a payload.
    pub fn register_with_payload<P, F, Fut>(
        &mut self,
        route: RouteId,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(Arc<ConnectionContext>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.insert(
            route,
            RouteSignature::new(Some(type_name::<P>()), None, ReplyCardinality::None),
            RouteHandler::OneWay(handler::one_way_with_payload(handler)),
        )
    }

    /// Register a single-reply route without a payload.
    pub fn register_with_reply<R, F, Fut>(
        &mut self,
        route: RouteId,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        R: Serialize + Send + 'static,
        F: Fn(Arc<ConnectionContext>, SingleReply<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.insert(
            route,
            RouteSignature::new(None, Some(type_name::<R>()), ReplyCardinality::Single),
            RouteHandler::Single(handler::single(handler)),
        )
    }

    /// Register a single-reply route taking a payload.
    pub fn register_with_payload_and_reply<P, R, F, Fut>(
        &mut self,
        route: RouteId,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<ConnectionContext>, P, SingleReply<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.insert(
            route,
            RouteSignature::new(
                Some(type_name::<P>()),
                Some(type_name::<R>()),
                ReplyCardinality::Single,
            ),
            RouteHandler::Single(handler::single_with_payload(handler)),
        )
    }

    /// Register a sequential-reply route without a payload.
    pub fn register_sequential<R, F, Fut>(
        &mut self,
        route: RouteId,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        R: Serialize + Send + 'static,
        F: Fn(Arc<ConnectionContext>, SequentialReply<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.insert(
            route,
            RouteSignature::new(None, Some(type_name::<R>()), ReplyCardinality::Sequential),
            RouteHandler::Sequential(handler::sequential(handler)),
        )
    }

    /// Register a sequential-reply route taking a payload.
    pub fn register_sequential_with_payload<P, R, F, Fut>(
        &mut self,
        route: RouteId,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(Arc<ConnectionContext>, P, SequentialReply<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.insert(
            route,
            RouteSignature::new(
                Some(type_name::<P>()),
                Some(type_name::<R>()),
                ReplyCardinality::Sequential,
            ),
            RouteHandler::Sequential(handler::sequential_with_payload(handler)),
        )
    }

    /// Set the error handler for this server instance.
    ///
    /// The last registration wins; replacing an earlier handler is logged.
    pub fn set_error_handler<F, Fut>(&mut self, handler: F)
    where
        F: Fn(DispatchError, Arc<ConnectionContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.error_handler.is_some() {
            warn!("error handler already set, replacing");
        }
        self.error_handler = Some(hook::wrap_handler(handler));
    }

    /// The signature a route was registered with, if any.
    #[must_use]
    pub fn lookup(&self, route: &RouteId) -> Option<&RouteSignature> {
        self.routes.get(route).map(|entry| &entry.signature)
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn insert(
        &mut self,
        route: RouteId,
        signature: RouteSignature,
        handler: RouteHandler,
    ) -> Result<(), RegistrationError> {
        match self.routes.entry(route) {
            Entry::Occupied(entry) => Err(RegistrationError::DuplicateRoute {
                route: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                debug!(
                    route = %entry.key(),
                    cardinality = ?signature.cardinality(),
                    payload = signature.payload_type().unwrap_or("none"),
                    "route registered"
                );
                entry.insert(RegisteredRoute { signature, handler });
                Ok(())
            }
        }
    }

    pub(crate) fn into_parts(self) -> (RouteTable, Option<ErrorHandler>) {
        (
            RouteTable {
                routes: self.routes,
            },
            self.error_handler,
        )
    }
}

/// Immutable route table the running engine reads without locking.
pub(crate) struct RouteTable {
    routes: HashMap<RouteId, RegisteredRoute>,
}

impl RouteTable {
    pub(crate) fn lookup(&self, route: &RouteId) -> Option<&RegisteredRoute> {
        self.routes.get(route)
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.len()
    }
}
