//! Routes and the adapter contract
//!
//! A [`Route`] binds a [`WebhookDescriptor`] to the identity of one event
//! source. Protocol adapters wrap a route in a type implementing
//! [`RouteManager`] and hand it to [`process_route`](crate::process_route).

use crate::{HookError, ValidationError, WebhookDescriptor};
use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Span;

// ============================================================================
// Ready Signal
// ============================================================================

/// One-shot signal raised by the controller once the route's listener exists
#[derive(Debug)]
pub struct ReadySignal {
    sender: watch::Sender<bool>,
}

impl ReadySignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Raise the signal
    ///
    /// Returns `false` when the signal had already been raised; the second
    /// call has no effect.
    pub fn signal(&self) -> bool {
        self.sender.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    pub fn is_ready(&self) -> bool {
        *self.sender.borrow()
    }

    /// Wait until the signal is raised
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting
        let _ = receiver.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Route
// ============================================================================

/// One event source's webhook configuration plus its activation signal
#[derive(Debug)]
pub struct Route {
    descriptor: WebhookDescriptor,
    source_id: String,
    source_name: String,
    ready: Arc<ReadySignal>,
    span: Span,
}

impl Route {
    /// Create a route for an event source
    ///
    /// All lifecycle logging of the route happens inside a span carrying the
    /// event source name, port and endpoint.
    pub fn new(
        descriptor: WebhookDescriptor,
        source_id: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        let source_id = source_id.into();
        let source_name = source_name.into();
        let span = tracing::info_span!(
            "route",
            event_source = %source_name,
            port = %descriptor.port(),
            endpoint = %descriptor.endpoint(),
        );

        Self {
            descriptor,
            source_id,
            source_name,
            ready: Arc::new(ReadySignal::new()),
            span,
        }
    }

    pub fn descriptor(&self) -> &WebhookDescriptor {
        &self.descriptor
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Signal raised once the route's listener is running
    pub fn ready(&self) -> &Arc<ReadySignal> {
        &self.ready
    }

    /// Span all of the route's logging is recorded in
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Validate the route and its descriptor
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_id.is_empty() {
            return Err(ValidationError::Required {
                field: "source_id".to_string(),
            });
        }

        if self.source_name.is_empty() {
            return Err(ValidationError::Required {
                field: "source_name".to_string(),
            });
        }

        self.descriptor.validate()
    }
}

// ============================================================================
// Route Manager
// ============================================================================

/// Protocol adapter contract
///
/// Implemented once per gateway type (GitHub, SNS, Slack, a plain webhook,
/// ...). The controller never decodes payloads itself; it calls
/// [`handle_route`](RouteManager::handle_route) for every request on the
/// route's path and the two hooks around the forward loop.
///
/// # Request handling
///
/// `handle_route` must:
/// 1. Look up the route's [`Endpoint`](crate::Endpoint) and answer `400` if
///    it is not active.
/// 2. Read and decode the body, answering `400` if decoding fails.
/// 3. Only on success, [`dispatch`](crate::Endpoint::dispatch) the decoded
///    bytes and answer `200`.
///
/// The helpers in [`responses`](crate::responses) produce the
/// `{"msg": "..."}` bodies gateways answer with.
#[async_trait]
pub trait RouteManager: Send + Sync + 'static {
    /// The route this manager drives
    fn route(&self) -> &Route;

    /// Handle one inbound request on the route's path
    async fn handle_route(&self, request: Request<Body>) -> Response;

    /// Register with the third party once the route is accepting requests
    async fn post_start(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Deregister from the third party after the route stopped forwarding
    async fn post_stop(&self) -> Result<(), HookError> {
        Ok(())
    }

    fn descriptor(&self) -> &WebhookDescriptor {
        self.route().descriptor()
    }
}

#[cfg(test)]
#[path = "route_tests.rs"]
mod tests;
