//! Common test utilities for event-gateway integration tests
//!
//! This module provides:
//! - A raw-body [`RouteManager`] with hook counters, a `post_start` gate and
//!   failure injection
//! - Helpers for spawning routes and sending requests to real listeners

use async_trait::async_trait;
use axum::{body::Body, extract::FromRequest, http::Request, response::Response};
use bytes::Bytes;
use event_gateway_core::{
    process_route, responses, ChannelEventStream, EndpointRegistry, EventReceiver, HookError,
    Route, RouteController, RouteError, RouteManager, WebhookDescriptor,
};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Duration;

#[allow(dead_code)]
pub const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Raw Route
// ============================================================================

/// Route manager forwarding request bodies unchanged
#[allow(dead_code)]
pub struct RawRoute {
    route: Route,
    endpoints: Arc<EndpointRegistry>,
    gate: Option<Arc<Notify>>,
    fail_post_start: bool,
    post_starts: AtomicUsize,
    post_stops: AtomicUsize,
}

#[allow(dead_code)]
impl RawRoute {
    pub fn new(controller: &RouteController, name: &str, descriptor: WebhookDescriptor) -> Self {
        Self {
            route: Route::new(descriptor, format!("{}-id", name), name),
            endpoints: Arc::clone(controller.endpoints()),
            gate: None,
            fail_post_start: false,
            post_starts: AtomicUsize::new(0),
            post_stops: AtomicUsize::new(0),
        }
    }

    /// Hold `post_start` until the returned gate is notified
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn failing_post_start(mut self) -> Self {
        self.fail_post_start = true;
        self
    }

    pub fn post_starts(&self) -> usize {
        self.post_starts.load(Ordering::SeqCst)
    }

    pub fn post_stops(&self) -> usize {
        self.post_stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouteManager for RawRoute {
    fn route(&self) -> &Route {
        &self.route
    }

    async fn handle_route(&self, request: Request<Body>) -> Response {
        let Some(endpoint) = self
            .endpoints
            .lookup(self.route.descriptor().endpoint())
            .filter(|endpoint| endpoint.is_active())
        else {
            return responses::bad_request("endpoint is inactive");
        };

        let body = match Bytes::from_request(request, &()).await {
            Ok(body) => body,
            Err(e) => return responses::bad_request(e.body_text()),
        };

        match endpoint.dispatch(body).await {
            Ok(()) => responses::success("success"),
            Err(e) => responses::bad_request(e.to_string()),
        }
    }

    async fn post_start(&self) -> Result<(), HookError> {
        self.post_starts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_post_start {
            return Err(HookError::external("test-service", "registration refused"));
        }
        Ok(())
    }

    async fn post_stop(&self) -> Result<(), HookError> {
        self.post_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Running Routes
// ============================================================================

/// A route driven by `process_route` on a background task
#[allow(dead_code)]
pub struct RunningRoute {
    pub manager: Arc<RawRoute>,
    pub events: EventReceiver,
    pub task: JoinHandle<Result<(), RouteError>>,
}

#[allow(dead_code)]
impl RunningRoute {
    /// Close the event stream and wait for the route to finish
    pub async fn stop(mut self) -> Result<(), RouteError> {
        self.events.close();
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("route should stop after its stream closes")
            .expect("route task panicked")
    }

    /// Wait for the route to finish on its own
    pub async fn finished(&mut self) -> Result<(), RouteError> {
        tokio::time::timeout(WAIT, &mut self.task)
            .await
            .expect("route should have finished")
            .expect("route task panicked")
    }
}

/// Spawn `process_route` for `manager` with a fresh channel stream
#[allow(dead_code)]
pub fn spawn_route(controller: &Arc<RouteController>, manager: RawRoute) -> RunningRoute {
    let manager = Arc::new(manager);
    let (stream, events) = ChannelEventStream::new(16);

    let task = {
        let controller = Arc::clone(controller);
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { process_route(manager, &controller, &stream).await })
    };

    RunningRoute {
        manager,
        events,
        task,
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A port nothing is listening on
#[allow(dead_code)]
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Poll `condition` until it holds
#[allow(dead_code)]
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition was not met in time");
}

/// Send a request to a local listener and return the status and `msg` field
#[allow(dead_code)]
pub async fn send(
    method: reqwest::Method,
    port: u16,
    path: &str,
    body: &'static str,
) -> (u16, String) {
    let response = reqwest::Client::new()
        .request(method, format!("http://127.0.0.1:{}{}", port, path))
        .body(body)
        .send()
        .await
        .unwrap();

    let status = response.status().as_u16();
    let body: serde_json::Value = response.json().await.unwrap();
    let msg = body["msg"].as_str().unwrap_or_default().to_string();
    (status, msg)
}

/// `POST` to a local listener
#[allow(dead_code)]
pub async fn post(port: u16, path: &str, body: &'static str) -> (u16, String) {
    send(reqwest::Method::POST, port, path, body).await
}
