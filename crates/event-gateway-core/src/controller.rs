//! Route controller
//!
//! The controller owns the [`ServerRegistry`] and the [`EndpointRegistry`]
//! and runs a single actor task that serializes the listener-creation
//! decision:
//!
//! - **Activate**: ensure a listener exists for the route's port, then raise
//!   the route's ready signal.
//! - **Deactivate**: if the route's port has a listener, mark the route's
//!   endpoint inactive.
//!
//! The actor never registers HTTP handlers itself. That happens in the
//! route's own task after the ready signal fires, so many routes can activate
//! concurrently while still agreeing on one listener per port.

use crate::{
    ActiveServer, ControllerOptions, EndpointRegistry, ReadySignal, Route, RouteError,
    ServerRegistry, TlsFiles,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Queue depth of the actor's request channels
const REQUEST_CHANNEL_CAPACITY: usize = 32;

struct ActivateRequest {
    port: u16,
    tls: Option<TlsFiles>,
    ready: Arc<ReadySignal>,
}

struct DeactivateRequest {
    port: u16,
    endpoint: String,
    done: oneshot::Sender<()>,
}

/// Shared webhook route controller
///
/// Construct one per process (or per test) with [`RouteController::spawn`]
/// and share it by `Arc` with every adapter. Dropping the last reference
/// stops the actor; listeners keep running until shut down.
#[derive(Debug)]
pub struct RouteController {
    servers: Arc<ServerRegistry>,
    endpoints: Arc<EndpointRegistry>,
    activate: mpsc::Sender<ActivateRequest>,
    deactivate: mpsc::Sender<DeactivateRequest>,
    options: ControllerOptions,
}

impl RouteController {
    /// Create a controller and start its actor
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(options: ControllerOptions) -> Arc<Self> {
        let servers = Arc::new(ServerRegistry::new(
            options.failure_delivery,
            options.max_body_size,
        ));
        let endpoints = Arc::new(EndpointRegistry::new(options.data_channel_capacity));

        let (activate, activate_requests) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (deactivate, deactivate_requests) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);

        tokio::spawn(run(
            Arc::clone(&servers),
            Arc::clone(&endpoints),
            activate_requests,
            deactivate_requests,
        ));

        Arc::new(Self {
            servers,
            endpoints,
            activate,
            deactivate,
            options,
        })
    }

    pub fn servers(&self) -> &Arc<ServerRegistry> {
        &self.servers
    }

    pub fn endpoints(&self) -> &Arc<EndpointRegistry> {
        &self.endpoints
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Activate a route and wait until its listener exists
    ///
    /// Returns the listener serving the route's port.
    pub async fn activate(&self, route: &Route) -> Result<Arc<ActiveServer>, RouteError> {
        let port = route.descriptor().port_number()?;

        self.activate
            .send(ActivateRequest {
                port,
                tls: route.descriptor().tls(),
                ready: Arc::clone(route.ready()),
            })
            .await
            .map_err(|_| RouteError::ControllerClosed)?;

        match self.options.activation_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, route.ready().wait())
                .await
                .map_err(|_| RouteError::ActivationTimeout { timeout })?,
            None => route.ready().wait().await,
        }

        self.servers
            .get(port)
            .ok_or(RouteError::ServerUnavailable { port })
    }

    /// Mark a route's endpoint inactive
    ///
    /// Returns once the actor has processed the request.
    pub async fn deactivate(&self, route: &Route) -> Result<(), RouteError> {
        let port = route.descriptor().port_number()?;
        let (done, processed) = oneshot::channel();

        self.deactivate
            .send(DeactivateRequest {
                port,
                endpoint: route.descriptor().endpoint().to_string(),
                done,
            })
            .await
            .map_err(|_| RouteError::ControllerClosed)?;

        processed.await.map_err(|_| RouteError::ControllerClosed)
    }

    /// Gracefully close every listener
    pub fn shutdown(&self, grace: Duration) {
        info!(grace_seconds = grace.as_secs(), "shutting down http servers");
        self.servers.shutdown_all(grace);
    }
}

/// Actor loop; runs until both request channels are closed
async fn run(
    servers: Arc<ServerRegistry>,
    endpoints: Arc<EndpointRegistry>,
    mut activate_requests: mpsc::Receiver<ActivateRequest>,
    mut deactivate_requests: mpsc::Receiver<DeactivateRequest>,
) {
    debug!("route controller started");

    loop {
        tokio::select! {
            Some(request) = activate_requests.recv() => {
                let server = servers.ensure_server(request.port, request.tls);
                debug!(port = server.port(), "listener ensured, signaling route");
                request.ready.signal();
            }
            Some(request) = deactivate_requests.recv() => {
                if servers.contains(request.port)
                    && endpoints.set_active(&request.endpoint, false)
                {
                    info!(port = request.port, endpoint = %request.endpoint, "route deactivated");
                }
                // The caller may have given up waiting
                let _ = request.done.send(());
            }
            else => break,
        }
    }

    debug!("route controller stopped");
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
