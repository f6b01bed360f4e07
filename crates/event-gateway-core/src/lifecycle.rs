//! Route lifecycle
//!
//! [`process_route`] drives one route from validation to shutdown:
//!
//! 1. validate the route
//! 2. activate it through the controller and wait for its listener
//! 3. register the route's handler on the port's multiplexer and mark the
//!    endpoint active
//! 4. run the adapter's `post_start` hook
//! 5. forward payloads to the event stream until the consumer disconnects,
//!    the listener fails, or a send fails
//! 6. run the adapter's `post_stop` hook
//!
//! Registrations made in steps 2 and 3 are shared by every route on the same
//! port and path and are never rolled back. The endpoint is marked inactive
//! again whenever the route stops forwarding, so requests are refused instead
//! of queuing behind a forward loop that no longer runs.

use crate::{
    Endpoint, Event, EventStream, HookError, RouteController, RouteError, RouteManager,
    ServerError, ServerFailures, StreamError,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

/// Run a route until its consumer disconnects or it fails
///
/// Returns `Ok(())` when the event stream closed and the route was
/// deactivated. Every other outcome is an error; `post_stop` has already run
/// for every outcome past a successful `post_start`.
pub async fn process_route(
    manager: Arc<dyn RouteManager>,
    controller: &RouteController,
    stream: &dyn EventStream,
) -> Result<(), RouteError> {
    let span = manager.route().span().clone();
    run(manager, controller, stream).instrument(span).await
}

async fn run(
    manager: Arc<dyn RouteManager>,
    controller: &RouteController,
    stream: &dyn EventStream,
) -> Result<(), RouteError> {
    let route = manager.route();

    if let Err(e) = route.validate() {
        error!(error = %e, "route is invalid");
        return Err(e.into());
    }
    let method = route.descriptor().http_method()?;
    let path = route.descriptor().endpoint().to_string();

    debug!("activating route");
    let server = controller.activate(route).await?;
    let mut failures = server.failures();

    let endpoint = controller.endpoints().register_once(
        &path,
        method,
        server.mux(),
        Arc::clone(&manager),
    );
    controller.endpoints().set_active(&path, true);
    info!(url = %route.descriptor().formatted_url(), "route activated");

    debug!("running post start operations");
    let hook_timeout = controller.options().hook_timeout();
    if let Err(e) = with_timeout("post_start", hook_timeout, manager.post_start()).await {
        error!(error = %e, "post start operations failed");
        controller.endpoints().set_active(&path, false);
        return Err(RouteError::PostStart(e));
    }
    info!("route is ready to accept requests");

    let outcome = forward(route.source_name(), &endpoint, &mut failures, stream).await;
    let result = match outcome {
        Outcome::Disconnected => {
            info!("event stream closed, deactivating route");
            controller.deactivate(route).await
        }
        Outcome::ServerFailed(e) => {
            error!(error = %e, "shared server stopped, route can no longer receive requests");
            controller.endpoints().set_active(&path, false);
            Err(RouteError::Server(e))
        }
        Outcome::SendFailed(e) => {
            error!(error = %e, "failed to send event");
            controller.endpoints().set_active(&path, false);
            Err(RouteError::Stream(e))
        }
    };

    debug!("running post stop operations");
    if let Err(e) = with_timeout("post_stop", hook_timeout, manager.post_stop()).await {
        warn!(error = %e, "post stop operations failed");
    }

    result
}

enum Outcome {
    Disconnected,
    ServerFailed(ServerError),
    SendFailed(StreamError),
}

async fn forward(
    source_name: &str,
    endpoint: &Endpoint,
    failures: &mut ServerFailures,
    stream: &dyn EventStream,
) -> Outcome {
    loop {
        tokio::select! {
            Some(payload) = endpoint.next_payload() => {
                debug!(bytes = payload.len(), "forwarding event");
                // A consumer leaving mid-send is a disconnect, not a failure
                tokio::select! {
                    biased;
                    _ = stream.closed() => return Outcome::Disconnected,
                    sent = stream.send(Event::new(source_name, payload)) => match sent {
                        Ok(()) => {}
                        Err(StreamError::Closed) => return Outcome::Disconnected,
                        Err(e) => return Outcome::SendFailed(e),
                    },
                }
            }
            _ = stream.closed() => return Outcome::Disconnected,
            e = failures.wait() => return Outcome::ServerFailed(e),
        }
    }
}

/// Bound a hook by the configured timeout, if any
async fn with_timeout<F>(
    hook: &'static str,
    timeout: Option<Duration>,
    future: F,
) -> Result<(), HookError>
where
    F: Future<Output = Result<(), HookError>>,
{
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, future)
            .await
            .map_err(|_| HookError::Timeout { hook, timeout })?,
        None => future.await,
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
