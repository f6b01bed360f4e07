//! # Event Gateway Service
//!
//! Runs the webhook event sources listed in the service configuration on a
//! shared [`RouteController`] and delivers their events to the dispatcher
//! over HTTP.
//!
//! Every configured route is driven by its own task through
//! [`process_route`]. Shutdown cancels the routes' event streams, which
//! deactivates each route and runs its `post_stop` hook, and then closes the
//! listeners gracefully.

pub mod config;
pub mod sink;

pub use config::{ConfigError, LoggingConfig, RouteConfig, ServiceConfig};
pub use sink::HttpEventStream;

use event_gateway_core::{
    adapters::GenericWebhookRoute, process_route, Route, RouteController, RouteError,
};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Service errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("All {count} routes stopped before shutdown was requested")]
    RoutesStopped { count: usize },
}

/// Run every configured route until `shutdown` is cancelled
///
/// Returns [`ServiceError::RoutesStopped`] if every route ended on its own.
pub async fn run(config: ServiceConfig, shutdown: CancellationToken) -> Result<(), ServiceError> {
    let controller = RouteController::spawn(config.server.controller_options());
    let mut routes = JoinSet::new();

    for route_config in &config.routes {
        let stream = HttpEventStream::new(&config.sink, shutdown.child_token())?;
        let route = Route::new(
            route_config.descriptor(),
            route_config.source_id(),
            &route_config.name,
        );
        let manager = Arc::new(GenericWebhookRoute::new(
            route,
            Arc::clone(controller.endpoints()),
        ));

        let controller = Arc::clone(&controller);
        let name = route_config.name.clone();
        routes.spawn(async move {
            let result = process_route(manager, &controller, &stream).await;
            (name, result)
        });
    }

    if config.routes.is_empty() {
        warn!("no routes configured");
    }
    info!(
        routes = config.routes.len(),
        sink = %config.sink.url,
        "event gateway started"
    );

    let count = routes.len();
    let requested = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break true,
            joined = routes.join_next() => match joined {
                Some(joined) => report(joined),
                None => break false,
            },
        }
    };

    // Streams are children of `shutdown`, so every remaining route deactivates
    shutdown.cancel();
    while let Some(joined) = routes.join_next().await {
        report(joined);
    }

    controller.shutdown(config.server.shutdown_timeout());
    info!("event gateway stopped");

    if !requested && count > 0 {
        return Err(ServiceError::RoutesStopped { count });
    }

    Ok(())
}

fn report(joined: Result<(String, Result<(), RouteError>), tokio::task::JoinError>) {
    match joined {
        Ok((name, Ok(()))) => info!(event_source = %name, "route stopped"),
        Ok((name, Err(e))) => error!(event_source = %name, error = %e, "route failed"),
        Err(e) => warn!(error = %e, "route task did not complete"),
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
