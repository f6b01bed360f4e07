//! # Event Gateway Core
//!
//! Shared webhook route controller for event gateways.
//!
//! Every event source that receives callbacks from a third party (GitHub,
//! GitLab, Slack, SNS, a plain webhook, ...) describes its HTTP endpoint with a
//! [`WebhookDescriptor`] and hands a [`RouteManager`] to [`process_route`].
//! The [`RouteController`] multiplexes all of those routes onto one listener
//! per TCP port and bridges each route's inbound requests to the outbound
//! [`EventStream`] of the event source.
//!
//! ## Architecture
//!
//! - [`ServerRegistry`]: one listener and one multiplexer per port
//! - [`EndpointRegistry`]: one active flag and one data channel per path
//! - [`RouteController`]: the actor serializing listener creation
//! - [`process_route`]: the per-route lifecycle (validate, activate,
//!   post start, forward, post stop)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_gateway_core::{
//!     adapters::GenericWebhookRoute, process_route, ChannelEventStream, ControllerOptions,
//!     Route, RouteController, WebhookDescriptor,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), event_gateway_core::RouteError> {
//! let controller = RouteController::spawn(ControllerOptions::default());
//! let descriptor = WebhookDescriptor::new("/push", "12000");
//! let route = Route::new(descriptor, "source-id", "push-source");
//! let manager = Arc::new(GenericWebhookRoute::new(route, controller.endpoints().clone()));
//!
//! let (stream, mut events) = ChannelEventStream::new(16);
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{}: {} bytes", event.name, event.payload.len());
//!     }
//! });
//!
//! process_route(manager, &controller, &stream).await
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod controller;
pub mod descriptor;
pub mod endpoint;
pub mod errors;
pub mod lifecycle;
pub mod responses;
pub mod route;
pub mod server;
pub mod stream;

pub use config::{ControllerOptions, FailureDelivery};
pub use controller::RouteController;
pub use descriptor::{format_endpoint, TlsFiles, WebhookDescriptor};
pub use endpoint::{Endpoint, EndpointRegistry};
pub use errors::{DispatchError, HookError, RouteError, ServerError, StreamError, ValidationError};
pub use lifecycle::process_route;
pub use route::{ReadySignal, Route, RouteManager};
pub use server::{ActiveServer, Mux, Scheme, ServerFailures, ServerRegistry};
pub use stream::{ChannelEventStream, Event, EventReceiver, EventStream};

/// Standard result type for route operations
pub type RouteResult<T> = Result<T, RouteError>;
