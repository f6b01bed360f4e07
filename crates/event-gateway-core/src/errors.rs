//! Error types for route processing
//!
//! Every route lifecycle ends with a single [`RouteError`] (or success). The
//! narrower error types describe one failing collaborator each and convert
//! into [`RouteError`] where the lifecycle treats them as terminal.

use std::time::Duration;

// ============================================================================
// Validation Errors
// ============================================================================

/// Validation errors for descriptors and routes
///
/// Raised synchronously before a route has any side effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },
}

// ============================================================================
// Server Errors
// ============================================================================

/// Failure of a shared listener
///
/// Published on the port's failure channel once the serving task exits. The
/// error is cloned to every route that observes it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind listener on port {port}: {message}")]
    BindFailed { port: u16, message: String },

    #[error("Failed to load TLS material for port {port}: {message}")]
    TlsConfig { port: u16, message: String },

    #[error("Listener on port {port} failed: {message}")]
    ServeFailed { port: u16, message: String },

    #[error("Listener on port {port} was closed")]
    Closed { port: u16 },
}

impl ServerError {
    /// Port of the listener that failed
    pub fn port(&self) -> u16 {
        match self {
            Self::BindFailed { port, .. }
            | Self::TlsConfig { port, .. }
            | Self::ServeFailed { port, .. }
            | Self::Closed { port } => *port,
        }
    }
}

// ============================================================================
// Hook Errors
// ============================================================================

/// Failure of a `post_start` / `post_stop` hook
///
/// Hooks talk to third-party systems (subscribe to a topic, create a webhook,
/// join a channel). Adapters report their failures with
/// [`HookError::ExternalService`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("Hook '{hook}' did not complete within {timeout:?}")]
    Timeout { hook: &'static str, timeout: Duration },
}

impl HookError {
    /// Shorthand for an external service failure
    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Stream Errors
// ============================================================================

/// Failure to deliver an event on the outbound stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Outbound event stream is closed")]
    Closed,

    #[error("Failed to send event: {message}")]
    SendFailed { message: String },
}

/// Failure to hand a decoded payload to the forward loop
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Endpoint '{path}' is not active")]
    Inactive { path: String },

    #[error("Data channel of endpoint '{path}' is closed")]
    ChannelClosed { path: String },
}

// ============================================================================
// Route Errors
// ============================================================================

/// Terminal error of a route lifecycle
///
/// Returned by [`process_route`](crate::process_route). A route that stops
/// because its consumer disconnected returns `Ok(())` instead.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Route is invalid: {0}")]
    Validation(#[from] ValidationError),

    #[error("Route controller is not running")]
    ControllerClosed,

    #[error("Route activation did not complete within {timeout:?}")]
    ActivationTimeout { timeout: Duration },

    #[error("No listener is registered for port {port}")]
    ServerUnavailable { port: u16 },

    #[error("Post start operations failed: {0}")]
    PostStart(#[source] HookError),

    #[error("Shared server stopped: {0}")]
    Server(#[from] ServerError),

    #[error("Failed to forward event: {0}")]
    Stream(#[from] StreamError),
}

impl RouteError {
    /// Check if the route failed before it had any side effect
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
