//! Configuration types for the gateway service
//!
//! Sources, applied in order (later sources override earlier ones):
//!
//! 1. `/etc/event-gateway/service.yaml`: system-wide defaults
//! 2. `./config/service.yaml`: deployment-local override
//! 3. the path given by `--config` or `EG_CONFIG_FILE`
//! 4. environment variables prefixed `EG__` with `__` as separator,
//!    e.g. `EG__SINK__URL=http://dispatcher:9300/events`
//!
//! Every field carries a serde default, so a missing file produces a valid
//! configuration without routes. A malformed file or an environment variable
//! of the wrong type is a hard error.

use event_gateway_core::{ControllerOptions, FailureDelivery, WebhookDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration loading failed: {0}")]
    Loading(#[from] config::ConfigError),
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Route controller and listener settings
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Where forwarded events are delivered
    pub sink: SinkConfig,

    /// Webhook event sources served by this process
    pub routes: Vec<RouteConfig>,
}

impl ServiceConfig {
    /// Load the layered configuration
    ///
    /// `explicit` is the operator-supplied file and must exist when given.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("/etc/event-gateway/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::with_name("config/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            );

        if let Some(path) = explicit {
            info!(path = %path.display(), "loading configuration from explicit path");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("EG").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.sink.validate()?;

        let mut names = HashSet::new();
        for route in &self.routes {
            route.validate()?;
            if !names.insert(route.name.as_str()) {
                return Err(ConfigError::Invalid {
                    message: format!("route name '{}' is used more than once", route.name),
                });
            }
        }

        Ok(())
    }
}

/// Route controller and listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Buffered payloads per endpoint
    pub data_channel_capacity: usize,

    /// Upper bound on route activation (none = wait forever)
    pub activation_timeout_seconds: Option<u64>,

    /// Upper bound on third-party registration hooks (none = wait forever)
    pub hook_timeout_seconds: Option<u64>,

    /// How a listener failure reaches the routes sharing its port
    pub failure_delivery: FailureDelivery,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl ServerConfig {
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            data_channel_capacity: self.data_channel_capacity,
            activation_timeout_seconds: self.activation_timeout_seconds,
            hook_timeout_seconds: self.hook_timeout_seconds,
            failure_delivery: self.failure_delivery,
            max_body_size: self.max_body_size,
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.data_channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "server.data_channel_capacity must be greater than zero".to_string(),
            });
        }

        if self.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let options = ControllerOptions::default();
        Self {
            data_channel_capacity: options.data_channel_capacity,
            activation_timeout_seconds: options.activation_timeout_seconds,
            hook_timeout_seconds: options.hook_timeout_seconds,
            failure_delivery: options.failure_delivery,
            shutdown_timeout_seconds: 30,
            max_body_size: options.max_body_size,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Event dispatcher endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// URL events are POSTed to
    pub url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl SinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Missing {
                key: "sink.url".to_string(),
            });
        }

        let url = url::Url::parse(&self.url).map_err(|e| ConfigError::Invalid {
            message: format!("sink.url '{}' is not a valid URL: {}", self.url, e),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                message: format!("sink.url must use http or https, got '{}'", url.scheme()),
            });
        }

        Ok(())
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9300/events".to_string(),
            timeout_seconds: 10,
        }
    }
}

/// One webhook event source
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RouteConfig {
    /// Event source name, attached to every forwarded event
    pub name: String,

    /// Event source identifier
    pub id: String,

    /// HTTP path of the route
    pub endpoint: String,

    /// Only accept this HTTP method (any method when unset)
    pub method: Option<String>,

    /// Port the route listens on
    pub port: String,

    /// Externally reachable base URL of the gateway
    pub url: String,

    /// TLS certificate, used only if this route is the first on its port
    pub server_cert_path: Option<String>,

    /// TLS private key, used only if this route is the first on its port
    pub server_key_path: Option<String>,
}

impl RouteConfig {
    /// Build the webhook descriptor of this route
    pub fn descriptor(&self) -> WebhookDescriptor {
        let mut descriptor =
            WebhookDescriptor::new(&self.endpoint, &self.port).with_url(&self.url);

        if let Some(method) = &self.method {
            descriptor = descriptor.with_method(method);
        }

        match (&self.server_cert_path, &self.server_key_path) {
            (Some(cert), Some(key)) => descriptor.with_tls(cert, key),
            _ => descriptor,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Missing {
                key: "routes[].name".to_string(),
            });
        }

        if self.server_cert_path.is_some() != self.server_key_path.is_some() {
            return Err(ConfigError::Invalid {
                message: format!(
                    "route '{}': server_cert_path and server_key_path must be set together",
                    self.name
                ),
            });
        }

        self.descriptor()
            .validate()
            .map_err(|e| ConfigError::Invalid {
                message: format!("route '{}': {}", self.name, e),
            })
    }

    /// Event source identifier, falling back to the name
    pub fn source_id(&self) -> &str {
        if self.id.is_empty() {
            &self.name
        } else {
            &self.id
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
