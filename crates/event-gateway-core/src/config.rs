//! Configuration types for the route controller

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a listener failure reaches the routes sharing its port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureDelivery {
    /// Every route on the port observes the failure and stops
    #[default]
    Broadcast,

    /// Exactly one route on the port observes the failure; the others keep
    /// waiting for their consumer to disconnect
    SingleObserver,
}

/// Route controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerOptions {
    /// Buffered payloads per endpoint before request handlers wait
    pub data_channel_capacity: usize,

    /// Upper bound on waiting for the controller to ready a route (none = wait forever)
    pub activation_timeout_seconds: Option<u64>,

    /// Upper bound on `post_start` / `post_stop` hooks (none = wait forever)
    pub hook_timeout_seconds: Option<u64>,

    /// Delivery policy for listener failures
    pub failure_delivery: FailureDelivery,

    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl ControllerOptions {
    pub fn activation_timeout(&self) -> Option<Duration> {
        self.activation_timeout_seconds.map(Duration::from_secs)
    }

    pub fn hook_timeout(&self) -> Option<Duration> {
        self.hook_timeout_seconds.map(Duration::from_secs)
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            data_channel_capacity: 64,
            activation_timeout_seconds: None,
            hook_timeout_seconds: None,
            failure_delivery: FailureDelivery::Broadcast,
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}
