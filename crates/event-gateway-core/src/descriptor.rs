//! Webhook descriptors
//!
//! A [`WebhookDescriptor`] is the immutable HTTP configuration of one event
//! source: which path on which port it listens on, the optional method it
//! accepts, the externally reachable URL used when registering callbacks with
//! third parties, and optional TLS material.

use crate::ValidationError;
use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP configuration of a webhook event source
///
/// Deserializes from the camelCase layout used in event source manifests:
///
/// ```yaml
/// endpoint: /push
/// method: POST
/// port: "12000"
/// url: https://gateway.example.com
/// serverCertPath: /etc/tls/tls.crt
/// serverKeyPath: /etc/tls/tls.key
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDescriptor {
    endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,

    port: String,

    #[serde(default)]
    url: String,

    #[serde(default, rename = "serverCertPath", skip_serializing_if = "Option::is_none")]
    cert_path: Option<String>,

    #[serde(default, rename = "serverKeyPath", skip_serializing_if = "Option::is_none")]
    key_path: Option<String>,
}

/// Certificate and private key files for a TLS listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert_path: String,
    pub key_path: String,
}

impl WebhookDescriptor {
    /// Create a plaintext descriptor accepting any method
    pub fn new(endpoint: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: None,
            port: port.into(),
            url: String::new(),
            cert_path: None,
            key_path: None,
        }
    }

    /// Restrict the route to a single HTTP method
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Set the externally reachable base URL of the gateway
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Serve the route's port over TLS
    ///
    /// Only honoured when this descriptor is the first to activate its port.
    pub fn with_tls(mut self, cert_path: impl Into<String>, key_path: impl Into<String>) -> Self {
        self.cert_path = Some(cert_path.into());
        self.key_path = Some(key_path.into());
        self
    }

    /// Parse a descriptor from a YAML (or JSON) document
    pub fn from_yaml(document: &str) -> Result<Self, ValidationError> {
        serde_yaml::from_str(document).map_err(|e| ValidationError::InvalidFormat {
            field: "webhook".to_string(),
            message: e.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// TLS files, present only when both cert and key paths are set
    pub fn tls(&self) -> Option<TlsFiles> {
        match (self.cert_path.as_deref(), self.key_path.as_deref()) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => Some(TlsFiles {
                cert_path: cert.to_string(),
                key_path: key.to_string(),
            }),
            _ => None,
        }
    }

    pub fn is_tls(&self) -> bool {
        self.tls().is_some()
    }

    /// Numeric port the route listens on
    pub fn port_number(&self) -> Result<u16, ValidationError> {
        if self.port.is_empty() {
            return Err(ValidationError::Required {
                field: "port".to_string(),
            });
        }

        self.port
            .parse::<u16>()
            .map_err(|e| ValidationError::InvalidFormat {
                field: "port".to_string(),
                message: format!("failed to parse server port '{}': {}", self.port, e),
            })
    }

    /// HTTP method the route is restricted to, if any
    pub fn http_method(&self) -> Result<Option<Method>, ValidationError> {
        match self.method.as_deref() {
            None | Some("") => Ok(None),
            Some(method) => Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map(Some)
                .map_err(|_| ValidationError::InvalidFormat {
                    field: "method".to_string(),
                    message: format!("'{}' is not a valid HTTP method", method),
                }),
        }
    }

    /// Callback URL third parties should deliver to: `url` followed by the endpoint
    pub fn formatted_url(&self) -> String {
        format!("{}{}", self.url, format_endpoint(&self.endpoint))
    }

    /// Validate descriptor invariants
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.endpoint.is_empty() {
            return Err(ValidationError::Required {
                field: "endpoint".to_string(),
            });
        }

        if !self.endpoint.starts_with('/') {
            return Err(ValidationError::InvalidFormat {
                field: "endpoint".to_string(),
                message: format!("'{}' must start with '/'", self.endpoint),
            });
        }

        self.port_number()?;
        self.http_method()?;

        // Half-configured TLS falls back to plaintext, which is rarely intended
        if self.cert_path.is_some() != self.key_path.is_some() {
            return Err(ValidationError::InvalidFormat {
                field: "tls".to_string(),
                message: "serverCertPath and serverKeyPath must be set together".to_string(),
            });
        }

        Ok(())
    }
}

impl fmt::Display for WebhookDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.method.as_deref() {
            Some(method) => write!(f, "{} :{}{}", method, self.port, self.endpoint),
            None => write!(f, ":{}{}", self.port, self.endpoint),
        }
    }
}

/// Prefix an endpoint with `/` when it is missing one
pub fn format_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{}", endpoint)
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
