//! Generic webhook adapter
//!
//! Accepts any request on the route's path and forwards its headers and body
//! as a [`WebhookEventData`] JSON document. JSON bodies are embedded as JSON;
//! every other body is embedded as a string.

use crate::{responses, DispatchError, EndpointRegistry, Route, RouteManager};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::FromRequest,
    http::{header::CONTENT_TYPE, HeaderMap, Request},
    response::Response,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Payload forwarded for every accepted webhook request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEventData {
    /// Request headers, lowercased, with every value of repeated headers
    pub header: BTreeMap<String, Vec<String>>,

    /// Decoded request body
    pub body: Value,
}

impl WebhookEventData {
    /// Decode a request's headers and body
    ///
    /// Fails if the request declares a JSON content type but the body is not
    /// valid JSON.
    pub fn decode(headers: &HeaderMap, body: &[u8]) -> Result<Self, serde_json::Error> {
        let mut header: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in headers {
            header
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        let body = if is_json(headers) {
            serde_json::from_slice(body)?
        } else {
            Value::String(String::from_utf8_lossy(body).into_owned())
        };

        Ok(Self { header, body })
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().contains("json"))
        .unwrap_or(false)
}

/// [`RouteManager`] for plain webhook event sources
///
/// Has no third-party registration, so both hooks are no-ops.
#[derive(Debug)]
pub struct GenericWebhookRoute {
    route: Route,
    endpoints: Arc<EndpointRegistry>,
}

impl GenericWebhookRoute {
    pub fn new(route: Route, endpoints: Arc<EndpointRegistry>) -> Self {
        Self { route, endpoints }
    }
}

#[async_trait]
impl RouteManager for GenericWebhookRoute {
    fn route(&self) -> &Route {
        &self.route
    }

    async fn handle_route(&self, request: Request<Body>) -> Response {
        let path = self.route.descriptor().endpoint();
        let span = self.route.span();
        info!(parent: span, http_method = %request.method(), "a request received, processing it");

        let Some(endpoint) = self
            .endpoints
            .lookup(path)
            .filter(|endpoint| endpoint.is_active())
        else {
            info!(parent: span, "endpoint is not active, rejecting the request");
            return responses::bad_request("endpoint is inactive");
        };

        let headers = request.headers().clone();
        let body = match Bytes::from_request(request, &()).await {
            Ok(body) => body,
            Err(e) => {
                warn!(parent: span, error = %e, "failed to read request body");
                return responses::bad_request(e.body_text());
            }
        };

        let data = match WebhookEventData::decode(&headers, &body) {
            Ok(data) => data,
            Err(e) => {
                warn!(parent: span, error = %e, "failed to decode request body");
                return responses::bad_request(format!("failed to decode request body: {}", e));
            }
        };

        let payload = match serde_json::to_vec(&data) {
            Ok(payload) => payload,
            Err(e) => {
                error!(parent: span, error = %e, "failed to serialize event data");
                return responses::internal_error("failed to serialize event data");
            }
        };

        match endpoint.dispatch(payload).await {
            Ok(()) => {
                debug!(parent: span, "dispatched event data to the route");
                responses::success("success")
            }
            Err(e @ DispatchError::Inactive { .. }) => {
                info!(parent: span, error = %e, "endpoint was deactivated while processing");
                responses::bad_request("endpoint is inactive")
            }
            Err(e @ DispatchError::ChannelClosed { .. }) => {
                error!(parent: span, error = %e, "failed to dispatch event data");
                responses::internal_error("failed to dispatch event data")
            }
        }
    }
}

#[cfg(test)]
#[path = "generic_webhook_tests.rs"]
mod tests;
