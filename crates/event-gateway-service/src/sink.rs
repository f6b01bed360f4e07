//! HTTP event stream
//!
//! Delivers every forwarded event to the event dispatcher as one `POST`
//! request. The body is the event payload unchanged; the event source name
//! travels in the `x-event-source` header.

use crate::config::{ConfigError, SinkConfig};
use async_trait::async_trait;
use event_gateway_core::{Event, EventStream, StreamError};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Header carrying the name of the event source
pub const EVENT_SOURCE_HEADER: &str = "x-event-source";

/// [`EventStream`] posting events to the dispatcher
///
/// The stream counts as disconnected once its cancellation token is
/// cancelled, which deactivates the route using it.
#[derive(Debug, Clone)]
pub struct HttpEventStream {
    client: reqwest::Client,
    url: Url,
    token: CancellationToken,
}

impl HttpEventStream {
    pub fn new(config: &SinkConfig, token: CancellationToken) -> Result<Self, ConfigError> {
        let url = Url::parse(&config.url).map_err(|e| ConfigError::Invalid {
            message: format!("sink.url '{}' is not a valid URL: {}", config.url, e),
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, url, token })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl EventStream for HttpEventStream {
    async fn send(&self, event: Event) -> Result<(), StreamError> {
        if self.token.is_cancelled() {
            return Err(StreamError::Closed);
        }

        let response = self
            .client
            .post(self.url.clone())
            .header(EVENT_SOURCE_HEADER, &event.name)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(event.payload)
            .send()
            .await
            .map_err(|e| StreamError::SendFailed {
                message: e.to_string(),
            })?;

        let status = response.status();
        response
            .error_for_status()
            .map_err(|e| StreamError::SendFailed {
                message: e.to_string(),
            })?;

        debug!(event_source = %event.name, status = %status, "event delivered");
        Ok(())
    }

    async fn closed(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
