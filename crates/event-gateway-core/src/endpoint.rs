//! Endpoint registry
//!
//! Tracks, per HTTP path, whether a route is currently accepting requests and
//! the channel decoded payloads travel through on their way to the route's
//! forward loop.
//!
//! Endpoints are never removed: handlers cannot be detached from a running
//! multiplexer, so a deactivated path keeps its entry (and its channel) and
//! answers `400` until a route activates it again. Payloads still queued when
//! the active flag flips are discarded; they belong to a forward loop that is
//! gone.
//!
//! The path map is guarded by its own mutex and the active flag lives in a
//! `watch` channel, so request handlers never contend with the controller
//! actor and a handler blocked on a full channel sees deactivation.

use crate::{server::Mux, DispatchError, RouteManager};
use axum::http::Method;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

// ============================================================================
// Endpoint
// ============================================================================

/// State of one HTTP path: active flag plus decoded-payload channel
#[derive(Debug)]
pub struct Endpoint {
    path: String,
    active: watch::Sender<bool>,
    sender: mpsc::Sender<Bytes>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
}

impl Endpoint {
    fn new(path: &str, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (active, _) = watch::channel(false);
        Self {
            path: path.to_string(),
            active,
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    pub(crate) fn set_active(&self, active: bool) {
        let previous = self.active.send_replace(active);
        if previous != active {
            let discarded = self.discard_queued();
            if discarded > 0 {
                debug!(endpoint = %self.path, discarded, "discarded stale payloads");
            }
        }
    }

    /// Hand a decoded payload to the route's forward loop
    ///
    /// Waits while the channel is full, but gives up with
    /// [`DispatchError::Inactive`] as soon as the endpoint is deactivated.
    pub async fn dispatch(&self, payload: impl Into<Bytes>) -> Result<(), DispatchError> {
        let mut active = self.active.subscribe();
        if !*active.borrow_and_update() {
            return Err(self.inactive());
        }

        tokio::select! {
            biased;
            _ = active.wait_for(|active| !*active) => Err(self.inactive()),
            sent = self.sender.send(payload.into()) => {
                sent.map_err(|_| DispatchError::ChannelClosed {
                    path: self.path.clone(),
                })
            }
        }
    }

    fn inactive(&self) -> DispatchError {
        DispatchError::Inactive {
            path: self.path.clone(),
        }
    }

    /// Number of payloads waiting for the forward loop
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Receive the next payload
    ///
    /// Cancel-safe: dropping the future before it completes loses nothing.
    pub(crate) async fn next_payload(&self) -> Option<Bytes> {
        self.receiver.lock().await.recv().await
    }

    /// Drop every queued payload unless a forward loop is receiving
    fn discard_queued(&self) -> usize {
        let Ok(mut receiver) = self.receiver.try_lock() else {
            return 0;
        };

        let mut discarded = 0;
        while receiver.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

// ============================================================================
// Endpoint Registry
// ============================================================================

/// Process-wide map from HTTP path to [`Endpoint`]
#[derive(Debug)]
pub struct EndpointRegistry {
    endpoints: Mutex<HashMap<String, Arc<Endpoint>>>,
    capacity: usize,
}

impl EndpointRegistry {
    /// Create an empty registry whose endpoints buffer `capacity` payloads
    pub fn new(capacity: usize) -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Endpoint>>> {
        self.endpoints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get or create the endpoint for `path` and bind `manager` to it on `mux`
    ///
    /// The handler is attached at most once per multiplexer and path; later
    /// registrations for the same path keep the first registrant's handler.
    /// The endpoint is returned inactive if it was just created.
    pub fn register_once(
        &self,
        path: &str,
        method: Option<Method>,
        mux: &Mux,
        manager: Arc<dyn RouteManager>,
    ) -> Arc<Endpoint> {
        let endpoint = {
            let mut endpoints = self.lock();
            Arc::clone(endpoints.entry(path.to_string()).or_insert_with(|| {
                debug!(endpoint = %path, "creating endpoint");
                Arc::new(Endpoint::new(path, self.capacity))
            }))
        };

        if mux.register(path, method, manager) {
            info!(endpoint = %path, port = mux.port(), "route handler added");
        } else {
            debug!(
                endpoint = %path,
                port = mux.port(),
                "route handler already registered, keeping the existing one"
            );
        }

        endpoint
    }

    /// Flip the active flag of `path`
    ///
    /// Returns `false` if no endpoint exists for the path.
    pub fn set_active(&self, path: &str, active: bool) -> bool {
        match self.lookup(path) {
            Some(endpoint) => {
                endpoint.set_active(active);
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, path: &str) -> Option<Arc<Endpoint>> {
        self.lock().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;
