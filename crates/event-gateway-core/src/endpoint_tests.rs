//! Tests for the endpoint registry.

use super::*;
use crate::{responses, Route, WebhookDescriptor};
use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use std::time::Duration;

struct StaticRoute {
    route: Route,
    msg: &'static str,
}

impl StaticRoute {
    fn arc(path: &str, msg: &'static str) -> Arc<Self> {
        Arc::new(Self {
            route: Route::new(WebhookDescriptor::new(path, "12000"), "id", "source"),
            msg,
        })
    }
}

#[async_trait]
impl RouteManager for StaticRoute {
    fn route(&self) -> &Route {
        &self.route
    }

    async fn handle_route(&self, _request: Request<Body>) -> Response {
        responses::success(self.msg)
    }
}

#[test]
fn test_register_once_creates_inactive_endpoint() {
    let registry = EndpointRegistry::new(4);
    let mux = Mux::new(12000);

    let endpoint = registry.register_once("/push", None, &mux, StaticRoute::arc("/push", "a"));

    assert_eq!(endpoint.path(), "/push");
    assert!(!endpoint.is_active());
    assert_eq!(registry.len(), 1);
    assert!(mux.contains("/push"));
}

#[test]
fn test_register_once_reuses_endpoint_and_handler() {
    let registry = EndpointRegistry::new(4);
    let mux = Mux::new(12000);

    let first = registry.register_once("/push", None, &mux, StaticRoute::arc("/push", "a"));
    let second = registry.register_once("/push", None, &mux, StaticRoute::arc("/push", "b"));

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);
    assert_eq!(mux.len(), 1);
}

#[test]
fn test_register_once_shares_mux_between_paths() {
    let registry = EndpointRegistry::new(4);
    let mux = Mux::new(12000);

    registry.register_once("/a", None, &mux, StaticRoute::arc("/a", "a"));
    registry.register_once("/b", None, &mux, StaticRoute::arc("/b", "b"));

    assert_eq!(registry.len(), 2);
    assert_eq!(mux.len(), 2);
}

#[test]
fn test_set_active_unknown_path() {
    let registry = EndpointRegistry::new(4);
    assert!(!registry.set_active("/missing", true));
    assert!(registry.lookup("/missing").is_none());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_dispatch_refused_while_inactive() {
    let registry = EndpointRegistry::new(4);
    let mux = Mux::new(12000);
    let endpoint = registry.register_once("/push", None, &mux, StaticRoute::arc("/push", "a"));

    let result = endpoint.dispatch(&b"payload"[..]).await;

    assert_eq!(
        result,
        Err(DispatchError::Inactive {
            path: "/push".to_string()
        })
    );
    assert_eq!(endpoint.queued(), 0);
}

#[tokio::test]
async fn test_dispatch_delivers_in_order_while_active() {
    let registry = EndpointRegistry::new(4);
    let mux = Mux::new(12000);
    let endpoint = registry.register_once("/push", None, &mux, StaticRoute::arc("/push", "a"));
    assert!(registry.set_active("/push", true));

    endpoint.dispatch(&b"first"[..]).await.unwrap();
    endpoint.dispatch(&b"second"[..]).await.unwrap();
    assert_eq!(endpoint.queued(), 2);

    assert_eq!(endpoint.next_payload().await.unwrap(), Bytes::from_static(b"first"));
    assert_eq!(endpoint.next_payload().await.unwrap(), Bytes::from_static(b"second"));
    assert_eq!(endpoint.queued(), 0);
}

#[tokio::test]
async fn test_deactivation_discards_queued_payloads() {
    let registry = EndpointRegistry::new(4);
    let mux = Mux::new(12000);
    let endpoint = registry.register_once("/push", None, &mux, StaticRoute::arc("/push", "a"));

    registry.set_active("/push", true);
    endpoint.dispatch(&b"stale"[..]).await.unwrap();
    assert_eq!(endpoint.queued(), 1);
    registry.set_active("/push", false);
    assert_eq!(endpoint.queued(), 0);

    // Reactivation reuses the same endpoint and starts from an empty channel
    registry.set_active("/push", true);
    let again = registry.lookup("/push").unwrap();
    assert!(Arc::ptr_eq(&endpoint, &again));
    assert!(again.is_active());

    endpoint.dispatch(&b"fresh"[..]).await.unwrap();
    assert_eq!(endpoint.next_payload().await, Some(Bytes::from_static(b"fresh")));
}

#[tokio::test]
async fn test_blocked_dispatch_fails_on_deactivation() {
    let registry = EndpointRegistry::new(1);
    let mux = Mux::new(12000);
    let endpoint = registry.register_once("/push", None, &mux, StaticRoute::arc("/push", "a"));
    registry.set_active("/push", true);
    endpoint.dispatch(&b"one"[..]).await.unwrap();

    let blocked = {
        let endpoint = Arc::clone(&endpoint);
        tokio::spawn(async move { endpoint.dispatch(&b"two"[..]).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_finished(), "dispatch should wait on a full channel");

    registry.set_active("/push", false);

    let result = tokio::time::timeout(Duration::from_secs(1), blocked)
        .await
        .expect("deactivation should release the blocked dispatch")
        .unwrap();
    assert_eq!(
        result,
        Err(DispatchError::Inactive {
            path: "/push".to_string()
        })
    );
    assert_eq!(endpoint.queued(), 0);
}

#[tokio::test]
async fn test_next_payload_is_cancel_safe() {
    let registry = EndpointRegistry::new(4);
    let mux = Mux::new(12000);
    let endpoint = registry.register_once("/push", None, &mux, StaticRoute::arc("/push", "a"));
    registry.set_active("/push", true);

    let pending = tokio::time::timeout(Duration::from_millis(20), endpoint.next_payload()).await;
    assert!(pending.is_err());

    endpoint.dispatch(&b"late"[..]).await.unwrap();
    assert_eq!(endpoint.next_payload().await, Some(Bytes::from_static(b"late")));
}
