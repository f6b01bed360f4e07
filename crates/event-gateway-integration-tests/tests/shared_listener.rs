//! Integration tests for sharing one listener between routes
//!
//! These tests drive real listeners: every route activates through
//! `process_route` and requests travel over TCP.

mod common;

use bytes::Bytes;
use common::{free_port, post, send, spawn_route, wait_until, RawRoute};
use event_gateway_core::{ControllerOptions, RouteController, Scheme, WebhookDescriptor};
use tokio_test::assert_ok;

/// Verify that many routes activating at once create exactly one listener
#[tokio::test]
async fn test_concurrent_activations_share_one_listener() {
    // Arrange
    let controller = RouteController::spawn(ControllerOptions::default());
    let port = free_port();

    // Act
    let mut routes = Vec::new();
    for i in 0..10 {
        let descriptor = WebhookDescriptor::new(format!("/route-{}", i), port.to_string());
        let manager = RawRoute::new(&controller, &format!("source-{}", i), descriptor);
        routes.push(spawn_route(&controller, manager));
    }
    for route in &routes {
        let manager = route.manager.clone();
        wait_until(move || manager.post_starts() == 1).await;
    }

    // Assert
    assert_eq!(controller.servers().servers_started(), 1);
    assert_eq!(controller.servers().ports(), vec![port]);
    assert_eq!(controller.servers().mux(port).unwrap().len(), 10);

    for (i, route) in routes.iter_mut().enumerate() {
        let path = format!("/route-{}", i);
        assert_eq!(post(port, &path, "ping").await.0, 200);

        let event = route.events.recv().await.unwrap();
        assert_eq!(event.name, format!("source-{}", i));
        assert_eq!(event.payload, Bytes::from_static(b"ping"));
    }

    for route in routes {
        assert_ok!(route.stop().await);
    }
    controller.servers().shutdown_server(port);
}

/// Verify that a second route on an existing path leaves the handler in place
#[tokio::test]
async fn test_same_path_registers_one_handler() {
    // Arrange
    let controller = RouteController::spawn(ControllerOptions::default());
    let port = free_port();
    let descriptor = WebhookDescriptor::new("/shared", port.to_string());

    // Act
    let first = spawn_route(
        &controller,
        RawRoute::new(&controller, "first", descriptor.clone()),
    );
    let manager = first.manager.clone();
    wait_until(move || manager.post_starts() == 1).await;

    let second = spawn_route(
        &controller,
        RawRoute::new(&controller, "second", descriptor),
    );
    let manager = second.manager.clone();
    wait_until(move || manager.post_starts() == 1).await;

    // Assert
    assert_eq!(controller.servers().servers_started(), 1);
    assert_eq!(controller.servers().mux(port).unwrap().len(), 1);
    assert_eq!(controller.endpoints().len(), 1);
    assert_eq!(post(port, "/shared", "ping").await.0, 200);

    assert_ok!(first.stop().await);
    assert_ok!(second.stop().await);
    controller.servers().shutdown_server(port);
}

/// Verify that routes on different paths share one multiplexer
#[tokio::test]
async fn test_different_paths_share_one_mux() {
    // Arrange
    let controller = RouteController::spawn(ControllerOptions::default());
    let port = free_port();

    let mut a = spawn_route(
        &controller,
        RawRoute::new(&controller, "a", WebhookDescriptor::new("/a", port.to_string())),
    );
    let mut b = spawn_route(
        &controller,
        RawRoute::new(&controller, "b", WebhookDescriptor::new("/b", port.to_string())),
    );
    let (ma, mb) = (a.manager.clone(), b.manager.clone());
    wait_until(move || ma.post_starts() == 1 && mb.post_starts() == 1).await;

    // Act
    assert_eq!(post(port, "/a", "for a").await.0, 200);
    assert_eq!(post(port, "/b", "for b").await.0, 200);

    // Assert
    assert_eq!(a.events.recv().await.unwrap().payload, Bytes::from_static(b"for a"));
    assert_eq!(b.events.recv().await.unwrap().payload, Bytes::from_static(b"for b"));
    assert_eq!(controller.servers().servers_started(), 1);

    assert_ok!(a.stop().await);
    assert_ok!(b.stop().await);
    controller.servers().shutdown_server(port);
}

/// Verify that the first route on a port decides whether it serves TLS
#[tokio::test]
async fn test_first_activator_decides_tls() {
    // Arrange
    let controller = RouteController::spawn(ControllerOptions::default());
    let port = free_port();

    let plain = spawn_route(
        &controller,
        RawRoute::new(&controller, "plain", WebhookDescriptor::new("/plain", port.to_string())),
    );
    let manager = plain.manager.clone();
    wait_until(move || manager.post_starts() == 1).await;

    // Act
    let descriptor = WebhookDescriptor::new("/secure", port.to_string())
        .with_tls("/nonexistent/tls.crt", "/nonexistent/tls.key");
    let secure = spawn_route(&controller, RawRoute::new(&controller, "secure", descriptor));
    let manager = secure.manager.clone();
    wait_until(move || manager.post_starts() == 1).await;

    // Assert: the TLS route is served over the existing plaintext listener
    let server = controller.servers().get(port).unwrap();
    assert_eq!(server.scheme(), Scheme::Plain);
    assert_eq!(post(port, "/secure", "ping").await.0, 200);

    assert_ok!(plain.stop().await);
    assert_ok!(secure.stop().await);
    controller.servers().shutdown_server(port);
}

/// Verify the responses for unknown paths and mismatched methods
#[tokio::test]
async fn test_unknown_path_and_wrong_method() {
    // Arrange
    let controller = RouteController::spawn(ControllerOptions::default());
    let port = free_port();
    let descriptor = WebhookDescriptor::new("/push", port.to_string()).with_method("POST");
    let route = spawn_route(&controller, RawRoute::new(&controller, "push", descriptor));
    let manager = route.manager.clone();
    wait_until(move || manager.post_starts() == 1).await;

    // Act
    let (missing, _) = post(port, "/missing", "ping").await;
    let (wrong_method, msg) = send(reqwest::Method::PUT, port, "/push", "ping").await;

    // Assert
    assert_eq!(missing, 404);
    assert_eq!(wrong_method, 405);
    assert!(msg.contains("POST"));

    assert_ok!(route.stop().await);
    controller.servers().shutdown_server(port);
}
