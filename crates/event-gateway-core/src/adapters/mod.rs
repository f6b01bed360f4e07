//! # Protocol Adapters
//!
//! [`RouteManager`](crate::RouteManager) implementations shipped with the
//! core crate. Gateway-specific adapters (signature checks, subscription
//! handshakes) live with their gateways.

pub mod generic_webhook;

pub use generic_webhook::{GenericWebhookRoute, WebhookEventData};
