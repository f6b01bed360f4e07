//! Outbound event stream
//!
//! Every route forwards its events into an [`EventStream`]: the long-lived
//! connection to whatever consumes the gateway's events. The transport is
//! not this crate's concern; it only needs to send events and report when
//! the consumer has gone away.

use crate::StreamError;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Event forwarded to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Name of the event source the payload arrived on
    pub name: String,

    /// Decoded payload, exactly as the adapter dispatched it
    pub payload: Bytes,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

/// Consumer connection of one route
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Deliver one event to the consumer
    async fn send(&self, event: Event) -> Result<(), StreamError>;

    /// Resolve once the consumer has disconnected
    ///
    /// Must be cancel-safe and must keep resolving immediately once the
    /// consumer is gone.
    async fn closed(&self);
}

// ============================================================================
// Channel-backed stream
// ============================================================================

/// In-process [`EventStream`] backed by a bounded channel
///
/// The consumer half is an [`EventReceiver`]; dropping it or calling
/// [`EventReceiver::close`] disconnects the stream.
#[derive(Debug, Clone)]
pub struct ChannelEventStream {
    sender: mpsc::Sender<Event>,
    token: CancellationToken,
}

impl ChannelEventStream {
    pub fn new(capacity: usize) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let token = CancellationToken::new();
        (
            Self {
                sender,
                token: token.clone(),
            },
            EventReceiver { receiver, token },
        )
    }

    /// Token cancelled when the consumer disconnects
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[async_trait]
impl EventStream for ChannelEventStream {
    async fn send(&self, event: Event) -> Result<(), StreamError> {
        if self.token.is_cancelled() {
            return Err(StreamError::Closed);
        }

        self.sender.send(event).await.map_err(|_| StreamError::Closed)
    }

    async fn closed(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = self.sender.closed() => {}
        }
    }
}

/// Consumer half of a [`ChannelEventStream`]
#[derive(Debug)]
pub struct EventReceiver {
    receiver: mpsc::Receiver<Event>,
    token: CancellationToken,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// Disconnect from the stream while keeping already-sent events readable
    pub fn close(&mut self) {
        self.token.cancel();
        self.receiver.close();
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
