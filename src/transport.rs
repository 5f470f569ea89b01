//! Per-peer message endpoints.
//!
//! The dispatcher talks to each remote peer through a [`Messages`] endpoint:
//! an async send side, a receive side consumed by the peer's feed loop, and
//! an idempotent close that unblocks both. [`message_channel`] provides the
//! standard channel-backed implementation; the scheduler pumps the returned
//! [`MessageWire`] half against the actual socket.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::protocol::Message;

/// Errors surfaced by a peer message endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint was closed.
    #[error("endpoint closed")]
    Closed,
}

/// Bidirectional message endpoint for one remote peer.
#[async_trait]
pub trait Messages: Send + Sync + 'static {
    /// Sends a message to the peer. May wait on transport backpressure;
    /// fails once the endpoint is closed.
    async fn send(&self, msg: Message) -> Result<(), TransportError>;

    /// Receives the next inbound message, or `None` once the endpoint is
    /// closed. The peer's feed loop is the only caller.
    async fn recv(&self) -> Option<Message>;

    /// Closes the endpoint. Idempotent; unblocks pending sends and receives
    /// on both halves.
    fn close(&self);
}

/// Creates a connected endpoint pair with the given channel capacity.
///
/// The [`ChannelMessages`] half is handed to the dispatcher; the
/// [`MessageWire`] half belongs to whatever pumps the wire (or to a test).
pub fn message_channel(capacity: usize) -> (ChannelMessages, MessageWire) {
    let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
    let cancel = CancellationToken::new();
    (
        ChannelMessages {
            outbound: outbound_tx,
            inbound: Mutex::new(inbound_rx),
            cancel: cancel.clone(),
        },
        MessageWire {
            inbound: inbound_tx,
            outbound: outbound_rx,
            cancel,
        },
    )
}

/// The dispatcher-side half of a [`message_channel`] pair.
pub struct ChannelMessages {
    outbound: mpsc::Sender<Message>,
    inbound: Mutex<mpsc::Receiver<Message>>,
    cancel: CancellationToken,
}

#[async_trait]
impl Messages for ChannelMessages {
    async fn send(&self, msg: Message) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TransportError::Closed),
            res = self.outbound.send(msg) => res.map_err(|_| TransportError::Closed),
        }
    }

    async fn recv(&self) -> Option<Message> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            msg = inbound.recv() => msg,
        }
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

/// The wire-side half of a [`message_channel`] pair.
pub struct MessageWire {
    inbound: mpsc::Sender<Message>,
    outbound: mpsc::Receiver<Message>,
    cancel: CancellationToken,
}

impl MessageWire {
    /// Delivers an inbound message to the endpoint.
    pub async fn deliver(&self, msg: Message) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TransportError::Closed),
            res = self.inbound.send(msg) => res.map_err(|_| TransportError::Closed),
        }
    }

    /// Returns the next message the endpoint sent, or `None` once the
    /// endpoint is closed.
    pub async fn next_outbound(&mut self) -> Option<Message> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            msg = self.outbound.recv() => msg,
        }
    }

    /// Closes the endpoint from the wire side. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Returns true once either side has closed the endpoint.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_deliver_and_recv() {
        let (endpoint, wire) = message_channel(4);

        wire.deliver(Message::Complete).await.unwrap();
        wire.deliver(Message::AnnouncePiece { index: 3 }).await.unwrap();

        assert!(matches!(endpoint.recv().await, Some(Message::Complete)));
        assert!(matches!(
            endpoint.recv().await,
            Some(Message::AnnouncePiece { index: 3 })
        ));
    }

    #[tokio::test]
    async fn test_wire_observes_outbound() {
        let (endpoint, mut wire) = message_channel(4);

        endpoint
            .send(Message::PieceRequest {
                index: 1,
                offset: 0,
                length: 64,
            })
            .await
            .unwrap();

        match wire.next_outbound().await {
            Some(Message::PieceRequest { index, offset, length }) => {
                assert_eq!((index, offset, length), (1, 0, 64));
            }
            other => panic!("unexpected outbound message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_unblocks_recv() {
        let (endpoint, wire) = message_channel(4);

        let pending = tokio::spawn(async move { endpoint.recv().await });
        wire.close();

        let received = timeout(Duration::from_secs(1), pending)
            .await
            .expect("recv should unblock on close")
            .unwrap();
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (endpoint, wire) = message_channel(4);

        endpoint.close();
        endpoint.close(); // idempotent

        assert!(endpoint.send(Message::Complete).await.is_err());
        assert!(wire.deliver(Message::Complete).await.is_err());
        assert!(wire.is_closed());
    }

    #[tokio::test]
    async fn test_dropped_wire_ends_receive_stream() {
        let (endpoint, wire) = message_channel(4);
        drop(wire);

        assert!(endpoint.recv().await.is_none());
        assert!(endpoint.send(Message::Complete).await.is_err());
    }
}
