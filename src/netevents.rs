//! Network telemetry events.
//!
//! The dispatcher emits fire-and-forget events describing transfer activity.
//! Embedders supply a [`Producer`] sink; [`NoopProducer`] discards everything.

use crate::protocol::{InfoHash, PeerId};

/// A telemetry event emitted by the dispatch layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// A piece payload was received, validated, and persisted.
    ReceivePiece {
        info_hash: InfoHash,
        local_peer: PeerId,
        remote_peer: PeerId,
        piece: u32,
    },
}

/// Sink for [`NetworkEvent`]s.
///
/// `produce` is called from dispatch hot paths and must not block;
/// implementations typically enqueue onto an unbounded channel.
pub trait Producer: Send + Sync + 'static {
    fn produce(&self, event: NetworkEvent);
}

/// Producer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProducer;

impl Producer for NoopProducer {
    fn produce(&self, _event: NetworkEvent) {}
}
