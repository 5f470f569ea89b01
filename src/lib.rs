//! rswarm - per-torrent dispatch for peer-to-peer content distribution
//!
//! This library implements the coordination core that sits between a
//! torrent's storage and its peer connections. One [`Dispatcher`] per
//! torrent multiplexes message traffic among many peers, tracks what each
//! remote holds, pipelines piece requests with timeouts and redispatch,
//! serves pieces to requesters, and announces completion exactly once.
//!
//! # Modules
//!
//! - [`dispatch`] - the per-torrent [`Dispatcher`], request ledger, and config
//! - [`protocol`] - peer/torrent identities, bitfields, and wire messages
//! - [`transport`] - per-peer message endpoints
//! - [`storage`] - the consumed [`Torrent`] storage contract
//! - [`netevents`] - fire-and-forget transfer telemetry

pub mod dispatch;
pub mod netevents;
pub mod protocol;
pub mod storage;
pub mod transport;

pub use dispatch::{
    Config, DispatchError, DispatchMetrics, Dispatcher, Events, PieceRequestManager, Request,
    RequestStatus,
};
pub use netevents::{NetworkEvent, NoopProducer, Producer};
pub use protocol::{Bitfield, ErrorCode, InfoHash, Message, PeerId, ProtocolError};
pub use storage::{MemoryTorrent, StorageError, Torrent, TorrentInfo};
pub use transport::{message_channel, ChannelMessages, MessageWire, Messages, TransportError};
