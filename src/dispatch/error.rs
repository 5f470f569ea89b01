use thiserror::Error;

use crate::protocol::PeerId;
use crate::storage::StorageError;
use crate::transport::TransportError;

/// Errors surfaced by the dispatcher.
///
/// Per-message errors are recovered locally: the feed loop logs them and
/// keeps consuming. Only [`DispatchError::PeerAlreadyDispatched`] reaches
/// callers, from [`Dispatcher::add_peer`](super::Dispatcher::add_peer).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The peer is already dispatched for this torrent.
    #[error("peer {0} already dispatched for the torrent")]
    PeerAlreadyDispatched(PeerId),

    /// A message referenced a piece index outside the torrent.
    #[error("piece index {index} out of bounds ({num_pieces} pieces)")]
    PieceOutOfBounds { index: u32, num_pieces: usize },

    /// Reading or writing a chunk of a piece is not supported.
    #[error("chunked piece transfer not supported (piece {piece}, offset {offset}, length {length})")]
    ChunkNotSupported { piece: u32, offset: u32, length: u32 },

    /// The transport already exchanged bitfields; a repeat is a protocol
    /// violation.
    #[error("received repeated bitfield message")]
    RepeatedBitfield,

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}
