use async_trait::async_trait;
use bytes::Bytes;

use super::error::StorageError;
use crate::protocol::{Bitfield, InfoHash};

/// Read and write access to a single torrent's piece store.
///
/// All methods are safe to call concurrently. `bitfield` returns a read
/// snapshot; duplicate writes of a completed piece fail with
/// [`StorageError::PieceAlreadyComplete`], which callers treat as benign.
#[async_trait]
pub trait Torrent: Send + Sync + 'static {
    /// Human-readable torrent name.
    fn name(&self) -> &str;

    fn info_hash(&self) -> InfoHash;

    /// Total content length in bytes.
    fn length(&self) -> u64;

    fn num_pieces(&self) -> usize;

    /// Length in bytes of piece `index`. The last piece may be short.
    /// Returns 0 for out-of-range indices.
    fn piece_length(&self, index: u32) -> u64;

    /// Length of the largest piece.
    fn max_piece_length(&self) -> u64;

    /// A snapshot of the pieces currently held.
    fn bitfield(&self) -> Bitfield;

    /// True once every piece is held.
    fn complete(&self) -> bool;

    fn stat(&self) -> TorrentInfo;

    /// Reads a completed piece.
    async fn read_piece(&self, index: u32) -> Result<Bytes, StorageError>;

    /// Validates and persists a piece.
    async fn write_piece(&self, index: u32, data: Bytes) -> Result<(), StorageError>;
}

/// Point-in-time summary of a torrent's state.
#[derive(Debug, Clone)]
pub struct TorrentInfo {
    pub info_hash: InfoHash,
    pub length: u64,
    pub bitfield: Bitfield,
}

impl TorrentInfo {
    /// Percentage of pieces held, rounded down.
    pub fn percent_complete(&self) -> u8 {
        let total = self.bitfield.piece_count();
        if total == 0 {
            return 100;
        }
        (self.bitfield.count() * 100 / total) as u8
    }
}
