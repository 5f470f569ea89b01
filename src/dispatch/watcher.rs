use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::protocol::{Bitfield, InfoHash};
use crate::storage::{StorageError, Torrent, TorrentInfo};

/// Wraps the storage torrent and records when it was last read and written.
pub(crate) struct TorrentAccessWatcher {
    torrent: Arc<dyn Torrent>,
    last_read: Mutex<Instant>,
    last_write: Mutex<Instant>,
}

impl TorrentAccessWatcher {
    pub(crate) fn new(torrent: Arc<dyn Torrent>) -> Self {
        let now = Instant::now();
        Self {
            torrent,
            last_read: Mutex::new(now),
            last_write: Mutex::new(now),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.torrent.name()
    }

    pub(crate) fn info_hash(&self) -> InfoHash {
        self.torrent.info_hash()
    }

    pub(crate) fn length(&self) -> u64 {
        self.torrent.length()
    }

    pub(crate) fn num_pieces(&self) -> usize {
        self.torrent.num_pieces()
    }

    pub(crate) fn piece_length(&self, index: u32) -> u64 {
        self.torrent.piece_length(index)
    }

    pub(crate) fn max_piece_length(&self) -> u64 {
        self.torrent.max_piece_length()
    }

    pub(crate) fn bitfield(&self) -> Bitfield {
        self.torrent.bitfield()
    }

    pub(crate) fn complete(&self) -> bool {
        self.torrent.complete()
    }

    pub(crate) fn stat(&self) -> TorrentInfo {
        self.torrent.stat()
    }

    pub(crate) async fn read_piece(&self, index: u32) -> Result<Bytes, StorageError> {
        let payload = self.torrent.read_piece(index).await?;
        *self.last_read.lock() = Instant::now();
        Ok(payload)
    }

    pub(crate) async fn write_piece(&self, index: u32, data: Bytes) -> Result<(), StorageError> {
        self.torrent.write_piece(index, data).await?;
        *self.last_write.lock() = Instant::now();
        Ok(())
    }

    pub(crate) fn last_read_time(&self) -> Instant {
        *self.last_read.lock()
    }

    pub(crate) fn last_write_time(&self) -> Instant {
        *self.last_write.lock()
    }
}
