use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use sha1::{Digest, Sha1};

use super::error::StorageError;
use super::torrent::{Torrent, TorrentInfo};
use crate::protocol::{Bitfield, InfoHash};

/// In-memory piece store.
///
/// Pieces are held as [`Bytes`] behind a single lock. Writes validate the
/// piece length and, when digests were supplied, the piece SHA-1 before
/// committing; the first write of a piece wins and later writes fail with
/// [`StorageError::PieceAlreadyComplete`].
pub struct MemoryTorrent {
    name: String,
    info_hash: InfoHash,
    piece_length: u64,
    total_length: u64,
    piece_count: usize,
    digests: Option<Vec<[u8; 20]>>,
    state: RwLock<State>,
}

struct State {
    pieces: Vec<Option<Bytes>>,
    bitfield: Bitfield,
}

impl MemoryTorrent {
    /// Creates an empty store for a torrent of `total_length` bytes split
    /// into pieces of `piece_length` (the last piece may be short).
    pub fn new(
        name: impl Into<String>,
        info_hash: InfoHash,
        piece_length: u64,
        total_length: u64,
    ) -> Arc<Self> {
        Self::build(name.into(), info_hash, piece_length, total_length, None)
    }

    /// Like [`MemoryTorrent::new`], with one SHA-1 digest per piece verified
    /// on write.
    pub fn with_digests(
        name: impl Into<String>,
        info_hash: InfoHash,
        piece_length: u64,
        total_length: u64,
        digests: Vec<[u8; 20]>,
    ) -> Arc<Self> {
        Self::build(
            name.into(),
            info_hash,
            piece_length,
            total_length,
            Some(digests),
        )
    }

    /// Creates a store already holding every piece.
    pub fn seeded(
        name: impl Into<String>,
        info_hash: InfoHash,
        piece_length: u64,
        pieces: Vec<Bytes>,
    ) -> Arc<Self> {
        let total_length = pieces.iter().map(|p| p.len() as u64).sum();
        let piece_count = pieces.len();
        let mut bitfield = Bitfield::new(piece_count);
        bitfield.set_all();
        Arc::new(Self {
            name: name.into(),
            info_hash,
            piece_length,
            total_length,
            piece_count,
            digests: None,
            state: RwLock::new(State {
                pieces: pieces.into_iter().map(Some).collect(),
                bitfield,
            }),
        })
    }

    fn build(
        name: String,
        info_hash: InfoHash,
        piece_length: u64,
        total_length: u64,
        digests: Option<Vec<[u8; 20]>>,
    ) -> Arc<Self> {
        assert!(piece_length > 0, "piece length must be positive");
        let piece_count = total_length.div_ceil(piece_length) as usize;
        if let Some(digests) = &digests {
            assert_eq!(digests.len(), piece_count, "one digest per piece");
        }
        Arc::new(Self {
            name,
            info_hash,
            piece_length,
            total_length,
            piece_count,
            digests,
            state: RwLock::new(State {
                pieces: vec![None; piece_count],
                bitfield: Bitfield::new(piece_count),
            }),
        })
    }
}

#[async_trait]
impl Torrent for MemoryTorrent {
    fn name(&self) -> &str {
        &self.name
    }

    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    fn length(&self) -> u64 {
        self.total_length
    }

    fn num_pieces(&self) -> usize {
        self.piece_count
    }

    fn piece_length(&self, index: u32) -> u64 {
        let index = index as usize;
        if index >= self.piece_count {
            return 0;
        }
        if index + 1 < self.piece_count {
            return self.piece_length;
        }
        let remainder = self.total_length % self.piece_length;
        if remainder == 0 {
            self.piece_length
        } else {
            remainder
        }
    }

    fn max_piece_length(&self) -> u64 {
        self.piece_length.min(self.total_length.max(1))
    }

    fn bitfield(&self) -> Bitfield {
        self.state.read().bitfield.clone()
    }

    fn complete(&self) -> bool {
        self.state.read().bitfield.is_complete()
    }

    fn stat(&self) -> TorrentInfo {
        TorrentInfo {
            info_hash: self.info_hash,
            length: self.total_length,
            bitfield: self.bitfield(),
        }
    }

    async fn read_piece(&self, index: u32) -> Result<Bytes, StorageError> {
        if index as usize >= self.piece_count {
            return Err(StorageError::InvalidPieceIndex(index));
        }
        self.state.read().pieces[index as usize]
            .clone()
            .ok_or(StorageError::PieceNotFound(index))
    }

    async fn write_piece(&self, index: u32, data: Bytes) -> Result<(), StorageError> {
        if index as usize >= self.piece_count {
            return Err(StorageError::InvalidPieceIndex(index));
        }
        let expected = self.piece_length(index);
        if data.len() as u64 != expected {
            return Err(StorageError::PieceLengthMismatch {
                piece: index,
                expected,
                actual: data.len() as u64,
            });
        }
        if let Some(digests) = &self.digests {
            let mut hasher = Sha1::new();
            hasher.update(&data);
            let digest: [u8; 20] = hasher.finalize().into();
            if digest != digests[index as usize] {
                return Err(StorageError::HashMismatch(index));
            }
        }

        let mut state = self.state.write();
        if state.bitfield.has_piece(index as usize) {
            return Err(StorageError::PieceAlreadyComplete(index));
        }
        state.pieces[index as usize] = Some(data);
        state.bitfield.set_piece(index as usize);
        Ok(())
    }
}
