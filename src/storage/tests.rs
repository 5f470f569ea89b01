use super::*;
use bytes::Bytes;
use sha1::{Digest, Sha1};

use crate::protocol::InfoHash;

fn hash() -> InfoHash {
    InfoHash::from_bytes([9u8; 20])
}

fn piece(byte: u8, len: usize) -> Bytes {
    Bytes::from(vec![byte; len])
}

#[tokio::test]
async fn test_write_and_read_piece() {
    let torrent = MemoryTorrent::new("t", hash(), 16, 32);

    torrent.write_piece(0, piece(1, 16)).await.unwrap();
    let data = torrent.read_piece(0).await.unwrap();
    assert_eq!(data, piece(1, 16));

    assert!(matches!(
        torrent.read_piece(1).await,
        Err(StorageError::PieceNotFound(1))
    ));
}

#[tokio::test]
async fn test_short_last_piece() {
    let torrent = MemoryTorrent::new("t", hash(), 16, 20);

    assert_eq!(torrent.num_pieces(), 2);
    assert_eq!(torrent.piece_length(0), 16);
    assert_eq!(torrent.piece_length(1), 4);
    assert_eq!(torrent.piece_length(2), 0);

    torrent.write_piece(1, piece(2, 4)).await.unwrap();
    assert_eq!(torrent.read_piece(1).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_duplicate_write_is_already_complete() {
    let torrent = MemoryTorrent::new("t", hash(), 8, 8);

    torrent.write_piece(0, piece(1, 8)).await.unwrap();
    assert!(matches!(
        torrent.write_piece(0, piece(2, 8)).await,
        Err(StorageError::PieceAlreadyComplete(0))
    ));
    // The first write wins.
    assert_eq!(torrent.read_piece(0).await.unwrap(), piece(1, 8));
}

#[tokio::test]
async fn test_length_mismatch_rejected() {
    let torrent = MemoryTorrent::new("t", hash(), 16, 32);

    assert!(matches!(
        torrent.write_piece(0, piece(1, 10)).await,
        Err(StorageError::PieceLengthMismatch { piece: 0, .. })
    ));
    assert!(!torrent.bitfield().has_piece(0));
}

#[tokio::test]
async fn test_out_of_range_index() {
    let torrent = MemoryTorrent::new("t", hash(), 16, 32);

    assert!(matches!(
        torrent.write_piece(5, piece(1, 16)).await,
        Err(StorageError::InvalidPieceIndex(5))
    ));
    assert!(matches!(
        torrent.read_piece(5).await,
        Err(StorageError::InvalidPieceIndex(5))
    ));
}

#[tokio::test]
async fn test_digest_verification() {
    let good = piece(7, 8);
    let digest: [u8; 20] = Sha1::digest(&good).into();
    let torrent = MemoryTorrent::with_digests("t", hash(), 8, 8, vec![digest]);

    assert!(matches!(
        torrent.write_piece(0, piece(8, 8)).await,
        Err(StorageError::HashMismatch(0))
    ));
    assert!(!torrent.complete());

    torrent.write_piece(0, good).await.unwrap();
    assert!(torrent.complete());
}

#[tokio::test]
async fn test_seeded_torrent_is_complete() {
    let torrent = MemoryTorrent::seeded("t", hash(), 8, vec![piece(1, 8), piece(2, 3)]);

    assert!(torrent.complete());
    assert_eq!(torrent.length(), 11);
    assert_eq!(torrent.num_pieces(), 2);
    assert_eq!(torrent.read_piece(1).await.unwrap(), piece(2, 3));
}

#[tokio::test]
async fn test_stat_tracks_progress() {
    let torrent = MemoryTorrent::new("t", hash(), 8, 32);

    assert_eq!(torrent.stat().percent_complete(), 0);

    torrent.write_piece(0, piece(1, 8)).await.unwrap();
    torrent.write_piece(2, piece(3, 8)).await.unwrap();

    let stat = torrent.stat();
    assert_eq!(stat.info_hash, hash());
    assert_eq!(stat.length, 32);
    assert_eq!(stat.bitfield.count(), 2);
    assert_eq!(stat.percent_complete(), 50);
    assert!(!torrent.complete());
}
