use super::*;
use bytes::Bytes;

#[test]
fn test_peer_id_generate() {
    let id1 = PeerId::generate();
    let id2 = PeerId::generate();
    assert_ne!(id1.0, id2.0);
    assert!(id1.0.starts_with(b"-RS0001-"));
}

#[test]
fn test_peer_id_from_bytes() {
    let bytes = [3u8; 20];
    let id = PeerId::from_bytes(&bytes).unwrap();
    assert_eq!(id.as_bytes(), &bytes);

    assert!(PeerId::from_bytes(&[0u8; 19]).is_err());
}

#[test]
fn test_info_hash_hex_roundtrip() {
    let hash = InfoHash::from_bytes([0xab; 20]);
    assert_eq!(hash.to_hex(), "ab".repeat(20));
    assert_eq!(InfoHash::from_hex(&hash.to_hex()).unwrap(), hash);

    assert!(InfoHash::from_hex("abcd").is_err());
    assert!(InfoHash::from_hex(&"zz".repeat(20)).is_err());
}

#[test]
fn test_info_hash_digest() {
    let a = InfoHash::digest(b"some metadata");
    let b = InfoHash::digest(b"some metadata");
    let c = InfoHash::digest(b"other metadata");
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_bitfield_set_and_count() {
    let mut bf = Bitfield::new(100);
    assert!(!bf.has_piece(0));

    bf.set_piece(0);
    assert!(bf.has_piece(0));

    bf.set_piece(99);
    assert!(bf.has_piece(99));

    bf.clear_piece(0);
    assert!(!bf.has_piece(0));

    assert_eq!(bf.count(), 1);
}

#[test]
fn test_bitfield_from_bytes() {
    let bytes = Bytes::from_static(&[0x80, 0x00]);
    let bf = Bitfield::from_bytes(bytes, 16);

    assert!(bf.has_piece(0));
    assert!(!bf.has_piece(1));
}

#[test]
fn test_bitfield_from_bytes_clears_spare_bits() {
    // 10 pieces in 2 bytes leaves 6 spare bits that must not count.
    let bytes = Bytes::from_static(&[0xFF, 0xFF]);
    let bf = Bitfield::from_bytes(bytes, 10);

    assert_eq!(bf.count(), 10);
    assert!(bf.is_complete());
}

#[test]
fn test_bitfield_full_and_set_all() {
    let full = Bitfield::full(10);
    assert!(full.is_complete());
    assert_eq!(full.count(), 10);

    let mut bf = Bitfield::new(10);
    bf.set_all();
    assert_eq!(bf, full);
}

#[test]
fn test_bitfield_complement_respects_piece_count() {
    let mut bf = Bitfield::new(10);
    bf.set_piece(3);

    let missing = bf.complement();
    assert_eq!(missing.count(), 9);
    assert!(!missing.has_piece(3));
    assert!(missing.has_piece(9));
    // Spare bits stay clear so the complement never over-counts.
    assert!(bf.complement().complement() == bf);
}

#[test]
fn test_bitfield_intersection() {
    let mut a = Bitfield::new(8);
    a.set_piece(1);
    a.set_piece(2);
    let mut b = Bitfield::new(8);
    b.set_piece(2);
    b.set_piece(3);

    let both = a.intersection(&b);
    assert_eq!(both.ones().collect::<Vec<_>>(), vec![2]);
}

#[test]
fn test_bitfield_ones_ascending() {
    let mut bf = Bitfield::new(20);
    bf.set_piece(17);
    bf.set_piece(2);
    bf.set_piece(9);

    assert_eq!(bf.ones().collect::<Vec<_>>(), vec![2, 9, 17]);
}

#[test]
fn test_bitfield_candidate_selection() {
    // The dispatcher computes candidates as "peer has, we don't".
    let peer = Bitfield::full(6);
    let mut local = Bitfield::new(6);
    local.set_piece(0);
    local.set_piece(4);

    let candidates = peer.intersection(&local.complement());
    assert_eq!(candidates.ones().collect::<Vec<_>>(), vec![1, 2, 3, 5]);
}

#[test]
fn test_message_kind() {
    assert_eq!(Message::Complete.kind(), "complete");
    assert_eq!(Message::AnnouncePiece { index: 1 }.kind(), "announce_piece");
    let payload = Message::PiecePayload {
        index: 0,
        offset: 0,
        length: 4,
        payload: Bytes::from_static(b"data"),
    };
    assert_eq!(payload.kind(), "piece_payload");
}
