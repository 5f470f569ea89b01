use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid piece index: {0}")]
    InvalidPieceIndex(u32),

    #[error("piece {0} not yet available")]
    PieceNotFound(u32),

    #[error("piece {0} already complete")]
    PieceAlreadyComplete(u32),

    #[error("unexpected length for piece {piece}: expected {expected}, got {actual}")]
    PieceLengthMismatch {
        piece: u32,
        expected: u64,
        actual: u64,
    },

    #[error("piece hash mismatch for piece {0}")]
    HashMismatch(u32),
}
