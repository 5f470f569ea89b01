use bytes::Bytes;

use super::bitfield::Bitfield;

/// Error codes carried by [`Message::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Catch-all for conditions the receiver only logs.
    Unknown,
    /// A piece request could not be served or produced bad data.
    PieceRequestFailed,
}

/// In-process representation of the peer wire messages.
///
/// The wire codec lives in the transport; the dispatcher only routes on
/// these variants. Piece payloads travel as [`Bytes`] so broadcasts and
/// storage writes share the same buffer.
#[derive(Debug, Clone)]
pub enum Message {
    /// The remote reports a failure for a piece.
    Error {
        index: u32,
        code: ErrorCode,
        message: String,
    },
    /// The remote newly holds the given piece.
    AnnouncePiece { index: u32 },
    /// Request for a full piece. `offset` must be 0 and `length` the exact
    /// piece length; sub-piece transfer is not supported.
    PieceRequest { index: u32, offset: u32, length: u32 },
    /// A full piece of content.
    PiecePayload {
        index: u32,
        offset: u32,
        length: u32,
        payload: Bytes,
    },
    /// Cancels an earlier request. Accepted and ignored.
    CancelPiece { index: u32 },
    /// Full piece inventory. Only valid during the transport handshake.
    Bitfield { bits: Bitfield },
    /// The remote has every piece.
    Complete,
}

impl Message {
    /// Short variant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Error { .. } => "error",
            Message::AnnouncePiece { .. } => "announce_piece",
            Message::PieceRequest { .. } => "piece_request",
            Message::PiecePayload { .. } => "piece_payload",
            Message::CancelPiece { .. } => "cancel_piece",
            Message::Bitfield { .. } => "bitfield",
            Message::Complete => "complete",
        }
    }
}
