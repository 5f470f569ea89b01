use thiserror::Error;

/// Errors from parsing protocol identities.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An info hash was not exactly 20 bytes (40 hex characters).
    #[error("invalid info hash length")]
    InvalidInfoHashLength,

    /// A peer id was not exactly 20 bytes.
    #[error("invalid peer id length: {0}")]
    InvalidPeerIdLength(usize),
}
