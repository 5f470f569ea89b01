//! Wire-level vocabulary shared by the dispatcher and its transports.
//!
//! This module defines the identities ([`PeerId`], [`InfoHash`]), the piece
//! [`Bitfield`], and the in-process [`Message`] variants exchanged between
//! peers. Encoding and decoding of messages is the transport's concern.

mod bitfield;
mod error;
mod info_hash;
mod message;
mod peer_id;

pub use bitfield::Bitfield;
pub use error::ProtocolError;
pub use info_hash::InfoHash;
pub use message::{ErrorCode, Message};
pub use peer_id::PeerId;

#[cfg(test)]
mod tests;
