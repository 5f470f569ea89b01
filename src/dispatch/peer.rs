use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::protocol::{Bitfield, PeerId};
use crate::transport::Messages;

/// Per-peer dispatch state.
///
/// The remote bitfield has a single writer, the peer's own feed task; other
/// feeds computing request candidates take a clone under the read guard.
pub(crate) struct PeerEntry {
    id: PeerId,
    bitfield: RwLock<Bitfield>,
    messages: Arc<dyn Messages>,
    last_good_piece_received: Mutex<Option<Instant>>,
    last_piece_sent: Mutex<Option<Instant>>,
}

impl PeerEntry {
    pub(crate) fn new(id: PeerId, bitfield: Bitfield, messages: Arc<dyn Messages>) -> Self {
        Self {
            id,
            bitfield: RwLock::new(bitfield),
            messages,
            last_good_piece_received: Mutex::new(None),
            last_piece_sent: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> PeerId {
        self.id
    }

    pub(crate) fn messages(&self) -> &dyn Messages {
        self.messages.as_ref()
    }

    /// A snapshot of the remote bitfield.
    pub(crate) fn bitfield(&self) -> Bitfield {
        self.bitfield.read().clone()
    }

    pub(crate) fn has_piece(&self, index: u32) -> bool {
        self.bitfield.read().has_piece(index as usize)
    }

    pub(crate) fn set_piece(&self, index: u32) {
        self.bitfield.write().set_piece(index as usize);
    }

    pub(crate) fn set_all_pieces(&self) {
        self.bitfield.write().set_all();
    }

    pub(crate) fn bitfield_complete(&self) -> bool {
        self.bitfield.read().is_complete()
    }

    pub(crate) fn touch_last_good_piece_received(&self) {
        *self.last_good_piece_received.lock() = Some(Instant::now());
    }

    pub(crate) fn last_good_piece_received(&self) -> Option<Instant> {
        *self.last_good_piece_received.lock()
    }

    pub(crate) fn touch_last_piece_sent(&self) {
        *self.last_piece_sent.lock() = Some(Instant::now());
    }

    pub(crate) fn last_piece_sent(&self) -> Option<Instant> {
        *self.last_piece_sent.lock()
    }
}
