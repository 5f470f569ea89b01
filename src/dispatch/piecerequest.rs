//! Ledger of outstanding piece requests.
//!
//! The manager is the single source of truth for which pieces have been
//! requested from which peers. Outside endgame at most one pending request
//! exists per piece; in endgame duplicates to distinct peers are allowed.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::protocol::{Bitfield, PeerId};

/// Lifecycle of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Sent and awaiting a payload.
    Pending,
    /// Pending for longer than the request timeout.
    Expired,
    /// Reserved but the send failed.
    Unsent,
    /// The peer reported failure or delivered bad data.
    Invalid,
}

/// A piece request owed by a single peer.
#[derive(Debug, Clone)]
pub struct Request {
    pub peer_id: PeerId,
    pub piece: u32,
    pub status: RequestStatus,
    sent_at: Instant,
}

#[derive(Default)]
struct Table {
    by_piece: HashMap<u32, Vec<Request>>,
    pending_by_peer: HashMap<PeerId, usize>,
}

impl Table {
    fn decrement_pending(&mut self, peer_id: PeerId) {
        if let Some(count) = self.pending_by_peer.get_mut(&peer_id) {
            *count -= 1;
            if *count == 0 {
                self.pending_by_peer.remove(&peer_id);
            }
        }
    }
}

/// Concurrency-safe ledger of outstanding piece requests, keyed by piece
/// index with a per-peer pending count for pipeline enforcement. Every
/// method is a single atomic operation.
pub struct PieceRequestManager {
    timeout: Duration,
    pipeline_limit: usize,
    table: Mutex<Table>,
}

impl PieceRequestManager {
    pub fn new(timeout: Duration, pipeline_limit: usize) -> Self {
        Self {
            timeout,
            pipeline_limit,
            table: Mutex::new(Table::default()),
        }
    }

    /// Reserves pieces to request from `peer_id`, in ascending index order.
    ///
    /// Candidates already pending are skipped: any pending entry outside
    /// endgame, or a pending entry for this same peer in endgame. At most
    /// `pipeline_limit` minus the peer's current pending count are returned,
    /// each inserted as a pending entry stamped now.
    pub fn reserve_pieces(
        &self,
        peer_id: PeerId,
        candidates: &Bitfield,
        endgame: bool,
    ) -> Vec<u32> {
        let mut table = self.table.lock();
        let pending = table.pending_by_peer.get(&peer_id).copied().unwrap_or(0);
        let quota = self.pipeline_limit.saturating_sub(pending);
        if quota == 0 {
            return Vec::new();
        }

        let mut reserved = Vec::new();
        for piece in candidates.ones() {
            if reserved.len() == quota {
                break;
            }
            let taken = table.by_piece.get(&piece).is_some_and(|entries| {
                entries.iter().any(|r| {
                    r.status == RequestStatus::Pending && (!endgame || r.peer_id == peer_id)
                })
            });
            if taken {
                continue;
            }
            table.by_piece.entry(piece).or_default().push(Request {
                peer_id,
                piece,
                status: RequestStatus::Pending,
                sent_at: Instant::now(),
            });
            reserved.push(piece);
        }

        if !reserved.is_empty() {
            *table.pending_by_peer.entry(peer_id).or_insert(0) += reserved.len();
        }
        reserved
    }

    /// Records that the request for `piece` never reached `peer_id`.
    pub fn mark_unsent(&self, peer_id: PeerId, piece: u32) {
        self.transition(peer_id, piece, RequestStatus::Unsent);
    }

    /// Records that `peer_id` failed or corrupted the request for `piece`.
    pub fn mark_invalid(&self, peer_id: PeerId, piece: u32) {
        self.transition(peer_id, piece, RequestStatus::Invalid);
    }

    fn transition(&self, peer_id: PeerId, piece: u32, to: RequestStatus) {
        let mut table = self.table.lock();
        let mut demoted = false;
        if let Some(entries) = table.by_piece.get_mut(&piece) {
            if let Some(entry) = entries
                .iter_mut()
                .find(|r| r.peer_id == peer_id && r.status == RequestStatus::Pending)
            {
                entry.status = to;
                demoted = true;
            }
        }
        if demoted {
            table.decrement_pending(peer_id);
        }
    }

    /// Expires overdue pending entries, then removes and returns every
    /// failed entry (expired, unsent, or invalid), ordered by piece index.
    pub fn get_failed_requests(&self) -> Vec<Request> {
        let mut table = self.table.lock();
        let now = Instant::now();

        let mut expired = Vec::new();
        for entries in table.by_piece.values_mut() {
            for entry in entries.iter_mut() {
                if entry.status == RequestStatus::Pending
                    && now.duration_since(entry.sent_at) > self.timeout
                {
                    entry.status = RequestStatus::Expired;
                    expired.push(entry.peer_id);
                }
            }
        }
        for peer_id in expired {
            table.decrement_pending(peer_id);
        }

        let mut failed = Vec::new();
        table.by_piece.retain(|_, entries| {
            let mut i = 0;
            while i < entries.len() {
                if entries[i].status != RequestStatus::Pending {
                    failed.push(entries.remove(i));
                } else {
                    i += 1;
                }
            }
            !entries.is_empty()
        });
        failed.sort_by_key(|r| r.piece);
        failed
    }

    /// Removes every entry for `piece`.
    pub fn clear(&self, piece: u32) {
        let mut table = self.table.lock();
        if let Some(entries) = table.by_piece.remove(&piece) {
            for entry in entries {
                if entry.status == RequestStatus::Pending {
                    table.decrement_pending(entry.peer_id);
                }
            }
        }
    }

    /// Removes every entry owed by `peer_id`.
    pub fn clear_peer(&self, peer_id: PeerId) {
        let mut table = self.table.lock();
        table.by_piece.retain(|_, entries| {
            entries.retain(|r| r.peer_id != peer_id);
            !entries.is_empty()
        });
        table.pending_by_peer.remove(&peer_id);
    }

    /// Number of pending entries currently owed by `peer_id`.
    pub fn pending_count(&self, peer_id: PeerId) -> usize {
        self.table
            .lock()
            .pending_by_peer
            .get(&peer_id)
            .copied()
            .unwrap_or(0)
    }

    /// Total entries in the ledger, in any status.
    pub fn len(&self) -> usize {
        self.table.lock().by_piece.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().by_piece.is_empty()
    }
}
