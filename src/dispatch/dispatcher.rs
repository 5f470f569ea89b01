use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::netevents::{NetworkEvent, Producer};
use crate::protocol::{Bitfield, ErrorCode, InfoHash, Message, PeerId};
use crate::storage::{StorageError, Torrent, TorrentInfo};
use crate::transport::Messages;

use super::config::Config;
use super::error::DispatchError;
use super::metrics::DispatchMetrics;
use super::peer::PeerEntry;
use super::piecerequest::{PieceRequestManager, RequestStatus};
use super::watcher::TorrentAccessWatcher;

/// Observer notified of dispatcher lifecycle events.
pub trait Events: Send + Sync + 'static {
    /// Called from a spawned task, at most once per dispatcher, after the
    /// local torrent completes.
    fn dispatcher_complete(&self, dispatcher: Arc<Dispatcher>);
}

/// Coordinates torrent state with sending and receiving messages across
/// multiple peers.
///
/// `Dispatcher` and torrent have a one-to-one relationship; dispatcher and
/// peer connections have a one-to-many relationship. Each registered peer
/// runs its own feed task consuming inbound messages; a single sweeper task
/// expires stalled piece requests and redispatches them until the torrent
/// completes or the dispatcher is torn down.
pub struct Dispatcher {
    config: Config,
    weak_self: Weak<Dispatcher>,
    created_at: Instant,
    local_peer_id: PeerId,
    torrent: TorrentAccessWatcher,
    peers: DashMap<PeerId, Arc<PeerEntry>>,
    netevents: Arc<dyn Producer>,
    events: Arc<dyn Events>,
    metrics: DispatchMetrics,
    piece_request_timeout: Duration,
    requests: PieceRequestManager,
    pending_pieces_done: CancellationToken,
    complete_notified: AtomicBool,
}

impl Dispatcher {
    /// Creates a dispatcher and starts its timeout sweeper. If the torrent
    /// is already complete, completion is announced immediately.
    pub fn new(
        config: Config,
        netevents: Arc<dyn Producer>,
        events: Arc<dyn Events>,
        local_peer_id: PeerId,
        torrent: Arc<dyn Torrent>,
    ) -> Arc<Self> {
        let dispatcher = Self::new_inner(config, netevents, events, local_peer_id, torrent);

        // Exits when pending_pieces_done closes.
        tokio::spawn(Arc::clone(&dispatcher).watch_pending_piece_requests());

        if dispatcher.torrent.complete() {
            let d = Arc::clone(&dispatcher);
            tokio::spawn(async move { d.complete().await });
        }

        dispatcher
    }

    // Constructor without task side effects.
    fn new_inner(
        config: Config,
        netevents: Arc<dyn Producer>,
        events: Arc<dyn Events>,
        local_peer_id: PeerId,
        torrent: Arc<dyn Torrent>,
    ) -> Arc<Self> {
        let config = config.apply_defaults();
        let torrent = TorrentAccessWatcher::new(torrent);
        let piece_request_timeout = config.calc_piece_request_timeout(torrent.max_piece_length());
        let requests = PieceRequestManager::new(piece_request_timeout, config.pipeline_limit);
        Arc::new_cyclic(|weak_self| Self {
            config,
            weak_self: weak_self.clone(),
            created_at: Instant::now(),
            local_peer_id,
            torrent,
            peers: DashMap::new(),
            netevents,
            events,
            metrics: DispatchMetrics::new(),
            piece_request_timeout,
            requests,
            pending_pieces_done: CancellationToken::new(),
            complete_notified: AtomicBool::new(false),
        })
    }

    /// The torrent's name.
    pub fn name(&self) -> &str {
        self.torrent.name()
    }

    /// The torrent's info hash.
    pub fn info_hash(&self) -> InfoHash {
        self.torrent.info_hash()
    }

    /// The torrent's total length in bytes.
    pub fn length(&self) -> u64 {
        self.torrent.length()
    }

    /// A snapshot of the torrent's state.
    pub fn stat(&self) -> TorrentInfo {
        self.torrent.stat()
    }

    /// True once the local torrent holds every piece.
    pub fn is_complete(&self) -> bool {
        self.torrent.complete()
    }

    /// When this dispatcher was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When a valid and needed piece was last received from `peer_id`.
    pub fn last_good_piece_received(&self, peer_id: PeerId) -> Option<Instant> {
        self.peers
            .get(&peer_id)
            .and_then(|p| p.last_good_piece_received())
    }

    /// When a piece was last sent to `peer_id`.
    pub fn last_piece_sent(&self, peer_id: PeerId) -> Option<Instant> {
        self.peers.get(&peer_id).and_then(|p| p.last_piece_sent())
    }

    /// When the torrent was last read from.
    pub fn last_read_time(&self) -> Instant {
        self.torrent.last_read_time()
    }

    /// When the torrent was last written to.
    pub fn last_write_time(&self) -> Instant {
        self.torrent.last_write_time()
    }

    /// True if no peers are attached.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Number of attached peers.
    pub fn num_peers(&self) -> usize {
        self.peers.len()
    }

    /// Counters for this dispatcher.
    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    #[cfg(test)]
    pub(crate) fn piece_requests(&self) -> &PieceRequestManager {
        &self.requests
    }

    // The dispatcher's own Arc, for handing to spawned tasks and observers.
    // Infallible while any caller can reach &self through the Arc.
    fn strong_self(&self) -> Option<Arc<Dispatcher>> {
        self.weak_self.upgrade()
    }

    /// Registers a new peer and starts its feed loop, plus an initial
    /// attempt to request pieces from it.
    ///
    /// `bitfield` is the remote inventory from the transport handshake and
    /// must cover the torrent's piece count.
    pub fn add_peer(
        &self,
        peer_id: PeerId,
        bitfield: Bitfield,
        messages: Arc<dyn Messages>,
    ) -> Result<(), DispatchError> {
        let peer = Arc::new(PeerEntry::new(peer_id, bitfield, messages));
        match self.peers.entry(peer_id) {
            Entry::Occupied(_) => return Err(DispatchError::PeerAlreadyDispatched(peer_id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&peer));
            }
        }

        if let Some(d) = self.strong_self() {
            let p = Arc::clone(&peer);
            let kickoff = Arc::clone(&d);
            tokio::spawn(async move {
                let _ = kickoff.maybe_request_more_pieces(&p).await;
            });
            tokio::spawn(d.feed(peer));
        }

        Ok(())
    }

    /// Closes the done latch and every peer endpoint. Feed loops observe
    /// the closed endpoints, deregister their peers, and exit.
    pub fn tear_down(&self) {
        self.pending_pieces_done.cancel();
        for entry in self.peers.iter() {
            info!("{} teardown closing connection to {}", self, entry.key());
            entry.value().messages().close();
        }
    }

    async fn complete(&self) {
        if !self.complete_notified.swap(true, Ordering::SeqCst) {
            if let Some(d) = self.strong_self() {
                let events = Arc::clone(&self.events);
                tokio::spawn(async move { events.dispatcher_complete(d) });
            }
        }
        self.pending_pieces_done.cancel();

        let peers: Vec<Arc<PeerEntry>> =
            self.peers.iter().map(|e| Arc::clone(e.value())).collect();
        for peer in peers {
            if peer.bitfield_complete() {
                // The connection to another completed peer is now useless.
                info!("{} closing connection to completed peer {}", self, peer.id());
                peer.messages().close();
            } else {
                let _ = peer.messages().send(Message::Complete).await;
            }
        }
    }

    fn endgame(&self) -> bool {
        if self.config.disable_endgame {
            return false;
        }
        let remaining = self
            .torrent
            .num_pieces()
            .saturating_sub(self.torrent.bitfield().count());
        remaining <= self.config.endgame_threshold
    }

    async fn maybe_request_more_pieces(&self, peer: &Arc<PeerEntry>) -> Result<bool, DispatchError> {
        let candidates = peer
            .bitfield()
            .intersection(&self.torrent.bitfield().complement());
        self.maybe_send_piece_requests(peer, &candidates).await
    }

    async fn maybe_send_piece_requests(
        &self,
        peer: &Arc<PeerEntry>,
        candidates: &Bitfield,
    ) -> Result<bool, DispatchError> {
        let pieces = self
            .requests
            .reserve_pieces(peer.id(), candidates, self.endgame());
        if pieces.is_empty() {
            return Ok(false);
        }
        for piece in pieces {
            let msg = Message::PieceRequest {
                index: piece,
                offset: 0,
                length: self.torrent.piece_length(piece) as u32,
            };
            if let Err(e) = peer.messages().send(msg).await {
                // Connection closed.
                self.requests.mark_unsent(peer.id(), piece);
                return Err(e.into());
            }
        }
        Ok(true)
    }

    async fn resend_failed_piece_requests(&self) {
        let failed = self.requests.get_failed_requests();
        if failed.is_empty() {
            return;
        }
        info!("{} resending {} failed piece requests", self, failed.len());
        self.metrics
            .record_piece_request_failures(failed.len() as u64);

        let mut sent = 0;
        for request in &failed {
            let peers: Vec<Arc<PeerEntry>> =
                self.peers.iter().map(|e| Arc::clone(e.value())).collect();
            for peer in peers {
                let failed_on_owner =
                    matches!(request.status, RequestStatus::Expired | RequestStatus::Invalid);
                if failed_on_owner && request.peer_id == peer.id() {
                    // Do not retry a peer that let the request lapse or
                    // corrupted it. Unsent requests may retry the same peer.
                    continue;
                }

                if self.torrent.bitfield().has_piece(request.piece as usize) {
                    break;
                }
                if !peer.has_piece(request.piece) {
                    continue;
                }

                let mut single = Bitfield::new(self.torrent.num_pieces());
                single.set_piece(request.piece as usize);
                if matches!(
                    self.maybe_send_piece_requests(&peer, &single).await,
                    Ok(true)
                ) {
                    sent += 1;
                    break;
                }
            }
        }

        let unsent = failed.len() - sent;
        if unsent > 0 {
            info!(
                "{} nowhere to resend {} / {} failed piece requests",
                self,
                unsent,
                failed.len()
            );
        }
    }

    async fn watch_pending_piece_requests(self: Arc<Self>) {
        let interval = self.piece_request_timeout / 2;
        loop {
            tokio::select! {
                _ = sleep(interval) => self.resend_failed_piece_requests().await,
                _ = self.pending_pieces_done.cancelled() => return,
            }
        }
    }

    /// Reads off `peer` and handles inbound messages. When the endpoint
    /// closes, the feed task removes the peer from the dispatcher and drops
    /// its ledger entries.
    async fn feed(self: Arc<Self>, peer: Arc<PeerEntry>) {
        while let Some(msg) = peer.messages().recv().await {
            let kind = msg.kind();
            if let Err(e) = self.dispatch(&peer, msg).await {
                error!("{} error dispatching {} from {}: {}", self, kind, peer.id(), e);
            }
        }
        self.peers.remove(&peer.id());
        self.requests.clear_peer(peer.id());
    }

    async fn dispatch(&self, peer: &Arc<PeerEntry>, msg: Message) -> Result<(), DispatchError> {
        match msg {
            Message::Error {
                index,
                code,
                message,
            } => self.handle_error(peer, index, code, &message),
            Message::AnnouncePiece { index } => self.handle_announce_piece(peer, index).await,
            Message::PieceRequest {
                index,
                offset,
                length,
            } => self.handle_piece_request(peer, index, offset, length).await,
            Message::PiecePayload {
                index,
                offset,
                length,
                payload,
            } => {
                self.handle_piece_payload(peer, index, offset, length, payload)
                    .await
            }
            Message::CancelPiece { index } => self.handle_cancel_piece(peer, index),
            Message::Bitfield { .. } => self.handle_bitfield(peer),
            Message::Complete => self.handle_complete(peer).await,
        }
    }

    fn handle_error(
        &self,
        peer: &Arc<PeerEntry>,
        index: u32,
        code: ErrorCode,
        message: &str,
    ) -> Result<(), DispatchError> {
        match code {
            ErrorCode::PieceRequestFailed => {
                error!("{} piece request failed at {}: {}", self, peer.id(), message);
                self.requests.mark_invalid(peer.id(), index);
            }
            ErrorCode::Unknown => {
                warn!("{} peer {} reported: {}", self, peer.id(), message);
            }
        }
        Ok(())
    }

    async fn handle_announce_piece(
        &self,
        peer: &Arc<PeerEntry>,
        index: u32,
    ) -> Result<(), DispatchError> {
        let num_pieces = self.torrent.num_pieces();
        if index as usize >= num_pieces {
            return Err(DispatchError::PieceOutOfBounds { index, num_pieces });
        }
        peer.set_piece(index);

        let _ = self.maybe_request_more_pieces(peer).await;
        Ok(())
    }

    fn is_full_piece(&self, index: u32, offset: u32, length: u32) -> bool {
        offset == 0 && u64::from(length) == self.torrent.piece_length(index)
    }

    async fn handle_piece_request(
        &self,
        peer: &Arc<PeerEntry>,
        index: u32,
        offset: u32,
        length: u32,
    ) -> Result<(), DispatchError> {
        if !self.is_full_piece(index, offset, length) {
            let _ = peer
                .messages()
                .send(Message::Error {
                    index,
                    code: ErrorCode::PieceRequestFailed,
                    message: "chunked piece transfer not supported".to_string(),
                })
                .await;
            return Err(DispatchError::ChunkNotSupported {
                piece: index,
                offset,
                length,
            });
        }

        let payload = match self.torrent.read_piece(index).await {
            Ok(payload) => payload,
            Err(e) => {
                let _ = peer
                    .messages()
                    .send(Message::Error {
                        index,
                        code: ErrorCode::PieceRequestFailed,
                        message: e.to_string(),
                    })
                    .await;
                return Err(e.into());
            }
        };

        let length = payload.len() as u32;
        if peer
            .messages()
            .send(Message::PiecePayload {
                index,
                offset: 0,
                length,
                payload,
            })
            .await
            .is_err()
        {
            return Ok(());
        }

        peer.touch_last_piece_sent();

        // Assume that the peer successfully received the piece.
        peer.set_piece(index);
        Ok(())
    }

    async fn handle_piece_payload(
        &self,
        peer: &Arc<PeerEntry>,
        index: u32,
        offset: u32,
        length: u32,
        payload: Bytes,
    ) -> Result<(), DispatchError> {
        if !self.is_full_piece(index, offset, length) {
            self.requests.mark_invalid(peer.id(), index);
            return Err(DispatchError::ChunkNotSupported {
                piece: index,
                offset,
                length,
            });
        }

        if let Err(e) = self.torrent.write_piece(index, payload).await {
            return match e {
                // Another peer's payload won the race; not the sender's fault.
                StorageError::PieceAlreadyComplete(_) => Ok(()),
                e => {
                    self.requests.mark_invalid(peer.id(), index);
                    Err(e.into())
                }
            };
        }

        self.netevents.produce(NetworkEvent::ReceivePiece {
            info_hash: self.torrent.info_hash(),
            local_peer: self.local_peer_id,
            remote_peer: peer.id(),
            piece: index,
        });

        peer.touch_last_good_piece_received();
        if self.torrent.complete() {
            self.complete().await;
        }

        self.requests.clear(index);

        let _ = self.maybe_request_more_pieces(peer).await;

        let others: Vec<Arc<PeerEntry>> = self
            .peers
            .iter()
            .filter(|e| *e.key() != peer.id())
            .map(|e| Arc::clone(e.value()))
            .collect();
        for other in others {
            let _ = other
                .messages()
                .send(Message::AnnouncePiece { index })
                .await;
        }
        Ok(())
    }

    fn handle_cancel_piece(&self, _peer: &Arc<PeerEntry>, _index: u32) -> Result<(), DispatchError> {
        // Inbound messages are processed in order, so a cancel always
        // arrives after the piece has already been read and committed.
        Ok(())
    }

    fn handle_bitfield(&self, _peer: &Arc<PeerEntry>) -> Result<(), DispatchError> {
        // The initial bitfield exchange belongs to the transport handshake.
        Err(DispatchError::RepeatedBitfield)
    }

    async fn handle_complete(&self, peer: &Arc<PeerEntry>) -> Result<(), DispatchError> {
        if self.is_complete() {
            info!("{} closing connection to completed peer {}", self, peer.id());
            peer.messages().close();
        } else {
            peer.set_all_pieces();
            let _ = self.maybe_request_more_pieces(peer).await;
        }
        Ok(())
    }
}

impl fmt::Display for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dispatcher({})", self.name())
    }
}
