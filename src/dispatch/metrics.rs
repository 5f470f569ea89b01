use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative counters for the dispatch module.
///
/// Exporters should report these under a `module=dispatch` tag.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    piece_request_failures: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_piece_request_failures(&self, n: u64) {
        self.piece_request_failures.fetch_add(n, Ordering::Relaxed);
    }

    /// Total piece requests that expired, failed to send, or were
    /// invalidated by their peer.
    pub fn piece_request_failures(&self) -> u64 {
        self.piece_request_failures.load(Ordering::Relaxed)
    }
}
