use std::time::Duration;

const DEFAULT_PIPELINE_LIMIT: usize = 3;
const DEFAULT_ENDGAME_THRESHOLD: usize = 5;
const DEFAULT_PIECE_REQUEST_MIN_TIMEOUT: Duration = Duration::from_secs(4);
const DEFAULT_PIECE_REQUEST_TIMEOUT_PER_MB: Duration = Duration::from_secs(4);

/// Dispatcher tuning knobs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum concurrent pending piece requests per peer.
    pub pipeline_limit: usize,

    /// Remaining-piece count at or below which endgame mode enables.
    /// In endgame, duplicate requests to distinct peers are permitted so a
    /// few stragglers cannot stall the tail of the download.
    pub endgame_threshold: usize,

    /// Force-disables endgame mode regardless of the threshold.
    pub disable_endgame: bool,

    /// Floor for the per-request timeout.
    pub piece_request_min_timeout: Duration,

    /// Timeout budget per mebibyte of the torrent's max piece length.
    pub piece_request_timeout_per_mb: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline_limit: DEFAULT_PIPELINE_LIMIT,
            endgame_threshold: DEFAULT_ENDGAME_THRESHOLD,
            disable_endgame: false,
            piece_request_min_timeout: DEFAULT_PIECE_REQUEST_MIN_TIMEOUT,
            piece_request_timeout_per_mb: DEFAULT_PIECE_REQUEST_TIMEOUT_PER_MB,
        }
    }
}

impl Config {
    /// Replaces zero-valued fields with their defaults.
    pub(crate) fn apply_defaults(mut self) -> Self {
        if self.pipeline_limit == 0 {
            self.pipeline_limit = DEFAULT_PIPELINE_LIMIT;
        }
        if self.endgame_threshold == 0 {
            self.endgame_threshold = DEFAULT_ENDGAME_THRESHOLD;
        }
        if self.piece_request_min_timeout.is_zero() {
            self.piece_request_min_timeout = DEFAULT_PIECE_REQUEST_MIN_TIMEOUT;
        }
        if self.piece_request_timeout_per_mb.is_zero() {
            self.piece_request_timeout_per_mb = DEFAULT_PIECE_REQUEST_TIMEOUT_PER_MB;
        }
        self
    }

    /// Piece request timeout scaled to the torrent's max piece length.
    pub(crate) fn calc_piece_request_timeout(&self, max_piece_length: u64) -> Duration {
        let mb = max_piece_length as f64 / (1024.0 * 1024.0);
        let scaled = self.piece_request_timeout_per_mb.mul_f64(mb);
        scaled.max(self.piece_request_min_timeout)
    }
}
