use std::time::Duration;

/// Tunables shared by both engines (spec.md §4.6). Chunk size matches the
/// HTTP upload default; the rest govern backpressure, liveness, and the
/// `end`/`end_ack` handshake retry budget.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub chunk_size: usize,
    pub max_unacked_chunks: usize,
    pub heartbeat_interval: Duration,
    pub watchdog_timeout: Duration,
    pub end_ack_timeout: Duration,
    pub end_ack_retries: u32,
    pub handshake_timeout: Duration,
    /// Buffer-based flow control (spec.md §4.6.4): once
    /// `DataChannel::buffered_amount()` exceeds this, the sender pauses.
    pub buffer_high_water_mark: usize,
    /// The sender resumes once buffered bytes drop below this, or after
    /// `buffer_drain_poll_interval` has elapsed, whichever comes first.
    pub buffer_low_water_mark: usize,
    pub buffer_drain_poll_interval: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256 * 1024,
            max_unacked_chunks: 32,
            heartbeat_interval: Duration::from_secs(5),
            watchdog_timeout: Duration::from_secs(15),
            end_ack_timeout: Duration::from_secs(15),
            end_ack_retries: 3,
            handshake_timeout: Duration::from_secs(10),
            buffer_high_water_mark: 8 * 1024 * 1024,
            buffer_low_water_mark: 2 * 1024 * 1024,
            buffer_drain_poll_interval: Duration::from_millis(60),
        }
    }
}
