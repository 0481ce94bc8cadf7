//! Flood control for outgoing messages.
//!
//! Implements the "hybrid" flood-control formula: each outgoing line
//! costs `2s + length/120s` of line time. The accumulated `badness`
//! tracks how far our output is running ahead of the server's
//! tolerance; once it exceeds 10 seconds, the writer must sleep one
//! line time before sending. Conversational pacing passes through
//! unthrottled while bursts are smoothed out.

use std::time::{Duration, Instant};

/// Badness threshold above which sends are delayed.
const THRESHOLD: Duration = Duration::from_secs(10);

/// Fixed per-line cost.
const LINE_OVERHEAD: Duration = Duration::from_secs(2);

/// Bytes of message length per second of line time.
const BYTES_PER_SECOND: f64 = 120.0;

/// Per-connection flood-control accumulator.
///
/// Owned exclusively by the writer loop; no locking needed.
#[derive(Debug)]
pub struct FloodControl {
    /// Estimated backlog; clamped non-negative.
    badness: Duration,
    /// When the previous send was recorded.
    last_sent: Instant,
}

impl FloodControl {
    /// New accumulator with an empty backlog.
    pub fn new() -> Self {
        Self {
            badness: Duration::ZERO,
            last_sent: Instant::now(),
        }
    }

    /// Compute the delay to apply before sending a line of `len` bytes.
    ///
    /// Returns [`Duration::ZERO`] when the line may go out immediately.
    pub fn delay(&mut self, len: usize) -> Duration {
        self.delay_at(len, Instant::now())
    }

    /// Current backlog estimate.
    pub fn badness(&self) -> Duration {
        self.badness
    }

    fn delay_at(&mut self, len: usize, now: Instant) -> Duration {
        let line_time = LINE_OVERHEAD + Duration::from_secs_f64(len as f64 / BYTES_PER_SECOND);
        let elapsed = now.saturating_duration_since(self.last_sent);

        // badness += line_time - elapsed, clamped to zero.
        self.badness = (self.badness + line_time).saturating_sub(elapsed);
        self.last_sent = now;

        if self.badness > THRESHOLD {
            line_time
        } else {
            Duration::ZERO
        }
    }
}

impl Default for FloodControl {
    fn default() -> Self {
        Self::new()
    }
}
