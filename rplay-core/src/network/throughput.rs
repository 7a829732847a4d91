//! Rolling-window throughput meter.
//!
//! Tracks bytes moved over a rolling window and derives the current
//! rate in bytes/second and packets/second. Both session loops feed it
//! and log the result periodically.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling-window throughput meter.
///
/// Records `(timestamp, bytes)` samples and computes the average rate
/// over the most recent `window`.
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    /// Running total of bytes in the window.
    window_bytes: u64,
}

impl ThroughputMeter {
    /// A meter with a 1-second rolling window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(128),
            window,
            window_bytes: 0,
        }
    }

    /// Record one packet of `bytes` moved now.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_at(&mut self, when: Instant, bytes: u64) {
        self.samples.push_back((when, bytes));
        self.window_bytes += bytes;
        self.evict(when);
    }

    /// Average bytes/second over the window.
    pub fn bytes_per_sec(&self) -> u64 {
        match self.span() {
            Some(secs) => (self.window_bytes as f64 / secs) as u64,
            None => 0,
        }
    }

    /// Average packets/second over the window.
    pub fn packets_per_sec(&self) -> f64 {
        match self.span() {
            Some(secs) => self.samples.len() as f64 / secs,
            None => 0.0,
        }
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Seconds covered by the window's samples, at least 1 ms.
    fn span(&self) -> Option<f64> {
        let (first, last) = (self.samples.front()?, self.samples.back()?);
        let d = last.0.duration_since(first.0);
        let d = if d.is_zero() { Duration::from_millis(1) } else { d };
        Some(d.as_secs_f64())
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.duration_since(ts) > self.window {
                self.samples.pop_front();
                self.window_bytes = self.window_bytes.saturating_sub(bytes);
            } else {
                break;
            }
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
