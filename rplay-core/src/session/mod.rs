//! # Streaming sessions
//!
//! Two single-task loops, one per side of the connection:
//!
//! | Module   | Loop                                        |
//! |----------|---------------------------------------------|
//! | `host`   | capture → encode → send, paced per frame    |
//! | `client` | receive → decode → present                  |
//!
//! Each loop owns its codec context and transport. When `run` returns,
//! for any reason, both are dropped.
//! The only state shared across tasks is the `CancellationToken`.

pub mod client;
pub mod host;

use std::time::Duration;

use crate::error::{CaptureError, StreamError};
use crate::video::types::{PixelFormat, PlanarFrame, RawSurface};

pub use client::{ClientConfig, ClientSession};
pub use host::{HostConfig, HostSession};

// ── Collaborator traits ──────────────────────────────────────────

/// Geometry a capture source will deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Produces raw display surfaces.
pub trait CaptureSource {
    /// Geometry of every surface this source returns.
    fn surface_info(&self) -> SurfaceInfo;

    /// Block until a new surface is available or `timeout` elapses.
    ///
    /// [`CaptureError::Timeout`] is not fatal; the host loop skips the
    /// iteration. Anything else ends the session.
    fn acquire_next_surface(&mut self, timeout: Duration) -> Result<RawSurface, CaptureError>;
}

/// Displays decoded surfaces.
pub trait Presenter {
    fn present_surface(&mut self, frame: &PlanarFrame) -> Result<(), StreamError>;

    /// Whether the user asked to close the view. Polled between packets
    /// and periodically while the stream is idle.
    fn poll_shutdown_requested(&mut self) -> bool;
}

// ── SessionStats ─────────────────────────────────────────────────

/// Counters reported when a session loop ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    /// Surfaces obtained from the capture source (host).
    pub frames_captured: u64,
    /// Capture attempts that timed out (host).
    pub captures_skipped: u64,
    /// Packets sent (host) or received (client).
    pub packets: u64,
    /// Payload bytes sent or received.
    pub bytes: u64,
    /// Surfaces handed to the presenter (client).
    pub frames_presented: u64,
    /// Wall time the loop ran for.
    pub elapsed: Duration,
}

impl SessionStats {
    /// Average payload rate over the whole session.
    pub fn average_bytes_per_sec(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_rate() {
        let stats = SessionStats {
            bytes: 3_000,
            elapsed: Duration::from_secs(2),
            ..SessionStats::default()
        };
        assert_eq!(stats.average_bytes_per_sec(), 1_500);
        assert_eq!(SessionStats::default().average_bytes_per_sec(), 0);
    }
}
