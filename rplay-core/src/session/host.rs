//! Host-side capture → encode → send loop.
//!
//! 1. The [`CaptureSource`] hands over the next surface (a timeout
//!    skips the iteration).
//! 2. The [`EncoderPipeline`] turns it into zero or more packets.
//! 3. Each packet goes out through the [`FrameTransport`], in encoder
//!    order.
//! 4. The loop sleeps for whatever is left of the frame interval.
//!
//! The only backpressure is the socket: when the peer stops reading,
//! `send` stalls until the I/O timeout fires.

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{CaptureError, StreamError};
use crate::network::{FrameTransport, ThroughputMeter};
use crate::session::{CaptureSource, SessionStats};
use crate::video::backend::VideoEncoder;
use crate::video::encoder::EncoderPipeline;

// ── HostConfig ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Minimum time between the starts of two iterations.
    pub frame_interval: Duration,
    /// How long one capture attempt may block.
    pub capture_timeout: Duration,
    /// How often throughput is logged.
    pub stats_interval: Duration,
}

impl HostConfig {
    /// Pacing for `fps` frames per second (clamped to at least 1).
    pub fn with_fps(fps: u32) -> Self {
        Self {
            frame_interval: Duration::from_secs(1) / fps.max(1),
            ..Self::default()
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            capture_timeout: Duration::from_millis(100),
            stats_interval: Duration::from_secs(5),
        }
    }
}

// ── HostSession ──────────────────────────────────────────────────

pub struct HostSession<C, E: VideoEncoder, S> {
    capture: C,
    encoder: EncoderPipeline<E>,
    transport: FrameTransport<S>,
    config: HostConfig,
}

impl<C, E, S> HostSession<C, E, S>
where
    C: CaptureSource,
    E: VideoEncoder,
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        capture: C,
        encoder: EncoderPipeline<E>,
        transport: FrameTransport<S>,
        config: HostConfig,
    ) -> Self {
        Self {
            capture,
            encoder,
            transport,
            config,
        }
    }

    /// Run until `cancel` fires or a fatal error occurs.
    ///
    /// Cancellation is checked after every capture attempt and raced
    /// against every send and pacing sleep. The session is consumed; the
    /// encoder, capture source and socket are released on return.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<SessionStats, StreamError> {
        let started = Instant::now();
        let mut stats = SessionStats::default();
        let mut meter = ThroughputMeter::new();
        let mut last_report = Instant::now();

        info!(
            backend = %self.encoder.backend(),
            interval_ms = self.config.frame_interval.as_millis() as u64,
            "host session started"
        );

        let result = self
            .stream(&cancel, &mut stats, &mut meter, &mut last_report)
            .await;
        stats.elapsed = started.elapsed();

        match &result {
            Ok(()) => info!(
                frames = stats.frames_captured,
                skipped = stats.captures_skipped,
                packets = stats.packets,
                bytes = stats.bytes,
                "host session finished"
            ),
            Err(e) => warn!(
                error = %e,
                frames = stats.frames_captured,
                packets = stats.packets,
                "host session aborted"
            ),
        }
        result.map(|()| stats)
    }

    async fn stream(
        &mut self,
        cancel: &CancellationToken,
        stats: &mut SessionStats,
        meter: &mut ThroughputMeter,
        last_report: &mut Instant,
    ) -> Result<(), StreamError> {
        while !cancel.is_cancelled() {
            let iteration = Instant::now();

            // 1. Capture.
            let surface = match self.capture.acquire_next_surface(self.config.capture_timeout) {
                Ok(surface) => surface,
                Err(CaptureError::Timeout(_)) => {
                    // Nothing changed on screen within the deadline.
                    stats.captures_skipped += 1;
                    tokio::task::yield_now().await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            stats.frames_captured += 1;

            if cancel.is_cancelled() {
                break;
            }

            // 2. Encode.
            let packets = self.encoder.encode(&surface)?;

            // 3. Send, in encoder order.
            for packet in packets {
                let len = packet.len() as u64;
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    res = self.transport.send(packet) => Some(res),
                };
                match sent {
                    Some(res) => res?,
                    None => return Ok(()),
                }
                meter.record(len);
                stats.packets += 1;
                stats.bytes += len;
            }
            trace!(frame = stats.frames_captured, "iteration complete");

            if last_report.elapsed() >= self.config.stats_interval {
                debug!(
                    bytes_per_sec = meter.bytes_per_sec(),
                    packets_per_sec = meter.packets_per_sec(),
                    encoded = self.encoder.frame_count(),
                    "host throughput"
                );
                *last_report = Instant::now();
            }

            // 4. Pace.
            let remaining = self.config.frame_interval.saturating_sub(iteration.elapsed());
            if !remaining.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(remaining) => {}
                }
            }
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
