//! Client-side receive → decode → present loop.
//!
//! Packets are decoded strictly in arrival order and every surface the
//! decoder releases goes to the [`Presenter`] as emitted. A decode error
//! ends the session: the stream carries no markers to resynchronise on,
//! so recovery would need a restart handshake at this level.

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::StreamError;
use crate::network::{FrameTransport, ThroughputMeter};
use crate::session::{Presenter, SessionStats};
use crate::video::backend::VideoDecoder;
use crate::video::decoder::DecoderPipeline;

// ── ClientConfig ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How often the presenter is asked about shutdown while no packets
    /// arrive.
    pub shutdown_poll: Duration,
    /// How often throughput is logged.
    pub stats_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            shutdown_poll: Duration::from_millis(50),
            stats_interval: Duration::from_secs(5),
        }
    }
}

// ── ClientSession ────────────────────────────────────────────────

pub struct ClientSession<D: VideoDecoder, P, S> {
    decoder: DecoderPipeline<D>,
    presenter: P,
    transport: FrameTransport<S>,
    config: ClientConfig,
}

impl<D, P, S> ClientSession<D, P, S>
where
    D: VideoDecoder,
    P: Presenter,
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        decoder: DecoderPipeline<D>,
        presenter: P,
        transport: FrameTransport<S>,
        config: ClientConfig,
    ) -> Self {
        Self {
            decoder,
            presenter,
            transport,
            config,
        }
    }

    /// Run until `cancel` fires, the presenter asks to close, or a fatal
    /// error occurs.
    ///
    /// A presenter shutdown request cancels `cancel` so that any sibling
    /// task sharing the token stops as well.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<SessionStats, StreamError> {
        let started = Instant::now();
        let mut stats = SessionStats::default();

        info!("client session started");
        let result = self.stream(&cancel, &mut stats).await;
        stats.elapsed = started.elapsed();

        match &result {
            Ok(()) => info!(
                packets = stats.packets,
                bytes = stats.bytes,
                presented = stats.frames_presented,
                "client session finished"
            ),
            Err(e) => warn!(
                error = %e,
                packets = stats.packets,
                presented = stats.frames_presented,
                "client session aborted"
            ),
        }
        result.map(|()| stats)
    }

    async fn stream(
        &mut self,
        cancel: &CancellationToken,
        stats: &mut SessionStats,
    ) -> Result<(), StreamError> {
        let mut meter = ThroughputMeter::new();
        let mut last_report = Instant::now();
        let mut poll = tokio::time::interval(self.config.shutdown_poll);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if self.presenter.poll_shutdown_requested() {
                info!("presenter requested shutdown");
                cancel.cancel();
                return Ok(());
            }

            // `receive` is cancel-safe, so losing the race to a poll tick
            // drops no bytes.
            let packet = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = poll.tick() => continue,
                res = self.transport.receive() => res?,
            };
            stats.packets += 1;
            stats.bytes += packet.len() as u64;
            meter.record(packet.len() as u64);

            if cancel.is_cancelled() {
                return Ok(());
            }

            let frames = self.decoder.decode(&packet)?;
            trace!(index = packet.frame_index, frames = frames.len(), "packet received");
            for frame in &frames {
                self.presenter.present_surface(frame)?;
                stats.frames_presented += 1;
            }

            if last_report.elapsed() >= self.config.stats_interval {
                debug!(
                    bytes_per_sec = meter.bytes_per_sec(),
                    packets_per_sec = meter.packets_per_sec(),
                    decoded_packets = self.decoder.packets_in(),
                    decoded_frames = self.decoder.frames_out(),
                    "client throughput"
                );
                last_report = Instant::now();
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
