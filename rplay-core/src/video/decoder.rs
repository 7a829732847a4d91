//! Decoder pipeline.
//!
//! Takes [`EncodedPacket`]s received from the network and returns the
//! planar surfaces the backend releases, in emission order.

use tracing::trace;

use crate::error::StreamError;
use crate::video::backend::VideoDecoder;
use crate::video::types::{EncodedPacket, PlanarFrame};

// ── DecoderPipeline ──────────────────────────────────────────────

pub struct DecoderPipeline<D: VideoDecoder> {
    decoder: D,
    packets_in: u64,
    frames_out: u64,
}

impl<D: VideoDecoder> DecoderPipeline<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            packets_in: 0,
            frames_out: 0,
        }
    }

    /// Submit one packet and drain every ready surface.
    ///
    /// An empty result is normal: the decoder may hold pictures back while
    /// it waits for reference frames. Surfaces are returned as emitted and
    /// never re-sorted by pts.
    pub fn decode(&mut self, packet: &EncodedPacket) -> Result<Vec<PlanarFrame>, StreamError> {
        self.decoder
            .send_packet(&packet.data)
            .map_err(StreamError::DecodeFailed)?;
        self.packets_in += 1;

        let mut frames = Vec::new();
        while let Some(frame) = self
            .decoder
            .receive_frame()
            .map_err(StreamError::DecodeFailed)?
        {
            frames.push(frame);
        }
        self.frames_out += frames.len() as u64;

        trace!(bytes = packet.len(), frames = frames.len(), "packet decoded");
        Ok(frames)
    }

    /// Packets accepted so far.
    pub fn packets_in(&self) -> u64 {
        self.packets_in
    }

    /// Surfaces released so far.
    pub fn frames_out(&self) -> u64 {
        self.frames_out
    }
}

// ── Tests ────────────────────────────────────────────────────────
