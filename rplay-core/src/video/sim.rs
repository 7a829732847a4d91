//! Deterministic in-process codec for exercising the pipeline without H.264.
//!
//! [`SimProvider`] advertises a configurable set of backends and can be
//! told to fail any cascade step for any of them. Output can be held back
//! (`with_delay`) and released in groups (`with_burst`). Every context it hands
//! out bumps a shared live counter that drops back on `Drop`, so callers
//! can check that failed candidates were released.
//!
//! Packets are not H.264. Each one is a 20-byte record:
//!
//! ```text
//! magic:  b"SIMV"
//! pts:    u64 BE
//! width:  u32 BE
//! height: u32 BE
//! ```
//!
//! [`SimDecoder`] parses the same record back into a black [`PlanarFrame`]
//! carrying the pts, and rejects anything else.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::CodecError;
use crate::video::backend::{CodecProvider, EncoderBackend, EncoderSettings, VideoDecoder, VideoEncoder};
use crate::video::types::PlanarFrame;

pub const SIM_MAGIC: &[u8; 4] = b"SIMV";
pub const SIM_PACKET_LEN: usize = 20;

/// A cascade step that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimStep {
    Allocate,
    Tune,
    Open,
}

// ── Live-context accounting ──────────────────────────────────────

#[derive(Debug)]
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── SimProvider ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SimProvider {
    available: Vec<EncoderBackend>,
    failures: HashMap<EncoderBackend, SimStep>,
    /// Submissions held back before the first packet comes out.
    delay: usize,
    /// Packets are released only on every `burst`-th submission.
    burst: usize,
    /// Fail `send_frame` once this many frames have been accepted.
    fail_after: Option<u64>,
    live: Arc<AtomicUsize>,
}

impl SimProvider {
    /// A provider where only `available` resolve.
    pub fn with_backends(available: &[EncoderBackend]) -> Self {
        Self {
            available: available.to_vec(),
            ..Self::default()
        }
    }

    /// A provider where nothing resolves.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failing(mut self, backend: EncoderBackend, step: SimStep) -> Self {
        self.failures.insert(backend, step);
        self
    }

    pub fn with_delay(mut self, frames: usize) -> Self {
        self.delay = frames;
        self
    }

    /// Release output only every `frames` submissions, all of it at once.
    pub fn with_burst(mut self, frames: usize) -> Self {
        self.burst = frames;
        self
    }

    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Contexts currently alive across every encoder this provider made.
    pub fn live_contexts(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn fails_at(&self, backend: EncoderBackend, step: SimStep) -> bool {
        self.failures.get(&backend) == Some(&step)
    }
}

impl CodecProvider for SimProvider {
    type Encoder = SimEncoder;

    fn resolve(&self, backend: EncoderBackend) -> Result<(), CodecError> {
        if self.available.contains(&backend) {
            Ok(())
        } else {
            Err(CodecError::NotFound(backend.encoder_name()))
        }
    }

    fn allocate(
        &self,
        backend: EncoderBackend,
        settings: &EncoderSettings,
    ) -> Result<SimEncoder, CodecError> {
        if self.fails_at(backend, SimStep::Allocate) {
            return Err(CodecError::Allocation(format!(
                "{}x{} rejected",
                settings.width, settings.height
            )));
        }
        Ok(SimEncoder {
            width: settings.width,
            height: settings.height,
            opened: false,
            reject_tuning: self.fails_at(backend, SimStep::Tune),
            reject_open: self.fails_at(backend, SimStep::Open),
            delay: self.delay,
            burst: self.burst.max(1) as u64,
            fail_after: self.fail_after,
            accepted: 0,
            pending: VecDeque::new(),
            releasable: 0,
            options: Vec::new(),
            _live: LiveGuard::new(&self.live),
        })
    }
}

// ── SimEncoder ───────────────────────────────────────────────────

#[derive(Debug)]
pub struct SimEncoder {
    width: u32,
    height: u32,
    opened: bool,
    reject_tuning: bool,
    reject_open: bool,
    delay: usize,
    burst: u64,
    fail_after: Option<u64>,
    accepted: u64,
    pending: VecDeque<u64>,
    /// Packets `receive_packet` may still hand out before the next submission.
    releasable: usize,
    options: Vec<(&'static str, &'static str)>,
    _live: LiveGuard,
}

impl SimEncoder {
    /// Options applied through [`VideoEncoder::set_option`], in order.
    pub fn options(&self) -> &[(&'static str, &'static str)] {
        &self.options
    }
}

impl VideoEncoder for SimEncoder {
    fn set_option(&mut self, key: &'static str, value: &'static str) -> Result<(), CodecError> {
        if self.reject_tuning {
            return Err(CodecError::Tuning { key, value });
        }
        self.options.push((key, value));
        Ok(())
    }

    fn open(&mut self) -> Result<(), CodecError> {
        if self.reject_open {
            return Err(CodecError::Open("device busy".into()));
        }
        self.opened = true;
        Ok(())
    }

    fn send_frame(&mut self, frame: &PlanarFrame) -> Result<(), CodecError> {
        if !self.opened {
            return Err(CodecError::NotOpen);
        }
        if self.fail_after.is_some_and(|n| self.accepted >= n) {
            return Err(CodecError::Backend("injected failure".into()));
        }
        if frame.width != self.width || frame.height != self.height {
            return Err(CodecError::Backend(format!(
                "frame is {}x{}, context is {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        self.accepted += 1;
        self.pending.push_back(frame.pts);
        if self.accepted % self.burst == 0 {
            self.releasable = self.pending.len().saturating_sub(self.delay);
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<Option<Vec<u8>>, CodecError> {
        if self.releasable == 0 {
            return Ok(None);
        }
        self.releasable -= 1;
        Ok(self
            .pending
            .pop_front()
            .map(|pts| sim_packet(pts, self.width, self.height)))
    }
}

// ── SimDecoder ───────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SimDecoder {
    ready: VecDeque<PlanarFrame>,
}

impl SimDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VideoDecoder for SimDecoder {
    fn send_packet(&mut self, data: &[u8]) -> Result<(), CodecError> {
        let (pts, width, height) = parse_sim_packet(data)
            .ok_or_else(|| CodecError::Backend(format!("invalid bitstream ({} bytes)", data.len())))?;
        let mut frame = PlanarFrame::new(width, height);
        frame.pts = pts;
        self.ready.push_back(frame);
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<PlanarFrame>, CodecError> {
        Ok(self.ready.pop_front())
    }
}

// ── Packet format ────────────────────────────────────────────────

/// Build the record a [`SimEncoder`] emits for one submission.
pub fn sim_packet(pts: u64, width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(SIM_PACKET_LEN);
    out.extend_from_slice(SIM_MAGIC);
    out.extend_from_slice(&pts.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&height.to_be_bytes());
    out
}

/// Returns `(pts, width, height)` for a well-formed record.
pub fn parse_sim_packet(data: &[u8]) -> Option<(u64, u32, u32)> {
    if data.len() != SIM_PACKET_LEN || &data[..4] != SIM_MAGIC {
        return None;
    }
    let pts = u64::from_be_bytes(data[4..12].try_into().ok()?);
    let width = u32::from_be_bytes(data[12..16].try_into().ok()?);
    let height = u32::from_be_bytes(data[16..20].try_into().ok()?);
    if width == 0 || height == 0 {
        return None;
    }
    Some((pts, width, height))
}

// ── Tests ────────────────────────────────────────────────────────
