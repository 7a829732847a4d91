//! Codec backends and the seams the pipelines talk through.
//!
//! A backend is a closed [`EncoderBackend`] variant. The cascade in
//! [`EncoderPipeline::open`](crate::video::encoder::EncoderPipeline::open)
//! asks a [`CodecProvider`] to resolve and allocate each variant in
//! preference order; whatever comes back is a concrete
//! [`VideoEncoder`] type, so the per-frame path is statically dispatched.

use std::fmt;

use crate::error::CodecError;
use crate::video::types::{PixelFormat, PlanarFrame};

// ── EncoderBackend ───────────────────────────────────────────────

/// The encoder implementations the cascade knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderBackend {
    /// NVIDIA NVENC (hardware tier A).
    Nvenc,
    /// Intel Quick Sync (hardware tier B).
    Qsv,
    /// AMD AMF (hardware tier C).
    Amf,
    /// CPU encoder.
    Software,
}

impl EncoderBackend {
    /// Fixed preference order: hardware tiers first, software last.
    pub const PREFERENCE: [EncoderBackend; 4] = [
        EncoderBackend::Nvenc,
        EncoderBackend::Qsv,
        EncoderBackend::Amf,
        EncoderBackend::Software,
    ];

    /// Name of the encoder implementation to resolve.
    pub const fn encoder_name(self) -> &'static str {
        match self {
            EncoderBackend::Nvenc => "h264_nvenc",
            EncoderBackend::Qsv => "h264_qsv",
            EncoderBackend::Amf => "h264_amf",
            EncoderBackend::Software => "openh264",
        }
    }

    /// Backend-specific options applied before the context is opened.
    pub const fn tuning(self) -> &'static [(&'static str, &'static str)] {
        match self {
            EncoderBackend::Software => &[("preset", "ultrafast"), ("tune", "zerolatency")],
            // Low-latency, high-performance preset.
            EncoderBackend::Nvenc => &[("preset", "llhp")],
            EncoderBackend::Qsv | EncoderBackend::Amf => &[],
        }
    }

    pub const fn is_hardware(self) -> bool {
        !matches!(self, EncoderBackend::Software)
    }

    /// Parse a configuration name (`nvenc`, `qsv`, `amf`, `software`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "nvenc" => Some(EncoderBackend::Nvenc),
            "qsv" => Some(EncoderBackend::Qsv),
            "amf" => Some(EncoderBackend::Amf),
            "software" | "sw" => Some(EncoderBackend::Software),
            _ => None,
        }
    }
}

impl fmt::Display for EncoderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncoderBackend::Nvenc => "nvenc",
            EncoderBackend::Qsv => "qsv",
            EncoderBackend::Amf => "amf",
            EncoderBackend::Software => "software",
        };
        f.pad(name)
    }
}

// ── EncoderSettings ──────────────────────────────────────────────

/// Geometry and rate control requested from every candidate backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    /// Group-of-pictures size (keyframe interval in frames).
    pub gop_size: u32,
    /// Maximum consecutive B-frames.
    pub max_b_frames: u32,
    /// Pixel format of the captured surfaces.
    pub input_format: PixelFormat,
    /// Candidates to try, in order. Defaults to [`EncoderBackend::PREFERENCE`].
    pub backends: Vec<EncoderBackend>,
}

impl EncoderSettings {
    /// Defaults: 30 fps, 5 Mbit/s, GOP 10, one B-frame, every backend.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fps: 30,
            bitrate: 5_000_000,
            gop_size: 10,
            max_b_frames: 1,
            input_format: PixelFormat::Bgra8,
            backends: EncoderBackend::PREFERENCE.to_vec(),
        }
    }
}

// ── Traits ───────────────────────────────────────────────────────

/// Something that can resolve and allocate encoder contexts.
///
/// The cascade calls `resolve`, then `allocate`; the returned context is
/// then tuned with `set_option` and activated with `open`.
pub trait CodecProvider {
    type Encoder: VideoEncoder;

    /// Is the named implementation present?
    fn resolve(&self, backend: EncoderBackend) -> Result<(), CodecError>;

    /// Allocate an unopened context with the requested geometry.
    fn allocate(
        &self,
        backend: EncoderBackend,
        settings: &EncoderSettings,
    ) -> Result<Self::Encoder, CodecError>;
}

/// An encoding context.
///
/// The send/receive split mirrors how real encoders behave: a
/// submission may produce zero packets (the encoder is buffering) or
/// several (reordering delay elapsed).
pub trait VideoEncoder {
    /// Apply one backend-specific option before opening.
    fn set_option(&mut self, key: &'static str, value: &'static str) -> Result<(), CodecError>;

    /// Activate the context.
    fn open(&mut self) -> Result<(), CodecError>;

    /// Submit one frame. `frame.pts` carries the running frame counter.
    fn send_frame(&mut self, frame: &PlanarFrame) -> Result<(), CodecError>;

    /// Pull the next ready packet, or `Ok(None)` when nothing is ready.
    fn receive_packet(&mut self) -> Result<Option<Vec<u8>>, CodecError>;
}

/// A decoding context; same send/receive contract as [`VideoEncoder`].
pub trait VideoDecoder {
    /// Submit one compressed bitstream unit.
    fn send_packet(&mut self, data: &[u8]) -> Result<(), CodecError>;

    /// Pull the next decoded picture, or `Ok(None)` when nothing is ready.
    fn receive_frame(&mut self) -> Result<Option<PlanarFrame>, CodecError>;
}

// ── Tests ────────────────────────────────────────────────────────
