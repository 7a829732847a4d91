//! Cisco OpenH264 backend.
//!
//! OpenH264 is a CPU encoder, so this provider only resolves
//! [`EncoderBackend::Software`]; the hardware tiers report
//! [`CodecError::NotFound`] and the cascade moves on. The library has no
//! B-frames and emits at most one access unit per submitted picture.
//!
//! Requires the `h264` feature.

use std::collections::VecDeque;

use openh264::OpenH264API;
use openh264::decoder::{Decoder, DecoderConfig};
use openh264::encoder::{BitRate, Complexity, Encoder, EncoderConfig, FrameRate, UsageType};
use openh264::formats::{YUVSlices, YUVSource};
use openh264::nal_units;
use tracing::{debug, trace};

use crate::error::CodecError;
use crate::video::backend::{CodecProvider, EncoderBackend, EncoderSettings, VideoDecoder, VideoEncoder};
use crate::video::types::PlanarFrame;

// ── OpenH264Provider ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenH264Provider;

impl CodecProvider for OpenH264Provider {
    type Encoder = OpenH264Encoder;

    fn resolve(&self, backend: EncoderBackend) -> Result<(), CodecError> {
        match backend {
            EncoderBackend::Software => Ok(()),
            other => Err(CodecError::NotFound(other.encoder_name())),
        }
    }

    fn allocate(
        &self,
        backend: EncoderBackend,
        settings: &EncoderSettings,
    ) -> Result<OpenH264Encoder, CodecError> {
        self.resolve(backend)?;

        let (w, h) = (settings.width, settings.height);
        if w == 0 || h == 0 || w % 2 != 0 || h % 2 != 0 {
            return Err(CodecError::Allocation(format!(
                "{w}x{h}: dimensions must be non-zero and even"
            )));
        }
        if settings.fps == 0 || settings.bitrate == 0 {
            return Err(CodecError::Allocation(format!(
                "fps {} / bitrate {} must be positive",
                settings.fps, settings.bitrate
            )));
        }
        if settings.max_b_frames > 0 {
            debug!(max_b_frames = settings.max_b_frames, "openh264 has no B-frames, ignoring");
        }

        Ok(OpenH264Encoder {
            width: w,
            height: h,
            fps: settings.fps,
            bitrate: settings.bitrate,
            gop_size: settings.gop_size,
            complexity: Effort::Medium,
            skip_frames: true,
            encoder: None,
            ready: VecDeque::new(),
        })
    }
}

// ── OpenH264Encoder ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effort {
    Low,
    Medium,
    High,
}

/// An OpenH264 context. The library encoder is only created on `open`.
pub struct OpenH264Encoder {
    width: u32,
    height: u32,
    fps: u32,
    bitrate: u32,
    gop_size: u32,
    complexity: Effort,
    skip_frames: bool,
    encoder: Option<Encoder>,
    ready: VecDeque<Vec<u8>>,
}

impl VideoEncoder for OpenH264Encoder {
    fn set_option(&mut self, key: &'static str, value: &'static str) -> Result<(), CodecError> {
        match (key, value) {
            ("preset", "ultrafast" | "superfast" | "veryfast") => self.complexity = Effort::Low,
            ("preset", "fast" | "medium") => self.complexity = Effort::Medium,
            ("preset", "slow" | "slower" | "veryslow") => self.complexity = Effort::High,
            // Dropping frames under rate pressure adds jitter.
            ("tune", "zerolatency") => self.skip_frames = false,
            _ => return Err(CodecError::Tuning { key, value }),
        }
        Ok(())
    }

    fn open(&mut self) -> Result<(), CodecError> {
        let complexity = match self.complexity {
            Effort::Low => Complexity::Low,
            Effort::Medium => Complexity::Medium,
            Effort::High => Complexity::High,
        };
        let config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(self.bitrate))
            .max_frame_rate(FrameRate::from_hz(self.fps as f32))
            .skip_frames(self.skip_frames)
            .usage_type(UsageType::ScreenContentRealTime)
            .complexity(complexity);

        let encoder = Encoder::with_api_config(OpenH264API::from_source(), config)
            .map_err(|e| CodecError::Open(format!("{e:?}")))?;
        self.encoder = Some(encoder);
        Ok(())
    }

    fn send_frame(&mut self, frame: &PlanarFrame) -> Result<(), CodecError> {
        let encoder = self.encoder.as_mut().ok_or(CodecError::NotOpen)?;
        if frame.width != self.width || frame.height != self.height {
            return Err(CodecError::Backend(format!(
                "frame is {}x{}, context is {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        // GOP boundary. The first picture is an IDR anyway.
        if self.gop_size > 0 && frame.pts > 0 && frame.pts % self.gop_size as u64 == 0 {
            encoder.force_intra_frame();
        }

        let yuv = YUVSlices::new(
            (frame.y.as_slice(), frame.u.as_slice(), frame.v.as_slice()),
            (frame.width as usize, frame.height as usize),
            (frame.y_stride, frame.uv_stride, frame.uv_stride),
        );
        let bitstream = encoder
            .encode(&yuv)
            .map_err(|e| CodecError::Backend(format!("{e:?}")))?;

        // An empty bitstream means the rate controller skipped the picture.
        let data = bitstream.to_vec();
        trace!(pts = frame.pts, bytes = data.len(), "openh264 encode");
        if !data.is_empty() {
            self.ready.push_back(data);
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<Option<Vec<u8>>, CodecError> {
        Ok(self.ready.pop_front())
    }
}

// ── OpenH264Decoder ──────────────────────────────────────────────

pub struct OpenH264Decoder {
    decoder: Decoder,
    ready: VecDeque<PlanarFrame>,
    emitted: u64,
}

impl OpenH264Decoder {
    pub fn new() -> Result<Self, CodecError> {
        let decoder = Decoder::with_api_config(OpenH264API::from_source(), DecoderConfig::new())
            .map_err(|e| CodecError::Open(format!("{e:?}")))?;
        Ok(Self {
            decoder,
            ready: VecDeque::new(),
            emitted: 0,
        })
    }
}

impl VideoDecoder for OpenH264Decoder {
    fn send_packet(&mut self, data: &[u8]) -> Result<(), CodecError> {
        for nal in nal_units(data) {
            let decoded = self
                .decoder
                .decode(nal)
                .map_err(|e| CodecError::Backend(format!("{e:?}")))?;
            if let Some(yuv) = decoded {
                let mut frame = copy_planes(&yuv)?;
                frame.pts = self.emitted;
                self.emitted += 1;
                self.ready.push_back(frame);
            }
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<PlanarFrame>, CodecError> {
        Ok(self.ready.pop_front())
    }
}

/// Copy a decoder-owned picture into a tightly packed frame.
fn copy_planes(yuv: &impl YUVSource) -> Result<PlanarFrame, CodecError> {
    let (w, h) = yuv.dimensions();
    let (sy, su, sv) = yuv.strides();
    let mut frame = PlanarFrame::new(w as u32, h as u32);
    let (cw, ch) = PlanarFrame::chroma_dimensions(w as u32, h as u32);

    copy_plane(yuv.y(), sy, &mut frame.y, w, h)?;
    copy_plane(yuv.u(), su, &mut frame.u, cw, ch)?;
    copy_plane(yuv.v(), sv, &mut frame.v, cw, ch)?;
    Ok(frame)
}

fn copy_plane(src: &[u8], stride: usize, dst: &mut [u8], width: usize, rows: usize) -> Result<(), CodecError> {
    for row in 0..rows {
        let line = src
            .get(row * stride..row * stride + width)
            .ok_or_else(|| CodecError::Backend(format!("decoded plane short at row {row}")))?;
        dst[row * width..(row + 1) * width].copy_from_slice(line);
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
