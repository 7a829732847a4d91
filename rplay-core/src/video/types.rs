//! Shared types for the capture/encode/decode pipeline.
//!
//! [`RawSurface`] is what a capture source hands to the encoder,
//! [`PlanarFrame`] is the I420 picture the codecs work on, and
//! [`EncodedPacket`] is the compressed unit the transport carries.

use std::time::Instant;

use bytes::Bytes;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a captured surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Blue, Green, Red, Alpha (DXGI default).
    Bgra8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
        }
    }

    /// Byte offsets of the red, green and blue channels within a pixel.
    pub const fn rgb_offsets(self) -> (usize, usize, usize) {
        match self {
            PixelFormat::Bgra8 => (2, 1, 0),
            PixelFormat::Rgba8 => (0, 1, 2),
        }
    }
}

// ── RawSurface ───────────────────────────────────────────────────

/// A raw, uncompressed surface obtained from the capture source.
///
/// The `data` buffer holds `height` rows of `stride` bytes each.
/// `stride` may be larger than `width * bytes_per_pixel` due to
/// GPU row-alignment requirements (DXGI pads rows of staging textures).
#[derive(Debug, Clone)]
pub struct RawSurface {
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
    /// Row pitch in **bytes** (may exceed `width * bpp`).
    pub stride: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Raw pixel data, `stride * height` bytes.
    pub data: Vec<u8>,
    /// Monotonic capture timestamp.
    pub timestamp: Instant,
}

impl RawSurface {
    /// Total byte size the raw bitmap occupies.
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    /// Returns a row slice without its padding bytes.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        let end = start + self.width as usize * self.format.bytes_per_pixel();
        &self.data[start..end]
    }
}

// ── PlanarFrame ──────────────────────────────────────────────────

/// A planar YUV 4:2:0 picture (I420 plane order: Y, U, V).
///
/// Chroma planes are `ceil(width / 2) × ceil(height / 2)`. Strides are
/// per plane and may exceed the visible width when the frame came out
/// of a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanarFrame {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    /// Row pitch of the Y plane in bytes.
    pub y_stride: usize,
    /// Row pitch of the U and V planes in bytes.
    pub uv_stride: usize,
    /// Presentation timestamp, in frames.
    pub pts: u64,
}

impl PlanarFrame {
    /// Allocate a black, tightly packed frame.
    pub fn new(width: u32, height: u32) -> Self {
        let (cw, ch) = Self::chroma_dimensions(width, height);
        let luma = width as usize * height as usize;
        Self {
            width,
            height,
            y: vec![16; luma],
            u: vec![128; cw * ch],
            v: vec![128; cw * ch],
            y_stride: width as usize,
            uv_stride: cw,
            pts: 0,
        }
    }

    /// Width and height of each chroma plane.
    pub const fn chroma_dimensions(width: u32, height: u32) -> (usize, usize) {
        (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
    }

    /// Visible bytes of luma row `row`.
    pub fn y_row(&self, row: usize) -> &[u8] {
        let start = row * self.y_stride;
        &self.y[start..start + self.width as usize]
    }
}

// ── EncodedPacket ────────────────────────────────────────────────

/// One unit of compressed video output.
///
/// On the host, `frame_index` counts packets in the order the encoder
/// released them: 0 for the first, +1 for each one after, independent of
/// how many packets a single submission drains. On the client it counts
/// packets in arrival order, which is the same sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    /// Position of the packet in the session's packet sequence.
    pub frame_index: u64,
    /// Opaque compressed payload.
    pub data: Bytes,
}

impl EncodedPacket {
    pub fn new(frame_index: u64, data: impl Into<Bytes>) -> Self {
        Self {
            frame_index,
            data: data.into(),
        }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────
