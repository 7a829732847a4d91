//! Packed RGB → planar I420 conversion.
//!
//! BT.601 limited-range integer matrix:
//!
//! ```text
//! Y = (( 66 R + 129 G +  25 B + 128) >> 8) +  16
//! U = ((-38 R -  74 G + 112 B + 128) >> 8) + 128
//! V = ((112 R -  94 G -  18 B + 128) >> 8) + 128
//! ```
//!
//! Chroma is computed from the 2×2 box average of the source pixels. Odd
//! widths/heights reuse the last column/row for the missing neighbours.

use crate::error::CodecError;
use crate::video::types::{PixelFormat, PlanarFrame, RawSurface};

/// A conversion context for one `(source format, geometry)` pair.
///
/// Created once by the encoder cascade (step e) and reused for every
/// frame of the session.
#[derive(Debug, Clone)]
pub struct ColorConverter {
    format: PixelFormat,
    width: u32,
    height: u32,
}

impl ColorConverter {
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Result<Self, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::Conversion(format!(
                "invalid geometry {width}x{height}"
            )));
        }
        Ok(Self {
            format,
            width,
            height,
        })
    }

    /// Convert `surface` into `dst`, overwriting every visible sample.
    ///
    /// `dst` must have been allocated for the converter's geometry. Rows
    /// are processed top to bottom, none are skipped.
    pub fn convert(&self, surface: &RawSurface, dst: &mut PlanarFrame) -> Result<(), CodecError> {
        self.check(surface, dst)?;

        let bpp = self.format.bytes_per_pixel();
        let (ro, go, bo) = self.format.rgb_offsets();
        let width = self.width as usize;
        let height = self.height as usize;
        let stride = surface.stride as usize;

        // Luma.
        for y in 0..height {
            let src = surface.row(y as u32);
            let dst_row = &mut dst.y[y * dst.y_stride..y * dst.y_stride + width];
            for (x, out) in dst_row.iter_mut().enumerate() {
                let px = &src[x * bpp..x * bpp + bpp];
                *out = luma(px[ro], px[go], px[bo]);
            }
        }

        // Chroma, one sample per 2×2 block.
        let (cw, ch) = PlanarFrame::chroma_dimensions(self.width, self.height);
        for cy in 0..ch {
            let y0 = cy * 2;
            let y1 = (y0 + 1).min(height - 1);
            for cx in 0..cw {
                let x0 = cx * 2;
                let x1 = (x0 + 1).min(width - 1);

                let (mut r, mut g, mut b) = (0i32, 0i32, 0i32);
                for (sx, sy) in [(x0, y0), (x1, y0), (x0, y1), (x1, y1)] {
                    let off = sy * stride + sx * bpp;
                    r += surface.data[off + ro] as i32;
                    g += surface.data[off + go] as i32;
                    b += surface.data[off + bo] as i32;
                }
                let (r, g, b) = ((r + 2) / 4, (g + 2) / 4, (b + 2) / 4);

                dst.u[cy * dst.uv_stride + cx] = chroma_u(r, g, b);
                dst.v[cy * dst.uv_stride + cx] = chroma_v(r, g, b);
            }
        }

        Ok(())
    }

    fn check(&self, surface: &RawSurface, dst: &PlanarFrame) -> Result<(), CodecError> {
        if surface.format != self.format {
            return Err(CodecError::Conversion(format!(
                "surface format {:?} does not match converter format {:?}",
                surface.format, self.format
            )));
        }
        if surface.width != self.width || surface.height != self.height {
            return Err(CodecError::Conversion(format!(
                "surface is {}x{}, converter expects {}x{}",
                surface.width, surface.height, self.width, self.height
            )));
        }
        let min_stride = self.width as usize * self.format.bytes_per_pixel();
        if (surface.stride as usize) < min_stride || surface.data.len() < surface.byte_len() {
            return Err(CodecError::Conversion(format!(
                "surface buffer too small: stride {} / {} bytes",
                surface.stride,
                surface.data.len()
            )));
        }
        if dst.width != self.width || dst.height != self.height {
            return Err(CodecError::Conversion("destination frame geometry mismatch".into()));
        }
        Ok(())
    }
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

#[inline]
fn chroma_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

#[inline]
fn chroma_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

// ── Tests ────────────────────────────────────────────────────────
