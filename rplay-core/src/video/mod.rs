//! # Video pipeline
//!
//! ```text
//! HOST                                        CLIENT
//! ┌─────────────────────────┐                ┌──────────────────────┐
//! │ CaptureSource           │                │ FrameTransport::recv │
//! │   ↓ RawSurface          │                │   ↓ EncodedPacket    │
//! │ ColorConverter (I420)   │      TCP       │ DecoderPipeline      │
//! │   ↓                     │ ──────────►    │   ↓ PlanarFrame      │
//! │ EncoderPipeline         │                │ Presenter            │
//! │   ↓ EncodedPacket       │                │                      │
//! │ FrameTransport::send    │                │                      │
//! └─────────────────────────┘                └──────────────────────┘
//! ```
//!
//! ## Sub-modules
//!
//! | Module     | Purpose                                              |
//! |------------|------------------------------------------------------|
//! | `types`    | Surfaces, planar frames, packets                     |
//! | `convert`  | Packed RGB → I420 conversion                         |
//! | `backend`  | Backend enum, settings, codec traits                 |
//! | `encoder`  | Backend cascade + per-frame encode                   |
//! | `decoder`  | Per-packet decode                                    |
//! | `openh264` | OpenH264 provider (`h264` feature)                   |
//! | `sim`      | Deterministic codec for tests and loopback runs      |

pub mod backend;
pub mod convert;
pub mod decoder;
pub mod encoder;
#[cfg(feature = "h264")]
pub mod openh264;
pub mod sim;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use backend::{CodecProvider, EncoderBackend, EncoderSettings, VideoDecoder, VideoEncoder};
pub use convert::ColorConverter;
pub use decoder::DecoderPipeline;
pub use encoder::EncoderPipeline;
#[cfg(feature = "h264")]
pub use self::openh264::{OpenH264Decoder, OpenH264Encoder, OpenH264Provider};
pub use sim::{SimDecoder, SimEncoder, SimProvider};
pub use types::{EncodedPacket, PixelFormat, PlanarFrame, RawSurface};
