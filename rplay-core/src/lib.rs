//! # rplay-core
//!
//! Frame transport pipeline for streaming a captured display from a host
//! to a single client over TCP.
//!
//! This crate contains:
//! - **Video**: surface/frame/packet types, RGB → I420 conversion, the
//!   encoder backend cascade and the decoder pipeline
//! - **Codec**: `WireCodec`, the 4-byte big-endian length framing, for
//!   `tokio_util`
//! - **Network**: `FrameTransport` over any async byte stream plus TCP
//!   connect/accept helpers
//! - **Session**: the host (capture → encode → send) and client
//!   (receive → decode → present) loops
//! - **Error**: `StreamError` / `CodecError` / `CaptureError`, typed,
//!   `thiserror`-based

pub mod codec;
pub mod error;
pub mod network;
pub mod session;
pub mod video;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{DEFAULT_MAX_PAYLOAD, LENGTH_PREFIX, WireCodec};
pub use error::{CaptureError, CodecError, StreamError};
pub use network::{FrameTransport, ThroughputMeter, TransportOptions};
pub use session::{
    CaptureSource, ClientConfig, ClientSession, HostConfig, HostSession, Presenter, SessionStats,
    SurfaceInfo,
};
pub use video::{
    CodecProvider, ColorConverter, DecoderPipeline, EncodedPacket, EncoderBackend,
    EncoderPipeline, EncoderSettings, PixelFormat, PlanarFrame, RawSurface, VideoDecoder,
    VideoEncoder,
};

#[cfg(feature = "h264")]
pub use video::{OpenH264Decoder, OpenH264Encoder, OpenH264Provider};
