//! Frame transport: the [`WireCodec`](crate::codec::WireCodec) applied to
//! a byte stream, plus TCP connect/accept helpers and a throughput meter.

pub mod throughput;
pub mod transport;

pub use throughput::ThroughputMeter;
pub use transport::{FrameTransport, TransportOptions, accept, bind, connect};
