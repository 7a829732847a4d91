//! Wire codec for the packet stream.
//!
//! Every message is a 4-byte big-endian payload length followed by
//! exactly that many payload bytes:
//!
//! ```text
//! ┌──────────────┬────────────────────────┐
//! │ len: u32 BE  │ payload (len bytes)    │
//! └──────────────┴────────────────────────┘
//! ```
//!
//! There is no magic, version, type tag or checksum. Both directions
//! enforce the same payload cap; the cap never changes the bytes on the
//! wire.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::StreamError;
use crate::video::types::EncodedPacket;

/// Size of the length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// Default payload cap (64 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Length-prefixed framing for [`EncodedPacket`]s.
///
/// On the receive side packets are numbered in arrival order, since the
/// wire does not carry the sender's frame index.
#[derive(Debug, Clone)]
pub struct WireCodec {
    max_payload: usize,
    received: u64,
}

impl WireCodec {
    pub fn new(max_payload: usize) -> Self {
        Self {
            // The prefix cannot describe anything larger.
            max_payload: max_payload.min(u32::MAX as usize),
            received: 0,
        }
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl Decoder for WireCodec {
    type Item = EncodedPacket;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len > self.max_payload {
            return Err(StreamError::PayloadTooLarge {
                size: len,
                max: self.max_payload,
            });
        }

        let total = LENGTH_PREFIX + len;
        if src.len() < total {
            // Wait for the rest; make room for it in one go.
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let payload = src.split_to(len).freeze();

        let index = self.received;
        self.received += 1;
        Ok(Some(EncodedPacket::new(index, payload)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(packet) => Ok(Some(packet)),
            None if src.is_empty() => Ok(None),
            None => Err(StreamError::ConnectionLost(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream closed inside a frame ({} bytes buffered)", src.len()),
            ))),
        }
    }
}

impl Encoder<EncodedPacket> for WireCodec {
    type Error = StreamError;

    fn encode(&mut self, item: EncodedPacket, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.len();
        if len > self.max_payload {
            return Err(StreamError::PayloadTooLarge {
                size: len,
                max: self.max_payload,
            });
        }

        dst.reserve(LENGTH_PREFIX + len);
        dst.put_u32(len as u32);
        dst.extend_from_slice(&item.data);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
