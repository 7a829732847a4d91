//! H.264 encoder pipeline with backend fallback.
//!
//! [`EncoderPipeline::open`] walks the candidate backends in preference
//! order and adopts the first one for which every setup step succeeds:
//!
//! 1. resolve the encoder implementation,
//! 2. allocate a context with the requested geometry and rate control,
//! 3. apply backend tuning,
//! 4. open the context,
//! 5. build the RGB → I420 converter.
//!
//! A candidate that fails any step is dropped (releasing whatever it
//! allocated) before the next one is tried. The chosen backend is fixed
//! for the lifetime of the pipeline.

use tracing::{debug, info, trace, warn};

use crate::error::{CodecError, StreamError};
use crate::video::backend::{CodecProvider, EncoderBackend, EncoderSettings, VideoEncoder};
use crate::video::convert::ColorConverter;
use crate::video::types::{EncodedPacket, PlanarFrame, RawSurface};

// ── EncoderPipeline ──────────────────────────────────────────────

/// Converts captured surfaces into compressed packets.
pub struct EncoderPipeline<E: VideoEncoder> {
    backend: EncoderBackend,
    encoder: E,
    converter: ColorConverter,
    /// Reused I420 buffer, overwritten on every frame.
    frame: PlanarFrame,
    frame_count: u64,
    /// Index the next drained packet gets.
    next_index: u64,
}

impl<E: VideoEncoder> EncoderPipeline<E> {
    /// Run the backend cascade and return a ready pipeline.
    ///
    /// Candidates come from `settings.backends`, visited in the fixed
    /// [`EncoderBackend::PREFERENCE`] order regardless of how the list
    /// was written. Fails with [`StreamError::EncoderUnavailable`] listing
    /// every attempt when no candidate survives.
    pub fn open<P>(provider: &P, settings: &EncoderSettings) -> Result<Self, StreamError>
    where
        P: CodecProvider<Encoder = E>,
    {
        let mut attempts = Vec::new();

        for backend in candidates(&settings.backends) {
            match try_backend(provider, backend, settings) {
                Ok((encoder, converter)) => {
                    info!(
                        %backend,
                        encoder = backend.encoder_name(),
                        width = settings.width,
                        height = settings.height,
                        fps = settings.fps,
                        bitrate = settings.bitrate,
                        "encoder opened"
                    );
                    return Ok(Self {
                        backend,
                        encoder,
                        converter,
                        frame: PlanarFrame::new(settings.width, settings.height),
                        frame_count: 0,
                        next_index: 0,
                    });
                }
                Err(e) => {
                    debug!(%backend, error = %e, "encoder candidate rejected");
                    attempts.push((backend, e));
                }
            }
        }

        warn!(tried = attempts.len(), "no usable encoder backend");
        Err(StreamError::EncoderUnavailable { attempts })
    }

    /// Encode one surface and return every packet the backend released.
    ///
    /// The result may be empty (the backend is buffering) or hold packets
    /// for earlier submissions. The frame counter advances by exactly one
    /// per accepted surface. Packets are indexed in emission order across
    /// the whole session, however they are spread over the drains.
    pub fn encode(&mut self, surface: &RawSurface) -> Result<Vec<EncodedPacket>, StreamError> {
        self.converter
            .convert(surface, &mut self.frame)
            .map_err(StreamError::EncodeFailed)?;

        let pts = self.frame_count;
        self.frame.pts = pts;
        self.encoder
            .send_frame(&self.frame)
            .map_err(StreamError::EncodeFailed)?;
        self.frame_count += 1;

        let mut packets = Vec::new();
        while let Some(data) = self
            .encoder
            .receive_packet()
            .map_err(StreamError::EncodeFailed)?
        {
            packets.push(EncodedPacket::new(self.next_index, data));
            self.next_index += 1;
        }

        trace!(pts, packets = packets.len(), "frame encoded");
        Ok(packets)
    }

    /// The backend the cascade settled on.
    pub fn backend(&self) -> EncoderBackend {
        self.backend
    }

    /// Number of surfaces submitted so far (also the next pts).
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Number of packets released so far (also the next packet index).
    pub fn packets_emitted(&self) -> u64 {
        self.next_index
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }
}

/// Requested backends in preference order, each at most once.
fn candidates(requested: &[EncoderBackend]) -> impl Iterator<Item = EncoderBackend> + '_ {
    EncoderBackend::PREFERENCE
        .into_iter()
        .filter(move |b| requested.contains(b))
}

fn try_backend<P: CodecProvider>(
    provider: &P,
    backend: EncoderBackend,
    settings: &EncoderSettings,
) -> Result<(P::Encoder, ColorConverter), CodecError> {
    provider.resolve(backend)?;

    let mut encoder = provider.allocate(backend, settings)?;
    for &(key, value) in backend.tuning() {
        encoder.set_option(key, value)?;
    }
    encoder.open()?;

    let converter = ColorConverter::new(settings.input_format, settings.width, settings.height)?;
    Ok((encoder, converter))
}

// ── Tests ────────────────────────────────────────────────────────
