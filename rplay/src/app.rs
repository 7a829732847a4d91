//! Mode entry points: wire configuration, capture, codec and transport
//! into a host or client session.

use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rplay_core::network::{accept, bind, connect};
use rplay_core::{
    CaptureSource, ClientSession, CodecError, CodecProvider, DecoderPipeline, EncoderBackend,
    EncoderPipeline, HostSession, OpenH264Decoder, OpenH264Provider, Presenter, SessionStats,
    StreamError, VideoDecoder,
};

use crate::capture::Capture;
use crate::config::RplayConfig;

// ── Host ─────────────────────────────────────────────────────────

/// Listen on the configured address and stream to the first client.
pub async fn run_host(
    config: &RplayConfig,
    port: u16,
    cancel: CancellationToken,
) -> Result<SessionStats, StreamError> {
    let ip: IpAddr = config.network.bind_address.parse().map_err(|_| {
        StreamError::Usage(format!(
            "network.bind_address is not an IP address: {:?}",
            config.network.bind_address
        ))
    })?;
    let listener = bind(SocketAddr::new(ip, port)).await?;
    serve(listener, config, &OpenH264Provider, cancel).await
}

/// Open capture and encoder, wait for one client, then run the host loop.
///
/// Returns empty stats if `cancel` fires before a client connects.
pub async fn serve<P: CodecProvider>(
    listener: TcpListener,
    config: &RplayConfig,
    provider: &P,
    cancel: CancellationToken,
) -> Result<SessionStats, StreamError> {
    let capture = Capture::open(&config.capture)?;
    let surface = capture.surface_info();
    let settings = config.encoder_settings(surface)?;
    let encoder = EncoderPipeline::open(provider, &settings)?;

    info!(
        addr = %listener.local_addr()?,
        width = surface.width,
        height = surface.height,
        backend = %encoder.backend(),
        "waiting for client"
    );
    let options = config.transport_options();
    let (transport, _peer) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(SessionStats::default()),
        res = accept(&listener, &options) => res?,
    };

    HostSession::new(capture, encoder, transport, config.host_config())
        .run(cancel)
        .await
}

// ── Client ───────────────────────────────────────────────────────

/// Connect to `ip:port` and present the stream with OpenH264.
pub async fn run_client<R: Presenter>(
    config: &RplayConfig,
    ip: IpAddr,
    port: u16,
    presenter: R,
    cancel: CancellationToken,
) -> Result<SessionStats, StreamError> {
    let decoder = OpenH264Decoder::new().map_err(StreamError::DecodeFailed)?;
    watch(SocketAddr::new(ip, port), config, decoder, presenter, cancel).await
}

pub async fn watch<D: VideoDecoder, R: Presenter>(
    addr: SocketAddr,
    config: &RplayConfig,
    decoder: D,
    presenter: R,
    cancel: CancellationToken,
) -> Result<SessionStats, StreamError> {
    let transport = connect(addr, &config.transport_options()).await?;
    ClientSession::new(
        DecoderPipeline::new(decoder),
        presenter,
        transport,
        config.client_config(),
    )
    .run(cancel)
    .await
}

// ── Encoders ─────────────────────────────────────────────────────

/// Resolve every backend in preference order.
pub fn encoder_report<P: CodecProvider>(provider: &P) -> Vec<(EncoderBackend, Result<(), CodecError>)> {
    EncoderBackend::PREFERENCE
        .iter()
        .map(|&backend| (backend, provider.resolve(backend)))
        .collect()
}

/// Backend availability for the built-in provider.
pub fn list_encoders() -> Vec<(EncoderBackend, Result<(), CodecError>)> {
    encoder_report(&OpenH264Provider)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rplay_core::video::sim::{SimDecoder, SimProvider};
    use rplay_core::PlanarFrame;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn pattern_config() -> RplayConfig {
        let mut config = RplayConfig::default();
        config.capture.source = "test-pattern".into();
        config.capture.pattern_width = 64;
        config.capture.pattern_height = 48;
        config.encoder.fps = 200;
        config
    }

    #[derive(Clone, Default)]
    struct Counting {
        shown: Arc<Mutex<Vec<(u32, u32)>>>,
        stop_after: usize,
    }

    impl Presenter for Counting {
        fn present_surface(&mut self, frame: &PlanarFrame) -> Result<(), StreamError> {
            self.shown.lock().unwrap().push((frame.width, frame.height));
            Ok(())
        }

        fn poll_shutdown_requested(&mut self) -> bool {
            self.shown.lock().unwrap().len() >= self.stop_after
        }
    }

    #[tokio::test]
    async fn host_and_client_share_a_stream() {
        let config = pattern_config();
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();

        let presenter = Counting {
            stop_after: 5,
            ..Counting::default()
        };
        let shown = Arc::clone(&presenter.shown);

        let provider = SimProvider::with_backends(&[EncoderBackend::Software]);
        let host = serve(listener, &config, &provider, cancel.clone());
        let client = watch(addr, &config, SimDecoder::new(), presenter, cancel.clone());

        let (host, client) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(host, client)
        })
        .await
        .expect("timeout");

        // The presenter closing cancels the shared token, which stops the host.
        let client = client.unwrap();
        assert_eq!(client.frames_presented, 5);
        assert!(host.unwrap().frames_captured >= 5);
        assert!(shown.lock().unwrap().iter().all(|&g| g == (64, 48)));
    }

    #[tokio::test]
    async fn cancel_before_client_connects() {
        let config = pattern_config();
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let provider = SimProvider::with_backends(&[EncoderBackend::Software]);
        let stats = serve(listener, &config, &provider, cancel).await.unwrap();
        assert_eq!(stats.frames_captured, 0);
    }

    #[tokio::test]
    async fn serve_fails_without_encoders() {
        let config = pattern_config();
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let err = serve(listener, &config, &SimProvider::empty(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::EncoderUnavailable { .. }));
    }

    #[tokio::test]
    async fn bad_bind_address_is_usage_error() {
        let mut config = pattern_config();
        config.network.bind_address = "not-an-ip".into();
        let err = run_host(&config, 0, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, StreamError::Usage(_)));
    }

    #[test]
    fn report_covers_every_backend_in_order() {
        let provider = SimProvider::with_backends(&[EncoderBackend::Qsv]);
        let report = encoder_report(&provider);
        let order: Vec<_> = report.iter().map(|(b, _)| *b).collect();
        assert_eq!(order, EncoderBackend::PREFERENCE.to_vec());
        let available: Vec<_> = report
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(b, _)| *b)
            .collect();
        assert_eq!(available, vec![EncoderBackend::Qsv]);
    }

    #[test]
    fn built_in_provider_offers_software() {
        let report = list_encoders();
        assert!(
            report
                .iter()
                .any(|(b, r)| *b == EncoderBackend::Software && r.is_ok())
        );
    }
}
