//! Integration tests: host and client sessions talking over a real TCP
//! connection on localhost.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rplay_core::video::sim::{SIM_PACKET_LEN, SimDecoder, SimProvider, parse_sim_packet};
use rplay_core::{
    CaptureError, CaptureSource, ClientConfig, ClientSession, DecoderPipeline, EncodedPacket,
    EncoderBackend, EncoderPipeline, EncoderSettings, HostConfig, HostSession,
    PixelFormat, PlanarFrame, Presenter, RawSurface, StreamError, SurfaceInfo, TransportOptions,
};
use rplay_core::network::{accept, bind, connect};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

// ── Helpers ──────────────────────────────────────────────────────

async fn ephemeral_listener() -> (TcpListener, SocketAddr) {
    let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Yields `remaining` gradient surfaces, then cancels the host.
struct FiniteCapture {
    width: u32,
    height: u32,
    remaining: u32,
    done: CancellationToken,
}

impl CaptureSource for FiniteCapture {
    fn surface_info(&self) -> SurfaceInfo {
        SurfaceInfo {
            width: self.width,
            height: self.height,
            format: PixelFormat::Bgra8,
        }
    }

    fn acquire_next_surface(&mut self, timeout: Duration) -> Result<RawSurface, CaptureError> {
        if self.remaining == 0 {
            self.done.cancel();
            return Err(CaptureError::Timeout(timeout));
        }
        self.remaining -= 1;

        let stride = self.width * 4;
        let mut data = vec![0u8; (stride * self.height) as usize];
        for (i, px) in data.chunks_exact_mut(4).enumerate() {
            let x = (i as u32 % self.width) as u8;
            px.copy_from_slice(&[x, x.wrapping_add((self.remaining as u8).wrapping_mul(40)), 0x20, 0xFF]);
        }
        Ok(RawSurface {
            width: self.width,
            height: self.height,
            stride,
            format: PixelFormat::Bgra8,
            data,
            timestamp: Instant::now(),
        })
    }
}

#[derive(Default)]
struct Collect {
    frames: Arc<Mutex<Vec<(u64, u32, u32)>>>,
}

impl Presenter for Collect {
    fn present_surface(&mut self, frame: &PlanarFrame) -> Result<(), StreamError> {
        self.frames
            .lock()
            .unwrap()
            .push((frame.pts, frame.width, frame.height));
        Ok(())
    }

    fn poll_shutdown_requested(&mut self) -> bool {
        false
    }
}

fn fast_host() -> HostConfig {
    HostConfig {
        frame_interval: Duration::from_millis(1),
        capture_timeout: Duration::from_millis(1),
        stats_interval: Duration::from_secs(60),
    }
}

// ── Scenario ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_three_surfaces_become_three_messages() {
    let (listener, addr) = ephemeral_listener().await;
    let options = TransportOptions::default();

    let host = tokio::spawn({
        let options = options.clone();
        async move {
            let (transport, _) = accept(&listener, &options).await.unwrap();
            let cancel = CancellationToken::new();
            let capture = FiniteCapture {
                width: 1280,
                height: 720,
                remaining: 3,
                done: cancel.clone(),
            };
            let provider = SimProvider::with_backends(&[EncoderBackend::Software]);
            let encoder =
                EncoderPipeline::open(&provider, &EncoderSettings::new(1280, 720)).unwrap();
            HostSession::new(capture, encoder, transport, fast_host())
                .run(cancel)
                .await
                .unwrap()
        }
    });

    let mut client = connect(addr, &options).await.unwrap();
    let mut received = Vec::new();
    for _ in 0..3 {
        let packet = tokio::time::timeout(Duration::from_secs(5), client.receive())
            .await
            .expect("timeout")
            .unwrap();
        received.push(packet);
    }

    let stats = host.await.unwrap();
    assert_eq!(stats.frames_captured, 3);
    assert_eq!(stats.packets, 3);
    assert_eq!(stats.bytes, 3 * SIM_PACKET_LEN as u64);

    let indices: Vec<u64> = received.iter().map(|p| p.frame_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    for (pts, packet) in received.iter().enumerate() {
        assert_eq!(packet.len(), SIM_PACKET_LEN);
        assert_eq!(parse_sim_packet(&packet.data), Some((pts as u64, 1280, 720)));
    }

    // Host finished and closed its socket.
    assert!(client.receive().await.unwrap_err().is_connection_lost());
}

#[tokio::test]
async fn test_burst_encoder_keeps_packet_order() {
    let (listener, addr) = ephemeral_listener().await;
    let options = TransportOptions::default();

    let host = tokio::spawn({
        let options = options.clone();
        async move {
            let (transport, _) = accept(&listener, &options).await.unwrap();
            let cancel = CancellationToken::new();
            let capture = FiniteCapture {
                width: 320,
                height: 240,
                remaining: 6,
                done: cancel.clone(),
            };
            // Two packets per release, none on the submissions in between.
            let provider = SimProvider::with_backends(&[EncoderBackend::Software]).with_burst(2);
            let encoder =
                EncoderPipeline::open(&provider, &EncoderSettings::new(320, 240)).unwrap();
            HostSession::new(capture, encoder, transport, fast_host())
                .run(cancel)
                .await
                .unwrap()
        }
    });

    let mut client = connect(addr, &options).await.unwrap();
    let mut received = Vec::new();
    for _ in 0..6 {
        let packet = tokio::time::timeout(Duration::from_secs(5), client.receive())
            .await
            .expect("timeout")
            .unwrap();
        received.push(packet);
    }

    let stats = host.await.unwrap();
    assert_eq!(stats.frames_captured, 6);
    assert_eq!(stats.packets, 6);

    let indices: Vec<u64> = received.iter().map(|p| p.frame_index).collect();
    assert_eq!(indices, (0..6).collect::<Vec<_>>());
    let pts: Vec<u64> = received
        .iter()
        .map(|p| parse_sim_packet(&p.data).unwrap().0)
        .collect();
    assert_eq!(pts, (0..6).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_host_to_client_session() {
    let (listener, addr) = ephemeral_listener().await;
    let options = TransportOptions::default();

    let host = tokio::spawn({
        let options = options.clone();
        async move {
            let (transport, _) = accept(&listener, &options).await.unwrap();
            let cancel = CancellationToken::new();
            let capture = FiniteCapture {
                width: 64,
                height: 48,
                remaining: 10,
                done: cancel.clone(),
            };
            let provider = SimProvider::with_backends(&[EncoderBackend::Software]).with_delay(1);
            let encoder = EncoderPipeline::open(&provider, &EncoderSettings::new(64, 48)).unwrap();
            HostSession::new(capture, encoder, transport, fast_host())
                .run(cancel)
                .await
                .unwrap()
        }
    });

    let presenter = Collect::default();
    let frames = Arc::clone(&presenter.frames);
    let transport = connect(addr, &options).await.unwrap();
    let client = ClientSession::new(
        DecoderPipeline::new(SimDecoder::new()),
        presenter,
        transport,
        ClientConfig::default(),
    );

    let err = tokio::time::timeout(Duration::from_secs(5), client.run(CancellationToken::new()))
        .await
        .expect("timeout")
        .unwrap_err();
    assert!(err.is_connection_lost());

    let host_stats = host.await.unwrap();
    // One submission is still buffered in the encoder when the host stops.
    assert_eq!(host_stats.packets, 9);

    let frames = frames.lock().unwrap();
    let pts: Vec<u64> = frames.iter().map(|f| f.0).collect();
    assert_eq!(pts, (0..9).collect::<Vec<_>>());
    assert!(frames.iter().all(|&(_, w, h)| (w, h) == (64, 48)));
}

#[cfg(feature = "h264")]
#[tokio::test]
async fn test_openh264_end_to_end() {
    use rplay_core::{OpenH264Decoder, OpenH264Provider};

    // Both sides run on this task: the OpenH264 contexts stay on one thread.
    let (listener, addr) = ephemeral_listener().await;
    let options = TransportOptions::default();

    let host = async {
        let (transport, _) = accept(&listener, &options).await.unwrap();
        let cancel = CancellationToken::new();
        let capture = FiniteCapture {
            width: 320,
            height: 240,
            remaining: 3,
            done: cancel.clone(),
        };
        let encoder =
            EncoderPipeline::open(&OpenH264Provider, &EncoderSettings::new(320, 240)).unwrap();
        assert_eq!(encoder.backend(), EncoderBackend::Software);
        HostSession::new(capture, encoder, transport, fast_host())
            .run(cancel)
            .await
            .unwrap()
    };

    let presenter = Collect::default();
    let frames = Arc::clone(&presenter.frames);
    let client = async {
        let transport = connect(addr, &options).await.unwrap();
        ClientSession::new(
            DecoderPipeline::new(OpenH264Decoder::new().unwrap()),
            presenter,
            transport,
            ClientConfig::default(),
        )
        .run(CancellationToken::new())
        .await
    };

    let (host_stats, client_result) =
        tokio::time::timeout(Duration::from_secs(30), async { tokio::join!(host, client) })
            .await
            .expect("timeout");
    assert!(host_stats.packets > 0);
    assert!(client_result.unwrap_err().is_connection_lost());

    let frames = frames.lock().unwrap();
    assert!(!frames.is_empty());
    assert!(frames.iter().all(|&(_, w, h)| (w, h) == (320, 240)));
}

// ── Framing over TCP ─────────────────────────────────────────────

#[tokio::test]
async fn test_large_and_empty_payloads() {
    let (listener, addr) = ephemeral_listener().await;
    let options = TransportOptions::default();

    let big: Vec<u8> = (0..8 * 1024 * 1024).map(|i| (i % 253) as u8).collect();
    let expected = big.clone();

    let sender = tokio::spawn({
        let options = options.clone();
        async move {
            let (mut transport, _) = accept(&listener, &options).await.unwrap();
            transport.send(EncodedPacket::new(0, Vec::new())).await.unwrap();
            transport.send(EncodedPacket::new(1, big)).await.unwrap();
            transport.send(EncodedPacket::new(2, Vec::new())).await.unwrap();
        }
    });

    let mut client = connect(addr, &options).await.unwrap();
    assert!(client.receive().await.unwrap().is_empty());
    let packet = client.receive().await.unwrap();
    assert_eq!(packet.len(), expected.len());
    assert_eq!(&packet.data[..], &expected[..]);
    assert!(client.receive().await.unwrap().is_empty());

    sender.await.unwrap();
}

#[tokio::test]
async fn test_connection_drop_detected() {
    let (listener, addr) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let transport = connect(addr, &TransportOptions::default()).await.unwrap();
    server.await.unwrap();

    let client = ClientSession::new(
        DecoderPipeline::new(SimDecoder::new()),
        Collect::default(),
        transport,
        ClientConfig::default(),
    );
    let err = client.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, StreamError::ConnectionLost(_)));
}

#[tokio::test]
async fn test_oversized_message_rejected_by_receiver() {
    let (listener, addr) = ephemeral_listener().await;

    let sender = tokio::spawn(async move {
        let (mut transport, _) = accept(&listener, &TransportOptions::default()).await.unwrap();
        transport.send(EncodedPacket::new(0, vec![0u8; 2048])).await.unwrap();
        // Keep the socket open until the receiver has judged the prefix.
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let small = TransportOptions {
        max_payload: 1024,
        ..TransportOptions::default()
    };
    let mut client = connect(addr, &small).await.unwrap();
    let err = client.receive().await.unwrap_err();
    assert!(matches!(err, StreamError::PayloadTooLarge { size: 2048, max: 1024 }));

    sender.await.unwrap();
}

#[test]
fn test_encoder_unavailable_without_backends() {
    let provider = SimProvider::empty();
    let err = EncoderPipeline::open(&provider, &EncoderSettings::new(1280, 720))
        .err()
        .unwrap();
    assert!(matches!(err, StreamError::EncoderUnavailable { ref attempts } if attempts.len() == 4));
    assert_eq!(provider.live_contexts(), 0);
}
