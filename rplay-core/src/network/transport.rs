use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info};

use crate::codec::{DEFAULT_MAX_PAYLOAD, WireCodec};
use crate::error::StreamError;
use crate::video::types::EncodedPacket;

// ── TransportOptions ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Bound on a single send and on connect. `None` waits forever.
    pub io_timeout: Option<Duration>,
    /// Largest payload accepted or emitted.
    pub max_payload: usize,
    /// Disable Nagle's algorithm on TCP sockets.
    pub nodelay: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            io_timeout: Some(Duration::from_secs(5)),
            max_payload: DEFAULT_MAX_PAYLOAD,
            nodelay: true,
        }
    }
}

// ── FrameTransport ───────────────────────────────────────────────

/// Framed packet stream over any byte stream.
///
/// `send` writes the whole message before returning; short writes are
/// retried by the underlying `Framed` flush. `receive` yields a packet
/// only once its full declared length has arrived. Any failure, a clean
/// EOF included, is reported as an error and the transport should be
/// dropped.
pub struct FrameTransport<S> {
    framed: Framed<S, WireCodec>,
    io_timeout: Option<Duration>,
    bytes_sent: u64,
    bytes_received: u64,
}

impl<S> FrameTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, options: &TransportOptions) -> Self {
        Self {
            framed: Framed::new(stream, WireCodec::new(options.max_payload)),
            io_timeout: options.io_timeout,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Write one packet as a length-prefixed message and flush it.
    pub async fn send(&mut self, packet: EncodedPacket) -> Result<(), StreamError> {
        let len = packet.len() as u64;
        let send = self.framed.send(packet);

        match self.io_timeout {
            Some(limit) => tokio::time::timeout(limit, send).await.map_err(|_| {
                StreamError::ConnectionLost(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("send did not complete within {limit:?}"),
                ))
            })??,
            None => send.await?,
        }

        self.bytes_sent += len;
        Ok(())
    }

    /// Wait for the next complete packet.
    ///
    /// Not bounded by the I/O timeout: an idle desktop can go quiet for
    /// long stretches. Cancel-safe.
    pub async fn receive(&mut self) -> Result<EncodedPacket, StreamError> {
        match self.framed.next().await {
            Some(Ok(packet)) => {
                self.bytes_received += packet.len() as u64;
                Ok(packet)
            }
            Some(Err(e)) => Err(e),
            None => Err(StreamError::ConnectionLost(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            ))),
        }
    }

    /// Payload bytes written so far (prefixes excluded).
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Payload bytes read so far (prefixes excluded).
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}

// ── TCP helpers ──────────────────────────────────────────────────

/// Connect to a host, bounded by the I/O timeout.
pub async fn connect(
    addr: SocketAddr,
    options: &TransportOptions,
) -> Result<FrameTransport<TcpStream>, StreamError> {
    let stream = match options.io_timeout {
        Some(limit) => tokio::time::timeout(limit, TcpStream::connect(addr))
            .await
            .map_err(|_| StreamError::Timeout(limit))??,
        None => TcpStream::connect(addr).await?,
    };
    configure(&stream, options)?;

    info!(%addr, nodelay = options.nodelay, "connected to host");
    Ok(FrameTransport::new(stream, options))
}

/// Apply socket options to a freshly connected stream.
fn configure(stream: &TcpStream, options: &TransportOptions) -> Result<(), StreamError> {
    stream.set_nodelay(options.nodelay)?;
    Ok(())
}

/// Bind the listening socket for a host session.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, StreamError> {
    let listener = TcpListener::bind(addr).await?;
    debug!(addr = %listener.local_addr()?, "listening");
    Ok(listener)
}

/// Accept exactly one client.
pub async fn accept(
    listener: &TcpListener,
    options: &TransportOptions,
) -> Result<(FrameTransport<TcpStream>, SocketAddr), StreamError> {
    let (stream, peer) = listener.accept().await?;
    configure(&stream, options)?;

    info!(%peer, "client connected");
    Ok((FrameTransport::new(stream, options), peer))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn opts() -> TransportOptions {
        TransportOptions::default()
    }

    #[tokio::test]
    async fn receive_reassembles_one_byte_reads() {
        let mock = Builder::new()
            .read(&[0x00])
            .read(&[0x00])
            .read(&[0x00])
            .read(&[0x03])
            .read(b"a")
            .read(b"b")
            .read(b"c")
            .build();
        let mut transport = FrameTransport::new(mock, &opts());

        let packet = transport.receive().await.unwrap();
        assert_eq!(&packet.data[..], b"abc");
        assert_eq!(transport.bytes_received(), 3);

        // The mock is exhausted: clean EOF between frames.
        let err = transport.receive().await.unwrap_err();
        assert!(matches!(err, StreamError::ConnectionLost(_)));
    }

    #[tokio::test]
    async fn send_survives_one_byte_writes() {
        let mock = Builder::new()
            .write(&[0x00])
            .write(&[0x00])
            .write(&[0x00])
            .write(&[0x02])
            .write(b"h")
            .write(b"i")
            .build();
        let mut transport = FrameTransport::new(mock, &opts());

        transport.send(EncodedPacket::new(0, &b"hi"[..])).await.unwrap();
        assert_eq!(transport.bytes_sent(), 2);
    }

    #[tokio::test]
    async fn eof_mid_payload_is_connection_lost() {
        let mock = Builder::new().read(&[0, 0, 0, 10]).read(b"short").build();
        let mut transport = FrameTransport::new(mock, &opts());

        let err = transport.receive().await.unwrap_err();
        assert!(err.is_connection_lost(), "{err}");
    }

    #[tokio::test]
    async fn read_error_is_connection_lost() {
        let mock = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut transport = FrameTransport::new(mock, &opts());

        let err = transport.receive().await.unwrap_err();
        assert!(matches!(err, StreamError::ConnectionLost(ref e) if e.kind() == io::ErrorKind::ConnectionReset));
    }

    #[tokio::test]
    async fn write_error_is_connection_lost() {
        let mock = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let mut transport = FrameTransport::new(mock, &opts());

        let err = transport.send(EncodedPacket::new(0, vec![1, 2, 3])).await.unwrap_err();
        assert!(matches!(err, StreamError::ConnectionLost(_)));
    }

    #[tokio::test]
    async fn oversized_declared_length_is_rejected() {
        let mock = Builder::new().read(&[0xFF, 0xFF, 0xFF, 0xFF]).build();
        let options = TransportOptions {
            max_payload: 1024,
            ..opts()
        };
        let mut transport = FrameTransport::new(mock, &options);

        let err = transport.receive().await.unwrap_err();
        assert!(matches!(err, StreamError::PayloadTooLarge { max: 1024, .. }));
    }

    #[tokio::test]
    async fn stalled_send_times_out() {
        // Nobody reads the other half, so the 64-byte pipe fills up.
        let (near, _far) = tokio::io::duplex(64);
        let options = TransportOptions {
            io_timeout: Some(Duration::from_millis(50)),
            ..opts()
        };
        let mut transport = FrameTransport::new(near, &options);

        let err = transport
            .send(EncodedPacket::new(0, vec![0u8; 4096]))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::ConnectionLost(ref e) if e.kind() == io::ErrorKind::TimedOut));
    }

    #[tokio::test]
    async fn tcp_roundtrip_over_localhost() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut transport, _) = accept(&listener, &TransportOptions::default())
                .await
                .unwrap();
            transport.send(EncodedPacket::new(0, vec![7u8; 1000])).await.unwrap();
            transport.send(EncodedPacket::new(1, Vec::new())).await.unwrap();
        });

        let mut client = connect(addr, &TransportOptions::default()).await.unwrap();
        assert_eq!(client.receive().await.unwrap().len(), 1000);
        assert_eq!(client.receive().await.unwrap().len(), 0);
        server.await.unwrap();
        assert!(client.receive().await.unwrap_err().is_connection_lost());
    }

    #[tokio::test]
    async fn nodelay_follows_options() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        for nodelay in [true, false] {
            let stream = TcpStream::connect(addr).await.unwrap();
            let options = TransportOptions {
                nodelay,
                ..opts()
            };
            configure(&stream, &options).unwrap();
            assert_eq!(stream.nodelay().unwrap(), nodelay);
        }
    }
}
