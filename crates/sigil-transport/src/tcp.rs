// ============================================
// File: crates/sigil-transport/src/tcp.rs
// ============================================
//! # TCP Channel
//!
//! ## Creation Reason
//! Direct socket backend for `tcp://host:port` addresses, and the
//! server-side wrapper used by the local verifier.
//!
//! ## Main Functionality
//! - Connect with timeout
//! - Keepalive and `TCP_NODELAY` via `socket2`
//! - Length-prefixed frames (see [`crate::frame`])
//! - Per-operation I/O timeout
//!
//! ## ⚠️ Important Note for Next Developer
//! - The socket is owned by the channel and released on drop, so every
//!   exit path of a protocol run closes it
//!
//! ## Last Modified
//! v0.1.0 - Initial TCP channel

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::frame::{read_frame, write_frame};
use crate::traits::{Channel, ChannelOptions};

/// Idle time before TCP keepalive probes start.
const KEEPALIVE_IDLE: Duration = Duration::from_secs(30);

/// Framed TCP connection.
pub struct TcpChannel {
    stream: TcpStream,
    peer: SocketAddr,
    options: ChannelOptions,
    closed: bool,
}

impl TcpChannel {
    /// Connects to `host:port`.
    ///
    /// # Errors
    /// `Timeout` if the connect timeout elapses, `ConnectFailed` otherwise.
    pub async fn connect(host: &str, port: u16, options: ChannelOptions) -> Result<Self> {
        options.validate()?;
        let target = format!("{host}:{port}");
        debug!(endpoint = %target, "Connecting TCP channel");

        let stream = timeout(options.connect_timeout, TcpStream::connect(&target))
            .await
            .map_err(|_| TransportError::timeout(format!("connect {target}")))?
            .map_err(|e| TransportError::connect_failed(&target, e.to_string()))?;

        Self::from_stream(stream, options)
    }

    /// Wraps an accepted stream.
    ///
    /// # Errors
    /// Fails only if the peer address cannot be read.
    pub fn from_stream(stream: TcpStream, options: ChannelOptions) -> Result<Self> {
        let peer = stream
            .peer_addr()
            .map_err(|e| TransportError::io("read peer address", e))?;

        if let Err(e) = configure_socket(&stream) {
            warn!(peer = %peer, error = %e, "Failed to tune TCP socket");
        }

        Ok(Self {
            stream,
            peer,
            options,
            closed: false,
        })
    }

    /// Remote address.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

fn configure_socket(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let sock = SockRef::from(stream);
    sock.set_tcp_keepalive(&TcpKeepalive::new().with_time(KEEPALIVE_IDLE))?;
    Ok(())
}

#[async_trait]
impl Channel for TcpChannel {
    async fn send(&mut self, message: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        timeout(
            self.options.io_timeout,
            write_frame(&mut self.stream, message, self.options.max_frame_size),
        )
        .await
        .map_err(|_| TransportError::timeout("tcp send"))?
    }

    async fn recv(&mut self) -> Result<Vec<u8>> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        timeout(
            self.options.io_timeout,
            read_frame(&mut self.stream, self.options.max_frame_size),
        )
        .await
        .map_err(|_| TransportError::timeout("tcp recv"))?
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!(peer = %self.peer, "Closing TCP channel");
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::io("tcp shutdown", e)),
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut channel = TcpChannel::from_stream(stream, ChannelOptions::default()).unwrap();
            let msg = channel.recv().await.unwrap();
            channel.send(&msg).await.unwrap();
            channel.close().await.unwrap();
        });

        let mut client = TcpChannel::connect("127.0.0.1", port, ChannelOptions::default())
            .await
            .unwrap();
        assert!(client.describe().starts_with("tcp://127.0.0.1:"));
        client.send(b"ping").await.unwrap();
        assert_eq!(client.recv().await.unwrap(), b"ping");

        server.await.unwrap();
        assert!(matches!(
            client.recv().await.unwrap_err(),
            TransportError::ConnectionClosed
        ));
        client.close().await.unwrap();
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_send_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = tokio::spawn(async move { listener.accept().await });

        let options = ChannelOptions::default().with_max_frame_size(8);
        let mut client = TcpChannel::connect("127.0.0.1", port, options).await.unwrap();
        let err = client.send(&[0u8; 9]).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { max: 8, actual: 9 }));
    }

    #[tokio::test]
    async fn test_recv_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await });

        let options = ChannelOptions::default().with_io_timeout(Duration::from_millis(50));
        let mut client = TcpChannel::connect("127.0.0.1", port, options).await.unwrap();
        let err = client.recv().await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        drop(accept);
    }
}
