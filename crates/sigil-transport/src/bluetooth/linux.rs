// ============================================
// File: crates/sigil-transport/src/bluetooth/linux.rs
// ============================================
//! # Linux RFCOMM Socket
//!
//! ## Main Functionality
//! - `socket(AF_BLUETOOTH, SOCK_STREAM, BTPROTO_RFCOMM)` in non-blocking mode
//! - Async connect: wait for writability, then read `SO_ERROR`
//! - `AsyncRead`/`AsyncWrite` over Tokio `AsyncFd`, so framing is shared
//!   with TCP
//!
//! ## Required Capabilities
//! - A running Bluetooth stack and a paired device; no special privileges
//!
//! ## ⚠️ Important Note for Next Developer
//! - `sockaddr_rc.rc_bdaddr` is little-endian (reversed display order)
//!
//! ## Last Modified
//! v0.1.0 - Initial RFCOMM socket

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use async_trait::async_trait;
use nix::libc;
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::time::timeout;
use tracing::debug;

use crate::endpoint::BluetoothAddress;
use crate::error::{Result, TransportError};
use crate::frame::{read_frame, write_frame};
use crate::traits::{Channel, ChannelOptions};

// ============================================
// Constants
// ============================================

/// RFCOMM protocol number (`<bluetooth/bluetooth.h>`).
const BTPROTO_RFCOMM: libc::c_int = 3;

// ============================================
// sockaddr_rc
// ============================================

/// `struct sockaddr_rc` from `<bluetooth/rfcomm.h>`.
#[repr(C)]
struct SockaddrRc {
    rc_family: libc::sa_family_t,
    rc_bdaddr: [u8; 6],
    rc_channel: u8,
}

impl SockaddrRc {
    fn new(address: BluetoothAddress, channel: u8) -> Self {
        let mut bdaddr = address.octets();
        bdaddr.reverse();
        Self {
            rc_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            rc_bdaddr: bdaddr,
            rc_channel: channel,
        }
    }
}

// ============================================
// RfcommStream
// ============================================

/// Non-blocking RFCOMM socket driven by the Tokio reactor.
struct RfcommStream {
    inner: AsyncFd<OwnedFd>,
}

impl RfcommStream {
    async fn connect(address: BluetoothAddress, channel: u8) -> io::Result<Self> {
        let raw = unsafe {
            libc::socket(
                libc::AF_BLUETOOTH,
                libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                BTPROTO_RFCOMM,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let addr = SockaddrRc::new(address, channel);
        let rc = unsafe {
            libc::connect(
                fd.as_raw_fd(),
                std::ptr::addr_of!(addr).cast::<libc::sockaddr>(),
                mem::size_of::<SockaddrRc>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINPROGRESS) {
                return Err(err);
            }
        }

        let inner = AsyncFd::new(fd)?;
        let _guard = inner.writable().await?;
        take_socket_error(inner.get_ref())?;
        Ok(Self { inner })
    }
}

fn take_socket_error(fd: &OwnedFd) -> io::Result<()> {
    let mut err: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            std::ptr::addr_of_mut!(err).cast::<libc::c_void>(),
            &mut len,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    if err != 0 {
        return Err(io::Error::from_raw_os_error(err));
    }
    Ok(())
}

impl AsyncRead for RfcommStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();

            match guard.try_io(|inner| {
                let fd = inner.get_ref().as_raw_fd();
                let result = unsafe {
                    libc::read(fd, unfilled.as_mut_ptr().cast::<libc::c_void>(), unfilled.len())
                };
                if result < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(result as usize)
                }
            }) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for RfcommStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;

            match guard.try_io(|inner| {
                let fd = inner.get_ref().as_raw_fd();
                let result =
                    unsafe { libc::write(fd, buf.as_ptr().cast::<libc::c_void>(), buf.len()) };
                if result < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(result as usize)
                }
            }) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let rc = unsafe { libc::shutdown(self.inner.get_ref().as_raw_fd(), libc::SHUT_WR) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOTCONN) {
                return Poll::Ready(Err(err));
            }
        }
        Poll::Ready(Ok(()))
    }
}

// ============================================
// RfcommChannel
// ============================================

/// Framed RFCOMM connection.
pub struct RfcommChannel {
    stream: RfcommStream,
    address: BluetoothAddress,
    channel: u8,
    options: ChannelOptions,
    closed: bool,
}

impl RfcommChannel {
    /// Connects to `address` on RFCOMM `channel`.
    ///
    /// # Errors
    /// `Timeout` after the connect timeout, `ConnectFailed` on socket errors.
    pub async fn connect(
        address: BluetoothAddress,
        channel: u8,
        options: ChannelOptions,
    ) -> Result<Self> {
        options.validate()?;
        let target = format!("{address}#{channel}");
        debug!(device = %address, channel, "Connecting RFCOMM channel");

        let stream = timeout(options.connect_timeout, RfcommStream::connect(address, channel))
            .await
            .map_err(|_| TransportError::timeout(format!("connect {target}")))?
            .map_err(|e| TransportError::connect_failed(&target, e.to_string()))?;

        Ok(Self {
            stream,
            address,
            channel,
            options,
            closed: false,
        })
    }
}

#[async_trait]
impl Channel for RfcommChannel {
    async fn send(&mut self, message: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        timeout(
            self.options.io_timeout,
            write_frame(&mut self.stream, message, self.options.max_frame_size),
        )
        .await
        .map_err(|_| TransportError::timeout("rfcomm send"))?
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
        .map_err(|_| TransportError::timeout("rfcomm recv"))?
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .shutdown()
            .await
            .map_err(|e| TransportError::io("rfcomm shutdown", e))
    }

    fn describe(&self) -> String {
        format!("btspp://{}#{}", self.address, self.channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sockaddr_layout() {
        assert_eq!(mem::size_of::<SockaddrRc>(), 10);
        let addr = SockaddrRc::new(BluetoothAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]), 10);
        assert_eq!(addr.rc_bdaddr, [0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(addr.rc_channel, 10);
    }

    #[tokio::test]
    async fn test_connect_without_device_fails() {
        let options = ChannelOptions::default().with_connect_timeout(Duration::from_millis(200));
        let result =
            RfcommChannel::connect(BluetoothAddress::new([0; 6]), 1, options).await;
        assert!(result.is_err());
    }
}
