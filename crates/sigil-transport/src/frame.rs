// ============================================
// File: crates/sigil-transport/src/frame.rs
// ============================================
//! # Stream Framing
//!
//! Stream channels (TCP, RFCOMM) carry messages as
//! ```text
//! ┌──────────────────────┬──────────────────────────┐
//! │ Length (u32 BE)      │ Payload (Length bytes)   │
//! └──────────────────────┴──────────────────────────┘
//! ```
//! The length is checked against the configured maximum before any
//! payload is buffered.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, TransportError};

/// Size of the length prefix.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default maximum payload size.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Hard ceiling for any configured maximum.
pub const MAX_FRAME_SIZE_LIMIT: usize = 16 * 1024 * 1024;

/// Builds `len || payload`.
///
/// # Errors
/// `FrameTooLarge` if `payload` exceeds `max`.
pub fn encode_frame(payload: &[u8], max: usize) -> Result<Bytes> {
    check_len(payload.len(), max)?;
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Parses a length prefix.
///
/// # Errors
/// `FrameTooLarge` if the announced length exceeds `max`.
pub fn decode_frame_len(header: [u8; FRAME_HEADER_SIZE], max: usize) -> Result<usize> {
    let len = u32::from_be_bytes(header) as usize;
    check_len(len, max)?;
    Ok(len)
}

fn check_len(len: usize, max: usize) -> Result<()> {
    if len > max {
        return Err(TransportError::FrameTooLarge { max, actual: len });
    }
    Ok(())
}

/// Writes one frame to an async stream.
///
/// # Errors
/// `FrameTooLarge` or I/O failure.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max: usize) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode_frame(payload, max)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame from an async stream.
///
/// # Errors
/// `ConnectionClosed` on EOF, `FrameTooLarge`, or I/O failure.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    let len = decode_frame_len(header, max)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"{\"type\":\"verdict\"}", 1024).await.unwrap();
        let got = read_frame(&mut b, 1024).await.unwrap();
        assert_eq!(got, b"{\"type\":\"verdict\"}");
    }

    #[tokio::test]
    async fn test_oversized_announced_length_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&1_000_000u32.to_be_bytes()).await.unwrap();
        let err = read_frame(&mut b, 1024).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { actual: 1_000_000, .. }));
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_closed() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&10u32.to_be_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);
        let err = read_frame(&mut b, 1024).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode_frame(b"hi", 16).unwrap();
        assert_eq!(&frame[..], &[0, 0, 0, 2, b'h', b'i']);
        assert!(encode_frame(&[0u8; 17], 16).is_err());
    }
}
