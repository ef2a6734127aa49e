// ============================================
// File: crates/sigil-transport/src/mock.rs
// ============================================
//! # Mock Channel Implementation
//!
//! ## Creation Reason
//! Drives a prover and a verifier against each other in tests without
//! sockets or privileges.
//!
//! ## Usage in Tests
//! ```
//! use sigil_transport::{Channel, MockChannel};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (mut a, mut b) = MockChannel::pair();
//! a.send(b"hello").await?;
//! assert_eq!(b.recv().await?, b"hello");
//! assert_eq!(a.sent(), vec![b"hello".to_vec()]);
//! # Ok(())
//! # }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Testing only; compiled under `cfg(test)` or the `mock` feature
//! - Dropping or closing one end makes the peer's pending `recv` fail
//!   with `ConnectionClosed`, like a socket would
//!
//! ## Last Modified
//! v0.1.0 - Initial mock channel

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Result, TransportError};
use crate::traits::Channel;

/// Maximum number of queued messages per direction.
const MAX_QUEUE_SIZE: usize = 1000;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

// ============================================
// Pipe
// ============================================

/// One direction of a mock connection.
#[derive(Default)]
struct Pipe {
    queue: Mutex<VecDeque<Vec<u8>>>,
    closed: AtomicBool,
    notify: Notify,
}

impl Pipe {
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

// ============================================
// MockChannel
// ============================================

/// In-memory duplex channel end.
pub struct MockChannel {
    id: usize,
    inbound: Arc<Pipe>,
    outbound: Arc<Pipe>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockChannel {
    /// Creates two connected ends.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        let a = Self {
            id,
            inbound: Arc::clone(&b_to_a),
            outbound: Arc::clone(&a_to_b),
            sent: Arc::default(),
        };
        let b = Self {
            id,
            inbound: a_to_b,
            outbound: b_to_a,
            sent: Arc::default(),
        };
        (a, b)
    }

    /// Messages this end has sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Handle for reading this end's transcript after the channel has
    /// been moved into a protocol run.
    #[must_use]
    pub fn transcript(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.sent)
    }

    /// Queues a message for this end to receive, as if the peer sent it.
    pub fn inject(&self, message: Vec<u8>) {
        self.inbound.queue.lock().push_back(message);
        self.inbound.notify.notify_one();
    }

    /// Number of messages waiting for this end.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inbound.queue.lock().len()
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn send(&mut self, message: &[u8]) -> Result<()> {
        if self.outbound.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed);
        }
        {
            let mut queue = self.outbound.queue.lock();
            if queue.len() >= MAX_QUEUE_SIZE {
                return Err(TransportError::SendFailed {
                    reason: "mock queue full".into(),
                });
            }
            queue.push_back(message.to_vec());
        }
        self.sent.lock().push(message.to_vec());
        self.outbound.notify.notify_one();
        Ok(())
    }

    async fn recv(&mut self) -> Result<Vec<u8>> {
        loop {
            {
                let mut queue = self.inbound.queue.lock();
                if let Some(message) = queue.pop_front() {
                    return Ok(message);
                }
            }
            if self.inbound.closed.load(Ordering::Acquire) {
                return Err(TransportError::ConnectionClosed);
            }
            self.inbound.notify.notified().await;
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.outbound.close();
        self.inbound.close();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("mock://{}", self.id)
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.outbound.close();
    }
}

impl std::fmt::Debug for MockChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockChannel")
            .field("id", &self.id)
            .field("pending", &self.pending())
            .field("sent", &self.sent.lock().len())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_exchange() {
        let (mut a, mut b) = MockChannel::pair();
        a.send(b"one").await.unwrap();
        a.send(b"two").await.unwrap();
        assert_eq!(b.pending(), 2);
        assert_eq!(b.recv().await.unwrap(), b"one");
        assert_eq!(b.recv().await.unwrap(), b"two");

        b.send(b"three").await.unwrap();
        assert_eq!(a.recv().await.unwrap(), b"three");
        assert_eq!(a.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_recv_waits_for_send() {
        let (mut a, mut b) = MockChannel::pair();
        let reader = tokio::spawn(async move { b.recv().await });
        tokio::task::yield_now().await;
        a.send(b"late").await.unwrap();
        assert_eq!(reader.await.unwrap().unwrap(), b"late");
    }

    #[tokio::test]
    async fn test_drop_closes_peer() {
        let (a, mut b) = MockChannel::pair();
        let reader = tokio::spawn(async move { b.recv().await });
        drop(a);
        let err = reader.await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_close_then_send_fails() {
        let (mut a, _b) = MockChannel::pair();
        a.close().await.unwrap();
        assert!(a.send(b"x").await.is_err());
        assert!(matches!(a.recv().await.unwrap_err(), TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_inject() {
        let (mut a, _b) = MockChannel::pair();
        a.inject(b"forged".to_vec());
        assert_eq!(a.recv().await.unwrap(), b"forged");
    }
}
