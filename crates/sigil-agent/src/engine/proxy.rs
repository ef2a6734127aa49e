// ============================================
// File: crates/sigil-agent/src/engine/proxy.rs
// ============================================
//! # Proxy
//!
//! A channel and the codec used on it. Converts failures into the
//! protocol taxonomy: channel errors become `Transport`, anything that
//! does not decode becomes `ProtocolViolation`.

use std::sync::Arc;

use tracing::{trace, warn};

use sigil_core::protocol::{Codec, Envelope, JsonCodec};
use sigil_transport::Channel;

use crate::error::ProtocolFailure;

/// Message-level view of one channel.
pub struct Proxy {
    channel: Box<dyn Channel>,
    codec: Arc<dyn Codec>,
}

impl Proxy {
    /// Pairs a channel with a codec.
    #[must_use]
    pub fn new(channel: Box<dyn Channel>, codec: Arc<dyn Codec>) -> Self {
        Self { channel, codec }
    }

    /// Pairs a channel with the default JSON codec.
    #[must_use]
    pub fn json(channel: Box<dyn Channel>) -> Self {
        Self::new(channel, Arc::new(JsonCodec::new()))
    }

    /// Encodes and sends one message.
    ///
    /// # Errors
    /// `ProtocolViolation` if encoding fails, `Transport` on channel errors.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), ProtocolFailure> {
        let bytes = self
            .codec
            .encode(envelope)
            .map_err(|e| ProtocolFailure::violation(e.to_string()))?;
        trace!(kind = envelope.kind(), bytes = bytes.len(), "Sending message");
        self.channel.send(&bytes).await?;
        Ok(())
    }

    /// Receives and decodes one message.
    ///
    /// # Errors
    /// `Transport` on channel errors, `ProtocolViolation` if the bytes do
    /// not decode.
    pub async fn recv(&mut self) -> Result<Envelope, ProtocolFailure> {
        let bytes = self.channel.recv().await?;
        let envelope = self
            .codec
            .decode(&bytes)
            .map_err(|e| ProtocolFailure::violation(e.to_string()))?;
        trace!(kind = envelope.kind(), bytes = bytes.len(), "Received message");
        Ok(envelope)
    }

    /// Closes the channel, logging instead of failing.
    pub async fn close(&mut self) {
        if let Err(e) = self.channel.close().await {
            warn!(peer = %self.channel.describe(), error = %e, "Channel close failed");
        }
    }

    /// Peer description for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        self.channel.describe()
    }

    /// Codec in use.
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("peer", &self.channel.describe())
            .field("codec", &self.codec.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::protocol::Verdict;
    use sigil_transport::MockChannel;

    use crate::error::FailureKind;

    #[tokio::test]
    async fn test_proxy_roundtrip() {
        let (a, b) = MockChannel::pair();
        let mut left = Proxy::json(Box::new(a));
        let mut right = Proxy::json(Box::new(b));

        let msg = Envelope::Verdict(Verdict {
            accepted: true,
            extra: None,
        });
        left.send(&msg).await.unwrap();
        assert_eq!(right.recv().await.unwrap(), msg);
    }

    #[tokio::test]
    async fn test_garbage_is_violation() {
        let (a, b) = MockChannel::pair();
        a.inject(b"not json".to_vec());
        let mut proxy = Proxy::json(Box::new(a));
        let err = proxy.recv().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProtocolViolation);
        drop(b);
    }

    #[tokio::test]
    async fn test_closed_channel_is_transport() {
        let (a, b) = MockChannel::pair();
        drop(b);
        let mut proxy = Proxy::json(Box::new(a));
        let err = proxy.recv().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport);
    }
}
