// ============================================
// File: crates/sigil-transport/src/traits.rs
// ============================================
//! # Transport Traits
//!
//! ## Creation Reason
//! The protocol engine talks to one logical, ordered, message-oriented
//! connection. [`Channel`] is that connection; every backend (TCP,
//! HTTP rendezvous, RFCOMM, in-memory mock) implements it.
//!
//! ## Main Functionality
//! - `Channel`: send/receive whole messages
//! - `ChannelOptions`: timeouts and limits shared by all backends
//!
//! ## ⚠️ Important Note for Next Developer
//! - A channel is owned by exactly one protocol run; methods take
//!   `&mut self` so it cannot be shared by accident
//! - Dropping a channel releases its socket; `close` is the graceful path
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definitions

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, TransportError};

// ============================================
// Channel Trait
// ============================================

/// One logical in-order message connection.
///
/// # Example
/// ```ignore
/// async fn echo(channel: &mut dyn Channel) -> Result<()> {
///     let msg = channel.recv().await?;
///     channel.send(&msg).await?;
///     channel.close().await
/// }
/// ```
#[async_trait]
pub trait Channel: Send {
    /// Sends one message.
    ///
    /// # Errors
    /// Network failure, oversized message, or closed channel.
    async fn send(&mut self, message: &[u8]) -> Result<()>;

    /// Receives the next message.
    ///
    /// # Errors
    /// Network failure, timeout, oversized frame, or peer closed.
    async fn recv(&mut self) -> Result<Vec<u8>>;

    /// Closes the channel. Idempotent.
    ///
    /// # Errors
    /// Only if the shutdown itself fails.
    async fn close(&mut self) -> Result<()>;

    /// Human-readable peer description for logs (`tcp://10.0.0.5:7000`).
    fn describe(&self) -> String;
}

// ============================================
// ChannelOptions
// ============================================

/// Timeouts and limits applied when opening and using a channel.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use sigil_transport::ChannelOptions;
///
/// let options = ChannelOptions::default()
///     .with_io_timeout(Duration::from_secs(5))
///     .with_max_frame_size(16 * 1024);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Time allowed for a single read or write.
    pub io_timeout: Duration,
    /// Largest message accepted or sent.
    pub max_frame_size: usize,
    /// Pause between empty rendezvous polls.
    pub poll_interval: Duration,
    /// Total time a rendezvous `recv` keeps polling.
    pub poll_timeout: Duration,
    /// Timeout of one HTTP request to the relay.
    pub request_timeout: Duration,
    /// RFCOMM channel used when the address names none.
    pub default_rfcomm_channel: u8,
}

impl ChannelOptions {
    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-operation I/O timeout.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the maximum frame size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Sets rendezvous polling interval and overall poll timeout.
    #[must_use]
    pub const fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    /// Sets the fallback RFCOMM channel.
    #[must_use]
    pub const fn with_default_rfcomm_channel(mut self, channel: u8) -> Self {
        self.default_rfcomm_channel = channel;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    /// `InvalidConfig` naming the first bad option.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(TransportError::invalid_config("connect_timeout", "must be non-zero"));
        }
        if self.io_timeout.is_zero() {
            return Err(TransportError::invalid_config("io_timeout", "must be non-zero"));
        }
        if self.max_frame_size == 0 || self.max_frame_size > crate::frame::MAX_FRAME_SIZE_LIMIT {
            return Err(TransportError::invalid_config(
                "max_frame_size",
                format!("must be in 1..={}", crate::frame::MAX_FRAME_SIZE_LIMIT),
            ));
        }
        if self.poll_interval.is_zero() || self.poll_interval > self.poll_timeout {
            return Err(TransportError::invalid_config(
                "poll_interval",
                "must be non-zero and not exceed poll_timeout",
            ));
        }
        if !crate::endpoint::RFCOMM_CHANNEL_RANGE.contains(&self.default_rfcomm_channel) {
            return Err(TransportError::invalid_config(
                "default_rfcomm_channel",
                "must be in 1..=30",
            ));
        }
        Ok(())
    }
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            max_frame_size: crate::frame::DEFAULT_MAX_FRAME_SIZE,
            poll_interval: Duration::from_millis(500),
            poll_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(15),
            default_rfcomm_channel: 1,
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        assert!(ChannelOptions::default().validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let bad = ChannelOptions::default().with_max_frame_size(0);
        assert!(bad.validate().is_err());

        let bad = ChannelOptions::default()
            .with_polling(Duration::from_secs(10), Duration::from_secs(1));
        assert!(bad.validate().is_err());

        let bad = ChannelOptions::default().with_default_rfcomm_channel(31);
        assert!(bad.validate().is_err());

        let bad = ChannelOptions::default().with_io_timeout(Duration::ZERO);
        assert!(bad.validate().is_err());
    }
}
