// ============================================
// File: crates/sigil-core/src/protocol/codec.rs
// ============================================
//! # Message Codec
//!
//! ## Creation Reason
//! Turns [`Envelope`]s into bytes and back. The codec only checks
//! structure; signatures and AEAD tags are checked by the engine.
//!
//! ## Main Functionality
//! - `Codec`: trait the engine and delegation code program against
//! - `JsonCodec`: UTF-8 JSON, size-bounded in both directions
//!
//! ## ⚠️ Important Note for Next Developer
//! - Unknown `type` tags and missing fields must fail here, never be
//!   defaulted, otherwise the engine cannot tell a peer bug from an attack
//!
//! ## Last Modified
//! v0.1.0 - JSON codec

use tracing::trace;

use super::messages::Envelope;
use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Default upper bound on an encoded message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

// ============================================
// Codec Trait
// ============================================

/// Structural (de)serialization of protocol messages.
pub trait Codec: Send + Sync {
    /// Short name for logs (`"json"`).
    fn name(&self) -> &'static str;

    /// Encodes a message.
    ///
    /// # Errors
    /// `MessageTooLarge` or `MalformedMessage`.
    fn encode(&self, msg: &Envelope) -> Result<Vec<u8>>;

    /// Decodes a message.
    ///
    /// # Errors
    /// `MessageTooLarge` or `MalformedMessage`.
    fn decode(&self, buf: &[u8]) -> Result<Envelope>;
}

// ============================================
// JsonCodec
// ============================================

/// JSON codec with a maximum message size.
///
/// # Example
/// ```
/// use sigil_core::protocol::{Codec, Envelope, JsonCodec, Verdict};
///
/// let codec = JsonCodec::new();
/// let bytes = codec.encode(&Envelope::Verdict(Verdict { accepted: true, extra: None })).unwrap();
/// assert_eq!(codec.decode(&bytes).unwrap().kind(), "verdict");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec {
    max_message_size: usize,
}

impl JsonCodec {
    /// Creates a codec with [`DEFAULT_MAX_MESSAGE_SIZE`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Overrides the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Returns the configured maximum.
    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len > self.max_message_size {
            return Err(CoreError::MessageTooLarge {
                max: self.max_message_size,
                actual: len,
            });
        }
        Ok(())
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, msg: &Envelope) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(msg)
            .map_err(|e| CoreError::malformed(format!("encode {}: {e}", msg.kind())))?;
        self.check_size(bytes.len())?;
        trace!(kind = msg.kind(), len = bytes.len(), "Encoded message");
        Ok(bytes)
    }

    fn decode(&self, buf: &[u8]) -> Result<Envelope> {
        self.check_size(buf.len())?;
        let msg: Envelope = serde_json::from_slice(buf)
            .map_err(|e| CoreError::malformed(format!("decode: {e}")))?;
        trace!(kind = msg.kind(), len = buf.len(), "Decoded message");
        Ok(msg)
    }
}

// ============================================
// Tests
// ============================================
