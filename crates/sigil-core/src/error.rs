// ============================================
// File: crates/sigil-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Errors raised by the cryptographic primitives and the wire protocol.
//! The agent maps these onto the protocol failure taxonomy; this crate
//! only reports *what* went wrong.
//!
//! ## Error Categories
//! 1. **Crypto Errors**: key handling, signatures, MACs, AEAD, KDF
//! 2. **Identity Errors**: commitment mismatch
//! 3. **Protocol Errors**: malformed or unexpected messages, versions
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include key material in error messages
//! - `Decryption` deliberately carries no detail
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use sigil_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for protocol and cryptographic operations.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Cryptographic Errors
    // ========================================

    /// Key bytes could not be turned into a key.
    #[error("Invalid key: {reason}")]
    InvalidKey {
        /// What is wrong with the key
        reason: String,
    },

    /// Signature verification failed.
    #[error("Signature verification failed")]
    SignatureVerification,

    /// Identity MAC did not verify.
    #[error("MAC verification failed")]
    MacVerification,

    /// Key exchange produced an unusable secret.
    #[error("Key exchange failed: {reason}")]
    KeyExchange {
        /// Why key exchange failed
        reason: String,
    },

    /// Encryption operation failed.
    #[error("Encryption failed: {context}")]
    Encryption {
        /// What was being encrypted
        context: String,
    },

    /// Decryption operation failed (authentication failure).
    #[error("Decryption failed: authentication error")]
    Decryption,

    /// Key derivation failed.
    #[error("Key derivation failed: {reason}")]
    KeyDerivation {
        /// Why derivation failed
        reason: String,
    },

    // ========================================
    // Identity Errors
    // ========================================

    /// Presented identity does not hash to the trusted commitment.
    #[error("Commitment mismatch: expected {expected}, got {actual}")]
    CommitmentMismatch {
        /// Trusted commitment (hex)
        expected: String,
        /// Commitment computed from the presented identity (hex)
        actual: String,
    },

    // ========================================
    // Protocol Errors
    // ========================================

    /// Protocol version mismatch.
    #[error("Unsupported protocol version: {got}, expected {expected}")]
    UnsupportedVersion {
        /// Version received
        got: String,
        /// Version expected
        expected: String,
    },

    /// Message is malformed.
    #[error("Malformed message: {reason}")]
    MalformedMessage {
        /// What's wrong with the message
        reason: String,
    },

    /// A well-formed message arrived at the wrong point of the exchange.
    #[error("Unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage {
        /// Message type the state machine was waiting for
        expected: &'static str,
        /// Message type actually received
        got: &'static str,
    },

    /// Message exceeds maximum allowed size.
    #[error("Message too large: max {max} bytes, got {actual}")]
    MessageTooLarge {
        /// Maximum allowed size
        max: usize,
        /// Actual size
        actual: usize,
    },

    /// Required field is missing.
    #[error("Missing required data: {field}")]
    MissingData {
        /// What data is missing
        field: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates an `InvalidKey` error.
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    /// Creates a `MalformedMessage` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Creates a `MissingData` error.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingData {
            field: field.into(),
        }
    }

    /// Creates an `UnexpectedMessage` error.
    pub const fn unexpected(expected: &'static str, got: &'static str) -> Self {
        Self::UnexpectedMessage { expected, got }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this is a cryptographic error.
    #[must_use]
    pub const fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey { .. }
                | Self::SignatureVerification
                | Self::MacVerification
                | Self::KeyExchange { .. }
                | Self::Encryption { .. }
                | Self::Decryption
                | Self::KeyDerivation { .. }
        )
    }

    /// Returns `true` if the far end failed to prove its identity.
    #[must_use]
    pub const fn is_identity_error(&self) -> bool {
        matches!(
            self,
            Self::CommitmentMismatch { .. } | Self::SignatureVerification | Self::MacVerification
        )
    }

    /// Returns `true` if this is a structural protocol error.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedVersion { .. }
                | Self::MalformedMessage { .. }
                | Self::UnexpectedMessage { .. }
                | Self::MessageTooLarge { .. }
                | Self::MissingData { .. }
        )
    }

    /// Returns `true` if this error might indicate an attack.
    #[must_use]
    pub const fn is_suspicious(&self) -> bool {
        matches!(
            self,
            Self::SignatureVerification
                | Self::MacVerification
                | Self::Decryption
                | Self::CommitmentMismatch { .. }
                | Self::KeyExchange { .. }
        )
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::SignatureVerification;
        assert!(err.to_string().contains("Signature"));

        let err = CoreError::unexpected("verdict", "prover_commit");
        assert!(err.to_string().contains("verdict"));
        assert!(err.to_string().contains("prover_commit"));
    }

    #[test]
    fn test_error_classification() {
        assert!(CoreError::SignatureVerification.is_crypto_error());
        assert!(CoreError::SignatureVerification.is_identity_error());
        assert!(CoreError::Decryption.is_suspicious());
        assert!(!CoreError::Decryption.is_identity_error());

        let mismatch = CoreError::CommitmentMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert!(mismatch.is_identity_error());
        assert!(!mismatch.is_protocol_error());

        assert!(CoreError::malformed("bad json").is_protocol_error());
    }

    #[test]
    fn test_common_error_conversion() {
        let common = CommonError::invalid_input("field", "bad value");
        let core: CoreError = common.into();
        assert!(matches!(core, CoreError::Common(_)));
    }
}
