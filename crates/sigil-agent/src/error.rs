// ============================================
// File: crates/sigil-agent/src/error.rs
// ============================================
//! # Agent Error Types
//!
//! ## Creation Reason
//! Three failure families must never be confused with each other:
//! - [`ProtocolFailure`]: why one protocol run ended without success
//! - [`DelegationError`]: why handing a token to a terminal failed
//! - [`AgentError`]: everything else (config, key files, stores)
//!
//! ## ⚠️ Important Note for Next Developer
//! - A `DelegationError` must not touch the session that produced the
//!   token; keep it out of `ProtocolFailure`
//! - No protocol failure is retried inside the engine
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use sigil_common::error::CommonError;
use sigil_core::error::CoreError;
use sigil_transport::error::TransportError;

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

// ============================================
// FailureKind
// ============================================

/// Coarse classification of a failed protocol run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Counterpart's proof did not match the trusted commitment.
    VerifierAuthFailed,
    /// Counterpart validly declined us.
    ProverAuthRejected,
    /// Prover's proof was invalid (verifier side).
    ProverAuthFailed,
    /// Malformed or out-of-order message.
    ProtocolViolation,
    /// Channel failure.
    Transport,
    /// Run token was cancelled.
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::VerifierAuthFailed => "VerifierAuthFailed",
            Self::ProverAuthRejected => "ProverAuthRejected",
            Self::ProverAuthFailed => "ProverAuthFailed",
            Self::ProtocolViolation => "ProtocolViolation",
            Self::Transport => "Transport",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

// ============================================
// ProtocolFailure
// ============================================

/// Why a protocol run failed.
#[derive(Error, Debug)]
pub enum ProtocolFailure {
    /// The counterpart could not prove the identity we trust. Possible attack.
    #[error("Verifier authentication failed: {source}")]
    VerifierAuthFailed {
        /// Which check failed
        #[source]
        source: CoreError,
    },

    /// The counterpart authenticated and then declined.
    #[error("Authentication rejected by verifier (session {session_id})")]
    ProverAuthRejected {
        /// Verifier-assigned session id
        session_id: String,
    },

    /// The prover's signature or MAC did not verify.
    #[error("Prover authentication failed: {source}")]
    ProverAuthFailed {
        /// Which check failed
        #[source]
        source: CoreError,
    },

    /// Unexpected or malformed message. Never retried.
    #[error("Protocol violation: {reason}")]
    ProtocolViolation {
        /// What was wrong
        reason: String,
    },

    /// Channel failure. The caller may run the whole protocol again.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The run's token was cancelled.
    #[error("Protocol run cancelled")]
    Cancelled,
}

impl ProtocolFailure {
    /// Creates a `ProtocolViolation`.
    pub fn violation(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }

    /// Classifies a crypto/codec error raised while processing the
    /// counterpart's messages on the prover side.
    #[must_use]
    pub fn from_verifier_side(err: CoreError) -> Self {
        if err.is_identity_error() {
            Self::VerifierAuthFailed { source: err }
        } else {
            Self::violation(err.to_string())
        }
    }

    /// Classifies an error raised while checking the prover (verifier side).
    #[must_use]
    pub fn from_prover_side(err: CoreError) -> Self {
        if err.is_identity_error() {
            Self::ProverAuthFailed { source: err }
        } else {
            Self::violation(err.to_string())
        }
    }

    /// Returns the failure classification.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::VerifierAuthFailed { .. } => FailureKind::VerifierAuthFailed,
            Self::ProverAuthRejected { .. } => FailureKind::ProverAuthRejected,
            Self::ProverAuthFailed { .. } => FailureKind::ProverAuthFailed,
            Self::ProtocolViolation { .. } => FailureKind::ProtocolViolation,
            Self::Transport(_) => FailureKind::Transport,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Returns `true` if a fresh run from scratch may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns `true` if the failure may indicate an active attacker.
    #[must_use]
    pub const fn is_suspicious(&self) -> bool {
        matches!(
            self,
            Self::VerifierAuthFailed { .. }
                | Self::ProverAuthFailed { .. }
                | Self::ProtocolViolation { .. }
        )
    }
}

impl From<CoreError> for ProtocolFailure {
    fn from(err: CoreError) -> Self {
        Self::from_verifier_side(err)
    }
}

// ============================================
// DelegationError
// ============================================

/// Why delegating a token to a terminal failed.
#[derive(Error, Debug)]
pub enum DelegationError {
    /// AEAD or key failure: stale, mismatched or forged.
    #[error("Delegation key rejected: {source}")]
    InvalidKey {
        /// Underlying crypto error
        #[source]
        source: CoreError,
    },

    /// Channel failure while sending or receiving.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Message could not be encoded or decoded.
    #[error("Delegation encoding failed: {source}")]
    Encoding {
        /// Underlying codec error
        #[source]
        source: CoreError,
    },

    /// Sequence number already seen.
    #[error("Replayed delegation message (sequence {sequence})")]
    Replayed {
        /// Offending sequence number
        sequence: u64,
    },

    /// Sequence number older than the replay window.
    #[error("Stale delegation message (sequence {sequence})")]
    Stale {
        /// Offending sequence number
        sequence: u64,
    },

    /// Token cannot be built from the given source.
    #[error("No delegable token: {reason}")]
    NoToken {
        /// Why
        reason: String,
    },
}

impl DelegationError {
    /// Returns `true` for failures that indicate forgery or replay.
    #[must_use]
    pub const fn is_suspicious(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey { .. } | Self::Replayed { .. } | Self::Stale { .. }
        )
    }
}

impl From<CoreError> for DelegationError {
    fn from(err: CoreError) -> Self {
        if err.is_crypto_error() {
            Self::InvalidKey { source: err }
        } else {
            Self::Encoding { source: err }
        }
    }
}

// ============================================
// AgentError
// ============================================

/// Agent error types.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        path: String,
        reason: String,
    },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        field: String,
        reason: String,
    },

    #[error("Key file '{path}': {reason}")]
    KeyFile {
        path: String,
        reason: String,
    },

    #[error("Session '{session_id}' has status ERROR and cannot be persisted")]
    SessionNotPersistable {
        session_id: String,
    },

    #[error("Pairing for {commitment} is not a key pairing")]
    NotKeyPairing {
        commitment: String,
    },

    #[error("Terminal not trusted: {commitment}")]
    UntrustedTerminal {
        commitment: String,
    },

    #[error("Credential store failure: {reason}")]
    Store {
        reason: String,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolFailure),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn key_file(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::KeyFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Protocol(f) => f.is_retryable(),
            Self::Transport(e) => e.is_retryable(),
            Self::Delegation(DelegationError::Transport(e)) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::config_load("/etc/sigil/agent.toml", "file not found");
        assert!(err.to_string().contains("/etc/sigil/agent.toml"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_failure_classification() {
        let f = ProtocolFailure::from_verifier_side(CoreError::SignatureVerification);
        assert_eq!(f.kind(), FailureKind::VerifierAuthFailed);
        assert!(f.is_suspicious());
        assert!(!f.is_retryable());

        let f = ProtocolFailure::from_verifier_side(CoreError::malformed("bad field"));
        assert_eq!(f.kind(), FailureKind::ProtocolViolation);

        let f = ProtocolFailure::from_prover_side(CoreError::MacVerification);
        assert_eq!(f.kind(), FailureKind::ProverAuthFailed);

        let f = ProtocolFailure::ProverAuthRejected {
            session_id: "s1".into(),
        };
        assert!(!f.is_suspicious());

        let f: ProtocolFailure = TransportError::timeout("recv").into();
        assert_eq!(f.kind(), FailureKind::Transport);
        assert!(f.is_retryable());
    }

    #[test]
    fn test_delegation_error_from_core() {
        let err: DelegationError = CoreError::Decryption.into();
        assert!(matches!(err, DelegationError::InvalidKey { .. }));
        assert!(err.is_suspicious());

        let err: DelegationError = CoreError::malformed("x").into();
        assert!(matches!(err, DelegationError::Encoding { .. }));
    }
}
