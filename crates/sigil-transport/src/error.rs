// ============================================
// File: crates/sigil-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Errors raised while addressing, opening, and using a channel.
//!
//! ## Error Categories
//! 1. **Addressing Errors**: bad URI, unsupported scheme
//! 2. **Network Errors**: connect/send/receive failures, HTTP status
//! 3. **Framing Errors**: oversized frames, peer closed mid-frame
//! 4. **Platform Errors**: Bluetooth on a platform without RFCOMM
//!
//! ## ⚠️ Important Note for Next Developer
//! - Nothing here is retried inside the transport; retry policy belongs
//!   to whoever runs the protocol
//! - `UnsupportedScheme` must stay fatal, never fall back to another channel
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;

use thiserror::Error;

use sigil_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Addressing Errors
    // ========================================

    /// URI scheme has no channel implementation.
    #[error("Unsupported protocol scheme '{scheme}'")]
    UnsupportedScheme {
        /// Scheme found in the address
        scheme: String,
    },

    /// Address could not be parsed.
    #[error("Invalid address '{addr}': {reason}")]
    InvalidAddress {
        /// The address as given
        addr: String,
        /// What is wrong with it
        reason: String,
    },

    /// Invalid channel option.
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig {
        /// Option name
        field: String,
        /// Why it's invalid
        reason: String,
    },

    // ========================================
    // Network Errors
    // ========================================

    /// Could not open the channel.
    #[error("Failed to connect to {endpoint}: {reason}")]
    ConnectFailed {
        /// Endpoint description
        endpoint: String,
        /// Why connecting failed
        reason: String,
    },

    /// Send operation failed.
    #[error("Failed to send: {reason}")]
    SendFailed {
        /// Why send failed
        reason: String,
    },

    /// Receive operation failed.
    #[error("Failed to receive: {reason}")]
    ReceiveFailed {
        /// Why receive failed
        reason: String,
    },

    /// Relay answered with an unexpected HTTP status.
    #[error("HTTP {status} from relay during {operation}")]
    HttpStatus {
        /// Operation in progress
        operation: String,
        /// Status code
        status: u16,
    },

    /// Peer closed the channel.
    #[error("Channel closed by peer")]
    ConnectionClosed,

    /// Operation timed out.
    #[error("Operation timed out: {operation}")]
    Timeout {
        /// What operation timed out
        operation: String,
    },

    // ========================================
    // Framing Errors
    // ========================================

    /// Frame exceeds the configured maximum.
    #[error("Frame too large: max {max} bytes, got {actual}")]
    FrameTooLarge {
        /// Configured maximum
        max: usize,
        /// Announced or actual size
        actual: usize,
    },

    // ========================================
    // Platform Errors
    // ========================================

    /// Channel kind not available on this platform.
    #[error("Unsupported on this platform: {feature}")]
    Unsupported {
        /// Missing capability
        feature: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates an `InvalidAddress` error.
    pub fn invalid_address(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConnectFailed` error.
    pub fn connect_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidConfig` error.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if running the whole exchange again might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::ConnectFailed { .. }
            | Self::SendFailed { .. }
            | Self::ReceiveFailed { .. }
            | Self::ConnectionClosed => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }

    /// Returns `true` if the address itself is unusable.
    #[must_use]
    pub const fn is_addressing_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedScheme { .. } | Self::InvalidAddress { .. } | Self::Unsupported { .. }
        )
    }
}

// ============================================
// Error Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset => Self::ConnectionClosed,
            _ => Self::Io {
                context: "unspecified I/O operation".into(),
                source: err,
            },
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout("relay request")
        } else if err.is_connect() {
            Self::connect_failed("relay", err.to_string())
        } else if let Some(status) = err.status() {
            Self::HttpStatus {
                operation: "relay request".into(),
                status: status.as_u16(),
            }
        } else {
            Self::ReceiveFailed {
                reason: err.to_string(),
            }
        }
    }
}

// ============================================
// Tests
// ============================================
