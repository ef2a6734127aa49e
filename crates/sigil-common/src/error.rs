// ============================================
// File: crates/sigil-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Base error enum wrapped by the per-crate errors (`CoreError`,
//! `TransportError`, `AgentError`).
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never put key material or tokens into an error message
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions
//! v0.1.1 - Trimmed to the variants in use

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Common result type for operations that may fail.
pub type Result<T> = std::result::Result<T, CommonError>;

// ============================================
// CommonError
// ============================================

/// Errors shared across the Sigil crates.
///
/// # Example
/// ```
/// use sigil_common::error::{CommonError, Result};
///
/// fn non_empty(id: &str) -> Result<()> {
///     if id.is_empty() {
///         return Err(CommonError::invalid_input("session_id", "cannot be empty"));
///     }
///     Ok(())
/// }
///
/// assert!(non_empty("").is_err());
/// ```
#[derive(Error, Debug)]
pub enum CommonError {
    /// Invalid input data provided.
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the field or parameter
        field: String,
        /// Description of what's wrong
        reason: String,
    },
}

impl CommonError {
    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VerifierSessionId;

    #[test]
    fn test_error_display() {
        let err = CommonError::invalid_input("session_id", "must not be empty");
        assert!(err.to_string().contains("session_id"));
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_rejected_session_id_names_field() {
        let err = VerifierSessionId::new("").unwrap_err();
        assert!(matches!(err, CommonError::InvalidInput { ref field, .. } if field == "session_id"));
    }
}
