// ============================================
// File: crates/sigil-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Identifiers that appear on the wire and in persisted records.
//!
//! ## Main Functionality
//! - `SequenceNumber`: freshness value carried in reauthentication messages
//! - `VerifierSessionId`: opaque session id assigned by the verifying side
//!
//! ## ⚠️ Important Note for Next Developer
//! - `VerifierSessionId` is chosen by the far end; treat it as untrusted
//!   input and keep the length bound
//! - `SequenceNumber::random()` exists for legacy terminals only, new
//!   terminals get a monotonic counter
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::CommonError;

// ============================================
// Constants
// ============================================

/// Maximum length of a verifier-assigned session id, in bytes.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Number of random bytes in a generated session id.
pub const GENERATED_SESSION_ID_BYTES: usize = 16;

// ============================================
// SequenceNumber
// ============================================

/// Freshness value included in every reauthentication message.
///
/// Ordered, so a receiver can track the highest value seen.
///
/// # Example
/// ```
/// use sigil_common::types::SequenceNumber;
///
/// let first = SequenceNumber::new(1);
/// assert!(first.next() > first);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// Creates a sequence number from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Draws a uniformly random sequence number.
    #[must_use]
    pub fn random() -> Self {
        Self(rand::thread_rng().next_u64())
    }

    /// Returns the successor, saturating at `u64::MAX`.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Big-endian encoding, used when binding the value into AEAD data.
    #[must_use]
    pub const fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================
// VerifierSessionId
// ============================================

/// Opaque session identifier assigned by the verifier.
///
/// Non-empty and at most [`MAX_SESSION_ID_LEN`] bytes. Construction goes
/// through [`VerifierSessionId::new`] (or `FromStr`/serde, which call it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VerifierSessionId(String);

impl VerifierSessionId {
    /// Validates and wraps a session id string.
    ///
    /// # Errors
    /// `InvalidInput` if the id is empty or longer than 128 bytes.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CommonError::invalid_input("session_id", "cannot be empty"));
        }
        if id.len() > MAX_SESSION_ID_LEN {
            return Err(CommonError::invalid_input(
                "session_id",
                format!("longer than {MAX_SESSION_ID_LEN} bytes"),
            ));
        }
        Ok(Self(id))
    }

    /// Generates a fresh id: 16 random bytes, hex encoded.
    #[must_use]
    pub fn generate() -> Self {
        let mut raw = [0u8; GENERATED_SESSION_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        Self(hex::encode(raw))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerifierSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VerifierSessionId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<[u8]> for VerifierSessionId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl<'de> Deserialize<'de> for VerifierSessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

// ============================================
// Tests
// ============================================
