// ============================================
// File: crates/sigil-core/src/protocol/version.rs
// ============================================
//! # Protocol Versioning
//!
//! ## Versioning Strategy
//! - `major.minor`, carried as the string `"1.1"` in `prover_commit`
//! - Same major is wire compatible; a minor bump only adds optional fields
//! - The version is also bound into both transcript signatures, so a
//!   downgrade by a man in the middle breaks the signatures
//!
//! ## Version History
//! | Version | Description |
//! |---------|-------------|
//! | 1.0     | SIGMA exchange, commitment always disclosed |
//! | 1.1     | Optional commitment disclosure, sealed extra data in verdict |
//!
//! ## Last Modified
//! v0.1.0 - Initial version definitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ============================================
// ProtocolVersion
// ============================================

/// Protocol version identifier.
///
/// # Example
/// ```
/// use sigil_core::protocol::ProtocolVersion;
///
/// let v: ProtocolVersion = "1.0".parse().unwrap();
/// assert!(ProtocolVersion::CURRENT.is_compatible_with(&v));
/// assert_eq!(ProtocolVersion::CURRENT.to_string(), "1.1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    /// Incremented for incompatible changes
    pub major: u8,
    /// Incremented for compatible additions
    pub minor: u8,
}

impl ProtocolVersion {
    /// The version this build speaks.
    pub const CURRENT: Self = Self::new(1, 1);

    /// Oldest version this build accepts.
    pub const MIN_SUPPORTED: Self = Self::new(1, 0);

    /// Creates a new protocol version.
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Same major and not older than [`MIN_SUPPORTED`](Self::MIN_SUPPORTED).
    #[must_use]
    pub const fn is_compatible_with(&self, other: &Self) -> bool {
        self.major == other.major
            && other.major == Self::MIN_SUPPORTED.major
            && other.minor >= Self::MIN_SUPPORTED.minor
    }

    /// Fails with `UnsupportedVersion` unless `other` is compatible.
    ///
    /// # Errors
    /// `UnsupportedVersion` on a major mismatch.
    pub fn require_compatible(&self, other: &Self) -> Result<(), CoreError> {
        if self.is_compatible_with(other) {
            Ok(())
        } else {
            Err(CoreError::UnsupportedVersion {
                got: other.to_string(),
                expected: self.to_string(),
            })
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| CoreError::malformed(format!("version '{s}' is not major.minor")))?;
        let major = major
            .parse()
            .map_err(|_| CoreError::malformed(format!("version major '{major}'")))?;
        let minor = minor
            .parse()
            .map_err(|_| CoreError::malformed(format!("version minor '{minor}'")))?;
        Ok(Self::new(major, minor))
    }
}

impl Serialize for ProtocolVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProtocolVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================
// Tests
// ============================================
