// ============================================
// File: crates/sigil-common/src/time.rs
// ============================================
//! # Time Utilities
//!
//! ## Creation Reason
//! Pairings, terminals and persisted sessions are stamped with wall-clock
//! time; this module gives them one representation.
//!
//! ## Last Modified
//! v0.1.0 - Initial time utilities
//! v0.1.1 - Dropped unused age helpers

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ============================================
// Timestamp
// ============================================

/// Unix timestamp in seconds.
///
/// # Example
/// ```
/// use sigil_common::time::Timestamp;
///
/// let now = Timestamp::now();
/// assert!(now.as_secs() > 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp for the current time.
    ///
    /// A clock set before the epoch yields `0` rather than panicking.
    #[must_use]
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self(i64::try_from(secs).unwrap_or(i64::MAX))
    }

    /// Returns the Unix timestamp in seconds.
    #[must_use]
    pub const fn as_secs(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================
// Tests
// ============================================
