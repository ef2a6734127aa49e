// ============================================
// File: crates/sigil-agent/src/engine/run_token.rs
// ============================================
//! # Run Tokens
//!
//! ## Creation Reason
//! A run whose result nobody wants any more must stop at its next stage
//! and report `Cancelled`. Each run carries its own [`RunToken`], handed
//! to the prover and checked by it; cancelling one token leaves every
//! other run alone.
//!
//! ## Main Functionality
//! - `RunToken::cancel`: stops the run holding this token (and its clones)
//! - `RunGeneration::begin`: issues an independent token
//! - `RunGeneration::invalidate`: stops every token issued so far
//!
//! ## ⚠️ Important Note for Next Developer
//! - `begin` must not touch the generation; concurrent runs from one
//!   `Authenticator` share the same `RunGeneration`
//! - The prover checks its token before each stage, not while blocked
//!   on I/O; a cancelled run notices at the next stage boundary
//!
//! ## Last Modified
//! v0.1.0 - Initial cancellation support
//! v0.1.1 - Per-run tokens; only `invalidate` affects other runs

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::ProtocolFailure;

/// Issues run tokens and can invalidate all of them at once.
#[derive(Debug, Clone, Default)]
pub struct RunGeneration {
    current: Arc<AtomicU64>,
}

impl RunGeneration {
    /// Creates a counter at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a token for one run. Other tokens are unaffected.
    #[must_use]
    pub fn begin(&self) -> RunToken {
        RunToken {
            generation: self.current.load(Ordering::Acquire),
            current: Arc::clone(&self.current),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every token issued so far stale.
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }

    /// Current generation number.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

/// Token held by one protocol run. Clones share the cancel flag, so the
/// caller keeps a clone to cancel the run it handed the original to.
#[derive(Debug, Clone)]
pub struct RunToken {
    generation: u64,
    current: Arc<AtomicU64>,
    cancelled: Arc<AtomicBool>,
}

impl RunToken {
    /// A token only its holders can cancel.
    #[must_use]
    pub fn detached() -> Self {
        RunGeneration::new().begin()
    }

    /// Generation this token was issued in.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancels the run holding this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` until the token is cancelled or its generation is
    /// invalidated.
    #[must_use]
    pub fn is_current(&self) -> bool {
        !self.cancelled.load(Ordering::Acquire)
            && self.current.load(Ordering::Acquire) == self.generation
    }

    /// Fails with `Cancelled` if the token is no longer current.
    ///
    /// # Errors
    /// `ProtocolFailure::Cancelled`.
    pub fn check(&self) -> Result<(), ProtocolFailure> {
        if self.is_current() {
            Ok(())
        } else {
            Err(ProtocolFailure::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_does_not_supersede() {
        let generation = RunGeneration::new();
        let first = generation.begin();
        let second = generation.begin();
        assert!(first.is_current());
        assert!(second.is_current());
        assert_eq!(generation.current(), 0);
    }

    #[test]
    fn test_cancel_stops_only_that_run() {
        let generation = RunGeneration::new();
        let first = generation.begin();
        let second = generation.begin();
        let handle = first.clone();

        handle.cancel();
        assert!(matches!(first.check(), Err(ProtocolFailure::Cancelled)));
        assert!(second.check().is_ok());
    }

    #[test]
    fn test_invalidate_stops_every_issued_token() {
        let generation = RunGeneration::new();
        let a = generation.begin();
        let b = generation.begin();
        generation.invalidate();
        assert!(a.check().is_err());
        assert!(b.check().is_err());

        let fresh = generation.begin();
        assert!(fresh.is_current());
        assert_eq!(fresh.generation(), 1);
    }

    #[test]
    fn test_detached() {
        assert!(RunToken::detached().is_current());
    }
}
