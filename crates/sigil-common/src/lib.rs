// ============================================
// File: crates/sigil-common/src/lib.rs
// ============================================
//! # Sigil Common - Shared Types
//!
//! ## Creation Reason
//! Holds the small set of types every Sigil crate agrees on: the base
//! error enum, wall-clock timestamps, and the identifiers that travel in
//! protocol messages.
//!
//! ## Main Functionality
//! - [`error`]: `CommonError` and the `Result` alias
//! - [`time`]: `Timestamp` (Unix seconds)
//! - [`types`]: `SequenceNumber`, `VerifierSessionId`
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                sigil-agent                          │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │    sigil-core          sigil-transport              │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │             sigil-common  ◄── You are here          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Leaf crate: no internal dependencies, keep external ones minimal
//! - Nothing here may carry key material
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;

pub use error::{CommonError, Result};
pub use time::Timestamp;
pub use types::{SequenceNumber, VerifierSessionId};
