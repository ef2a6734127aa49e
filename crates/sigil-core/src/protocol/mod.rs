// ============================================
// File: crates/sigil-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Main Functionality
//! - [`messages`]: the tagged [`Envelope`] and its payloads
//! - [`codec`]: structural (de)serialization
//! - [`version`]: `major.minor` versioning
//!
//! ## Wire Format Principles
//! - JSON objects tagged by `"type"`
//! - Only field presence and meaning are a contract, not byte layout
//! - Version travels in `prover_commit` and is signed by both sides
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod codec;
pub mod messages;
pub mod version;

pub use codec::{Codec, JsonCodec, DEFAULT_MAX_MESSAGE_SIZE};
pub use messages::{
    Envelope, ExtraData, ProverCommit, ProverProof, Reauth, ReauthState, SealedPayload, Verdict,
    VerifierProof,
};
pub use version::ProtocolVersion;
