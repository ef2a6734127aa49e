// ============================================
// File: crates/sigil-core/src/lib.rs
// ============================================
//! # Sigil Core - Protocol & Cryptography Library
//!
//! ## Creation Reason
//! Everything the SIGMA exchange needs that does not touch I/O:
//! primitives, transcript layout, wire messages and their codec.
//!
//! ## Main Functionality
//!
//! ### Crypto Module ([`crypto`])
//! - Ed25519 identities, X25519 ephemerals, AES-256-GCM shared keys
//! - Commitments, HKDF key schedule, identity MACs
//!
//! ### Protocol Module ([`protocol`])
//! - Tagged JSON envelope, versioned extra data
//! - `Codec` trait and `JsonCodec`
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                sigil-agent                          │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │    sigil-core  ◄──     sigil-transport              │
//! │    You are here               │                     │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │             sigil-common                            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Guarantees
//! - **Authenticity**: Ed25519 transcript signatures + HMAC identity MACs
//! - **Identity binding**: SHA-256 commitments checked before any key is trusted
//! - **Forward Secrecy**: X25519 ephemeral keys per run
//! - **Confidentiality/Integrity**: AES-256-GCM for extra data and delegation
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL cryptographic code uses audited RustCrypto / dalek crates
//! - ALL secret keys implement Zeroize
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod error;
pub mod protocol;

pub use crypto::{
    AeadCipher, AesGcmCipher, Commitment, EphemeralKeyPair, IdentityKeyPair, IdentityPublicKey,
    SharedKey,
};
pub use error::{CoreError, Result};
pub use protocol::{Codec, Envelope, ExtraData, JsonCodec, ProtocolVersion};
