// ============================================
// File: crates/sigil-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Every primitive the SIGMA exchange and the delegation sub-protocol
//! need, built on audited RustCrypto / dalek implementations.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`keys`]: Ed25519 identities, X25519 ephemerals, symmetric keys
//! - [`commitment`]: public hash binding an identity key and metadata
//! - [`kdf`]: HKDF-SHA256 derivation of the SIGMA key pair
//! - [`aead`]: AES-256-GCM sealing with random nonces
//! - [`sigma`]: transcript signing data and identity MACs
//!
//! ## Cryptographic Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Prover                                        Verifier     │
//! │    │  X (X25519) [+ commitment] ─────────────────►  │       │
//! │    │                                              │       │
//! │    │  ◄──── Y, id_V, meta, Sig_V(X,Y,sid), MAC_km(id_V)   │
//! │    │                                              │       │
//! │    │  check H(id_V, meta) == commitment           │       │
//! │    │  (km, ks) = HKDF(X25519(x, Y), X, Y)         │       │
//! │    │                                              │       │
//! │    │  id_P, Sig_P(Y,X,sid), MAC_km(id_P),         │       │
//! │    │  AEAD_ks(extra) ─────────────────────────────►│       │
//! │    │                                              │       │
//! │    │  ◄──────────────── verdict [+ AEAD_ks(extra)] │       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER roll your own crypto
//! - ALL secret keys implement Zeroize
//! - Changing any label below is a wire-breaking change
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

pub mod aead;
pub mod commitment;
pub mod kdf;
pub mod keys;
pub mod sigma;

pub use aead::{AeadCipher, AesGcmCipher};
pub use commitment::Commitment;
pub use kdf::{derive_sigma_keys, MacKey, SigmaKeys};
pub use keys::{EphemeralKeyPair, IdentityKeyPair, IdentityPublicKey, SharedKey};

// ============================================
// Constants
// ============================================

/// Size of Ed25519 public key in bytes.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of Ed25519 signature in bytes.
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// Size of X25519 public key in bytes.
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of an AES-256-GCM key in bytes.
pub const AES_KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce in bytes.
pub const AES_GCM_NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes.
pub const AES_GCM_TAG_SIZE: usize = 16;

/// Size of an HMAC-SHA256 tag in bytes.
pub const MAC_SIZE: usize = 32;

/// Size of a commitment in bytes.
pub const COMMITMENT_SIZE: usize = 32;

/// Domain label hashed in front of every commitment.
pub const COMMITMENT_DOMAIN: &[u8] = b"sigil-commitment-v1";

/// HKDF salt for SIGMA key derivation.
pub const SIGMA_HKDF_SALT: &[u8] = b"sigil-sigma-v1";

/// HKDF info prefix for SIGMA key derivation.
pub const SIGMA_HKDF_INFO: &[u8] = b"sigil-sigma-keys";
