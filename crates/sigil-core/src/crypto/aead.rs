// ============================================
// File: crates/sigil-core/src/crypto/aead.rs
// ============================================
//! # Authenticated Encryption
//!
//! ## Creation Reason
//! Extra data inside the SIGMA exchange and every delegation message are
//! sealed with AES-256-GCM under a 32-byte [`SharedKey`].
//!
//! ## Sealed Format
//! ```text
//! ┌──────────────────────┬───────────────────────────────┐
//! │ Nonce (12 bytes)     │ Ciphertext || Tag (16 bytes)  │
//! └──────────────────────┴───────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Nonces are random per message; a key here seals at most a handful of
//!   messages, far below the 2^32 random-nonce bound
//! - `open` never returns partial plaintext: tag failure is `Decryption`
//!
//! ## Last Modified
//! v0.1.0 - AES-256-GCM sealing

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use super::keys::SharedKey;
use super::{AES_GCM_NONCE_SIZE, AES_GCM_TAG_SIZE};
use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Bytes added to every sealed message (nonce + tag).
pub const SEAL_OVERHEAD: usize = AES_GCM_NONCE_SIZE + AES_GCM_TAG_SIZE;

// ============================================
// AeadCipher Trait
// ============================================

/// Authenticated encryption with associated data.
///
/// A seam so the engine and delegation code can be exercised with another
/// cipher suite without touching call sites.
pub trait AeadCipher: Send + Sync {
    /// Encrypts `plaintext`, binding `aad`, and returns `nonce || ciphertext`.
    ///
    /// # Errors
    /// `Encryption` if the cipher rejects the input.
    fn seal(&self, key: &SharedKey, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    /// Reverses [`seal`](Self::seal).
    ///
    /// # Errors
    /// - `MalformedMessage`: input shorter than the overhead
    /// - `Decryption`: wrong key, wrong AAD, or tampered ciphertext
    fn open(&self, key: &SharedKey, sealed: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>>;

    /// Bytes added by [`seal`](Self::seal).
    fn overhead(&self) -> usize;
}

// ============================================
// AesGcmCipher
// ============================================

/// AES-256-GCM with a random 96-bit nonce.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmCipher;

impl AesGcmCipher {
    /// Creates a new instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AeadCipher for AesGcmCipher {
    fn seal(&self, key: &SharedKey, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CoreError::Encryption {
            context: "AES-256-GCM key setup".into(),
        })?;

        let mut nonce = [0u8; AES_GCM_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
            .map_err(|_| CoreError::Encryption {
                context: "AES-256-GCM seal".into(),
            })?;

        let mut out = Vec::with_capacity(AES_GCM_NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, key: &SharedKey, sealed: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(CoreError::malformed(format!(
                "sealed payload of {} bytes is shorter than {SEAL_OVERHEAD}",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(AES_GCM_NONCE_SIZE);

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CoreError::Decryption)?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|_| CoreError::Decryption)?;
        Ok(Zeroizing::new(plaintext))
    }

    fn overhead(&self) -> usize {
        SEAL_OVERHEAD
    }
}

// ============================================
// Convenience Functions
// ============================================

/// Seals with [`AesGcmCipher`].
///
/// # Errors
/// See [`AeadCipher::seal`].
pub fn seal(key: &SharedKey, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    AesGcmCipher.seal(key, plaintext, aad)
}

/// Opens with [`AesGcmCipher`].
///
/// # Errors
/// See [`AeadCipher::open`].
pub fn open(key: &SharedKey, sealed: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    AesGcmCipher.open(key, sealed, aad)
}

// ============================================
// Tests
// ============================================
