// ============================================
// File: crates/sigil-core/src/crypto/kdf.rs
// ============================================
//! # Key Derivation Functions
//!
//! ## Main Functionality
//! - `derive_sigma_keys`: splits one X25519 secret into the MAC key used
//!   for identity MACs and the session key used for AEAD
//! - `hkdf_expand`: generic HKDF-SHA256 helper
//!
//! ## Derivation
//! ```text
//! okm(64) = HKDF-SHA256(
//!     ikm:  X25519(x, Y),
//!     salt: "sigil-sigma-v1",
//!     info: "sigil-sigma-keys" || X || Y
//! )
//! mac_key     = okm[0..32]
//! session_key = okm[32..64]
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Nothing in this module may log key material, not even at trace level
//!
//! ## Last Modified
//! v0.1.0 - SIGMA key schedule

use std::fmt;

use hkdf::Hkdf;
use sha2::Sha256;
use tracing::trace;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::keys::SharedKey;
use super::{AES_KEY_SIZE, MAC_SIZE, SIGMA_HKDF_INFO, SIGMA_HKDF_SALT, X25519_PUBLIC_KEY_SIZE};
use crate::error::{CoreError, Result};

// ============================================
// MacKey
// ============================================

/// HMAC-SHA256 key authenticating identities inside the exchange.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MacKey([u8; MAC_SIZE]);

impl MacKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; MAC_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; MAC_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacKey([REDACTED])")
    }
}

// ============================================
// SigmaKeys
// ============================================

/// Both keys produced by one SIGMA run.
#[derive(Debug)]
pub struct SigmaKeys {
    /// Authenticates identities (`km`)
    pub mac_key: MacKey,
    /// Seals extra data, becomes the session's shared key (`ks`)
    pub session_key: SharedKey,
}

/// Derives `(km, ks)` from the X25519 output and both ephemeral publics.
///
/// # Arguments
/// * `shared_secret` - X25519 output
/// * `prover_ephemeral` - prover's ephemeral public `X`
/// * `verifier_ephemeral` - verifier's ephemeral public `Y`
///
/// # Errors
/// `KeyDerivation` if HKDF refuses the output length (cannot happen for 64 bytes).
pub fn derive_sigma_keys(
    shared_secret: &[u8; 32],
    prover_ephemeral: &[u8; X25519_PUBLIC_KEY_SIZE],
    verifier_ephemeral: &[u8; X25519_PUBLIC_KEY_SIZE],
) -> Result<SigmaKeys> {
    let mut info = Vec::with_capacity(SIGMA_HKDF_INFO.len() + X25519_PUBLIC_KEY_SIZE * 2);
    info.extend_from_slice(SIGMA_HKDF_INFO);
    info.extend_from_slice(prover_ephemeral);
    info.extend_from_slice(verifier_ephemeral);

    let okm = Zeroizing::new(hkdf_expand(
        shared_secret,
        SIGMA_HKDF_SALT,
        &info,
        MAC_SIZE + AES_KEY_SIZE,
    )?);

    let mut mac_key = [0u8; MAC_SIZE];
    mac_key.copy_from_slice(&okm[..MAC_SIZE]);
    let mut session_key = [0u8; AES_KEY_SIZE];
    session_key.copy_from_slice(&okm[MAC_SIZE..]);

    trace!(info_len = info.len(), "Derived SIGMA key pair");

    Ok(SigmaKeys {
        mac_key: MacKey::from_bytes(mac_key),
        session_key: SharedKey::from_bytes(session_key),
    })
}

/// HKDF-SHA256 extract-and-expand to `output_len` bytes.
///
/// # Errors
/// `KeyDerivation` if `output_len` exceeds 255 * 32 bytes.
pub fn hkdf_expand(
    input_key_material: &[u8],
    salt: &[u8],
    info: &[u8],
    output_len: usize,
) -> Result<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), input_key_material);
    let mut output = vec![0u8; output_len];
    hk.expand(info, &mut output)
        .map_err(|_| CoreError::KeyDerivation {
            reason: format!("HKDF expansion failed for {output_len} bytes"),
        })?;
    Ok(output)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_sigma_keys_deterministic() {
        let secret = [0x42u8; 32];
        let x = [0x01u8; 32];
        let y = [0x02u8; 32];

        let k1 = derive_sigma_keys(&secret, &x, &y).unwrap();
        let k2 = derive_sigma_keys(&secret, &x, &y).unwrap();
        assert_eq!(k1.session_key, k2.session_key);
        assert_eq!(k1.mac_key.as_bytes(), k2.mac_key.as_bytes());
    }

    #[test]
    fn test_mac_and_session_keys_differ() {
        let keys = derive_sigma_keys(&[0x42u8; 32], &[1u8; 32], &[2u8; 32]).unwrap();
        assert_ne!(keys.mac_key.as_bytes(), keys.session_key.as_bytes());
    }

    #[test]
    fn test_ephemeral_order_matters() {
        let secret = [0x42u8; 32];
        let a = [0x01u8; 32];
        let b = [0x02u8; 32];

        let k1 = derive_sigma_keys(&secret, &a, &b).unwrap();
        let k2 = derive_sigma_keys(&secret, &b, &a).unwrap();
        assert_ne!(k1.session_key, k2.session_key);
    }

    #[test]
    fn test_hkdf_expand_limits() {
        let output = hkdf_expand(&[0x42u8; 32], b"salt", b"info", 64).unwrap();
        assert_eq!(output.len(), 64);
        assert!(hkdf_expand(&[0x42u8; 32], b"salt", b"info", 255 * 32 + 1).is_err());
    }
}
