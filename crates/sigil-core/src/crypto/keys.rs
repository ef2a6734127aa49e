// ============================================
// File: crates/sigil-core/src/crypto/keys.rs
// ============================================
//! # Cryptographic Key Types
//!
//! ## Creation Reason
//! Key types with the properties the protocol relies on: secrets zeroed
//! on drop, constant-time comparison, redacted `Debug`.
//!
//! ## Key Lifecycle
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  IdentityKeyPair (long-term, Ed25519)                      │
//! │  ├─ Created per pairing, persisted by the credential store │
//! │  └─ Signs the SIGMA transcript                             │
//! │                                                            │
//! │  EphemeralKeyPair (per run, X25519)                        │
//! │  ├─ Fresh for every protocol run                           │
//! │  └─ Consumed by `exchange`                                 │
//! │                                                            │
//! │  SharedKey (per session, AES-256-GCM)                      │
//! │  ├─ Derived from the exchange                              │
//! │  └─ Seals extra data and delegation messages               │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Private keys are never logged; `Debug` shows a truncated public key
//! - `EphemeralKeyPair::exchange` consumes self so the secret is single use
//!
//! ## Last Modified
//! v0.1.0 - Initial key type definitions

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{AES_KEY_SIZE, ED25519_PUBLIC_KEY_SIZE, ED25519_SIGNATURE_SIZE, X25519_PUBLIC_KEY_SIZE};
use crate::error::{CoreError, Result};

// ============================================
// IdentityKeyPair (Ed25519)
// ============================================

/// Long-term Ed25519 identity key pair.
///
/// Cloneable so a pairing can be handed to the engine and written back to
/// the credential store afterwards.
///
/// # Example
/// ```
/// use sigil_core::crypto::IdentityKeyPair;
///
/// let identity = IdentityKeyPair::generate();
/// let signature = identity.sign(b"transcript");
/// assert!(identity.public_key().verify(b"transcript", &signature).is_ok());
/// ```
#[derive(Clone)]
pub struct IdentityKeyPair {
    signing_key: SigningKey,
}

impl IdentityKeyPair {
    /// Generates a new random identity key pair.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restores an identity key pair from its 32-byte seed.
    ///
    /// # Errors
    /// `InvalidKey` if `bytes` is not 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut seed: [u8; 32] = bytes.try_into().map_err(|_| {
            CoreError::invalid_key(format!(
                "Ed25519 seed must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Ok(Self { signing_key })
    }

    /// Returns the public key component.
    #[must_use]
    pub fn public_key(&self) -> IdentityPublicKey {
        IdentityPublicKey(self.signing_key.verifying_key())
    }

    /// Returns the raw public key bytes.
    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; ED25519_PUBLIC_KEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Signs a message using this identity.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; ED25519_SIGNATURE_SIZE] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Exports the private seed for persistence.
    #[must_use]
    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

// ============================================
// IdentityPublicKey
// ============================================

/// Public component of an Ed25519 identity key.
///
/// Serializes as base64 in human-readable formats.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityPublicKey(VerifyingKey);

impl IdentityPublicKey {
    /// Creates a public key from raw bytes.
    ///
    /// # Errors
    /// `InvalidKey` if the bytes are not a valid curve point.
    pub fn from_bytes(bytes: &[u8; ED25519_PUBLIC_KEY_SIZE]) -> Result<Self> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| CoreError::invalid_key("invalid Ed25519 public key"))
    }

    /// Creates a public key from a slice of unknown length.
    ///
    /// # Errors
    /// `InvalidKey` on wrong length or invalid point.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; ED25519_PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CoreError::invalid_key(format!(
                "Ed25519 public key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Self::from_bytes(&arr)
    }

    /// Returns the raw public key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ED25519_PUBLIC_KEY_SIZE] {
        self.0.as_bytes()
    }

    /// Returns the raw public key bytes (owned).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ED25519_PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Verifies a signature against this public key.
    ///
    /// # Errors
    /// `SignatureVerification` if verification fails.
    pub fn verify(&self, message: &[u8], signature: &[u8; ED25519_SIGNATURE_SIZE]) -> Result<()> {
        let sig = Signature::from_bytes(signature);
        self.0
            .verify(message, &sig)
            .map_err(|_| CoreError::SignatureVerification)
    }

    /// Verifies a signature received off the wire, where the length is
    /// not yet known to be 64.
    ///
    /// # Errors
    /// `SignatureVerification` on wrong length or invalid signature.
    pub fn verify_slice(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let sig: &[u8; ED25519_SIGNATURE_SIZE] = signature
            .try_into()
            .map_err(|_| CoreError::SignatureVerification)?;
        self.verify(message, sig)
    }
}

impl fmt::Debug for IdentityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.as_bytes();
        write!(
            f,
            "IdentityPublicKey({:02x}{:02x}{:02x}{:02x}...)",
            bytes[0], bytes[1], bytes[2], bytes[3]
        )
    }
}

impl fmt::Display for IdentityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", BASE64.encode(self.0.as_bytes()))
    }
}

impl Serialize for IdentityPublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&BASE64.encode(self.0.as_bytes()))
        } else {
            serializer.serialize_bytes(self.0.as_bytes())
        }
    }
}

impl<'de> Deserialize<'de> for IdentityPublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            BASE64.decode(s).map_err(serde::de::Error::custom)?
        } else {
            <Vec<u8>>::deserialize(deserializer)?
        };
        Self::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

// ============================================
// EphemeralKeyPair (X25519)
// ============================================

/// Ephemeral X25519 key pair, one per protocol run.
///
/// # Example
/// ```
/// use sigil_core::crypto::EphemeralKeyPair;
///
/// let prover = EphemeralKeyPair::generate();
/// let verifier = EphemeralKeyPair::generate();
/// let (x, y) = (prover.public_key_bytes(), verifier.public_key_bytes());
///
/// let a = prover.exchange(&y).unwrap();
/// let b = verifier.exchange(&x).unwrap();
/// assert_eq!(*a, *b);
/// ```
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    /// Generates a new random ephemeral key pair.
    #[must_use]
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Returns the public key bytes.
    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; X25519_PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Performs the Diffie-Hellman exchange, consuming the secret.
    ///
    /// # Errors
    /// `KeyExchange` if the peer sent a low-order point (the shared secret
    /// would be all zeros).
    pub fn exchange(self, peer_public: &[u8; X25519_PUBLIC_KEY_SIZE]) -> Result<Zeroizing<[u8; 32]>> {
        let peer = X25519PublicKey::from(*peer_public);
        let shared = self.secret.diffie_hellman(&peer);
        if !shared.was_contributory() {
            return Err(CoreError::KeyExchange {
                reason: "non-contributory peer public key".into(),
            });
        }
        Ok(Zeroizing::new(shared.to_bytes()))
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.public.as_bytes();
        f.debug_struct("EphemeralKeyPair")
            .field(
                "public",
                &format_args!("{:02x}{:02x}{:02x}{:02x}...", bytes[0], bytes[1], bytes[2], bytes[3]),
            )
            .finish_non_exhaustive()
    }
}

// ============================================
// SharedKey
// ============================================

/// Symmetric AES-256-GCM key shared by the two parties of a session.
///
/// This is the session's derived shared key and, for a terminal, the
/// "terminal shared key" used to seal delegation messages.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; AES_KEY_SIZE]);

impl SharedKey {
    /// Creates a shared key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; AES_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a shared key from a slice.
    ///
    /// # Errors
    /// `InvalidKey` if `bytes` is not 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; AES_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CoreError::invalid_key(format!("shared key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; AES_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedKey([REDACTED])")
    }
}

impl PartialEq for SharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SharedKey {}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_keypair_generation() {
        let kp1 = IdentityKeyPair::generate();
        let kp2 = IdentityKeyPair::generate();
        assert_ne!(kp1.public_key_bytes(), kp2.public_key_bytes());
    }

    #[test]
    fn test_identity_sign_verify() {
        let kp = IdentityKeyPair::generate();
        let signature = kp.sign(b"test message");

        assert!(kp.public_key().verify(b"test message", &signature).is_ok());
        assert!(matches!(
            kp.public_key().verify(b"wrong message", &signature),
            Err(CoreError::SignatureVerification)
        ));
    }

    #[test]
    fn test_verify_slice_rejects_short_signature() {
        let kp = IdentityKeyPair::generate();
        let signature = kp.sign(b"m");
        assert!(kp.public_key().verify_slice(b"m", &signature).is_ok());
        assert!(kp.public_key().verify_slice(b"m", &signature[..63]).is_err());
    }

    #[test]
    fn test_identity_keypair_restore() {
        let kp = IdentityKeyPair::generate();
        let restored = IdentityKeyPair::from_bytes(kp.to_bytes().as_slice()).unwrap();
        assert_eq!(kp.public_key_bytes(), restored.public_key_bytes());

        assert!(IdentityKeyPair::from_bytes(&[0u8; 31]).is_err());
    }

    #[test]
    fn test_ephemeral_key_exchange() {
        let alice = EphemeralKeyPair::generate();
        let bob = EphemeralKeyPair::generate();
        let alice_pub = alice.public_key_bytes();
        let bob_pub = bob.public_key_bytes();

        let alice_shared = alice.exchange(&bob_pub).unwrap();
        let bob_shared = bob.exchange(&alice_pub).unwrap();
        assert_eq!(*alice_shared, *bob_shared);
    }

    #[test]
    fn test_ephemeral_rejects_low_order_point() {
        let alice = EphemeralKeyPair::generate();
        let result = alice.exchange(&[0u8; 32]);
        assert!(matches!(result, Err(CoreError::KeyExchange { .. })));
    }

    #[test]
    fn test_shared_key_debug_redacted() {
        let key = SharedKey::from_bytes([0x42; 32]);
        assert_eq!(format!("{key:?}"), "SharedKey([REDACTED])");
        assert_eq!(key, SharedKey::from_bytes([0x42; 32]));
        assert_ne!(key, SharedKey::from_bytes([0x43; 32]));
    }

    #[test]
    fn test_identity_public_key_serialization() {
        let public = IdentityKeyPair::generate().public_key();
        let json = serde_json::to_string(&public).unwrap();
        let restored: IdentityPublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(public, restored);
    }
}
