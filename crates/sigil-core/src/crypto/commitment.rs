// ============================================
// File: crates/sigil-core/src/crypto/commitment.rs
// ============================================
//! # Identity Commitments
//!
//! A commitment is the public hash a prover stores for every service or
//! terminal it trusts. The far end proves its identity by presenting the
//! key and metadata that hash to it.
//!
//! ```text
//! commitment = SHA-256("sigil-commitment-v1" || pk(32) || len(meta) u32 BE || meta)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::keys::IdentityPublicKey;
use super::{COMMITMENT_DOMAIN, COMMITMENT_SIZE};
use crate::error::{CoreError, Result};

/// 32-byte commitment to an identity key plus metadata.
///
/// Displays and serializes as lowercase hex; equality is constant time.
///
/// # Example
/// ```
/// use sigil_core::crypto::{Commitment, IdentityKeyPair};
///
/// let identity = IdentityKeyPair::generate();
/// let c = Commitment::derive(&identity.public_key(), b"front door");
/// let parsed: Commitment = c.to_string().parse().unwrap();
/// assert_eq!(c, parsed);
/// ```
#[derive(Clone, Copy)]
pub struct Commitment([u8; COMMITMENT_SIZE]);

impl Commitment {
    /// Computes the commitment for an identity key and its metadata.
    #[must_use]
    pub fn derive(identity: &IdentityPublicKey, metadata: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(COMMITMENT_DOMAIN);
        hasher.update(identity.as_bytes());
        hasher.update((metadata.len() as u32).to_be_bytes());
        hasher.update(metadata);
        Self(hasher.finalize().into())
    }

    /// Wraps raw commitment bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; COMMITMENT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; COMMITMENT_SIZE] {
        &self.0
    }

    /// First eight hex digits, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Checks that `identity` and `metadata` hash to this commitment.
    ///
    /// # Errors
    /// `CommitmentMismatch` otherwise.
    pub fn verify(&self, identity: &IdentityPublicKey, metadata: &[u8]) -> Result<()> {
        let actual = Self::derive(identity, metadata);
        if actual == *self {
            Ok(())
        } else {
            Err(CoreError::CommitmentMismatch {
                expected: self.to_string(),
                actual: actual.to_string(),
            })
        }
    }
}

impl PartialEq for Commitment {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Commitment {}

impl std::hash::Hash for Commitment {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({}...)", self.short())
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Commitment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; COMMITMENT_SIZE];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|e| CoreError::malformed(format!("commitment: {e}")))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Commitment {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
