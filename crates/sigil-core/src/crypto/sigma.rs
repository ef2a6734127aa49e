// ============================================
// File: crates/sigil-core/src/crypto/sigma.rs
// ============================================
//! # SIGMA Transcript Cryptography
//!
//! ## Creation Reason
//! The bytes each side signs and MACs during the exchange. Both roles use
//! these helpers so the prover and verifier can never disagree on layout.
//!
//! ## Signed Data
//! ```text
//! verifier: "sigil-verifier" || major || minor || X(32) || Y(32) || len(sid) u16 BE || sid
//! prover:   "sigil-prover"   || major || minor || Y(32) || X(32) || len(sid) u16 BE || sid
//! ```
//!
//! ## Identity MAC
//! ```text
//! HMAC-SHA256(km, role || identity(32) || len(meta) u32 BE || meta)
//! ```
//!
//! ## Verification Order (prover side)
//! 1. Commitment matches the trusted value
//! 2. Signature over the transcript
//! 3. Identity MAC under `km`
//!
//! A failure at any step means the counterpart is not who the commitment
//! says it is.
//!
//! ## Last Modified
//! v0.1.0 - Initial SIGMA helpers

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use super::commitment::Commitment;
use super::kdf::MacKey;
use super::keys::IdentityPublicKey;
use super::{MAC_SIZE, X25519_PUBLIC_KEY_SIZE};
use crate::error::{CoreError, Result};
use crate::protocol::ProtocolVersion;

type HmacSha256 = Hmac<Sha256>;

// ============================================
// Labels
// ============================================

/// Domain label for the verifier's transcript signature.
pub const VERIFIER_SIGN_LABEL: &[u8] = b"sigil-verifier";

/// Domain label for the prover's transcript signature.
pub const PROVER_SIGN_LABEL: &[u8] = b"sigil-prover";

/// Role label MACed with the verifier identity.
pub const VERIFIER_MAC_LABEL: &[u8] = b"verifier";

/// Role label MACed with the prover identity.
pub const PROVER_MAC_LABEL: &[u8] = b"prover";

// ============================================
// Signing Data
// ============================================

fn sign_data(
    label: &[u8],
    version: ProtocolVersion,
    first: &[u8; X25519_PUBLIC_KEY_SIZE],
    second: &[u8; X25519_PUBLIC_KEY_SIZE],
    session_id: &str,
) -> Vec<u8> {
    let sid = session_id.as_bytes();
    let mut data = Vec::with_capacity(label.len() + 2 + X25519_PUBLIC_KEY_SIZE * 2 + 2 + sid.len());
    data.extend_from_slice(label);
    data.push(version.major);
    data.push(version.minor);
    data.extend_from_slice(first);
    data.extend_from_slice(second);
    // VerifierSessionId caps ids at 128 bytes
    data.extend_from_slice(&(sid.len() as u16).to_be_bytes());
    data.extend_from_slice(sid);
    data
}

/// Bytes the verifier signs: its view of the transcript, `X` first.
#[must_use]
pub fn verifier_sign_data(
    version: ProtocolVersion,
    prover_ephemeral: &[u8; X25519_PUBLIC_KEY_SIZE],
    verifier_ephemeral: &[u8; X25519_PUBLIC_KEY_SIZE],
    session_id: &str,
) -> Vec<u8> {
    sign_data(VERIFIER_SIGN_LABEL, version, prover_ephemeral, verifier_ephemeral, session_id)
}

/// Bytes the prover signs: `Y` first, so neither signature can be
/// replayed as the other.
#[must_use]
pub fn prover_sign_data(
    version: ProtocolVersion,
    prover_ephemeral: &[u8; X25519_PUBLIC_KEY_SIZE],
    verifier_ephemeral: &[u8; X25519_PUBLIC_KEY_SIZE],
    session_id: &str,
) -> Vec<u8> {
    sign_data(PROVER_SIGN_LABEL, version, verifier_ephemeral, prover_ephemeral, session_id)
}

// ============================================
// Identity MACs
// ============================================

fn identity_mac_state(
    mac_key: &MacKey,
    role_label: &[u8],
    identity: &IdentityPublicKey,
    metadata: &[u8],
) -> Result<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key.as_bytes()).map_err(|_| {
        CoreError::KeyDerivation {
            reason: "HMAC key setup".into(),
        }
    })?;
    mac.update(role_label);
    mac.update(identity.as_bytes());
    mac.update(&(metadata.len() as u32).to_be_bytes());
    mac.update(metadata);
    Ok(mac)
}

/// Computes the identity MAC for `role_label`.
///
/// # Errors
/// `KeyDerivation` if the HMAC cannot be keyed (never for a 32-byte key).
pub fn identity_mac(
    mac_key: &MacKey,
    role_label: &[u8],
    identity: &IdentityPublicKey,
    metadata: &[u8],
) -> Result<[u8; MAC_SIZE]> {
    let mac = identity_mac_state(mac_key, role_label, identity, metadata)?;
    Ok(mac.finalize().into_bytes().into())
}

/// Verifies an identity MAC in constant time.
///
/// # Errors
/// `MacVerification` on mismatch (including wrong tag length).
pub fn verify_identity_mac(
    mac_key: &MacKey,
    role_label: &[u8],
    identity: &IdentityPublicKey,
    metadata: &[u8],
    tag: &[u8],
) -> Result<()> {
    identity_mac_state(mac_key, role_label, identity, metadata)?
        .verify_slice(tag)
        .map_err(|_| CoreError::MacVerification)
}

// ============================================
// Proof Checks
// ============================================

/// Everything the prover needs to judge a `verifier_proof` message.
#[derive(Debug)]
pub struct VerifierProofCheck<'a> {
    /// Commitment the prover trusts for this counterpart
    pub expected_commitment: &'a Commitment,
    /// Identity key presented by the verifier
    pub verifier_identity: &'a IdentityPublicKey,
    /// Metadata presented alongside the identity
    pub metadata: &'a [u8],
    /// Signature over [`verifier_sign_data`]
    pub signature: &'a [u8],
    /// Identity MAC under `km`
    pub mac: &'a [u8],
    /// Output of [`verifier_sign_data`] for this run
    pub signed_data: &'a [u8],
    /// `km` for this run
    pub mac_key: &'a MacKey,
}

/// Checks commitment, then signature, then MAC.
///
/// # Errors
/// `CommitmentMismatch`, `SignatureVerification` or `MacVerification`.
pub fn check_verifier_proof(check: &VerifierProofCheck<'_>) -> Result<()> {
    check
        .expected_commitment
        .verify(check.verifier_identity, check.metadata)?;
    check
        .verifier_identity
        .verify_slice(check.signed_data, check.signature)?;
    verify_identity_mac(
        check.mac_key,
        VERIFIER_MAC_LABEL,
        check.verifier_identity,
        check.metadata,
        check.mac,
    )?;
    debug!(
        commitment = %check.expected_commitment.short(),
        "Verifier proof accepted"
    );
    Ok(())
}

/// Checks the prover's signature and MAC (verifier side).
///
/// # Errors
/// `SignatureVerification` or `MacVerification`.
pub fn check_prover_proof(
    prover_identity: &IdentityPublicKey,
    signature: &[u8],
    mac: &[u8],
    signed_data: &[u8],
    mac_key: &MacKey,
) -> Result<()> {
    prover_identity.verify_slice(signed_data, signature)?;
    verify_identity_mac(mac_key, PROVER_MAC_LABEL, prover_identity, &[], mac)
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::IdentityKeyPair;

    const X: [u8; 32] = [0x11; 32];
    const Y: [u8; 32] = [0x22; 32];

    fn mac_key() -> MacKey {
        MacKey::from_bytes([0x33; 32])
    }

    #[test]
    fn test_sign_data_roles_distinct() {
        let v = ProtocolVersion::CURRENT;
        assert_ne!(
            verifier_sign_data(v, &X, &Y, "sid"),
            prover_sign_data(v, &X, &Y, "sid")
        );
        assert_ne!(
            verifier_sign_data(v, &X, &Y, "sid-1"),
            verifier_sign_data(v, &X, &Y, "sid-2")
        );
    }

    #[test]
    fn test_identity_mac_roundtrip() {
        let id = IdentityKeyPair::generate().public_key();
        let tag = identity_mac(&mac_key(), VERIFIER_MAC_LABEL, &id, b"meta").unwrap();

        assert!(verify_identity_mac(&mac_key(), VERIFIER_MAC_LABEL, &id, b"meta", &tag).is_ok());
        assert!(matches!(
            verify_identity_mac(&mac_key(), PROVER_MAC_LABEL, &id, b"meta", &tag),
            Err(CoreError::MacVerification)
        ));
        assert!(verify_identity_mac(&mac_key(), VERIFIER_MAC_LABEL, &id, b"meta", &tag[..31]).is_err());
    }

    fn valid_proof(identity: &IdentityKeyPair, metadata: &[u8]) -> (Commitment, Vec<u8>, [u8; 64], [u8; 32]) {
        let commitment = Commitment::derive(&identity.public_key(), metadata);
        let data = verifier_sign_data(ProtocolVersion::CURRENT, &X, &Y, "sid");
        let signature = identity.sign(&data);
        let mac = identity_mac(&mac_key(), VERIFIER_MAC_LABEL, &identity.public_key(), metadata).unwrap();
        (commitment, data, signature, mac)
    }

    #[test]
    fn test_check_verifier_proof_accepts_valid() {
        let identity = IdentityKeyPair::generate();
        let (commitment, data, signature, mac) = valid_proof(&identity, b"meta");
        let key = mac_key();

        let check = VerifierProofCheck {
            expected_commitment: &commitment,
            verifier_identity: &identity.public_key(),
            metadata: b"meta",
            signature: &signature,
            mac: &mac,
            signed_data: &data,
            mac_key: &key,
        };
        assert!(check_verifier_proof(&check).is_ok());
    }

    #[test]
    fn test_check_verifier_proof_failure_order() {
        let identity = IdentityKeyPair::generate();
        let impostor = IdentityKeyPair::generate();
        let (commitment, data, signature, mac) = valid_proof(&identity, b"meta");
        let key = mac_key();

        // Wrong identity: commitment check fires first.
        let check = VerifierProofCheck {
            expected_commitment: &commitment,
            verifier_identity: &impostor.public_key(),
            metadata: b"meta",
            signature: &signature,
            mac: &mac,
            signed_data: &data,
            mac_key: &key,
        };
        assert!(matches!(
            check_verifier_proof(&check),
            Err(CoreError::CommitmentMismatch { .. })
        ));

        // Right identity, signature over another transcript.
        let other = verifier_sign_data(ProtocolVersion::CURRENT, &Y, &X, "sid");
        let check = VerifierProofCheck {
            verifier_identity: &identity.public_key(),
            signed_data: &other,
            ..check
        };
        assert!(matches!(
            check_verifier_proof(&check),
            Err(CoreError::SignatureVerification)
        ));

        // Good signature, MAC under a different key.
        let wrong_key = MacKey::from_bytes([0x44; 32]);
        let check = VerifierProofCheck {
            signed_data: &data,
            mac_key: &wrong_key,
            ..check
        };
        assert!(matches!(
            check_verifier_proof(&check),
            Err(CoreError::MacVerification)
        ));
    }

    #[test]
    fn test_check_prover_proof() {
        let prover = IdentityKeyPair::generate();
        let data = prover_sign_data(ProtocolVersion::CURRENT, &X, &Y, "sid");
        let signature = prover.sign(&data);
        let mac = identity_mac(&mac_key(), PROVER_MAC_LABEL, &prover.public_key(), &[]).unwrap();

        assert!(check_prover_proof(&prover.public_key(), &signature, &mac, &data, &mac_key()).is_ok());
        assert!(check_prover_proof(&prover.public_key(), &signature, &[0u8; 32], &data, &mac_key()).is_err());
    }
}
