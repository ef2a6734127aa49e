// ============================================
// File: crates/sigil-agent/src/engine/verifier.rs
// ============================================
//! # Verifier Engine
//!
//! ## Creation Reason
//! The counterpart of [`super::Prover`]: used by the `serve` command to
//! stand in for a service or terminal, and by tests to drive the prover
//! end to end.
//!
//! ## Main Functionality
//! - `Verifier::respond`: one full exchange over a proxy
//! - `VerifierPolicy`: accept/reject decision once the prover is proven
//!
//! ## ⚠️ Important Note for Next Developer
//! - A disclosed commitment that is not ours ends the run before any key
//!   material is produced
//! - A bad prover proof gets a reject verdict and `ProverAuthFailed`
//!
//! ## Last Modified
//! v0.1.0 - Initial verifier implementation

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use sigil_common::VerifierSessionId;
use sigil_core::crypto::aead;
use sigil_core::crypto::sigma::{
    check_prover_proof, identity_mac, prover_sign_data, verifier_sign_data, VERIFIER_MAC_LABEL,
};
use sigil_core::crypto::{
    derive_sigma_keys, Commitment, EphemeralKeyPair, IdentityKeyPair, IdentityPublicKey, SharedKey,
};
use sigil_core::protocol::{
    Envelope, ExtraData, ProtocolVersion, SealedPayload, Verdict, VerifierProof,
};

use super::proxy::Proxy;
use super::{extra_aad, PROVER_EXTRA_LABEL, VERIFIER_EXTRA_LABEL};
use crate::error::ProtocolFailure;

// ============================================
// VerifierPolicy
// ============================================

/// Decides whether a proven prover is admitted.
pub trait VerifierPolicy: Send + Sync {
    /// Called after the prover's signature and MAC verified.
    fn decide(&self, prover: &IdentityPublicKey, extra: Option<&ExtraData>) -> bool;
}

/// Admits every prover that proves its key.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl VerifierPolicy for AcceptAll {
    fn decide(&self, _prover: &IdentityPublicKey, _extra: Option<&ExtraData>) -> bool {
        true
    }
}

/// Admits only the listed prover identities.
#[derive(Debug, Default, Clone)]
pub struct AllowList {
    allowed: HashSet<IdentityPublicKey>,
}

impl AllowList {
    /// Builds the list from identities.
    pub fn new(allowed: impl IntoIterator<Item = IdentityPublicKey>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl VerifierPolicy for AllowList {
    fn decide(&self, prover: &IdentityPublicKey, _extra: Option<&ExtraData>) -> bool {
        self.allowed.contains(prover)
    }
}

impl<F> VerifierPolicy for F
where
    F: Fn(&IdentityPublicKey, Option<&ExtraData>) -> bool + Send + Sync,
{
    fn decide(&self, prover: &IdentityPublicKey, extra: Option<&ExtraData>) -> bool {
        self(prover, extra)
    }
}

// ============================================
// VerifierOutcome
// ============================================

/// Result of one verifier exchange.
#[derive(Debug, Clone)]
pub struct VerifierOutcome {
    /// Session id we assigned.
    pub session_id: VerifierSessionId,
    /// Session key, present only when accepted.
    pub shared_key: Option<SharedKey>,
    /// Identity the prover proved.
    pub prover_identity: IdentityPublicKey,
    /// Extra data the prover sent.
    pub prover_extra: Option<ExtraData>,
    /// Verdict we sent.
    pub accepted: bool,
}

// ============================================
// Verifier
// ============================================

/// Verifier role: long-term identity plus metadata.
pub struct Verifier {
    key_pair: IdentityKeyPair,
    metadata: Vec<u8>,
    commitment: Commitment,
    policy: Arc<dyn VerifierPolicy>,
    extra: Option<ExtraData>,
}

impl Verifier {
    /// Creates a verifier that accepts every proven prover.
    #[must_use]
    pub fn new(key_pair: IdentityKeyPair, metadata: Vec<u8>) -> Self {
        let commitment = Commitment::derive(&key_pair.public_key(), &metadata);
        Self {
            key_pair,
            metadata,
            commitment,
            policy: Arc::new(AcceptAll),
            extra: None,
        }
    }

    /// Replaces the admission policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn VerifierPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Extra data attached to accepting verdicts.
    #[must_use]
    pub fn with_extra(mut self, extra: ExtraData) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Commitment provers must trust to reach us.
    #[must_use]
    pub const fn commitment(&self) -> Commitment {
        self.commitment
    }

    /// Runs one exchange on `proxy`.
    ///
    /// # Errors
    /// - `ProtocolViolation`: bad version, foreign commitment, malformed message
    /// - `ProverAuthFailed`: prover signature or MAC invalid
    /// - `Transport`: channel failure
    pub async fn respond(&self, proxy: &mut Proxy) -> Result<VerifierOutcome, ProtocolFailure> {
        let commit = proxy
            .recv()
            .await?
            .into_prover_commit()
            .map_err(ProtocolFailure::from_prover_side)?;

        ProtocolVersion::CURRENT
            .require_compatible(&commit.version)
            .map_err(ProtocolFailure::from_prover_side)?;

        if let Some(requested) = commit.commitment {
            if requested != self.commitment {
                warn!(
                    requested = %requested.short(),
                    ours = %self.commitment.short(),
                    "Prover asked for a different identity"
                );
                return Err(ProtocolFailure::violation(format!(
                    "commitment {} is not served here",
                    requested.short()
                )));
            }
        }

        let x = commit.ephemeral;
        let ephemeral = EphemeralKeyPair::generate();
        let y = ephemeral.public_key_bytes();
        let session_id = VerifierSessionId::generate();

        let shared_secret = ephemeral
            .exchange(&x)
            .map_err(ProtocolFailure::from_prover_side)?;
        let keys = derive_sigma_keys(&shared_secret, &x, &y)
            .map_err(ProtocolFailure::from_prover_side)?;

        let identity = self.key_pair.public_key();
        let signature = self
            .key_pair
            .sign(&verifier_sign_data(commit.version, &x, &y, session_id.as_str()));
        let mac = identity_mac(&keys.mac_key, VERIFIER_MAC_LABEL, &identity, &self.metadata)
            .map_err(ProtocolFailure::from_prover_side)?;

        proxy
            .send(&Envelope::VerifierProof(VerifierProof {
                session_id: session_id.clone(),
                ephemeral: y,
                identity,
                metadata: self.metadata.clone(),
                signature: signature.to_vec(),
                mac: mac.to_vec(),
            }))
            .await?;
        debug!(session_id = %session_id, "Sent verifier proof");

        let proof = proxy
            .recv()
            .await?
            .into_prover_proof()
            .map_err(ProtocolFailure::from_prover_side)?;

        let signed = prover_sign_data(commit.version, &x, &y, session_id.as_str());
        if let Err(e) =
            check_prover_proof(&proof.identity, &proof.signature, &proof.mac, &signed, &keys.mac_key)
        {
            warn!(session_id = %session_id, error = %e, "Prover proof invalid");
            proxy
                .send(&Envelope::Verdict(Verdict {
                    accepted: false,
                    extra: None,
                }))
                .await?;
            return Err(ProtocolFailure::from_prover_side(e));
        }

        let prover_extra = match proof.extra {
            Some(sealed) => {
                let aad = extra_aad(PROVER_EXTRA_LABEL, session_id.as_str());
                let plain = aead::open(&keys.session_key, &sealed.ciphertext, &aad)
                    .map_err(|e| ProtocolFailure::violation(format!("prover extra: {e}")))?;
                Some(ExtraData::from_bytes(&plain).map_err(ProtocolFailure::from_prover_side)?)
            }
            None => None,
        };

        let accepted = self.policy.decide(&proof.identity, prover_extra.as_ref());

        let verdict_extra = match (&self.extra, accepted) {
            (Some(extra), true) => {
                let aad = extra_aad(VERIFIER_EXTRA_LABEL, session_id.as_str());
                let bytes = extra.to_bytes().map_err(ProtocolFailure::from_prover_side)?;
                let sealed = aead::seal(&keys.session_key, &bytes, &aad)
                    .map_err(ProtocolFailure::from_prover_side)?;
                Some(SealedPayload::new(sealed))
            }
            _ => None,
        };

        proxy
            .send(&Envelope::Verdict(Verdict {
                accepted,
                extra: verdict_extra,
            }))
            .await?;

        info!(
            session_id = %session_id,
            prover = %proof.identity,
            accepted,
            "Verifier run finished"
        );

        Ok(VerifierOutcome {
            session_id,
            shared_key: accepted.then(|| keys.session_key.clone()),
            prover_identity: proof.identity,
            prover_extra,
            accepted,
        })
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("identity", &self.key_pair.public_key())
            .field("commitment", &self.commitment.short())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::protocol::{ProverCommit, ProverProof};
    use sigil_transport::MockChannel;

    use crate::error::FailureKind;

    fn pair() -> (Proxy, Proxy) {
        let (a, b) = MockChannel::pair();
        (Proxy::json(Box::new(a)), Proxy::json(Box::new(b)))
    }

    #[tokio::test]
    async fn test_foreign_commitment_rejected_before_keys() {
        let verifier = Verifier::new(IdentityKeyPair::generate(), b"meta".to_vec());
        let (mut prover, mut verifier_side) = pair();

        let other = Commitment::derive(&IdentityKeyPair::generate().public_key(), b"meta");
        prover
            .send(&Envelope::ProverCommit(ProverCommit {
                version: ProtocolVersion::CURRENT,
                ephemeral: EphemeralKeyPair::generate().public_key_bytes(),
                commitment: Some(other),
            }))
            .await
            .unwrap();

        let err = verifier.respond(&mut verifier_side).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProtocolViolation);
    }

    #[tokio::test]
    async fn test_incompatible_version() {
        let verifier = Verifier::new(IdentityKeyPair::generate(), Vec::new());
        let (mut prover, mut verifier_side) = pair();
        prover
            .send(&Envelope::ProverCommit(ProverCommit {
                version: ProtocolVersion::new(2, 0),
                ephemeral: EphemeralKeyPair::generate().public_key_bytes(),
                commitment: None,
            }))
            .await
            .unwrap();

        let err = verifier.respond(&mut verifier_side).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProtocolViolation);
    }

    #[tokio::test]
    async fn test_bad_prover_proof_gets_reject_verdict() {
        let verifier = Verifier::new(IdentityKeyPair::generate(), Vec::new());
        let (mut prover, mut verifier_side) = pair();
        let server = tokio::spawn(async move { verifier.respond(&mut verifier_side).await });

        prover
            .send(&Envelope::ProverCommit(ProverCommit {
                version: ProtocolVersion::CURRENT,
                ephemeral: EphemeralKeyPair::generate().public_key_bytes(),
                commitment: None,
            }))
            .await
            .unwrap();
        let _proof = prover.recv().await.unwrap().into_verifier_proof().unwrap();
        prover
            .send(&Envelope::ProverProof(ProverProof {
                identity: IdentityKeyPair::generate().public_key(),
                signature: vec![1u8; 64],
                mac: vec![2u8; 32],
                extra: None,
            }))
            .await
            .unwrap();

        let verdict = prover.recv().await.unwrap().into_verdict().unwrap();
        assert!(!verdict.accepted);

        let err = server.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProverAuthFailed);
    }

    #[test]
    fn test_allow_list_policy() {
        let allowed = IdentityKeyPair::generate().public_key();
        let policy = AllowList::new([allowed]);
        assert!(policy.decide(&allowed, None));
        assert!(!policy.decide(&IdentityKeyPair::generate().public_key(), None));
    }
}
