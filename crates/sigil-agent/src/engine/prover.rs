// ============================================
// File: crates/sigil-agent/src/engine/prover.rs
// ============================================
//! # Prover Engine
//!
//! ## Creation Reason
//! Runs the SIGMA exchange as the proving party: proves possession of
//! the device key to a verifier whose identity must match a locally
//! trusted commitment, and derives the session key.
//!
//! ## Main Functionality
//! - `ProverBuilder`: assembles a single-use `Prover`
//! - `Prover::prove`: the whole exchange, consuming the engine
//! - `ProofVerdict`: accepted (key + session id + extra) or rejected
//! - `ProverReport`: the run's result plus whatever session id the
//!   verifier assigned before it ended, for failure diagnostics
//!
//! ## State Machine
//! ```text
//! Init ─► SentCommit ─► ReceivedVerifierProof ─► KeyDerived
//!                                                   │
//!                         SentProverProof ◄─────────┘
//!                           │         │
//!                       Accepted   Rejected
//!
//! any state ─► Failed(kind)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `prove` takes `self`: ephemeral keys and transcript are never reused
//! - Verification order is commitment, signature, MAC; a failure in any
//!   of them is `VerifierAuthFailed`, not a protocol violation
//! - The channel is closed on every exit path
//!
//! ## Last Modified
//! v0.1.0 - Initial prover implementation
//! v0.1.1 - `prove_report` keeps the session id of failed runs

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sigil_common::VerifierSessionId;
use sigil_core::crypto::aead;
use sigil_core::crypto::sigma::{
    check_verifier_proof, identity_mac, prover_sign_data, verifier_sign_data, VerifierProofCheck,
    PROVER_MAC_LABEL,
};
use sigil_core::crypto::{
    derive_sigma_keys, Commitment, EphemeralKeyPair, IdentityKeyPair, IdentityPublicKey, SharedKey,
};
use sigil_core::protocol::{
    Envelope, ExtraData, ProtocolVersion, ProverCommit, ProverProof, SealedPayload,
};

use super::progress::{NoProgress, Progress, ProgressSink};
use super::proxy::Proxy;
use super::run_token::RunToken;
use super::{extra_aad, PROVER_EXTRA_LABEL, VERIFIER_EXTRA_LABEL};
use crate::error::{FailureKind, ProtocolFailure};

// ============================================
// CommitMode
// ============================================

/// Whether the first message names the commitment the prover expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    /// Send the commitment so a multi-identity verifier can pick its key.
    #[default]
    Disclosed,
    /// Send only the ephemeral key.
    Withheld,
}

// ============================================
// ProverState
// ============================================

/// Where a prover run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProverState {
    /// Nothing sent yet.
    Init,
    /// `prover_commit` sent.
    SentCommit,
    /// `verifier_proof` received and checked.
    ReceivedVerifierProof,
    /// Session and MAC keys derived.
    KeyDerived,
    /// `prover_proof` sent.
    SentProverProof,
    /// Verifier accepted.
    Accepted,
    /// Verifier declined.
    Rejected,
    /// Run failed.
    Failed(FailureKind),
}

impl fmt::Display for ProverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::SentCommit => write!(f, "SENT_COMMIT"),
            Self::ReceivedVerifierProof => write!(f, "RECEIVED_VERIFIER_PROOF"),
            Self::KeyDerived => write!(f, "KEY_DERIVED"),
            Self::SentProverProof => write!(f, "SENT_PROVER_PROOF"),
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Failed(kind) => write!(f, "FAILED({kind})"),
        }
    }
}

// ============================================
// Results
// ============================================

/// Successful run.
#[derive(Debug, Clone)]
pub struct AcceptedProof {
    /// Derived AES-256-GCM session key.
    pub shared_key: SharedKey,
    /// Verifier-assigned session id.
    pub session_id: VerifierSessionId,
    /// Extra data the verifier attached to its verdict.
    pub extra: Option<ExtraData>,
    /// Identity key the verifier proved.
    pub verifier_identity: IdentityPublicKey,
}

/// Outcome of a completed exchange.
#[derive(Debug, Clone)]
pub enum ProofVerdict {
    /// Verifier accepted.
    Accepted(AcceptedProof),
    /// Verifier authenticated itself and then declined.
    Rejected {
        /// Verifier-assigned session id.
        session_id: VerifierSessionId,
    },
}

impl ProofVerdict {
    /// Returns `true` for `Accepted`.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Verifier-assigned session id.
    #[must_use]
    pub fn session_id(&self) -> &VerifierSessionId {
        match self {
            Self::Accepted(p) => &p.session_id,
            Self::Rejected { session_id } => session_id,
        }
    }

    /// Treats a rejection as an error.
    ///
    /// # Errors
    /// `ProverAuthRejected` for `Rejected`.
    pub fn into_accepted(self) -> Result<AcceptedProof, ProtocolFailure> {
        match self {
            Self::Accepted(p) => Ok(p),
            Self::Rejected { session_id } => Err(ProtocolFailure::ProverAuthRejected {
                session_id: session_id.to_string(),
            }),
        }
    }
}

/// Result of a run together with the verifier-assigned session id, if a
/// `verifier_proof` arrived before the run ended.
#[derive(Debug)]
pub struct ProverReport {
    /// What `prove` would return.
    pub result: Result<ProofVerdict, ProtocolFailure>,
    /// Session id seen on the wire, even for failed runs.
    pub session_id: Option<VerifierSessionId>,
}

// ============================================
// ProverBuilder
// ============================================

/// Builds a [`Prover`].
///
/// # Example
/// ```ignore
/// let verdict = ProverBuilder::new(key_pair, proxy, trusted_commitment)
///     .extra(ExtraData::text("hello"))
///     .progress(Arc::new(sink))
///     .build()
///     .prove()
///     .await?;
/// ```
pub struct ProverBuilder {
    version: ProtocolVersion,
    key_pair: IdentityKeyPair,
    extra: Option<ExtraData>,
    proxy: Proxy,
    commitment: Commitment,
    mode: CommitMode,
    progress: Arc<dyn ProgressSink>,
    token: Option<RunToken>,
}

impl ProverBuilder {
    /// Starts a builder with the required inputs.
    #[must_use]
    pub fn new(key_pair: IdentityKeyPair, proxy: Proxy, commitment: Commitment) -> Self {
        Self {
            version: ProtocolVersion::CURRENT,
            key_pair,
            extra: None,
            proxy,
            commitment,
            mode: CommitMode::default(),
            progress: Arc::new(NoProgress),
            token: None,
        }
    }

    /// Protocol version to announce.
    #[must_use]
    pub fn version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Payload to send sealed under the session key.
    #[must_use]
    pub fn extra(mut self, extra: Option<ExtraData>) -> Self {
        self.extra = extra;
        self
    }

    /// Commitment disclosure mode.
    #[must_use]
    pub fn commit_mode(mut self, mode: CommitMode) -> Self {
        self.mode = mode;
        self
    }

    /// Stage update sink.
    #[must_use]
    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Cancellation token.
    #[must_use]
    pub fn run_token(mut self, token: RunToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Finishes the builder.
    #[must_use]
    pub fn build(self) -> Prover {
        Prover {
            version: self.version,
            key_pair: self.key_pair,
            extra: self.extra,
            proxy: self.proxy,
            commitment: self.commitment,
            mode: self.mode,
            progress: self.progress,
            token: self.token.unwrap_or_else(RunToken::detached),
            state: ProverState::Init,
            session_id: None,
        }
    }
}

// ============================================
// Prover
// ============================================

/// Single-use prover engine.
pub struct Prover {
    version: ProtocolVersion,
    key_pair: IdentityKeyPair,
    extra: Option<ExtraData>,
    proxy: Proxy,
    commitment: Commitment,
    mode: CommitMode,
    progress: Arc<dyn ProgressSink>,
    token: RunToken,
    state: ProverState,
    session_id: Option<VerifierSessionId>,
}

impl Prover {
    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ProverState {
        self.state
    }

    /// Runs the exchange to completion.
    ///
    /// # Errors
    /// - `VerifierAuthFailed`: counterpart's proof does not match the commitment
    /// - `ProtocolViolation`: unexpected or malformed message
    /// - `Transport`: channel failure
    /// - `Cancelled`: the run token was cancelled
    pub async fn prove(self) -> Result<ProofVerdict, ProtocolFailure> {
        self.prove_report().await.result
    }

    /// Runs the exchange to completion and reports the session id the
    /// verifier assigned, including for failed runs.
    pub async fn prove_report(mut self) -> ProverReport {
        info!(
            commitment = %self.commitment.short(),
            peer = %self.proxy.describe(),
            version = %self.version,
            "Starting prover run"
        );

        let result = self.run().await;

        match &result {
            Ok(verdict) => {
                self.state = if verdict.is_accepted() {
                    ProverState::Accepted
                } else {
                    ProverState::Rejected
                };
                info!(
                    session_id = %verdict.session_id(),
                    state = %self.state,
                    "Prover run finished"
                );
            }
            Err(failure) => {
                let last = self.state;
                self.state = ProverState::Failed(failure.kind());
                warn!(
                    last_state = %last,
                    kind = %failure.kind(),
                    error = %failure,
                    "Prover run failed"
                );
            }
        }

        self.proxy.close().await;
        ProverReport {
            result,
            session_id: self.session_id,
        }
    }

    fn stage(&self, stage: u8, description: &'static str) -> Result<(), ProtocolFailure> {
        self.token.check()?;
        self.progress.on_progress(Progress::stage(stage, description));
        Ok(())
    }

    async fn run(&mut self) -> Result<ProofVerdict, ProtocolFailure> {
        // 1. Commit
        self.stage(1, "Sending commitment")?;
        let ephemeral = EphemeralKeyPair::generate();
        let x = ephemeral.public_key_bytes();
        let commit = ProverCommit {
            version: self.version,
            ephemeral: x,
            commitment: match self.mode {
                CommitMode::Disclosed => Some(self.commitment),
                CommitMode::Withheld => None,
            },
        };
        self.proxy.send(&Envelope::ProverCommit(commit)).await?;
        self.state = ProverState::SentCommit;

        // 2. Verifier proof
        self.stage(2, "Verifying counterpart")?;
        let proof = self.proxy.recv().await?.into_verifier_proof()?;
        let y = proof.ephemeral;
        let session_id = proof.session_id.clone();
        self.session_id = Some(session_id.clone());
        debug!(session_id = %session_id, "Received verifier proof");

        let shared_secret = ephemeral.exchange(&y)?;
        let keys = derive_sigma_keys(&shared_secret, &x, &y)?;
        let signed = verifier_sign_data(self.version, &x, &y, session_id.as_str());
        check_verifier_proof(&VerifierProofCheck {
            expected_commitment: &self.commitment,
            verifier_identity: &proof.identity,
            metadata: &proof.metadata,
            signature: &proof.signature,
            mac: &proof.mac,
            signed_data: &signed,
            mac_key: &keys.mac_key,
        })?;
        self.state = ProverState::ReceivedVerifierProof;

        // 3. Keys are ready
        self.stage(3, "Deriving session key")?;
        self.state = ProverState::KeyDerived;

        // 4. Own proof
        self.stage(4, "Sending proof")?;
        let identity = self.key_pair.public_key();
        let signature =
            self.key_pair
                .sign(&prover_sign_data(self.version, &x, &y, session_id.as_str()));
        let mac = identity_mac(&keys.mac_key, PROVER_MAC_LABEL, &identity, &[])?;
        let extra = match &self.extra {
            Some(extra) => {
                let aad = extra_aad(PROVER_EXTRA_LABEL, session_id.as_str());
                Some(SealedPayload::new(aead::seal(
                    &keys.session_key,
                    &extra.to_bytes()?,
                    &aad,
                )?))
            }
            None => None,
        };
        self.proxy
            .send(&Envelope::ProverProof(ProverProof {
                identity,
                signature: signature.to_vec(),
                mac: mac.to_vec(),
                extra,
            }))
            .await?;
        self.state = ProverState::SentProverProof;

        // 5. Verdict
        self.stage(5, "Awaiting verdict")?;
        let verdict = self.proxy.recv().await?.into_verdict()?;
        if !verdict.accepted {
            return Ok(ProofVerdict::Rejected { session_id });
        }

        let extra = match verdict.extra {
            Some(sealed) => {
                let aad = extra_aad(VERIFIER_EXTRA_LABEL, session_id.as_str());
                let plain = aead::open(&keys.session_key, &sealed.ciphertext, &aad)
                    .map_err(|e| ProtocolFailure::violation(format!("verdict extra: {e}")))?;
                Some(ExtraData::from_bytes(&plain)?)
            }
            None => None,
        };

        Ok(ProofVerdict::Accepted(AcceptedProof {
            shared_key: keys.session_key.clone(),
            session_id,
            extra,
            verifier_identity: proof.identity,
        }))
    }
}

impl fmt::Debug for Prover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prover")
            .field("version", &self.version)
            .field("commitment", &self.commitment.short())
            .field("mode", &self.mode)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
