// ============================================
// File: crates/sigil-agent/src/engine/mod.rs
// ============================================
//! # Protocol Engines
//!
//! ## Creation Reason
//! The SIGMA exchange has two roles. The device is always the prover;
//! the verifier role exists for the local test server and for tests.
//!
//! ## Module Structure
//! - [`proxy`]: channel + codec pair used by both roles
//! - [`prover`]: single-use prover state machine
//! - [`verifier`]: counterpart role with accept/reject policy
//! - [`progress`]: stage reporting for UIs
//! - [`run_token`]: per-run cancellation
//!
//! ## Message Flow
//! ```text
//! Prover                                  Verifier
//!   │  prover_commit {X, [commitment]}       │
//!   │ ─────────────────────────────────────► │
//!   │  verifier_proof {sid, Y, id, meta,     │
//!   │                  sig, mac}             │
//!   │ ◄───────────────────────────────────── │
//!   │  (derive km, ke from DH(X, Y))         │
//!   │  prover_proof {id, sig, mac, [extra]}  │
//!   │ ─────────────────────────────────────► │
//!   │  verdict {accepted, [extra]}           │
//!   │ ◄───────────────────────────────────── │
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial engine layout

pub mod progress;
pub mod prover;
pub mod proxy;
pub mod run_token;
pub mod verifier;

pub use progress::{ChannelProgress, NoProgress, Progress, ProgressSink, TOTAL_STAGES};
pub use prover::{
    AcceptedProof, CommitMode, ProofVerdict, Prover, ProverBuilder, ProverReport, ProverState,
};
pub use proxy::Proxy;
pub use run_token::{RunGeneration, RunToken};
pub use verifier::{AcceptAll, AllowList, Verifier, VerifierOutcome, VerifierPolicy};

/// AAD label for extra data sent by the prover.
pub(crate) const PROVER_EXTRA_LABEL: &[u8] = b"sigil-extra-prover";

/// AAD label for extra data sent by the verifier.
pub(crate) const VERIFIER_EXTRA_LABEL: &[u8] = b"sigil-extra-verifier";

/// Binds sealed extra data to its direction and session.
pub(crate) fn extra_aad(label: &[u8], session_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(label.len() + session_id.len());
    aad.extend_from_slice(label);
    aad.extend_from_slice(session_id.as_bytes());
    aad
}
