// ============================================
// File: crates/sigil-agent/src/lib.rs
// ============================================
//! # Sigil Agent Library
//!
//! ## Creation Reason
//! The device side of Sigil: proves possession of the device key to
//! services and terminals, records sessions, and delegates tokens to
//! trusted terminals.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`engine`]: SIGMA prover and verifier state machines
//! - [`authenticator`]: orchestration over stores and transports
//! - [`pairing`]: services, terminals, key and lens pairings
//! - [`store`]: credential store trait + in-memory implementation
//! - [`session`]: session lifecycle and persistence contract
//! - [`delegation`]: reauth messages, sequence policy, replay window
//! - [`connector`]: endpoint → channel seam
//! - [`keyfile`]: device key file
//! - [`config`]: TOML configuration
//! - [`error`]: protocol failures, delegation errors, agent errors
//!
//! ## Architecture Overview
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       Authenticator                       │
//! ├───────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//! │  │ Credential   │   │   Prover     │   │  Delegator   │   │
//! │  │ Store        │   │   Engine     │   │              │   │
//! │  └──────────────┘   └──────┬───────┘   └──────┬───────┘   │
//! │  ┌──────────────┐          │                  │           │
//! │  │ Session      │          ▼                  ▼           │
//! │  │ Store        │   ┌─────────────────────────────────┐   │
//! │  └──────────────┘   │  Proxy (Codec + Channel)        │   │
//! │                     └───────────────┬─────────────────┘   │
//! ├─────────────────────────────────────┼─────────────────────┤
//! │              ChannelConnector       ▼                     │
//! │        tcp://      http(s)://      btspp://               │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only `Active` and `Closed` sessions are ever persisted
//! - Delegation failures are reported separately from authentication
//!   and never alter the session the token came from
//!
//! ## Last Modified
//! v0.1.0 - Initial agent library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod authenticator;
pub mod config;
pub mod connector;
pub mod delegation;
pub mod engine;
pub mod error;
pub mod keyfile;
pub mod pairing;
pub mod session;
pub mod store;

// Re-export primary types
pub use authenticator::{
    AuthOutcome, Authenticator, PendingAuth, AUTHENTICATE_TERMINAL_UNTRUSTED,
};
pub use config::AgentConfig;
pub use connector::{ChannelConnector, TransportConnector};
pub use delegation::{
    AuthToken, DelegationReceiver, Delegator, ReauthMessage, SequencePolicy, TokenKind,
};
pub use engine::{
    CommitMode, ProofVerdict, Prover, ProverBuilder, ProverReport, Proxy, RunToken, Verifier,
};
pub use error::{AgentError, DelegationError, FailureKind, ProtocolFailure, Result};
pub use pairing::{KeyPairing, LensPairing, Pairing, Service, Terminal};
pub use session::{MemorySessionStore, Session, SessionRecord, SessionStatus, SessionStore};
pub use store::{CredentialStore, MemoryCredentialStore};
