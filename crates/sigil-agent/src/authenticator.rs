// ============================================
// File: crates/sigil-agent/src/authenticator.rs
// ============================================
//! # Authenticator
//!
//! ## Creation Reason
//! Ties the prover engine to the credential store, session store and
//! transport selection. This is the entry point applications call.
//!
//! ## Main Functionality
//! - `authenticate_terminal`: trust check, then a prover run against the
//!   terminal; yields the terminal key used for delegation
//! - `authenticate_pairing`: prover run against a service; creates or
//!   updates the key pairing and records the session
//! - `delegate_session` / `delegate_token`: hand a token to a terminal
//! - `*_with`: same operations under a caller-held [`RunToken`]
//! - `spawn_*`: same operations on a background task; the returned
//!   [`PendingAuth`] carries the outcome receiver and the run's token
//! - `cancel_all`: invalidates every run in flight
//!
//! ## Outcome Codes
//! | Outcome                  | Code                              |
//! |--------------------------|-----------------------------------|
//! | `TerminalAuthenticated`  | `AUTHENTICATE_TERMINAL_OK`        |
//! | `TerminalUntrusted`      | `AUTHENTICATE_TERMINAL_UNTRUSTED` |
//! | `PairingAuthenticated`   | `AUTHENTICATE_PAIRING_OK`         |
//! | `PairingRejected`        | `AUTHENTICATE_PAIRING_REJECTED`   |
//! | `Failed`                 | `AUTHENTICATION_FAILED`           |
//!
//! ## ⚠️ Important Note for Next Developer
//! - An untrusted terminal never gets a channel opened to it
//! - Protocol failures are outcomes, not errors: `Err` from these methods
//!   means the stores or local state failed
//! - Error sessions are handed back to the caller but never saved
//! - Runs are independent: starting one never cancels another. Only the
//!   run's own token or `cancel_all` stops it
//!
//! ## Last Modified
//! v0.1.0 - Initial authenticator
//! v0.1.1 - Per-run tokens; error sessions keep the verifier session id

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{error, info, warn};

use sigil_common::SequenceNumber;
use sigil_core::crypto::{Commitment, SharedKey};
use sigil_core::protocol::{Codec, ExtraData, JsonCodec, ProtocolVersion};

use crate::config::AgentConfig;
use crate::connector::{ChannelConnector, TransportConnector};
use crate::delegation::{AuthToken, Delegator, SequencePolicy};
use crate::engine::{
    CommitMode, NoProgress, ProgressSink, ProofVerdict, ProverBuilder, ProverReport, Proxy,
    RunGeneration, RunToken,
};
use crate::error::{AgentError, ProtocolFailure, Result};
use crate::pairing::{KeyPairing, Pairing, Service, Terminal};
use crate::session::{Session, SessionStore};
use crate::store::CredentialStore;

/// Outcome code logged when a terminal is not in the credential store.
pub const AUTHENTICATE_TERMINAL_UNTRUSTED: &str = "AUTHENTICATE_TERMINAL_UNTRUSTED";

/// Session id placed in reauth messages that continue no session.
const PLACEHOLDER_SESSION_ID: &str = "-";

// ============================================
// AuthOutcome
// ============================================

/// Result of an authentication request.
#[derive(Debug)]
pub enum AuthOutcome {
    /// Terminal proved its identity and accepted us.
    TerminalAuthenticated {
        /// Trusted terminal record.
        terminal: Terminal,
        /// Key for delegating to this terminal.
        shared_key: SharedKey,
        /// Extra data from the terminal.
        extra: Option<ExtraData>,
    },
    /// Commitment not in the credential store. Nothing was sent.
    TerminalUntrusted {
        /// Commitment that was asked for.
        commitment: Commitment,
    },
    /// Service accepted us; session is `Active` and saved.
    PairingAuthenticated(Session),
    /// Service declined us; session is `Closed` and saved.
    PairingRejected(Session),
    /// Run failed. A pairing run also returns its `Error` session.
    Failed {
        /// Why.
        failure: ProtocolFailure,
        /// Unsaved `Error` session, for pairing runs.
        session: Option<Session>,
    },
}

impl AuthOutcome {
    /// Stable outcome code for logs and UIs.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::TerminalAuthenticated { .. } => "AUTHENTICATE_TERMINAL_OK",
            Self::TerminalUntrusted { .. } => AUTHENTICATE_TERMINAL_UNTRUSTED,
            Self::PairingAuthenticated(_) => "AUTHENTICATE_PAIRING_OK",
            Self::PairingRejected(_) => "AUTHENTICATE_PAIRING_REJECTED",
            Self::Failed { .. } => "AUTHENTICATION_FAILED",
        }
    }

    /// `true` for the two accepted outcomes.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(
            self,
            Self::TerminalAuthenticated { .. } | Self::PairingAuthenticated(_)
        )
    }

    /// Session produced by a pairing run, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::PairingAuthenticated(s) | Self::PairingRejected(s) => Some(s),
            Self::Failed { session, .. } => session.as_ref(),
            Self::TerminalAuthenticated { .. } | Self::TerminalUntrusted { .. } => None,
        }
    }
}

// ============================================
// PendingAuth
// ============================================

/// A run started on a background task.
#[derive(Debug)]
pub struct PendingAuth {
    /// Delivers the outcome once the run ends.
    pub outcome: oneshot::Receiver<Result<AuthOutcome>>,
    /// Token of the run; `cancel` stops it at its next stage.
    pub token: RunToken,
}

impl PendingAuth {
    /// Cancels this run only.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

// ============================================
// Authenticator
// ============================================

/// Orchestrates prover runs and delegation.
#[derive(Clone)]
pub struct Authenticator {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    connector: Arc<dyn ChannelConnector>,
    codec: Arc<dyn Codec>,
    progress: Arc<dyn ProgressSink>,
    version: ProtocolVersion,
    commit_mode: CommitMode,
    sequence_policy: SequencePolicy,
    generation: RunGeneration,
}

impl Authenticator {
    /// Authenticator with default modes and the JSON codec.
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        connector: Arc<dyn ChannelConnector>,
    ) -> Self {
        Self {
            credentials,
            sessions,
            connector,
            codec: Arc::new(JsonCodec::new()),
            progress: Arc::new(NoProgress),
            version: ProtocolVersion::CURRENT,
            commit_mode: CommitMode::default(),
            sequence_policy: SequencePolicy::default(),
            generation: RunGeneration::new(),
        }
    }

    /// Authenticator configured from `config`, connecting through
    /// `sigil-transport`.
    #[must_use]
    pub fn from_config(
        config: &AgentConfig,
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let connector = Arc::new(TransportConnector::new(config.channel_options()));
        Self::new(credentials, sessions, connector)
            .with_commit_mode(config.protocol.commit_mode)
            .with_sequence_policy(config.delegation.sequence_policy)
    }

    /// Commitment disclosure mode for prover runs.
    #[must_use]
    pub fn with_commit_mode(mut self, mode: CommitMode) -> Self {
        self.commit_mode = mode;
        self
    }

    /// Sequence policy for delegation.
    #[must_use]
    pub fn with_sequence_policy(mut self, policy: SequencePolicy) -> Self {
        self.sequence_policy = policy;
        self
    }

    /// Stage sink shared by every run.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Replaces the codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Invalidates every run in flight. They fail with `Cancelled` at
    /// their next stage.
    pub fn cancel_all(&self) {
        self.generation.invalidate();
        info!(generation = self.generation.current(), "Cancelled runs in flight");
    }

    /// Token for a new run. It stays valid until cancelled or until
    /// [`cancel_all`](Self::cancel_all); other runs never affect it.
    #[must_use]
    pub fn begin_run(&self) -> RunToken {
        self.generation.begin()
    }

    async fn run_prover(
        &self,
        pairing: &KeyPairing,
        service: &Service,
        extra: Option<ExtraData>,
        token: RunToken,
    ) -> ProverReport {
        let endpoint = service
            .endpoint
            .clone()
            .keyed(service.commitment.to_string());
        let connected = match self.connector.connect(&endpoint).await {
            Ok(channel) => token.check().map(|()| channel),
            Err(e) => Err(ProtocolFailure::from(e)),
        };
        let channel = match connected {
            Ok(channel) => channel,
            Err(failure) => {
                return ProverReport {
                    result: Err(failure),
                    session_id: None,
                };
            }
        };

        ProverBuilder::new(
            pairing.key_pair.clone(),
            Proxy::new(channel, Arc::clone(&self.codec)),
            service.commitment,
        )
        .version(self.version)
        .extra(extra)
        .commit_mode(self.commit_mode)
        .progress(Arc::clone(&self.progress))
        .run_token(token)
        .build()
        .prove_report()
        .await
    }

    async fn key_pairing_for(&self, service: &Service) -> Result<KeyPairing> {
        match self
            .credentials
            .get_pairing_by_commitment(&service.commitment)
            .await?
        {
            Some(Pairing::Key(pairing)) => Ok(pairing),
            Some(Pairing::Lens(_)) => Err(AgentError::NotKeyPairing {
                commitment: service.commitment.to_string(),
            }),
            None => Ok(KeyPairing::generate(service.clone())),
        }
    }

    /// Authenticates to a trusted terminal.
    ///
    /// # Errors
    /// Store failures, or `NotKeyPairing` if the terminal commitment is
    /// paired by credentials.
    pub async fn authenticate_terminal(&self, commitment: &Commitment) -> Result<AuthOutcome> {
        self.authenticate_terminal_with(commitment, self.begin_run())
            .await
    }

    /// [`authenticate_terminal`](Self::authenticate_terminal) under a
    /// caller-held token.
    ///
    /// # Errors
    /// As `authenticate_terminal`.
    pub async fn authenticate_terminal_with(
        &self,
        commitment: &Commitment,
        token: RunToken,
    ) -> Result<AuthOutcome> {
        let Some(terminal) = self
            .credentials
            .get_terminal_by_commitment(commitment)
            .await?
        else {
            warn!(
                code = AUTHENTICATE_TERMINAL_UNTRUSTED,
                commitment = %commitment.short(),
                "Terminal is not trusted"
            );
            return Ok(AuthOutcome::TerminalUntrusted {
                commitment: *commitment,
            });
        };

        let service = terminal.as_service();
        let mut pairing = self.key_pairing_for(&service).await?;

        let report = self.run_prover(&pairing, &service, None, token).await;
        let accepted = match report.result.and_then(ProofVerdict::into_accepted) {
            Ok(accepted) => accepted,
            Err(failure) => {
                error!(
                    terminal = %terminal.name,
                    kind = %failure.kind(),
                    error = %failure,
                    "Terminal authentication failed"
                );
                return Ok(AuthOutcome::Failed {
                    failure,
                    session: None,
                });
            }
        };

        pairing.service = service;
        if accepted.extra.is_some() {
            pairing.extra.clone_from(&accepted.extra);
        }
        self.credentials
            .save_or_update_pairing(&Pairing::Key(pairing))
            .await?;

        info!(
            terminal = %terminal.name,
            code = "AUTHENTICATE_TERMINAL_OK",
            "Terminal authenticated"
        );
        Ok(AuthOutcome::TerminalAuthenticated {
            terminal,
            shared_key: accepted.shared_key,
            extra: accepted.extra,
        })
    }

    /// Authenticates to a service, creating the key pairing on first
    /// success and updating its name and extra data afterwards.
    ///
    /// # Errors
    /// Store failures, or `NotKeyPairing` for a lens-paired service.
    pub async fn authenticate_pairing(
        &self,
        service: &Service,
        extra: Option<ExtraData>,
    ) -> Result<AuthOutcome> {
        self.authenticate_pairing_with(service, extra, self.begin_run())
            .await
    }

    /// [`authenticate_pairing`](Self::authenticate_pairing) under a
    /// caller-held token.
    ///
    /// # Errors
    /// As `authenticate_pairing`.
    pub async fn authenticate_pairing_with(
        &self,
        service: &Service,
        extra: Option<ExtraData>,
        token: RunToken,
    ) -> Result<AuthOutcome> {
        let mut pairing = self.key_pairing_for(service).await?;
        let report = self.run_prover(&pairing, service, extra, token).await;

        match report.result {
            Ok(ProofVerdict::Accepted(accepted)) => {
                pairing.service = service.clone();
                if accepted.extra.is_some() {
                    pairing.extra.clone_from(&accepted.extra);
                }
                self.credentials
                    .save_or_update_pairing(&Pairing::Key(pairing))
                    .await?;

                let session = Session::new_active(
                    accepted.session_id,
                    accepted.shared_key,
                    service.commitment,
                    accepted.extra,
                );
                session.save(self.sessions.as_ref()).await?;
                info!(service = %service.name, session = ?session, "Pairing authenticated");
                Ok(AuthOutcome::PairingAuthenticated(session))
            }
            Ok(ProofVerdict::Rejected { session_id }) => {
                let session = Session::new_closed(session_id, service.commitment, None);
                session.save(self.sessions.as_ref()).await?;
                info!(service = %service.name, session = ?session, "Pairing rejected by service");
                Ok(AuthOutcome::PairingRejected(session))
            }
            Err(failure) => {
                let session =
                    Session::new_error(report.session_id, service.commitment, failure.kind());
                error!(
                    service = %service.name,
                    session = ?session,
                    kind = %failure.kind(),
                    suspicious = failure.is_suspicious(),
                    error = %failure,
                    "Pairing authentication failed"
                );
                Ok(AuthOutcome::Failed {
                    failure,
                    session: Some(session),
                })
            }
        }
    }

    /// Delegates an active session's token to a terminal.
    ///
    /// # Errors
    /// `UntrustedTerminal`, `Delegation` or store failures. The session is
    /// never modified.
    pub async fn delegate_session(
        &self,
        terminal: &Commitment,
        terminal_key: &SharedKey,
        session: &Session,
    ) -> Result<SequenceNumber> {
        let token = AuthToken::from_session(session)?;
        let session_id = session
            .id()
            .map_or(PLACEHOLDER_SESSION_ID, |id| id.as_str());
        self.delegate_token(terminal, terminal_key, session_id, &token)
            .await
    }

    /// Delegates `token` to a terminal. The terminal record is saved
    /// afterwards whether or not sending succeeded, so a spent sequence
    /// number is never reused.
    ///
    /// # Errors
    /// `UntrustedTerminal`, `Delegation` or store failures.
    pub async fn delegate_token(
        &self,
        terminal: &Commitment,
        terminal_key: &SharedKey,
        session_id: &str,
        token: &AuthToken,
    ) -> Result<SequenceNumber> {
        let mut record = self
            .credentials
            .get_terminal_by_commitment(terminal)
            .await?
            .ok_or_else(|| AgentError::UntrustedTerminal {
                commitment: terminal.to_string(),
            })?;

        let delegator = Delegator::new(Arc::clone(&self.connector), self.sequence_policy)
            .with_codec(Arc::clone(&self.codec));
        let result = delegator
            .delegate(&mut record, terminal_key, session_id, token)
            .await;

        if self.sequence_policy == SequencePolicy::Monotonic {
            self.credentials.save_terminal(&record).await?;
        }
        if let Err(e) = &result {
            warn!(terminal = %record.name, error = %e, "Delegation failed");
        }
        Ok(result?)
    }

    /// [`authenticate_terminal`](Self::authenticate_terminal) on a
    /// background task with its own run token.
    #[must_use]
    pub fn spawn_authenticate_terminal(&self, commitment: Commitment) -> PendingAuth {
        let (tx, outcome) = oneshot::channel();
        let token = self.begin_run();
        let this = self.clone();
        let run_token = token.clone();
        tokio::spawn(async move {
            let result = this
                .authenticate_terminal_with(&commitment, run_token)
                .await;
            // Receiver may be gone; nothing to report then.
            let _ = tx.send(result);
        });
        PendingAuth { outcome, token }
    }

    /// [`authenticate_pairing`](Self::authenticate_pairing) on a
    /// background task with its own run token.
    #[must_use]
    pub fn spawn_authenticate_pairing(
        &self,
        service: Service,
        extra: Option<ExtraData>,
    ) -> PendingAuth {
        let (tx, outcome) = oneshot::channel();
        let token = self.begin_run();
        let this = self.clone();
        let run_token = token.clone();
        tokio::spawn(async move {
            let result = this
                .authenticate_pairing_with(&service, extra, run_token)
                .await;
            let _ = tx.send(result);
        });
        PendingAuth { outcome, token }
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("codec", &self.codec.name())
            .field("version", &self.version)
            .field("commit_mode", &self.commit_mode)
            .field("sequence_policy", &self.sequence_policy)
            .field("generation", &self.generation.current())
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    use sigil_core::crypto::IdentityKeyPair;
    use sigil_core::protocol::Envelope;
    use sigil_transport::{ChannelOptions, MockChannel, TcpChannel};

    use crate::connector::QueuedConnector;
    use crate::delegation::DelegationReceiver;
    use crate::engine::{Verifier, VerifierOutcome};
    use crate::error::{DelegationError, FailureKind};
    use crate::session::{MemorySessionStore, SessionStatus};
    use crate::store::MemoryCredentialStore;

    struct Fixture {
        credentials: Arc<MemoryCredentialStore>,
        sessions: Arc<MemorySessionStore>,
        connector: Arc<QueuedConnector>,
        auth: Authenticator,
    }

    fn fixture() -> Fixture {
        let credentials = Arc::new(MemoryCredentialStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let connector = Arc::new(QueuedConnector::default());
        let auth = Authenticator::new(credentials.clone(), sessions.clone(), connector.clone());
        Fixture {
            credentials,
            sessions,
            connector,
            auth,
        }
    }

    /// Queues a channel whose far end is answered by `verifier`.
    fn serve_once(
        connector: &QueuedConnector,
        verifier: Arc<Verifier>,
    ) -> tokio::task::JoinHandle<std::result::Result<VerifierOutcome, ProtocolFailure>> {
        let (device, far) = MockChannel::pair();
        connector.push(device);
        tokio::spawn(async move {
            let mut proxy = Proxy::json(Box::new(far));
            verifier.respond(&mut proxy).await
        })
    }

    /// Like `serve_once`, but the verifier waits `delay` before answering.
    fn serve_after(
        connector: &QueuedConnector,
        verifier: Arc<Verifier>,
        delay: std::time::Duration,
    ) -> tokio::task::JoinHandle<std::result::Result<VerifierOutcome, ProtocolFailure>> {
        let (device, far) = MockChannel::pair();
        connector.push(device);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut proxy = Proxy::json(Box::new(far));
            verifier.respond(&mut proxy).await
        })
    }

    fn service_for(verifier: &Verifier) -> Service {
        Service::new("mail", "tcp://127.0.0.1:4000", verifier.commitment()).unwrap()
    }

    #[tokio::test]
    async fn test_terminal_then_pairing_over_tcp() {
        let verifier = Arc::new(
            Verifier::new(IdentityKeyPair::generate(), b"front-desk".to_vec())
                .with_extra(ExtraData::named("desk", "welcome")),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server_verifier = Arc::clone(&verifier);
        let server = tokio::spawn(async move {
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let channel = TcpChannel::from_stream(stream, ChannelOptions::default()).unwrap();
                let mut proxy = Proxy::json(Box::new(channel));
                server_verifier.respond(&mut proxy).await.unwrap();
            }
        });

        let credentials = Arc::new(MemoryCredentialStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let auth = Authenticator::new(
            credentials.clone(),
            sessions.clone(),
            Arc::new(TransportConnector::default()),
        );

        let uri = format!("tcp://127.0.0.1:{port}");
        let terminal = Terminal::new("front desk", &uri, verifier.commitment()).unwrap();
        credentials.save_terminal(&terminal).await.unwrap();

        let outcome = auth
            .authenticate_terminal(&verifier.commitment())
            .await
            .unwrap();
        assert_eq!(outcome.code(), "AUTHENTICATE_TERMINAL_OK");
        match outcome {
            AuthOutcome::TerminalAuthenticated { extra, .. } => {
                assert_eq!(extra, Some(ExtraData::named("desk", "welcome")));
            }
            other => panic!("unexpected {other:?}"),
        }

        let service = Service::new("front desk", &uri, verifier.commitment()).unwrap();
        let outcome = auth.authenticate_pairing(&service, None).await.unwrap();
        let session = match outcome {
            AuthOutcome::PairingAuthenticated(session) => session,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(session.status(), SessionStatus::Active);
        assert!(session.shared_key().is_some());
        assert_eq!(sessions.len(), 1);
        assert_eq!(credentials.pairing_count(), 1);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_untrusted_terminal_opens_nothing() {
        let f = fixture();
        let unknown = Commitment::derive(&IdentityKeyPair::generate().public_key(), b"?");

        let outcome = f.auth.authenticate_terminal(&unknown).await.unwrap();
        assert!(matches!(outcome, AuthOutcome::TerminalUntrusted { .. }));
        assert_eq!(outcome.code(), AUTHENTICATE_TERMINAL_UNTRUSTED);
        assert!(f.connector.requested().is_empty());
        assert!(f.sessions.is_empty());
        assert_eq!(f.credentials.pairing_count(), 0);
    }

    #[tokio::test]
    async fn test_first_success_creates_pairing_then_updates_it() {
        let f = fixture();
        let verifier = Arc::new(
            Verifier::new(IdentityKeyPair::generate(), b"svc".to_vec())
                .with_extra(ExtraData::named("mail", "v1")),
        );
        let commitment = verifier.commitment();
        let service = service_for(&verifier);

        let first = serve_once(&f.connector, Arc::clone(&verifier));
        let outcome = f.auth.authenticate_pairing(&service, None).await.unwrap();
        assert!(outcome.is_success());
        let first = first.await.unwrap().unwrap();
        assert_eq!(f.credentials.pairing_count(), 1);

        let renamed = Service {
            name: "mail (work)".into(),
            ..service.clone()
        };
        let second = serve_once(&f.connector, Arc::clone(&verifier));
        f.auth.authenticate_pairing(&renamed, None).await.unwrap();
        let second = second.await.unwrap().unwrap();

        // Same device key both times, one row updated in place.
        assert_eq!(first.prover_identity, second.prover_identity);
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(f.credentials.pairing_count(), 1);
        match f.credentials.get_pairing_by_commitment(&commitment).await.unwrap() {
            Some(Pairing::Key(p)) => {
                assert_eq!(p.service.name, "mail (work)");
                assert_eq!(p.extra, Some(ExtraData::named("mail", "v1")));
                assert_eq!(p.key_pair.public_key(), first.prover_identity);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.sessions.len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_session_saved_as_closed() {
        let f = fixture();
        let deny = |_: &sigil_core::crypto::IdentityPublicKey, _: Option<&ExtraData>| false;
        let verifier = Verifier::new(IdentityKeyPair::generate(), Vec::new())
            .with_policy(Arc::new(deny));
        let service = service_for(&verifier);
        serve_once(&f.connector, Arc::new(verifier));

        let outcome = f.auth.authenticate_pairing(&service, None).await.unwrap();
        let session = match outcome {
            AuthOutcome::PairingRejected(session) => session,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(session.shared_key().is_none());

        let stored = f.sessions.all();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, SessionStatus::Closed);
        assert_eq!(f.credentials.pairing_count(), 0);
    }

    #[tokio::test]
    async fn test_impostor_yields_unsaved_error_session() {
        let f = fixture();
        let real = Verifier::new(IdentityKeyPair::generate(), b"bank".to_vec());
        let impostor = Verifier::new(IdentityKeyPair::generate(), b"bank".to_vec());
        let service = service_for(&real);
        serve_once(&f.connector, Arc::new(impostor));

        let auth = f.auth.clone().with_commit_mode(CommitMode::Withheld);
        let outcome = auth.authenticate_pairing(&service, None).await.unwrap();
        match &outcome {
            AuthOutcome::Failed { failure, session } => {
                assert_eq!(failure.kind(), FailureKind::VerifierAuthFailed);
                let session = session.as_ref().unwrap();
                assert_eq!(session.status(), SessionStatus::Error);
                // verifier_proof had arrived, so its session id is kept.
                assert!(session.id().is_some());
                assert!(session.save(f.sessions.as_ref()).await.is_err());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(f.sessions.is_empty());
        assert_eq!(f.credentials.pairing_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_is_transport_failure() {
        let f = fixture();
        let verifier = Verifier::new(IdentityKeyPair::generate(), Vec::new());
        let outcome = f
            .auth
            .authenticate_pairing(&service_for(&verifier), None)
            .await
            .unwrap();
        match outcome {
            AuthOutcome::Failed { failure, session } => {
                assert_eq!(failure.kind(), FailureKind::Transport);
                assert!(failure.is_retryable());
                assert!(session.unwrap().id().is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forged_delegation_leaves_session_active() {
        let f = fixture();
        let verifier = Verifier::new(IdentityKeyPair::generate(), b"svc".to_vec());
        let service = service_for(&verifier);
        serve_once(&f.connector, Arc::new(verifier));
        let session = match f.auth.authenticate_pairing(&service, None).await.unwrap() {
            AuthOutcome::PairingAuthenticated(s) => s,
            other => panic!("unexpected {other:?}"),
        };

        let terminal_id = Commitment::derive(&IdentityKeyPair::generate().public_key(), b"desk");
        let terminal = Terminal::new("desk", "https://relay.example/sigil", terminal_id).unwrap();
        f.credentials.save_terminal(&terminal).await.unwrap();

        let terminal_key = SharedKey::from_bytes([0x42; 32]);
        let (device, far) = MockChannel::pair();
        f.connector.push(device);
        let sequence = f
            .auth
            .delegate_session(&terminal_id, &terminal_key, &session)
            .await
            .unwrap();
        assert_eq!(sequence.value(), 1);

        // Terminal side: flip one ciphertext byte before opening.
        let mut proxy = Proxy::json(Box::new(far));
        let mut reauth = match proxy.recv().await.unwrap() {
            Envelope::Reauth(r) => r,
            other => panic!("unexpected {}", other.kind()),
        };
        reauth.payload.ciphertext[20] ^= 0x80;
        let receiver = DelegationReceiver::new(terminal_key, SequencePolicy::Monotonic);
        assert!(matches!(
            receiver.receive(&reauth),
            Err(DelegationError::InvalidKey { .. })
        ));

        assert_eq!(session.status(), SessionStatus::Active);
        let stored = f
            .sessions
            .load_session(session.id().unwrap().as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SessionStatus::Active);

        // Sequence was persisted.
        let saved = f
            .credentials
            .get_terminal_by_commitment(&terminal_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.next_sequence.value(), 2);
    }

    #[tokio::test]
    async fn test_delegate_to_unknown_terminal() {
        let f = fixture();
        let token = AuthToken::new(crate::delegation::TokenKind::Lens, b"{}".to_vec());
        let unknown = Commitment::derive(&IdentityKeyPair::generate().public_key(), b"");
        let err = f
            .auth
            .delegate_token(&unknown, &SharedKey::from_bytes([1; 32]), "-", &token)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UntrustedTerminal { .. }));
    }

    #[tokio::test]
    async fn test_spawned_run_reports_on_channel() {
        let f = fixture();
        let unknown = Commitment::derive(&IdentityKeyPair::generate().public_key(), b"");
        let pending = f.auth.spawn_authenticate_terminal(unknown);
        let outcome = pending.outcome.await.unwrap().unwrap();
        assert!(matches!(outcome, AuthOutcome::TerminalUntrusted { .. }));

        let verifier = Verifier::new(IdentityKeyPair::generate(), Vec::new());
        let service = service_for(&verifier);
        serve_once(&f.connector, Arc::new(verifier));
        let outcome = f
            .auth
            .spawn_authenticate_pairing(service, Some(ExtraData::text("hi")))
            .outcome
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::PairingAuthenticated(_)));
    }

    #[tokio::test]
    async fn test_concurrent_pairings_do_not_cancel_each_other() {
        let f = fixture();
        let slow = Arc::new(Verifier::new(IdentityKeyPair::generate(), b"a".to_vec()));
        let fast = Arc::new(Verifier::new(IdentityKeyPair::generate(), b"b".to_vec()));
        let slow_service = service_for(&slow);
        let fast_service = service_for(&fast);
        serve_after(&f.connector, slow, std::time::Duration::from_millis(200));
        serve_once(&f.connector, fast);

        let first = f.auth.spawn_authenticate_pairing(slow_service, None);
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        let second = f.auth.spawn_authenticate_pairing(fast_service, None);

        let second = second.outcome.await.unwrap().unwrap();
        let first = first.outcome.await.unwrap().unwrap();
        assert_eq!(second.code(), "AUTHENTICATE_PAIRING_OK");
        assert_eq!(first.code(), "AUTHENTICATE_PAIRING_OK");
        assert_eq!(f.sessions.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_only_its_own_run() {
        let f = fixture();
        let slow = Arc::new(Verifier::new(IdentityKeyPair::generate(), b"a".to_vec()));
        let fast = Arc::new(Verifier::new(IdentityKeyPair::generate(), b"b".to_vec()));
        let slow_service = service_for(&slow);
        let fast_service = service_for(&fast);
        serve_after(&f.connector, slow, std::time::Duration::from_millis(200));
        serve_once(&f.connector, fast);

        let first = f.auth.spawn_authenticate_pairing(slow_service, None);
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        let second = f.auth.spawn_authenticate_pairing(fast_service, None);
        first.cancel();

        let second = second.outcome.await.unwrap().unwrap();
        assert!(second.is_success());
        match first.outcome.await.unwrap().unwrap() {
            AuthOutcome::Failed { failure, session } => {
                assert_eq!(failure.kind(), FailureKind::Cancelled);
                assert!(session.unwrap().id().is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_all_stops_runs_in_flight() {
        let f = fixture();
        let slow = Arc::new(Verifier::new(IdentityKeyPair::generate(), b"a".to_vec()));
        let service = service_for(&slow);
        serve_after(&f.connector, slow, std::time::Duration::from_millis(100));

        let pending = f.auth.spawn_authenticate_pairing(service, None);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        f.auth.cancel_all();

        let outcome = pending.outcome.await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            AuthOutcome::Failed { ref failure, .. } if failure.kind() == FailureKind::Cancelled
        ));
        assert!(f.auth.begin_run().is_current());
    }

    #[tokio::test]
    async fn test_terminal_without_extra_keeps_stored_extra() {
        let f = fixture();
        let identity = IdentityKeyPair::generate();
        let with_extra = Arc::new(
            Verifier::new(identity.clone(), b"desk".to_vec())
                .with_extra(ExtraData::named("desk", "v1")),
        );
        let without_extra = Arc::new(Verifier::new(identity, b"desk".to_vec()));
        let commitment = with_extra.commitment();
        let terminal = Terminal::new("desk", "tcp://127.0.0.1:4000", commitment).unwrap();
        f.credentials.save_terminal(&terminal).await.unwrap();

        serve_once(&f.connector, with_extra);
        let first = f.auth.authenticate_terminal(&commitment).await.unwrap();
        assert!(first.is_success());

        serve_once(&f.connector, without_extra);
        match f.auth.authenticate_terminal(&commitment).await.unwrap() {
            AuthOutcome::TerminalAuthenticated { extra, .. } => assert!(extra.is_none()),
            other => panic!("unexpected {other:?}"),
        }

        match f.credentials.get_pairing_by_commitment(&commitment).await.unwrap() {
            Some(Pairing::Key(p)) => assert_eq!(p.extra, Some(ExtraData::named("desk", "v1"))),
            other => panic!("unexpected {other:?}"),
        }
    }
}
