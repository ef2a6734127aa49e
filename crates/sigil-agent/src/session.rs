// ============================================
// File: crates/sigil-agent/src/session.rs
// ============================================
//! # Sessions
//!
//! ## Creation Reason
//! Records the outcome of one prover run against a service.
//!
//! ## Main Functionality
//! - `Session`: status, verifier-assigned id, key (while active), pairing
//! - `SessionStore`: persistence of key-free `SessionRecord`s
//! - `MemorySessionStore`: `DashMap` implementation
//!
//! ## Status Rules
//! ```text
//! new_active ─► Active ──close()──► Closed
//! new_closed ─► Closed
//! new_error  ─► Error      (never persisted)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Saving is explicit. The authenticator saves Active and Closed
//!   sessions; an Error session is refused with `SessionNotPersistable`
//!   and its status is left untouched
//! - The shared key never leaves memory: `SessionRecord` has no key field
//!
//! ## Last Modified
//! v0.1.0 - Initial session lifecycle

use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sigil_common::{Timestamp, VerifierSessionId};
use sigil_core::crypto::{Commitment, SharedKey};
use sigil_core::protocol::ExtraData;

use crate::error::{AgentError, FailureKind, Result};

// ============================================
// SessionStatus
// ============================================

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    /// Authenticated, key available.
    Active,
    /// Ended or declined by the verifier.
    Closed,
    /// The run failed.
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Closed => write!(f, "CLOSED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

// ============================================
// Session
// ============================================

/// Outcome of one authentication against a service.
#[derive(Clone)]
pub struct Session {
    id: Option<VerifierSessionId>,
    status: SessionStatus,
    shared_key: Option<SharedKey>,
    pairing: Commitment,
    extra: Option<ExtraData>,
    failure: Option<FailureKind>,
    created_at: Timestamp,
}

impl Session {
    /// Accepted run.
    #[must_use]
    pub fn new_active(
        id: VerifierSessionId,
        shared_key: SharedKey,
        pairing: Commitment,
        extra: Option<ExtraData>,
    ) -> Self {
        Self {
            id: Some(id),
            status: SessionStatus::Active,
            shared_key: Some(shared_key),
            pairing,
            extra,
            failure: None,
            created_at: Timestamp::now(),
        }
    }

    /// Run the verifier authenticated and then declined.
    #[must_use]
    pub fn new_closed(
        id: VerifierSessionId,
        pairing: Commitment,
        extra: Option<ExtraData>,
    ) -> Self {
        Self {
            id: Some(id),
            status: SessionStatus::Closed,
            shared_key: None,
            pairing,
            extra,
            failure: None,
            created_at: Timestamp::now(),
        }
    }

    /// Failed run. The id is known only if the verifier got far enough
    /// to assign one.
    #[must_use]
    pub fn new_error(id: Option<VerifierSessionId>, pairing: Commitment, kind: FailureKind) -> Self {
        Self {
            id,
            status: SessionStatus::Error,
            shared_key: None,
            pairing,
            extra: None,
            failure: Some(kind),
            created_at: Timestamp::now(),
        }
    }

    /// Verifier-assigned id.
    #[must_use]
    pub const fn id(&self) -> Option<&VerifierSessionId> {
        self.id.as_ref()
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// `true` while `Active`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Session key, only while `Active`.
    #[must_use]
    pub fn shared_key(&self) -> Option<&SharedKey> {
        match self.status {
            SessionStatus::Active => self.shared_key.as_ref(),
            SessionStatus::Closed | SessionStatus::Error => None,
        }
    }

    /// Commitment of the pairing's service.
    #[must_use]
    pub const fn pairing(&self) -> Commitment {
        self.pairing
    }

    /// Extra data received from the verifier.
    #[must_use]
    pub const fn extra(&self) -> Option<&ExtraData> {
        self.extra.as_ref()
    }

    /// Failure kind for `Error` sessions.
    #[must_use]
    pub const fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Ends an active session and drops its key. No effect otherwise.
    pub fn close(&mut self) {
        if self.status == SessionStatus::Active {
            self.status = SessionStatus::Closed;
            self.shared_key = None;
            info!(session_id = ?self.id.as_ref().map(VerifierSessionId::as_str), "Session closed");
        }
    }

    /// Key-free persistent form. `None` for sessions without an id.
    #[must_use]
    pub fn record(&self) -> Option<SessionRecord> {
        self.id.as_ref().map(|id| SessionRecord {
            session_id: id.clone(),
            status: self.status,
            pairing: self.pairing,
            extra: self.extra.clone(),
            created_at: self.created_at,
        })
    }

    /// Persists the session.
    ///
    /// # Errors
    /// `SessionNotPersistable` for `Error` sessions, or a store failure.
    pub async fn save(&self, store: &dyn SessionStore) -> Result<()> {
        let not_persistable = || AgentError::SessionNotPersistable {
            session_id: self
                .id
                .as_ref()
                .map_or_else(|| "<none>".to_string(), ToString::to_string),
        };

        if self.status == SessionStatus::Error {
            return Err(not_persistable());
        }
        let record = self.record().ok_or_else(not_persistable)?;
        store.save_session(&record).await?;
        debug!(session_id = %record.session_id, status = %record.status, "Session saved");
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("has_key", &self.shared_key.is_some())
            .field("pairing", &self.pairing.short())
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

// ============================================
// Persistence
// ============================================

/// Persistent session row. Carries no key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Verifier-assigned id.
    pub session_id: VerifierSessionId,
    /// Status at save time, never `Error`.
    pub status: SessionStatus,
    /// Commitment of the pairing's service.
    pub pairing: Commitment,
    /// Extra data received from the verifier.
    pub extra: Option<ExtraData>,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Session history storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts or replaces a record.
    async fn save_session(&self, record: &SessionRecord) -> Result<()>;

    /// Looks up a record by id.
    async fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Removes a record. Returns `true` if one existed.
    async fn delete_session(&self, session_id: &str) -> Result<bool>;
}

/// `DashMap`-backed session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: DashMap<String, SessionRecord>,
}

impl MemorySessionStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of every record.
    #[must_use]
    pub fn all(&self) -> Vec<SessionRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save_session(&self, record: &SessionRecord) -> Result<()> {
        if record.status == SessionStatus::Error {
            return Err(AgentError::SessionNotPersistable {
                session_id: record.session_id.to_string(),
            });
        }
        self.records
            .insert(record.session_id.as_str().to_string(), record.clone());
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.records.get(session_id).map(|r| r.value().clone()))
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        Ok(self.records.remove(session_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::crypto::IdentityKeyPair;

    fn commitment() -> Commitment {
        Commitment::derive(&IdentityKeyPair::generate().public_key(), b"svc")
    }

    fn sid(s: &str) -> VerifierSessionId {
        VerifierSessionId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_active_session_saved_without_key() {
        let store = MemorySessionStore::new();
        let session = Session::new_active(
            sid("s-1"),
            SharedKey::from_bytes([7u8; 32]),
            commitment(),
            Some(ExtraData::text("cookie")),
        );
        assert!(session.shared_key().is_some());

        session.save(&store).await.unwrap();
        let record = store.load_session("s-1").await.unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Active);
        assert_eq!(record.extra, Some(ExtraData::text("cookie")));
        assert!(!serde_json::to_string(&record).unwrap().contains("key"));
    }

    #[tokio::test]
    async fn test_error_session_never_saved() {
        let store = MemorySessionStore::new();
        let session = Session::new_error(Some(sid("s-2")), commitment(), FailureKind::VerifierAuthFailed);

        let err = session.save(&store).await.unwrap_err();
        assert!(matches!(err, AgentError::SessionNotPersistable { .. }));
        // Refusal does not promote the session.
        assert_eq!(session.status(), SessionStatus::Error);
        assert!(session.save(&store).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_closed_session_saved() {
        let store = MemorySessionStore::new();
        Session::new_closed(sid("s-3"), commitment(), None)
            .save(&store)
            .await
            .unwrap();
        assert_eq!(
            store.load_session("s-3").await.unwrap().unwrap().status,
            SessionStatus::Closed
        );
        assert!(store.delete_session("s-3").await.unwrap());
        assert!(store.load_session("s-3").await.unwrap().is_none());
    }

    #[test]
    fn test_close_drops_key() {
        let mut session =
            Session::new_active(sid("s-4"), SharedKey::from_bytes([1u8; 32]), commitment(), None);
        session.close();
        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(session.shared_key().is_none());

        let mut failed = Session::new_error(None, commitment(), FailureKind::Transport);
        failed.close();
        assert_eq!(failed.status(), SessionStatus::Error);
    }
}
