// ============================================
// File: crates/sigil-agent/src/store.rs
// ============================================
//! # Credential Store
//!
//! Commitment-keyed lookups for pairings and trusted terminals. The
//! authenticator only depends on the [`CredentialStore`] trait; the
//! in-memory implementation backs tests and the CLI.
//!
//! ## ⚠️ Important Note for Next Developer
//! Implementations must serialize writes per commitment. The authenticator
//! does read-modify-write on pairings and terminals and relies on it.
//!
//! ## Last Modified
//! v0.1.0 - Initial credential store

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use sigil_core::crypto::Commitment;

use crate::error::Result;
use crate::pairing::{Pairing, Terminal};

/// Storage for pairings and trusted terminals.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Pairing for the service with this commitment.
    async fn get_pairing_by_commitment(&self, commitment: &Commitment) -> Result<Option<Pairing>>;

    /// Inserts or replaces the pairing keyed by its service commitment.
    async fn save_or_update_pairing(&self, pairing: &Pairing) -> Result<()>;

    /// Removes a pairing. Returns `true` if one existed.
    async fn delete_pairing(&self, commitment: &Commitment) -> Result<bool>;

    /// Trusted terminal with this commitment.
    async fn get_terminal_by_commitment(&self, commitment: &Commitment)
        -> Result<Option<Terminal>>;

    /// Inserts or replaces a trusted terminal.
    async fn save_terminal(&self, terminal: &Terminal) -> Result<()>;
}

/// `DashMap`-backed store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    pairings: DashMap<Commitment, Pairing>,
    terminals: DashMap<Commitment, Terminal>,
}

impl MemoryCredentialStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored pairings.
    #[must_use]
    pub fn pairing_count(&self) -> usize {
        self.pairings.len()
    }

    /// Number of trusted terminals.
    #[must_use]
    pub fn terminal_count(&self) -> usize {
        self.terminals.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_pairing_by_commitment(&self, commitment: &Commitment) -> Result<Option<Pairing>> {
        Ok(self.pairings.get(commitment).map(|r| r.value().clone()))
    }

    async fn save_or_update_pairing(&self, pairing: &Pairing) -> Result<()> {
        let replaced = self
            .pairings
            .insert(pairing.commitment(), pairing.clone())
            .is_some();
        debug!(
            commitment = %pairing.commitment().short(),
            kind = pairing.kind(),
            replaced,
            "Pairing saved"
        );
        Ok(())
    }

    async fn delete_pairing(&self, commitment: &Commitment) -> Result<bool> {
        Ok(self.pairings.remove(commitment).is_some())
    }

    async fn get_terminal_by_commitment(
        &self,
        commitment: &Commitment,
    ) -> Result<Option<Terminal>> {
        Ok(self.terminals.get(commitment).map(|r| r.value().clone()))
    }

    async fn save_terminal(&self, terminal: &Terminal) -> Result<()> {
        self.terminals.insert(terminal.commitment, terminal.clone());
        debug!(
            commitment = %terminal.commitment.short(),
            next_sequence = terminal.next_sequence.value(),
            "Terminal saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::crypto::IdentityKeyPair;
    use sigil_core::protocol::ExtraData;

    use crate::pairing::{KeyPairing, Service};

    fn commitment() -> Commitment {
        Commitment::derive(&IdentityKeyPair::generate().public_key(), b"")
    }

    #[tokio::test]
    async fn test_pairing_crud() {
        let store = MemoryCredentialStore::new();
        let c = commitment();
        let service = Service::new("svc", "tcp://127.0.0.1:1", c).unwrap();

        assert!(store.get_pairing_by_commitment(&c).await.unwrap().is_none());

        let mut pairing = KeyPairing::generate(service);
        store
            .save_or_update_pairing(&Pairing::Key(pairing.clone()))
            .await
            .unwrap();

        pairing.extra = Some(ExtraData::text("v2"));
        store
            .save_or_update_pairing(&Pairing::Key(pairing))
            .await
            .unwrap();
        assert_eq!(store.pairing_count(), 1);

        match store.get_pairing_by_commitment(&c).await.unwrap() {
            Some(Pairing::Key(p)) => assert_eq!(p.extra, Some(ExtraData::text("v2"))),
            other => panic!("unexpected {other:?}"),
        }

        assert!(store.delete_pairing(&c).await.unwrap());
        assert!(!store.delete_pairing(&c).await.unwrap());
    }

    #[tokio::test]
    async fn test_terminal_lookup() {
        let store = MemoryCredentialStore::new();
        let c = commitment();
        assert!(store.get_terminal_by_commitment(&c).await.unwrap().is_none());

        let terminal = Terminal::new("desk", "tcp://127.0.0.1:2", c).unwrap();
        store.save_terminal(&terminal).await.unwrap();
        assert_eq!(
            store.get_terminal_by_commitment(&c).await.unwrap(),
            Some(terminal)
        );
    }
}
