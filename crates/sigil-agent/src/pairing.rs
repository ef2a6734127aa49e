// ============================================
// File: crates/sigil-agent/src/pairing.rs
// ============================================
//! # Pairings
//!
//! ## Creation Reason
//! Long-term relationships between this device and remote parties.
//!
//! ## Main Functionality
//! - `Service`: addressable verifier (name, endpoint, commitment)
//! - `Terminal`: locally trusted intermediary, also carries the next
//!   delegation sequence number
//! - `Pairing`: key pairing or lens (form credential) pairing
//!
//! ## ⚠️ Important Note for Next Developer
//! - A pairing always belongs to exactly one service; the store keys
//!   pairings by the service commitment
//! - `LensPairing::masked_credentials` is the only form that may be shown
//!   or logged
//!
//! ## Last Modified
//! v0.1.0 - Initial pairing model

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use sigil_common::SequenceNumber;
use sigil_core::crypto::{Commitment, IdentityKeyPair};
use sigil_core::protocol::ExtraData;
use sigil_transport::Endpoint;

use crate::error::Result;

/// Character used to mask private lens fields.
pub const MASK_CHAR: char = '•';

// ============================================
// Service / Terminal
// ============================================

/// A remote verifier the device authenticates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Display name.
    pub name: String,
    /// Where to reach it.
    pub endpoint: Endpoint,
    /// Identity it must prove.
    pub commitment: Commitment,
}

impl Service {
    /// Builds a service from an address URI.
    ///
    /// # Errors
    /// Transport error if the URI does not parse.
    pub fn new(name: impl Into<String>, uri: &str, commitment: Commitment) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            endpoint: Endpoint::parse(uri)?,
            commitment,
        })
    }
}

/// A terminal the user has chosen to trust.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminal {
    /// Display name.
    pub name: String,
    /// Where to reach it.
    pub endpoint: Endpoint,
    /// Identity it must prove.
    pub commitment: Commitment,
    /// Next delegation sequence number to use.
    pub next_sequence: SequenceNumber,
}

impl Terminal {
    /// Builds a terminal record with the sequence starting at 1.
    ///
    /// # Errors
    /// Transport error if the URI does not parse.
    pub fn new(name: impl Into<String>, uri: &str, commitment: Commitment) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            endpoint: Endpoint::parse(uri)?,
            commitment,
            next_sequence: SequenceNumber::new(1),
        })
    }

    /// Returns the current sequence number and advances the record.
    pub fn take_sequence(&mut self) -> SequenceNumber {
        let current = self.next_sequence;
        self.next_sequence = current.next();
        current
    }

    /// The same endpoint viewed as a service, for running the prover
    /// against the terminal.
    #[must_use]
    pub fn as_service(&self) -> Service {
        Service {
            name: self.name.clone(),
            endpoint: self.endpoint.clone(),
            commitment: self.commitment,
        }
    }
}

// ============================================
// Pairings
// ============================================

/// Pairing backed by a device key pair.
#[derive(Debug, Clone)]
pub struct KeyPairing {
    /// Service this pairing belongs to.
    pub service: Service,
    /// Device identity used with this service.
    pub key_pair: IdentityKeyPair,
    /// Extra data last received from the service.
    pub extra: Option<ExtraData>,
}

impl KeyPairing {
    /// Creates a pairing with a freshly generated key pair.
    #[must_use]
    pub fn generate(service: Service) -> Self {
        Self {
            service,
            key_pair: IdentityKeyPair::generate(),
            extra: None,
        }
    }
}

/// Pairing backed by form credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct LensPairing {
    /// Service this pairing belongs to.
    pub service: Service,
    /// Field name to value.
    pub credentials: BTreeMap<String, String>,
    /// Fields whose values must be masked for display.
    pub private_fields: BTreeSet<String>,
}

impl LensPairing {
    /// Credentials with every private value replaced by mask characters
    /// of the same length.
    #[must_use]
    pub fn masked_credentials(&self) -> BTreeMap<String, String> {
        self.credentials
            .iter()
            .map(|(field, value)| {
                let shown = if self.private_fields.contains(field) {
                    std::iter::repeat(MASK_CHAR)
                        .take(value.chars().count())
                        .collect()
                } else {
                    value.clone()
                };
                (field.clone(), shown)
            })
            .collect()
    }
}

impl fmt::Debug for LensPairing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LensPairing")
            .field("service", &self.service.name)
            .field("credentials", &self.masked_credentials())
            .field("private_fields", &self.private_fields)
            .finish()
    }
}

/// A long-term relationship with one service.
#[derive(Debug, Clone)]
pub enum Pairing {
    /// Key pairing.
    Key(KeyPairing),
    /// Lens pairing.
    Lens(LensPairing),
}

impl Pairing {
    /// Service of this pairing.
    #[must_use]
    pub const fn service(&self) -> &Service {
        match self {
            Self::Key(p) => &p.service,
            Self::Lens(p) => &p.service,
        }
    }

    /// Commitment of the service, which is also the store key.
    #[must_use]
    pub const fn commitment(&self) -> Commitment {
        self.service().commitment
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.service().name
    }

    /// Type tag for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Key(_) => "key",
            Self::Lens(_) => "lens",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> Service {
        let c = Commitment::derive(&IdentityKeyPair::generate().public_key(), b"svc");
        Service::new("mail", "tcp://127.0.0.1:9000", c).unwrap()
    }

    #[test]
    fn test_masked_credentials() {
        let lens = LensPairing {
            service: service(),
            credentials: BTreeMap::from([
                ("user".to_string(), "alice".to_string()),
                ("password".to_string(), "hunter2".to_string()),
            ]),
            private_fields: BTreeSet::from(["password".to_string()]),
        };
        let masked = lens.masked_credentials();
        assert_eq!(masked["user"], "alice");
        assert_eq!(masked["password"], "•••••••");
        assert!(!format!("{lens:?}").contains("hunter2"));
    }

    #[test]
    fn test_take_sequence_advances() {
        let mut t = Terminal::new("desk", "tcp://10.0.0.2:7000", service().commitment).unwrap();
        assert_eq!(t.take_sequence().value(), 1);
        assert_eq!(t.take_sequence().value(), 2);
        assert_eq!(t.next_sequence.value(), 3);
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let c = service().commitment;
        assert!(Service::new("x", "ftp://host/", c).is_err());
    }

    #[test]
    fn test_pairing_accessors() {
        let p = Pairing::Key(KeyPairing::generate(service()));
        assert_eq!(p.name(), "mail");
        assert_eq!(p.kind(), "key");
        assert_eq!(p.commitment(), p.service().commitment);
    }
}
