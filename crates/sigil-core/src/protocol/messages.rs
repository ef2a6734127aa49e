// ============================================
// File: crates/sigil-core/src/protocol/messages.rs
// ============================================
//! # Protocol Messages
//!
//! ## Creation Reason
//! The five records exchanged by the SIGMA run and the delegation
//! sub-protocol, as one tagged [`Envelope`].
//!
//! ## Message Flow
//! ```text
//! Prover                                   Verifier
//!   │  prover_commit  {version, X, [commitment]}  │
//!   │ ───────────────────────────────────────────►│
//!   │  verifier_proof {sid, Y, id_V, meta,        │
//!   │                  sig_V, mac_V}              │
//!   │ ◄───────────────────────────────────────────│
//!   │  prover_proof   {id_P, sig_P, mac_P,        │
//!   │                  [extra]}                   │
//!   │ ───────────────────────────────────────────►│
//!   │  verdict        {accepted, [extra]}         │
//!   │ ◄───────────────────────────────────────────│
//!
//! Device                                   Terminal
//!   │  reauth {sid, state, sequence, payload}     │
//!   │ ───────────────────────────────────────────►│
//! ```
//!
//! ## Field Encoding
//! - Binary fields: standard base64
//! - Commitments: lowercase hex
//! - Optional fields are omitted when absent
//!
//! ## ⚠️ Important Note for Next Developer
//! - Renaming a field or tag breaks every deployed peer
//! - `ExtraData` is versioned by its `format` tag, never by shape
//!
//! ## Last Modified
//! v0.1.0 - Initial message definitions

use serde::{Deserialize, Serialize};

use sigil_common::types::{SequenceNumber, VerifierSessionId};

use super::version::ProtocolVersion;
use crate::crypto::{Commitment, IdentityPublicKey};
use crate::error::{CoreError, Result};

// ============================================
// Base64 Field Helpers
// ============================================

/// Serde adapter for `Vec<u8>` fields as base64 strings.
pub mod b64 {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes bytes as a base64 string.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    /// Deserializes bytes from a base64 string.
    ///
    /// # Errors
    /// Fails on invalid base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for 32-byte public values as base64 strings.
pub mod b64_32 {
    use serde::{Deserializer, Serializer};

    /// Serializes a 32-byte array as base64.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        super::b64::serialize(bytes, serializer)
    }

    /// Deserializes a 32-byte array from base64.
    ///
    /// # Errors
    /// Fails on invalid base64 or wrong length.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let bytes = super::b64::deserialize(deserializer)?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::invalid_length(len, &"32 bytes"))
    }
}

// ============================================
// SealedPayload
// ============================================

/// AEAD output (`nonce || ciphertext || tag`) carried inside a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    /// Sealed bytes
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
}

impl SealedPayload {
    /// Wraps sealed bytes.
    #[must_use]
    pub fn new(ciphertext: Vec<u8>) -> Self {
        Self { ciphertext }
    }
}

// ============================================
// ExtraData
// ============================================

/// Application payload optionally exchanged during authentication.
///
/// # Wire Format
/// ```json
/// {"format": "text",  "data": "..."}
/// {"format": "named", "name": "...", "data": "..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ExtraData {
    /// Plain string payload
    Text {
        /// Payload
        data: String,
    },
    /// Payload with a display name (e.g. a pairing name chosen by the service)
    Named {
        /// Display name
        name: String,
        /// Payload
        data: String,
    },
}

impl ExtraData {
    /// Creates a `Text` payload.
    pub fn text(data: impl Into<String>) -> Self {
        Self::Text { data: data.into() }
    }

    /// Creates a `Named` payload.
    pub fn named(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Named {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Returns the payload string.
    #[must_use]
    pub fn data(&self) -> &str {
        match self {
            Self::Text { data } | Self::Named { data, .. } => data,
        }
    }

    /// Returns the name, for `Named` payloads.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Named { name, .. } => Some(name),
        }
    }

    /// Serializes to the bytes that get sealed.
    ///
    /// # Errors
    /// `MalformedMessage` if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CoreError::malformed(format!("extra data: {e}")))
    }

    /// Parses opened bytes. A payload without a known `format` tag is
    /// rejected rather than guessed at.
    ///
    /// # Errors
    /// `MalformedMessage` on anything but a tagged payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::malformed(format!("extra data: {e}")))
    }
}

// ============================================
// SIGMA Messages
// ============================================

/// First message: prover's ephemeral public value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverCommit {
    /// Version the prover speaks
    pub version: ProtocolVersion,
    /// Prover ephemeral `X`
    #[serde(with = "b64_32")]
    pub ephemeral: [u8; 32],
    /// Commitment the prover expects (disclosed mode only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment: Option<Commitment>,
}

/// Second message: verifier identity and proof of possession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierProof {
    /// Session id chosen by the verifier
    pub session_id: VerifierSessionId,
    /// Verifier ephemeral `Y`
    #[serde(with = "b64_32")]
    pub ephemeral: [u8; 32],
    /// Verifier long-term identity
    pub identity: IdentityPublicKey,
    /// Metadata hashed into the commitment
    #[serde(with = "b64")]
    pub metadata: Vec<u8>,
    /// Signature over the verifier transcript
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
    /// Identity MAC under `km`
    #[serde(with = "b64")]
    pub mac: Vec<u8>,
}

/// Third message: prover identity, proof, optional sealed extra data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverProof {
    /// Prover long-term identity
    pub identity: IdentityPublicKey,
    /// Signature over the prover transcript
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
    /// Identity MAC under `km`
    #[serde(with = "b64")]
    pub mac: Vec<u8>,
    /// `ExtraData` sealed under `ks`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<SealedPayload>,
}

/// Final message: the verifier's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the verifier accepts the prover
    pub accepted: bool,
    /// `ExtraData` sealed under `ks`, only meaningful when accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<SealedPayload>,
}

// ============================================
// Reauthentication
// ============================================

/// State tag of a reauthentication message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReauthState {
    /// Continue the referenced session on the terminal
    Continue,
}

impl ReauthState {
    /// Wire name, also bound into the AEAD data.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "CONTINUE",
        }
    }
}

/// Delegation message: header in clear, token sealed under the terminal key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reauth {
    /// Session being continued, or a placeholder
    pub session_id: String,
    /// State tag
    pub state: ReauthState,
    /// Freshness value
    pub sequence: SequenceNumber,
    /// Sealed token
    pub payload: SealedPayload,
}

// ============================================
// Envelope
// ============================================

/// Every message that crosses a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// See [`ProverCommit`]
    ProverCommit(ProverCommit),
    /// See [`VerifierProof`]
    VerifierProof(VerifierProof),
    /// See [`ProverProof`]
    ProverProof(ProverProof),
    /// See [`Verdict`]
    Verdict(Verdict),
    /// See [`Reauth`]
    Reauth(Reauth),
}

impl Envelope {
    /// Wire tag of this message, for logs and `UnexpectedMessage`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ProverCommit(_) => "prover_commit",
            Self::VerifierProof(_) => "verifier_proof",
            Self::ProverProof(_) => "prover_proof",
            Self::Verdict(_) => "verdict",
            Self::Reauth(_) => "reauth",
        }
    }

    /// Unwraps a `prover_commit`.
    ///
    /// # Errors
    /// `UnexpectedMessage` for any other type.
    pub fn into_prover_commit(self) -> Result<ProverCommit> {
        match self {
            Self::ProverCommit(m) => Ok(m),
            other => Err(CoreError::unexpected("prover_commit", other.kind())),
        }
    }

    /// Unwraps a `verifier_proof`.
    ///
    /// # Errors
    /// `UnexpectedMessage` for any other type.
    pub fn into_verifier_proof(self) -> Result<VerifierProof> {
        match self {
            Self::VerifierProof(m) => Ok(m),
            other => Err(CoreError::unexpected("verifier_proof", other.kind())),
        }
    }

    /// Unwraps a `prover_proof`.
    ///
    /// # Errors
    /// `UnexpectedMessage` for any other type.
    pub fn into_prover_proof(self) -> Result<ProverProof> {
        match self {
            Self::ProverProof(m) => Ok(m),
            other => Err(CoreError::unexpected("prover_proof", other.kind())),
        }
    }

    /// Unwraps a `verdict`.
    ///
    /// # Errors
    /// `UnexpectedMessage` for any other type.
    pub fn into_verdict(self) -> Result<Verdict> {
        match self {
            Self::Verdict(m) => Ok(m),
            other => Err(CoreError::unexpected("verdict", other.kind())),
        }
    }

    /// Unwraps a `reauth`.
    ///
    /// # Errors
    /// `UnexpectedMessage` for any other type.
    pub fn into_reauth(self) -> Result<Reauth> {
        match self {
            Self::Reauth(m) => Ok(m),
            other => Err(CoreError::unexpected("reauth", other.kind())),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_data_tagged_formats() {
        let text = ExtraData::text("hello");
        assert_eq!(
            String::from_utf8(text.to_bytes().unwrap()).unwrap(),
            r#"{"format":"text","data":"hello"}"#
        );

        let named = ExtraData::from_bytes(br#"{"format":"named","name":"Door","data":"x"}"#).unwrap();
        assert_eq!(named.name(), Some("Door"));
        assert_eq!(named.data(), "x");
    }

    #[test]
    fn test_extra_data_rejects_untagged() {
        // Bare strings and untagged objects are not guessed at.
        assert!(ExtraData::from_bytes(b"\"just a string\"").is_err());
        assert!(ExtraData::from_bytes(br#"{"name":"Door","data":"x"}"#).is_err());
        assert!(ExtraData::from_bytes(br#"{"format":"xml","data":"x"}"#).is_err());
    }

    #[test]
    fn test_prover_commit_omits_withheld_commitment() {
        let msg = Envelope::ProverCommit(ProverCommit {
            version: ProtocolVersion::CURRENT,
            ephemeral: [7u8; 32],
            commitment: None,
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"prover_commit""#));
        assert!(json.contains(r#""version":"1.1""#));
        assert!(!json.contains("commitment"));
    }

    #[test]
    fn test_reauth_state_wire_name() {
        let json = serde_json::to_string(&ReauthState::Continue).unwrap();
        assert_eq!(json, "\"CONTINUE\"");
        assert_eq!(ReauthState::Continue.as_str(), "CONTINUE");
    }

    #[test]
    fn test_envelope_unwrap_wrong_type() {
        let msg = Envelope::Verdict(Verdict {
            accepted: true,
            extra: None,
        });
        let err = msg.into_verifier_proof().unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnexpectedMessage {
                expected: "verifier_proof",
                got: "verdict"
            }
        ));
    }
}
