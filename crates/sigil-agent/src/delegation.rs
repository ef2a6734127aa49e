// ============================================
// File: crates/sigil-agent/src/delegation.rs
// ============================================
//! # Delegation (Reauthentication)
//!
//! ## Creation Reason
//! Hands an authentication token to a terminal the device has already
//! authenticated to, over a fresh channel, without another SIGMA run.
//!
//! ## Main Functionality
//! - `AuthToken`: bearer credential from an active session or a lens pairing
//! - `seal_reauth` / `open_reauth`: AEAD under the terminal key
//! - `Delegator`: opens the channel and sends one `reauth` message
//! - `DelegationReceiver`: terminal side, AEAD check then replay check
//!
//! ## Wire Layout
//! ```text
//! reauth {session_id, state, sequence, payload}
//!   payload = AES-256-GCM(terminal_key, token_json,
//!             aad = "sigil-reauth-v1" | u16 len(session_id) | session_id
//!                   | state | u64 sequence)
//! ```
//!
//! ## Sequence Numbers
//! `Monotonic` (default) takes the terminal record's counter and the
//! receiver tracks a sliding window. `Random` draws a fresh value per
//! message; with it the receiver can only rely on the AEAD tag.
//!
//! ## ⚠️ Important Note for Next Developer
//! - A delegation failure never changes the session the token came from
//! - Header fields are in clear but bound by the AAD; editing any of them
//!   makes the tag check fail
//!
//! ## Last Modified
//! v0.1.0 - Initial delegation implementation

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use sigil_common::SequenceNumber;
use sigil_core::crypto::{aead, Commitment, SharedKey};
use sigil_core::protocol::messages::b64;
use sigil_core::protocol::{
    Codec, Envelope, ExtraData, JsonCodec, Reauth, ReauthState, SealedPayload,
};
use sigil_core::CoreError;

use crate::connector::ChannelConnector;
use crate::engine::Proxy;
use crate::error::{DelegationError, ProtocolFailure};
use crate::pairing::{LensPairing, Terminal};
use crate::session::Session;

/// Result type for delegation.
pub type Result<T> = std::result::Result<T, DelegationError>;

/// AAD prefix for reauth payloads.
const REAUTH_AAD_LABEL: &[u8] = b"sigil-reauth-v1";

// ============================================
// AuthToken
// ============================================

/// Where a token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Active key-pairing session.
    Session,
    /// Lens pairing credentials.
    Lens,
}

/// Opaque bearer credential. Bytes are wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    kind: TokenKind,
    #[serde(with = "b64")]
    bytes: Vec<u8>,
}

#[derive(Serialize)]
struct SessionTokenBody<'a> {
    session_id: &'a str,
    service: Commitment,
    extra: Option<&'a ExtraData>,
}

impl AuthToken {
    /// Wraps raw token bytes.
    #[must_use]
    pub fn new(kind: TokenKind, bytes: Vec<u8>) -> Self {
        Self { kind, bytes }
    }

    /// Token for an active session: its id, service and extra data.
    ///
    /// # Errors
    /// `NoToken` unless the session is `Active`.
    pub fn from_session(session: &Session) -> Result<Self> {
        let id = match session.id() {
            Some(id) if session.is_active() => id,
            _ => {
                return Err(DelegationError::NoToken {
                    reason: format!("session status is {}", session.status()),
                })
            }
        };
        let body = SessionTokenBody {
            session_id: id.as_str(),
            service: session.pairing(),
            extra: session.extra(),
        };
        let bytes = serde_json::to_vec(&body).map_err(encoding)?;
        Ok(Self::new(TokenKind::Session, bytes))
    }

    /// Token carrying a lens pairing's credentials.
    ///
    /// # Errors
    /// `Encoding` if the credentials cannot be serialized.
    pub fn from_lens(pairing: &LensPairing) -> Result<Self> {
        let bytes = serde_json::to_vec(&pairing.credentials).map_err(encoding)?;
        Ok(Self::new(TokenKind::Lens, bytes))
    }

    /// Token source.
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decodes a lens token back to credentials.
    ///
    /// # Errors
    /// `NoToken` for session tokens, `Encoding` for malformed bytes.
    pub fn lens_credentials(&self) -> Result<BTreeMap<String, String>> {
        if self.kind != TokenKind::Lens {
            return Err(DelegationError::NoToken {
                reason: "not a lens token".into(),
            });
        }
        serde_json::from_slice(&self.bytes).map_err(encoding)
    }
}

impl Drop for AuthToken {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken({:?}, {} bytes)", self.kind, self.bytes.len())
    }
}

fn encoding(err: serde_json::Error) -> DelegationError {
    DelegationError::Encoding {
        source: CoreError::malformed(format!("token: {err}")),
    }
}

fn from_channel(failure: ProtocolFailure) -> DelegationError {
    match failure {
        ProtocolFailure::Transport(e) => DelegationError::Transport(e),
        other => DelegationError::Encoding {
            source: CoreError::malformed(other.to_string()),
        },
    }
}

// ============================================
// Sealing
// ============================================

/// Plaintext view of a `reauth` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReauthMessage {
    /// Session being continued, or a placeholder.
    pub session_id: String,
    /// State tag.
    pub state: ReauthState,
    /// Freshness value.
    pub sequence: SequenceNumber,
    /// Credential being delegated.
    pub token: AuthToken,
}

impl ReauthMessage {
    /// `CONTINUE` message.
    #[must_use]
    pub fn continue_session(
        session_id: impl Into<String>,
        sequence: SequenceNumber,
        token: AuthToken,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            state: ReauthState::Continue,
            sequence,
            token,
        }
    }
}

fn reauth_aad(session_id: &str, state: ReauthState, sequence: SequenceNumber) -> Vec<u8> {
    let state = state.as_str().as_bytes();
    let mut aad =
        Vec::with_capacity(REAUTH_AAD_LABEL.len() + 2 + session_id.len() + state.len() + 8);
    aad.extend_from_slice(REAUTH_AAD_LABEL);
    aad.extend_from_slice(&(session_id.len() as u16).to_be_bytes());
    aad.extend_from_slice(session_id.as_bytes());
    aad.extend_from_slice(state);
    aad.extend_from_slice(&sequence.to_be_bytes());
    aad
}

/// Seals `message` under the terminal key.
///
/// # Errors
/// `Encoding` if the token cannot be serialized, `InvalidKey` if sealing fails.
pub fn seal_reauth(key: &SharedKey, message: &ReauthMessage) -> Result<Reauth> {
    let plaintext = Zeroizing::new(serde_json::to_vec(&message.token).map_err(encoding)?);
    let aad = reauth_aad(&message.session_id, message.state, message.sequence);
    let sealed = aead::seal(key, &plaintext, &aad)?;
    Ok(Reauth {
        session_id: message.session_id.clone(),
        state: message.state,
        sequence: message.sequence,
        payload: SealedPayload::new(sealed),
    })
}

/// Opens a `reauth` message.
///
/// # Errors
/// `InvalidKey` for a wrong key or any tampering, `Encoding` for a
/// malformed token.
pub fn open_reauth(key: &SharedKey, reauth: &Reauth) -> Result<ReauthMessage> {
    let aad = reauth_aad(&reauth.session_id, reauth.state, reauth.sequence);
    let plaintext = aead::open(key, &reauth.payload.ciphertext, &aad)?;
    let token: AuthToken = serde_json::from_slice(&plaintext).map_err(encoding)?;
    Ok(ReauthMessage {
        session_id: reauth.session_id.clone(),
        state: reauth.state,
        sequence: reauth.sequence,
        token,
    })
}

// ============================================
// Sequence Policy & Replay Window
// ============================================

/// How delegation sequence numbers are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequencePolicy {
    /// Per-terminal counter; receivers enforce a replay window.
    #[default]
    Monotonic,
    /// Fresh random value per message. For terminals that predate counters.
    Random,
}

/// Sequence numbers tracked behind the highest one seen.
const REPLAY_WINDOW_SIZE: u64 = 256;

const BITMAP_WORDS: usize = (REPLAY_WINDOW_SIZE / 64) as usize;

/// Result of a replay check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayCheckResult {
    /// Inside the window and unseen; recorded.
    Accept,
    /// Ahead of the window; window advanced.
    AcceptAndAdvance,
    /// Already seen.
    Replay,
    /// Behind the window.
    TooOld,
}

/// Sliding-window replay detection over sequence numbers.
///
/// # Algorithm
/// - Window covers `highest_seen - WINDOW_SIZE + 1 ..= highest_seen`
/// - Ahead of window: accept, clear the bits that slid out, advance
/// - Inside window: accept once per value
/// - Behind window: reject
pub struct ReplayWindow {
    highest_seen: u64,
    bitmap: [u64; BITMAP_WORDS],
}

impl ReplayWindow {
    /// Empty window.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            highest_seen: 0,
            bitmap: [0u64; BITMAP_WORDS],
        }
    }

    /// Checks `sequence` and records it when accepted.
    pub fn check_and_record(&mut self, sequence: u64) -> ReplayCheckResult {
        if sequence > self.highest_seen {
            let advance = sequence - self.highest_seen;
            if advance >= REPLAY_WINDOW_SIZE {
                self.bitmap = [0u64; BITMAP_WORDS];
            } else {
                for i in 1..=advance {
                    self.clear_bit(self.highest_seen + i);
                }
            }
            self.highest_seen = sequence;
            self.set_bit(sequence);
            return ReplayCheckResult::AcceptAndAdvance;
        }

        if sequence < self.window_base() {
            return ReplayCheckResult::TooOld;
        }
        if self.get_bit(sequence) {
            return ReplayCheckResult::Replay;
        }
        self.set_bit(sequence);
        ReplayCheckResult::Accept
    }

    #[inline]
    fn slot(sequence: u64) -> (usize, u64) {
        let bit = (sequence % REPLAY_WINDOW_SIZE) as usize;
        (bit / 64, 1u64 << (bit % 64))
    }

    fn get_bit(&self, sequence: u64) -> bool {
        let (word, mask) = Self::slot(sequence);
        self.bitmap[word] & mask != 0
    }

    fn set_bit(&mut self, sequence: u64) {
        let (word, mask) = Self::slot(sequence);
        self.bitmap[word] |= mask;
    }

    fn clear_bit(&mut self, sequence: u64) {
        let (word, mask) = Self::slot(sequence);
        self.bitmap[word] &= !mask;
    }

    /// Highest sequence number accepted so far.
    #[must_use]
    pub const fn highest_seen(&self) -> u64 {
        self.highest_seen
    }

    /// Oldest sequence number still inside the window.
    #[must_use]
    pub const fn window_base(&self) -> u64 {
        self.highest_seen.saturating_sub(REPLAY_WINDOW_SIZE - 1)
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReplayWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayWindow")
            .field("highest_seen", &self.highest_seen)
            .field("window_base", &self.window_base())
            .finish()
    }
}

// ============================================
// Receiver
// ============================================

/// Terminal-side handling of `reauth` messages.
pub struct DelegationReceiver {
    key: SharedKey,
    policy: SequencePolicy,
    window: Mutex<ReplayWindow>,
}

impl DelegationReceiver {
    /// Receiver for messages sealed under `key`.
    #[must_use]
    pub fn new(key: SharedKey, policy: SequencePolicy) -> Self {
        Self {
            key,
            policy,
            window: Mutex::new(ReplayWindow::new()),
        }
    }

    /// Opens `reauth`, then applies the replay window in `Monotonic` mode.
    /// The window is only updated for authentic messages.
    ///
    /// # Errors
    /// `InvalidKey`, `Encoding`, `Replayed` or `Stale`.
    pub fn receive(&self, reauth: &Reauth) -> Result<ReauthMessage> {
        let message = open_reauth(&self.key, reauth).map_err(|e| {
            warn!(session_id = %reauth.session_id, error = %e, "Rejected reauth message");
            e
        })?;

        if self.policy == SequencePolicy::Monotonic {
            let sequence = message.sequence.value();
            match self.window.lock().check_and_record(sequence) {
                ReplayCheckResult::Accept | ReplayCheckResult::AcceptAndAdvance => {}
                ReplayCheckResult::Replay => {
                    warn!(sequence, "Replayed reauth message");
                    return Err(DelegationError::Replayed { sequence });
                }
                ReplayCheckResult::TooOld => {
                    warn!(sequence, "Stale reauth message");
                    return Err(DelegationError::Stale { sequence });
                }
            }
        }

        debug!(
            session_id = %message.session_id,
            sequence = message.sequence.value(),
            kind = ?message.token.kind(),
            "Reauth message accepted"
        );
        Ok(message)
    }

    /// Receives one message from `proxy`.
    ///
    /// # Errors
    /// As [`receive`](Self::receive), plus `Transport` and `Encoding` for
    /// channel failures and unexpected messages.
    pub async fn accept(&self, proxy: &mut Proxy) -> Result<ReauthMessage> {
        let reauth = proxy.recv().await.map_err(from_channel)?.into_reauth()?;
        self.receive(&reauth)
    }
}

impl fmt::Debug for DelegationReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegationReceiver")
            .field("policy", &self.policy)
            .field("window", &*self.window.lock())
            .finish_non_exhaustive()
    }
}

// ============================================
// Delegator
// ============================================

/// Sends tokens to trusted terminals.
pub struct Delegator {
    connector: Arc<dyn ChannelConnector>,
    codec: Arc<dyn Codec>,
    policy: SequencePolicy,
}

impl Delegator {
    /// Delegator using the JSON codec.
    #[must_use]
    pub fn new(connector: Arc<dyn ChannelConnector>, policy: SequencePolicy) -> Self {
        Self {
            connector,
            codec: Arc::new(JsonCodec::new()),
            policy,
        }
    }

    /// Replaces the codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Active sequence policy.
    #[must_use]
    pub const fn policy(&self) -> SequencePolicy {
        self.policy
    }

    /// Seals `token` under `key` and sends it to `terminal` over a new
    /// channel. In `Monotonic` mode the terminal's counter is consumed
    /// before anything is sent; the caller persists the terminal.
    ///
    /// Returns the sequence number used.
    ///
    /// # Errors
    /// `InvalidKey`, `Encoding` or `Transport`.
    pub async fn delegate(
        &self,
        terminal: &mut Terminal,
        key: &SharedKey,
        session_id: &str,
        token: &AuthToken,
    ) -> Result<SequenceNumber> {
        let sequence = match self.policy {
            SequencePolicy::Monotonic => terminal.take_sequence(),
            SequencePolicy::Random => SequenceNumber::random(),
        };
        let message = ReauthMessage::continue_session(session_id, sequence, token.clone());
        let reauth = seal_reauth(key, &message)?;

        let endpoint = terminal
            .endpoint
            .clone()
            .keyed(terminal.commitment.to_string());
        let channel = self.connector.connect(&endpoint).await?;
        let mut proxy = Proxy::new(channel, Arc::clone(&self.codec));

        let sent = proxy.send(&Envelope::Reauth(reauth)).await;
        proxy.close().await;
        sent.map_err(from_channel)?;

        info!(
            terminal = %terminal.name,
            commitment = %terminal.commitment.short(),
            sequence = sequence.value(),
            "Token delegated"
        );
        Ok(sequence)
    }
}

impl fmt::Debug for Delegator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegator")
            .field("codec", &self.codec.name())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use sigil_common::VerifierSessionId;
    use sigil_core::crypto::IdentityKeyPair;
    use sigil_transport::MockChannel;

    use crate::connector::QueuedConnector;
    use crate::error::FailureKind;
    use crate::pairing::Service;

    fn key(b: u8) -> SharedKey {
        SharedKey::from_bytes([b; 32])
    }

    fn commitment() -> Commitment {
        Commitment::derive(&IdentityKeyPair::generate().public_key(), b"desk")
    }

    fn token() -> AuthToken {
        AuthToken::new(TokenKind::Session, b"bearer-123".to_vec())
    }

    fn message(seq: u64) -> ReauthMessage {
        ReauthMessage::continue_session("sess-1", SequenceNumber::new(seq), token())
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let sealed = seal_reauth(&key(1), &message(5)).unwrap();
        assert_eq!(sealed.state, ReauthState::Continue);
        let opened = open_reauth(&key(1), &sealed).unwrap();
        assert_eq!(opened.token.as_bytes(), b"bearer-123");
        assert_eq!(opened, message(5));
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let sealed = seal_reauth(&key(1), &message(5)).unwrap();
        let err = open_reauth(&key(2), &sealed).unwrap_err();
        assert!(matches!(
            err,
            DelegationError::InvalidKey {
                source: CoreError::Decryption
            }
        ));
        assert!(err.is_suspicious());
    }

    #[test]
    fn test_bit_flip_detected() {
        let mut sealed = seal_reauth(&key(1), &message(5)).unwrap();
        let last = sealed.payload.ciphertext.len() - 1;
        sealed.payload.ciphertext[last / 2] ^= 0x01;
        assert!(matches!(
            open_reauth(&key(1), &sealed),
            Err(DelegationError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_header_bound_by_aad() {
        let mut sealed = seal_reauth(&key(1), &message(5)).unwrap();
        sealed.sequence = SequenceNumber::new(6);
        assert!(open_reauth(&key(1), &sealed).is_err());

        let mut sealed = seal_reauth(&key(1), &message(5)).unwrap();
        sealed.session_id = "sess-2".into();
        assert!(open_reauth(&key(1), &sealed).is_err());
    }

    #[test]
    fn test_replay_window() {
        let mut w = ReplayWindow::new();
        assert_eq!(w.check_and_record(1), ReplayCheckResult::AcceptAndAdvance);
        assert_eq!(w.check_and_record(3), ReplayCheckResult::AcceptAndAdvance);
        assert_eq!(w.check_and_record(2), ReplayCheckResult::Accept);
        assert_eq!(w.check_and_record(2), ReplayCheckResult::Replay);
        assert_eq!(w.check_and_record(3), ReplayCheckResult::Replay);

        assert_eq!(w.check_and_record(1000), ReplayCheckResult::AcceptAndAdvance);
        assert_eq!(w.window_base(), 1000 - REPLAY_WINDOW_SIZE + 1);
        assert_eq!(w.check_and_record(3), ReplayCheckResult::TooOld);
        assert_eq!(w.check_and_record(999), ReplayCheckResult::Accept);
    }

    #[test]
    fn test_receiver_rejects_replay_in_monotonic_mode() {
        let receiver = DelegationReceiver::new(key(1), SequencePolicy::Monotonic);
        let sealed = seal_reauth(&key(1), &message(7)).unwrap();
        receiver.receive(&sealed).unwrap();
        assert!(matches!(
            receiver.receive(&sealed),
            Err(DelegationError::Replayed { sequence: 7 })
        ));
    }

    #[test]
    fn test_forged_message_does_not_advance_window() {
        let receiver = DelegationReceiver::new(key(1), SequencePolicy::Monotonic);
        let forged = seal_reauth(&key(9), &message(50)).unwrap();
        assert!(receiver.receive(&forged).is_err());
        receiver
            .receive(&seal_reauth(&key(1), &message(2)).unwrap())
            .unwrap();
    }

    #[test]
    fn test_random_policy_skips_window() {
        let receiver = DelegationReceiver::new(key(1), SequencePolicy::Random);
        let sealed = seal_reauth(&key(1), &message(7)).unwrap();
        receiver.receive(&sealed).unwrap();
        receiver.receive(&sealed).unwrap();
    }

    #[test]
    fn test_token_from_session_requires_active() {
        let sid = VerifierSessionId::new("s-9").unwrap();
        let active = Session::new_active(sid.clone(), key(3), commitment(), None);
        let token = AuthToken::from_session(&active).unwrap();
        assert_eq!(token.kind(), TokenKind::Session);
        assert!(String::from_utf8_lossy(token.as_bytes()).contains("s-9"));

        let closed = Session::new_closed(sid.clone(), commitment(), None);
        assert!(matches!(
            AuthToken::from_session(&closed),
            Err(DelegationError::NoToken { .. })
        ));
        let failed = Session::new_error(Some(sid), commitment(), FailureKind::Transport);
        assert!(AuthToken::from_session(&failed).is_err());
    }

    #[test]
    fn test_lens_token_roundtrip() {
        let lens = LensPairing {
            service: Service::new("intranet", "tcp://10.0.0.1:80", commitment()).unwrap(),
            credentials: BTreeMap::from([("user".to_string(), "bob".to_string())]),
            private_fields: BTreeSet::new(),
        };
        let token = AuthToken::from_lens(&lens).unwrap();
        assert_eq!(token.lens_credentials().unwrap(), lens.credentials);
        assert!(!format!("{token:?}").contains("bob"));
    }

    #[tokio::test]
    async fn test_delegate_to_rendezvous_terminal() {
        let connector = Arc::new(QueuedConnector::default());
        let (device_side, terminal_side) = MockChannel::pair();
        connector.push(device_side);

        let c = commitment();
        let mut terminal = Terminal::new("desk", "https://relay.example/sigil", c).unwrap();
        let delegator = Delegator::new(connector.clone(), SequencePolicy::Monotonic);

        let sequence = delegator
            .delegate(&mut terminal, &key(4), "sess-1", &token())
            .await
            .unwrap();
        assert_eq!(sequence.value(), 1);
        assert_eq!(terminal.next_sequence.value(), 2);

        match &connector.requested()[0] {
            sigil_transport::Endpoint::Rendezvous { channel_id, .. } => {
                assert_eq!(channel_id.as_deref(), Some(c.to_string().as_str()));
            }
            other => panic!("unexpected endpoint {other}"),
        }

        let receiver = DelegationReceiver::new(key(4), SequencePolicy::Monotonic);
        let mut proxy = Proxy::json(Box::new(terminal_side));
        let received = receiver.accept(&mut proxy).await.unwrap();
        assert_eq!(received.session_id, "sess-1");
        assert_eq!(received.token, token());
    }

    #[tokio::test]
    async fn test_delegate_connect_failure_is_transport() {
        let connector = Arc::new(QueuedConnector::default());
        let mut terminal = Terminal::new("desk", "tcp://127.0.0.1:9", commitment()).unwrap();
        let delegator = Delegator::new(connector, SequencePolicy::Monotonic);

        let err = delegator
            .delegate(&mut terminal, &key(4), "sess-1", &token())
            .await
            .unwrap_err();
        assert!(matches!(err, DelegationError::Transport(_)));
        // The sequence number is spent even though nothing was sent.
        assert_eq!(terminal.next_sequence.value(), 2);
    }
}
