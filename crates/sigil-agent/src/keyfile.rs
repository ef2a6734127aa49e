// ============================================
// File: crates/sigil-agent/src/keyfile.rs
// ============================================
//! # Device Key File
//!
//! JSON file holding the device identity key pair:
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "key_type": "ed25519",
//!   "public_key": "<base64>",
//!   "private_key": "<base64>",
//!   "created_at": 1700000000
//! }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Written with mode 0600 on Unix
//! - `public_key` is checked against the private key on load

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::Zeroizing;

use sigil_common::Timestamp;
use sigil_core::crypto::IdentityKeyPair;

use crate::error::{AgentError, Result};

const KEY_FILE_VERSION: &str = "1.0";
const KEY_TYPE: &str = "ed25519";

#[derive(Serialize, Deserialize)]
struct KeyFile {
    version: String,
    key_type: String,
    public_key: String,
    private_key: String,
    created_at: i64,
}

/// Loads the key pair stored at `path`.
///
/// # Errors
/// `KeyFile` if the file is unreadable, malformed or inconsistent.
pub async fn load_key(path: impl AsRef<Path>) -> Result<IdentityKeyPair> {
    let path = path.as_ref();
    let shown = path.display().to_string();

    let content = Zeroizing::new(
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AgentError::key_file(&shown, e.to_string()))?,
    );
    let key_data: KeyFile = serde_json::from_str(&content)
        .map_err(|e| AgentError::key_file(&shown, e.to_string()))?;

    if key_data.key_type != KEY_TYPE {
        return Err(AgentError::key_file(
            &shown,
            format!("unsupported key type '{}'", key_data.key_type),
        ));
    }

    let private_bytes = Zeroizing::new(
        BASE64
            .decode(&key_data.private_key)
            .map_err(|e| AgentError::key_file(&shown, format!("private key: {e}")))?,
    );
    let identity = IdentityKeyPair::from_bytes(&private_bytes)
        .map_err(|e| AgentError::key_file(&shown, e.to_string()))?;

    let expected = BASE64.encode(identity.public_key_bytes());
    if expected != key_data.public_key {
        return Err(AgentError::key_file(
            &shown,
            "public key does not match private key",
        ));
    }

    Ok(identity)
}

/// Writes `identity` to `path`, creating parent directories.
///
/// # Errors
/// `KeyFile` on any I/O failure.
pub async fn save_key(identity: &IdentityKeyPair, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let shown = path.display().to_string();
    let io_err = |e: std::io::Error| AgentError::key_file(&shown, e.to_string());

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let secret = identity.to_bytes();
    let key_data = KeyFile {
        version: KEY_FILE_VERSION.to_string(),
        key_type: KEY_TYPE.to_string(),
        public_key: BASE64.encode(identity.public_key_bytes()),
        private_key: BASE64.encode(&secret[..]),
        created_at: Timestamp::now().as_secs(),
    };

    let content = Zeroizing::new(
        serde_json::to_string_pretty(&key_data)
            .map_err(|e| AgentError::key_file(&shown, e.to_string()))?,
    );
    tokio::fs::write(path, content.as_bytes())
        .await
        .map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(path).await.map_err(io_err)?.permissions();
        perms.set_mode(0o600);
        tokio::fs::set_permissions(path, perms)
            .await
            .map_err(io_err)?;
    }

    info!(path = %shown, public_key = %identity.public_key(), "Key file written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("sigil-keyfile-{}-{name}", std::process::id()))
            .join("device.key")
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let path = scratch("roundtrip");
        let identity = IdentityKeyPair::generate();
        save_key(&identity, &path).await.unwrap();

        let loaded = load_key(&path).await.unwrap();
        assert_eq!(loaded.public_key(), identity.public_key());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_mismatched_public_key_rejected() {
        let path = scratch("mismatch");
        save_key(&IdentityKeyPair::generate(), &path).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut json: serde_json::Value = serde_json::from_str(&content).unwrap();
        json["public_key"] =
            serde_json::Value::String(BASE64.encode(IdentityKeyPair::generate().public_key_bytes()));
        std::fs::write(&path, json.to_string()).unwrap();

        let err = load_key(&path).await.unwrap_err();
        assert!(matches!(err, AgentError::KeyFile { .. }));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = load_key(scratch("absent")).await.unwrap_err();
        assert!(err.to_string().contains("device.key"));
    }
}
