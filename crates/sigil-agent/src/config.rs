// ============================================
// File: crates/sigil-agent/src/config.rs
// ============================================
//! # Agent Configuration
//!
//! ## Creation Reason
//! Key location, channel timeouts, and protocol options for the agent,
//! loaded from TOML.
//!
//! ## Main Functionality
//! - `AgentConfig`: main configuration structure
//! - TOML file loading and parsing
//! - Per-section validation
//! - Conversion to `ChannelOptions`
//!
//! ## Configuration Sections
//! - `device`: key file
//! - `transport`: connect/I/O timeouts, max frame size
//! - `rendezvous`: relay polling
//! - `bluetooth`: default RFCOMM channel
//! - `protocol`: commitment disclosure mode
//! - `delegation`: sequence number policy
//! - `logging`: log level
//!
//! ## Example Configuration
//! ```toml
//! [device]
//! key_file = "/var/lib/sigil/device_key.json"
//!
//! [transport]
//! connect_timeout_secs = 10
//! io_timeout_secs = 30
//!
//! [rendezvous]
//! poll_interval_ms = 500
//! poll_timeout_secs = 60
//!
//! [protocol]
//! commit_mode = "disclosed"
//!
//! [delegation]
//! sequence_policy = "monotonic"
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use sigil_transport::ChannelOptions;

use crate::delegation::SequencePolicy;
use crate::engine::CommitMode;
use crate::error::{AgentError, Result};

// ============================================
// AgentConfig
// ============================================

/// Main agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Device key location.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Stream transport settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// HTTP relay settings.
    #[serde(default)]
    pub rendezvous: RendezvousConfig,

    /// Bluetooth settings.
    #[serde(default)]
    pub bluetooth: BluetoothConfig,

    /// Protocol options.
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Delegation options.
    #[serde(default)]
    pub delegation: DelegationConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AgentConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed, or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AgentError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AgentError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error on parse or validation failure.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AgentError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// `ConfigInvalid` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        self.device.validate()?;
        self.transport.validate()?;
        self.rendezvous.validate()?;
        self.bluetooth.validate()?;
        self.channel_options()
            .validate()
            .map_err(|e| AgentError::config_invalid("transport", e.to_string()))?;
        Ok(())
    }

    /// Serializes configuration to TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Channel options assembled from the transport sections.
    #[must_use]
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            connect_timeout: Duration::from_secs(self.transport.connect_timeout_secs),
            io_timeout: Duration::from_secs(self.transport.io_timeout_secs),
            max_frame_size: self.transport.max_frame_size,
            poll_interval: Duration::from_millis(self.rendezvous.poll_interval_ms),
            poll_timeout: Duration::from_secs(self.rendezvous.poll_timeout_secs),
            request_timeout: Duration::from_secs(self.rendezvous.request_timeout_secs),
            default_rfcomm_channel: self.bluetooth.default_channel,
        }
    }
}

// ============================================
// DeviceConfig
// ============================================

/// Device section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Path of the device identity key file.
    #[serde(default = "default_key_file")]
    pub key_file: String,
}

fn default_key_file() -> String {
    "/var/lib/sigil/device_key.json".to_string()
}

impl DeviceConfig {
    fn validate(&self) -> Result<()> {
        if self.key_file.trim().is_empty() {
            return Err(AgentError::config_invalid("device.key_file", "cannot be empty"));
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            key_file: default_key_file(),
        }
    }
}

// ============================================
// TransportConfig
// ============================================

/// Transport section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-operation I/O timeout in seconds.
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,

    /// Largest message in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_io_timeout() -> u64 {
    30
}

fn default_max_frame_size() -> usize {
    64 * 1024
}

impl TransportConfig {
    fn validate(&self) -> Result<()> {
        if self.connect_timeout_secs == 0 {
            return Err(AgentError::config_invalid(
                "transport.connect_timeout_secs",
                "must be at least 1",
            ));
        }
        if self.io_timeout_secs == 0 {
            return Err(AgentError::config_invalid(
                "transport.io_timeout_secs",
                "must be at least 1",
            ));
        }
        if self.max_frame_size < 1024 {
            return Err(AgentError::config_invalid(
                "transport.max_frame_size",
                "must be at least 1024",
            ));
        }
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            io_timeout_secs: default_io_timeout(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

// ============================================
// RendezvousConfig
// ============================================

/// Rendezvous relay section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendezvousConfig {
    /// Pause between empty polls in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Total polling time per receive in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Single HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    500
}

fn default_poll_timeout() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    15
}

impl RendezvousConfig {
    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms < 50 {
            return Err(AgentError::config_invalid(
                "rendezvous.poll_interval_ms",
                "must be at least 50",
            ));
        }
        if self.poll_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(AgentError::config_invalid(
                "rendezvous",
                "timeouts must be at least 1 second",
            ));
        }
        Ok(())
    }
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            poll_timeout_secs: default_poll_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// ============================================
// BluetoothConfig
// ============================================

/// Bluetooth section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BluetoothConfig {
    /// RFCOMM channel for addresses that name none.
    #[serde(default = "default_rfcomm_channel")]
    pub default_channel: u8,
}

fn default_rfcomm_channel() -> u8 {
    1
}

impl BluetoothConfig {
    fn validate(&self) -> Result<()> {
        if !(1..=30).contains(&self.default_channel) {
            return Err(AgentError::config_invalid(
                "bluetooth.default_channel",
                "must be in 1..=30",
            ));
        }
        Ok(())
    }
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            default_channel: default_rfcomm_channel(),
        }
    }
}

// ============================================
// ProtocolConfig
// ============================================

/// Protocol section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Whether the prover sends the expected commitment up front.
    #[serde(default)]
    pub commit_mode: CommitMode,
}

// ============================================
// DelegationConfig
// ============================================

/// Delegation section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelegationConfig {
    /// How reauth sequence numbers are chosen.
    #[serde(default)]
    pub sequence_policy: SequencePolicy,
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
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
    fn test_default_config() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.protocol.commit_mode, CommitMode::Disclosed);
        assert_eq!(config.delegation.sequence_policy, SequencePolicy::Monotonic);
    }

    #[test]
    fn test_full_config_format() {
        let toml = r#"
            [device]
            key_file = "/tmp/sigil/key.json"

            [transport]
            connect_timeout_secs = 5
            io_timeout_secs = 20
            max_frame_size = 32768

            [rendezvous]
            poll_interval_ms = 250
            poll_timeout_secs = 30

            [bluetooth]
            default_channel = 3

            [protocol]
            commit_mode = "withheld"

            [delegation]
            sequence_policy = "random"

            [logging]
            level = "debug"
        "#;

        let config = AgentConfig::from_str(toml).unwrap();
        assert_eq!(config.device.key_file, "/tmp/sigil/key.json");
        assert_eq!(config.protocol.commit_mode, CommitMode::Withheld);
        assert_eq!(config.delegation.sequence_policy, SequencePolicy::Random);

        let options = config.channel_options();
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
        assert_eq!(options.poll_interval, Duration::from_millis(250));
        assert_eq!(options.max_frame_size, 32768);
        assert_eq!(options.default_rfcomm_channel, 3);
    }

    #[test]
    fn test_device_section_holds_only_the_key_file() {
        // Older files may still carry a credential directory; it is ignored.
        let config = AgentConfig::from_str(
            "[device]\nkey_file = \"/tmp/k.json\"\ncredential_dir = \"/tmp/creds\"",
        )
        .unwrap();
        assert_eq!(config.device.key_file, "/tmp/k.json");

        let written = toml::to_string(&config).unwrap();
        assert!(!written.contains("credential_dir"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(AgentConfig::from_str("[bluetooth]\ndefault_channel = 0").is_err());
        assert!(AgentConfig::from_str("[transport]\nio_timeout_secs = 0").is_err());
        assert!(AgentConfig::from_str("[rendezvous]\npoll_interval_ms = 10").is_err());
        assert!(AgentConfig::from_str("[protocol]\ncommit_mode = \"sometimes\"").is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AgentConfig::default();
        let parsed = AgentConfig::from_str(&config.to_toml()).unwrap();
        assert_eq!(parsed.transport.io_timeout_secs, config.transport.io_timeout_secs);
    }
}
