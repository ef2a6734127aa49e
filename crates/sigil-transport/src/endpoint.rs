// ============================================
// File: crates/sigil-transport/src/endpoint.rs
// ============================================
//! # Endpoint Addressing
//!
//! ## Creation Reason
//! Services and terminals are stored with an address URI. The scheme
//! picks the channel backend; nothing else does.
//!
//! ## Supported Forms
//! ```text
//! tcp://host:port
//! http://relay.example/sigil        (rendezvous base URL)
//! https://relay.example/sigil
//! btspp://AABBCCDDEEFF              (default RFCOMM channel)
//! btspp://AABBCCDDEEFF:0A           (channel as hex byte)
//! btspp://AABBCCDDEEFF?channel=10   (channel as decimal)
//! ```
//! Trailing `;key=value` parameters on `btspp` addresses are ignored.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Unknown schemes are an error, never a fallback to TCP
//! - Bluetooth addresses are stored most-significant byte first; the
//!   kernel wants them reversed (see `bluetooth::linux`)
//!
//! ## Last Modified
//! v0.1.0 - Initial endpoint parsing

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use reqwest::Url;

use crate::error::{Result, TransportError};

/// Valid RFCOMM channel numbers.
pub const RFCOMM_CHANNEL_RANGE: RangeInclusive<u8> = 1..=30;

/// Serial Port Profile service class UUID.
pub const SPP_SERVICE_UUID: &str = "00001101-0000-1000-8000-00805F9B34FB";

// ============================================
// BluetoothAddress
// ============================================

/// 48-bit Bluetooth device address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BluetoothAddress([u8; 6]);

impl BluetoothAddress {
    /// Creates an address from its six bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Address bytes, most significant first.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Parses `AABBCCDDEEFF` or `AA:BB:CC:DD:EE:FF`.
    ///
    /// # Errors
    /// `InvalidAddress` for anything else.
    pub fn parse(s: &str) -> Result<Self> {
        let digits: String = s.chars().filter(|c| *c != ':').collect();
        if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TransportError::invalid_address(
                s,
                "expected 12 hex digits for device address",
            ));
        }
        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
                .map_err(|e| TransportError::invalid_address(s, e.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for BluetoothAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ============================================
// Endpoint
// ============================================

/// A parsed service or terminal address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Direct TCP connection.
    Tcp {
        /// Host name or IP literal
        host: String,
        /// Port
        port: u16,
    },
    /// Store-and-forward HTTP(S) relay.
    Rendezvous {
        /// Relay base URL
        base: Url,
        /// Relay mailbox id, normally the hex commitment
        channel_id: Option<String>,
    },
    /// Bluetooth RFCOMM.
    Bluetooth {
        /// Device address
        address: BluetoothAddress,
        /// RFCOMM channel, `None` uses the configured default
        channel: Option<u8>,
    },
}

impl Endpoint {
    /// Parses an address URI.
    ///
    /// # Errors
    /// `UnsupportedScheme` for unknown schemes, `InvalidAddress` otherwise.
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| TransportError::invalid_address(uri, "missing scheme"))?;

        match scheme.to_ascii_lowercase().as_str() {
            "tcp" => parse_tcp(uri, rest),
            "http" | "https" => {
                let base = Url::parse(uri)
                    .map_err(|e| TransportError::invalid_address(uri, e.to_string()))?;
                if base.host_str().is_none() {
                    return Err(TransportError::invalid_address(uri, "missing host"));
                }
                Ok(Self::Rendezvous {
                    base,
                    channel_id: None,
                })
            }
            "btspp" => parse_btspp(uri, rest),
            other => Err(TransportError::UnsupportedScheme {
                scheme: other.to_string(),
            }),
        }
    }

    /// URI scheme of this endpoint.
    #[must_use]
    pub fn scheme(&self) -> &str {
        match self {
            Self::Tcp { .. } => "tcp",
            Self::Rendezvous { base, .. } => base.scheme(),
            Self::Bluetooth { .. } => "btspp",
        }
    }

    /// Sets the rendezvous mailbox id. No effect on other kinds.
    #[must_use]
    pub fn keyed(self, id: impl Into<String>) -> Self {
        match self {
            Self::Rendezvous { base, .. } => Self::Rendezvous {
                base,
                channel_id: Some(id.into()),
            },
            other => other,
        }
    }
}

fn parse_tcp(uri: &str, rest: &str) -> Result<Endpoint> {
    let authority = rest.trim_end_matches('/');
    let (host, port) = authority
        .rsplit_once(':')
        .ok_or_else(|| TransportError::invalid_address(uri, "missing port"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(TransportError::invalid_address(uri, "missing host"));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| TransportError::invalid_address(uri, "invalid port"))?;
    if port == 0 {
        return Err(TransportError::invalid_address(uri, "port must be non-zero"));
    }
    Ok(Endpoint::Tcp {
        host: host.to_string(),
        port,
    })
}

fn parse_btspp(uri: &str, rest: &str) -> Result<Endpoint> {
    // Drop `;authenticate=false` style parameters.
    let rest = rest.split(';').next().unwrap_or_default();

    let (device, query) = match rest.split_once('?') {
        Some((device, query)) => (device, Some(query)),
        None => (rest, None),
    };

    let (addr_part, hex_channel) = match device.split_once(':') {
        Some((addr, ch)) if addr.len() == 12 => (addr, Some(ch)),
        _ => (device, None),
    };
    let address = BluetoothAddress::parse(addr_part.trim_end_matches('/'))
        .map_err(|_| TransportError::invalid_address(uri, "expected 12 hex digits for device address"))?;

    let mut channel = match hex_channel {
        Some(ch) => Some(
            u8::from_str_radix(ch, 16)
                .map_err(|_| TransportError::invalid_address(uri, "channel must be a hex byte"))?,
        ),
        None => None,
    };

    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("channel=") {
                let ch: u8 = value.parse().map_err(|_| {
                    TransportError::invalid_address(uri, "channel must be a decimal byte")
                })?;
                channel = Some(ch);
            }
        }
    }

    if let Some(ch) = channel {
        if !RFCOMM_CHANNEL_RANGE.contains(&ch) {
            return Err(TransportError::invalid_address(
                uri,
                format!("RFCOMM channel {ch} outside 1..=30"),
            ));
        }
    }

    Ok(Endpoint::Bluetooth { address, channel })
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "tcp://[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::Rendezvous { base, .. } => write!(f, "{base}"),
            Self::Bluetooth { address, channel } => {
                let hex: String = address.octets().iter().map(|b| format!("{b:02X}")).collect();
                match channel {
                    Some(ch) => write!(f, "btspp://{hex}:{ch:02X}"),
                    None => write!(f, "btspp://{hex}"),
                }
            }
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
    fn test_btspp_hex_channel() {
        let ep = Endpoint::parse("btspp://AABBCCDDEEFF:0A").unwrap();
        match ep {
            Endpoint::Bluetooth { address, channel } => {
                assert_eq!(address.to_string(), "AA:BB:CC:DD:EE:FF");
                assert_eq!(channel, Some(0x0A));
            }
            other => panic!("unexpected endpoint {other:?}"),
        }
    }

    #[test]
    fn test_btspp_variants() {
        let ep = Endpoint::parse("btspp://aabbccddeeff?channel=12").unwrap();
        assert_eq!(
            ep,
            Endpoint::Bluetooth {
                address: BluetoothAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
                channel: Some(12),
            }
        );

        let ep = Endpoint::parse("btspp://001122334455;authenticate=false").unwrap();
        assert!(matches!(ep, Endpoint::Bluetooth { channel: None, .. }));

        assert!(Endpoint::parse("btspp://AABBCCDDEEFF:00").is_err());
        assert!(Endpoint::parse("btspp://AABBCCDDEEFF:1F").is_err());
        assert!(Endpoint::parse("btspp://AABBCC").is_err());
    }

    #[test]
    fn test_tcp() {
        let ep: Endpoint = "tcp://127.0.0.1:7000".parse().unwrap();
        assert_eq!(
            ep,
            Endpoint::Tcp {
                host: "127.0.0.1".into(),
                port: 7000
            }
        );
        assert_eq!(ep.to_string(), "tcp://127.0.0.1:7000");

        let ep: Endpoint = "tcp://[::1]:7000".parse().unwrap();
        assert_eq!(ep.to_string(), "tcp://[::1]:7000");

        assert!(Endpoint::parse("tcp://localhost").is_err());
        assert!(Endpoint::parse("tcp://localhost:0").is_err());
    }

    #[test]
    fn test_rendezvous() {
        let ep = Endpoint::parse("https://relay.example/sigil").unwrap();
        assert_eq!(ep.scheme(), "https");
        let keyed = ep.keyed("abcd");
        assert!(matches!(
            keyed,
            Endpoint::Rendezvous { channel_id: Some(ref id), .. } if id == "abcd"
        ));
    }

    #[test]
    fn test_unknown_scheme_fails_fast() {
        let err = Endpoint::parse("ftp://host:21").unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedScheme { ref scheme } if scheme == "ftp"));
        assert!(Endpoint::parse("no-scheme").is_err());
    }
}
