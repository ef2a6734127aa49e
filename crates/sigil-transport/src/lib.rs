// ============================================
// File: crates/sigil-transport/src/lib.rs
// ============================================
//! # Sigil Transport - Message Channels
//!
//! ## Creation Reason
//! The authentication protocol needs one ordered, message-oriented
//! connection per run. This crate provides it over three physical
//! transports and picks the right one from an address URI.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: `Channel` trait and `ChannelOptions`
//! - [`endpoint`]: address URI parsing (`tcp`, `http(s)`, `btspp`)
//! - [`tcp`]: direct TCP sockets
//! - [`rendezvous`]: HTTP(S) store-and-forward relay
//! - [`bluetooth`]: RFCOMM sockets (Linux)
//! - [`frame`]: length-prefixed framing for stream transports
//! - [`error`]: transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 sigil-agent                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                    │
//! │         ▼                     ▼                    │
//! │     sigil-core         sigil-transport             │
//! │                        You are here ◄──            │
//! │         │                     │                    │
//! │         └──────────┬──────────┘                    │
//! │                    ▼                               │
//! │              sigil-common                          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Platform Support
//! | Platform | TCP | HTTP | RFCOMM |
//! |----------|-----|------|--------|
//! | Linux    | ✅  | ✅   | ✅     |
//! | macOS    | ✅  | ✅   | ❌     |
//! | Windows  | ✅  | ✅   | ❌     |
//!
//! ## ⚠️ Important Note for Next Developer
//! - Channels carry opaque bytes; no cryptography happens here
//! - Mock implementation available with the `mock` feature
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bluetooth;
pub mod connect;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod rendezvous;
pub mod tcp;
pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export primary types
pub use connect::{connect, connect_uri};
pub use endpoint::{BluetoothAddress, Endpoint, SPP_SERVICE_UUID};
pub use error::{Result, TransportError};
pub use rendezvous::{RendezvousChannel, RendezvousRole};
pub use tcp::TcpChannel;
pub use traits::{Channel, ChannelOptions};

#[cfg(target_os = "linux")]
pub use bluetooth::RfcommChannel;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockChannel;
