// ============================================
// File: crates/sigil-transport/src/bluetooth/mod.rs
// ============================================
//! # Bluetooth RFCOMM Channel
//!
//! ## Creation Reason
//! Terminals without network access can be reached over Bluetooth
//! Serial Port Profile (`btspp://` addresses).
//!
//! ## Platform Support
//! - **Linux**: native `AF_BLUETOOTH` RFCOMM socket
//! - **Others**: `TransportError::Unsupported`
//!
//! ## ⚠️ Important Note for Next Developer
//! - There is no SDP lookup; an address without a channel uses
//!   `ChannelOptions::default_rfcomm_channel`
//!
//! ## Last Modified
//! v0.1.0 - Initial RFCOMM support

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::RfcommChannel;

use crate::endpoint::BluetoothAddress;
use crate::error::Result;
use crate::traits::{Channel, ChannelOptions};

/// Opens an RFCOMM channel to `address`.
///
/// # Errors
/// `Unsupported` on platforms without RFCOMM sockets, otherwise the
/// connect error.
pub async fn connect_rfcomm(
    address: BluetoothAddress,
    channel: Option<u8>,
    options: ChannelOptions,
) -> Result<Box<dyn Channel>> {
    let channel = channel.unwrap_or(options.default_rfcomm_channel);

    #[cfg(target_os = "linux")]
    {
        let rfcomm = RfcommChannel::connect(address, channel, options).await?;
        Ok(Box::new(rfcomm))
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = (address, channel, options);
        Err(crate::error::TransportError::Unsupported {
            feature: "bluetooth rfcomm".into(),
        })
    }
}
