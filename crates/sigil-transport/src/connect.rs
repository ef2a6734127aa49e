// ============================================
// File: crates/sigil-transport/src/connect.rs
// ============================================
//! # Channel Selection
//!
//! Maps a parsed [`Endpoint`] to its backend. The scheme alone decides.

use tracing::info;

use crate::bluetooth::connect_rfcomm;
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::rendezvous::{RendezvousChannel, RendezvousRole};
use crate::tcp::TcpChannel;
use crate::traits::{Channel, ChannelOptions};

/// Opens a prover-side channel to `endpoint`.
///
/// Rendezvous endpoints must carry a mailbox id (see [`Endpoint::keyed`]).
///
/// # Errors
/// `InvalidAddress` for an unkeyed rendezvous endpoint, otherwise the
/// backend's connect error.
pub async fn connect(endpoint: &Endpoint, options: &ChannelOptions) -> Result<Box<dyn Channel>> {
    info!(endpoint = %endpoint, "Opening channel");
    match endpoint {
        Endpoint::Tcp { host, port } => {
            let channel = TcpChannel::connect(host, *port, options.clone()).await?;
            Ok(Box::new(channel))
        }
        Endpoint::Rendezvous { base, channel_id } => {
            let id = channel_id.as_deref().ok_or_else(|| {
                TransportError::invalid_address(base.as_str(), "rendezvous endpoint has no mailbox id")
            })?;
            let channel = RendezvousChannel::open(base, id, RendezvousRole::Prover, options.clone())?;
            Ok(Box::new(channel))
        }
        Endpoint::Bluetooth { address, channel } => {
            connect_rfcomm(*address, *channel, options.clone()).await
        }
    }
}

/// Parses `uri` and opens a channel to it.
///
/// # Errors
/// `UnsupportedScheme` for unknown schemes, plus any [`connect`] error.
pub async fn connect_uri(uri: &str, options: &ChannelOptions) -> Result<Box<dyn Channel>> {
    let endpoint = Endpoint::parse(uri)?;
    connect(&endpoint, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = tokio::spawn(async move { listener.accept().await });

        let channel = connect_uri(&format!("tcp://127.0.0.1:{port}"), &ChannelOptions::default())
            .await
            .unwrap();
        assert!(channel.describe().starts_with("tcp://"));
    }

    #[tokio::test]
    async fn test_unkeyed_rendezvous_rejected() {
        let result = connect_uri("https://relay.example/sigil", &ChannelOptions::default()).await;
        assert!(matches!(result, Err(TransportError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_unknown_scheme() {
        let result = connect_uri("gopher://host:70", &ChannelOptions::default()).await;
        assert!(matches!(result, Err(TransportError::UnsupportedScheme { .. })));
    }
}
