// ============================================
// File: crates/sigil-agent/src/connector.rs
// ============================================
//! # Channel Connector
//!
//! Seam between orchestration and the transport layer, so the
//! authenticator and delegator can be driven over mock channels.

use async_trait::async_trait;

use sigil_transport::{connect, Channel, ChannelOptions, Endpoint, TransportError};

/// Opens channels to endpoints.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Opens a fresh channel to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Channel>, TransportError>;
}

/// Connector backed by [`sigil_transport::connect`].
#[derive(Debug, Clone, Default)]
pub struct TransportConnector {
    options: ChannelOptions,
}

impl TransportConnector {
    /// Creates a connector using `options` for every channel.
    #[must_use]
    pub const fn new(options: ChannelOptions) -> Self {
        Self { options }
    }

    /// Options applied to new channels.
    #[must_use]
    pub const fn options(&self) -> &ChannelOptions {
        &self.options
    }
}

#[async_trait]
impl ChannelConnector for TransportConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Channel>, TransportError> {
        connect(endpoint, &self.options).await
    }
}

/// Hands out pre-built channels in order and records requested endpoints.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct QueuedConnector {
    channels: parking_lot::Mutex<std::collections::VecDeque<Box<dyn Channel>>>,
    requested: parking_lot::Mutex<Vec<Endpoint>>,
}

#[cfg(test)]
impl QueuedConnector {
    pub(crate) fn push(&self, channel: impl Channel + 'static) {
        self.channels.lock().push_back(Box::new(channel));
    }

    pub(crate) fn requested(&self) -> Vec<Endpoint> {
        self.requested.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl ChannelConnector for QueuedConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Channel>, TransportError> {
        self.requested.lock().push(endpoint.clone());
        self.channels
            .lock()
            .pop_front()
            .ok_or_else(|| TransportError::connect_failed(endpoint.to_string(), "no queued channel"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_transport_connector_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = tokio::spawn(async move { listener.accept().await });

        let connector = TransportConnector::default();
        let endpoint = Endpoint::parse(&format!("tcp://127.0.0.1:{port}")).unwrap();
        let channel = connector.connect(&endpoint).await.unwrap();
        assert!(channel.describe().contains(&port.to_string()));
    }

    #[tokio::test]
    async fn test_unkeyed_rendezvous_fails_fast() {
        let connector = TransportConnector::default();
        let endpoint = Endpoint::parse("http://relay.invalid/sigil").unwrap();
        assert!(connector.connect(&endpoint).await.is_err());
    }
}
