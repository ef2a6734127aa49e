// ============================================
// File: crates/sigil-transport/src/rendezvous.rs
// ============================================
//! # HTTP Rendezvous Channel
//!
//! ## Creation Reason
//! Mobile devices are usually behind NAT. A store-and-forward relay lets
//! both parties reach each other with plain outbound HTTP(S).
//!
//! ## Relay Contract
//! ```text
//! POST {base}/{id}/to-verifier   body = one message     -> 2xx
//! GET  {base}/{id}/to-prover                             -> 200 body | 204 empty
//! POST {base}/{id}/to-prover     (verifier side)
//! GET  {base}/{id}/to-verifier   (verifier side)
//! ```
//! `{id}` is the mailbox id, normally the hex commitment of the verifier.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Strict request/response: one outstanding request at a time
//! - A 204 means "nothing yet"; `recv` keeps polling until the poll
//!   timeout and then fails with `Timeout`
//! - Bodies are bounded by `max_frame_size` while reading, never after
//!
//! ## Last Modified
//! v0.1.0 - Initial rendezvous channel
//! v0.1.1 - Bounded body reads

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use tokio::time::{sleep, Instant};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{Channel, ChannelOptions};

/// Which side of the mailbox this channel speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendezvousRole {
    /// Writes `to-verifier`, reads `to-prover`.
    Prover,
    /// Writes `to-prover`, reads `to-verifier`.
    Verifier,
}

impl RendezvousRole {
    const fn outbox(self) -> &'static str {
        match self {
            Self::Prover => "to-verifier",
            Self::Verifier => "to-prover",
        }
    }

    const fn inbox(self) -> &'static str {
        match self {
            Self::Prover => "to-prover",
            Self::Verifier => "to-verifier",
        }
    }
}

/// Polling channel over an HTTP(S) relay.
pub struct RendezvousChannel {
    client: Client,
    outbox: Url,
    inbox: Url,
    options: ChannelOptions,
    closed: bool,
}

impl RendezvousChannel {
    /// Opens a mailbox on the relay at `base`.
    ///
    /// # Errors
    /// `InvalidAddress` if the mailbox URLs cannot be formed,
    /// `ConnectFailed` if the HTTP client cannot be built.
    pub fn open(
        base: &Url,
        channel_id: &str,
        role: RendezvousRole,
        options: ChannelOptions,
    ) -> Result<Self> {
        options.validate()?;
        if channel_id.is_empty() || channel_id.contains('/') {
            return Err(TransportError::invalid_address(
                channel_id,
                "mailbox id must be a non-empty path segment",
            ));
        }

        let outbox = mailbox_url(base, channel_id, role.outbox())?;
        let inbox = mailbox_url(base, channel_id, role.inbox())?;

        let client = Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|e| TransportError::connect_failed(base.as_str(), e.to_string()))?;

        debug!(outbox = %outbox, inbox = %inbox, "Opened rendezvous channel");

        Ok(Self {
            client,
            outbox,
            inbox,
            options,
            closed: false,
        })
    }
}

/// Reads a response body, failing as soon as it exceeds `max` bytes.
async fn read_bounded(mut response: Response, max: usize) -> Result<Vec<u8>> {
    if let Some(announced) = response.content_length() {
        let announced = usize::try_from(announced).unwrap_or(usize::MAX);
        if announced > max {
            return Err(TransportError::FrameTooLarge {
                max,
                actual: announced,
            });
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let actual = body.len() + chunk.len();
        if actual > max {
            return Err(TransportError::FrameTooLarge { max, actual });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn mailbox_url(base: &Url, id: &str, direction: &str) -> Result<Url> {
    let joined = format!("{}/{id}/{direction}", base.as_str().trim_end_matches('/'));
    Url::parse(&joined).map_err(|e| TransportError::invalid_address(joined, e.to_string()))
}

#[async_trait]
impl Channel for RendezvousChannel {
    async fn send(&mut self, message: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        if message.len() > self.options.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                max: self.options.max_frame_size,
                actual: message.len(),
            });
        }

        let response = self
            .client
            .post(self.outbox.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(message.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                operation: "post message".into(),
                status: status.as_u16(),
            });
        }
        trace!(bytes = message.len(), "Posted message to relay");
        Ok(())
    }

    async fn recv(&mut self) -> Result<Vec<u8>> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        let deadline = Instant::now() + self.options.poll_timeout;

        loop {
            let response = self.client.get(self.inbox.clone()).send().await?;
            match response.status() {
                StatusCode::OK => {
                    let body = read_bounded(response, self.options.max_frame_size).await?;
                    trace!(bytes = body.len(), "Fetched message from relay");
                    return Ok(body);
                }
                StatusCode::NO_CONTENT => {
                    if Instant::now() + self.options.poll_interval > deadline {
                        return Err(TransportError::timeout("rendezvous poll"));
                    }
                    sleep(self.options.poll_interval).await;
                }
                other => {
                    return Err(TransportError::HttpStatus {
                        operation: "poll message".into(),
                        status: other.as_u16(),
                    });
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn describe(&self) -> String {
        self.outbox.to_string()
    }
}
