//! Outbound transports.

use async_trait::async_trait;
use pairwise_core::PackedMessage;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No endpoint to deliver to")]
    NoEndpoint,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint {endpoint} answered {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Delivers packed envelopes. Delivery is attempted once.
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    /// Send `envelope` to `endpoint`. Transports that can hold messages for
    /// later pickup accept `None`.
    async fn send(&self, envelope: &PackedMessage, endpoint: Option<&str>) -> Result<(), TransportError>;
}

/// POSTs envelopes as JSON.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OutboundTransport for HttpTransport {
    async fn send(&self, envelope: &PackedMessage, endpoint: Option<&str>) -> Result<(), TransportError> {
        let endpoint = endpoint.ok_or(TransportError::NoEndpoint)?;
        let response = self.client.post(endpoint).json(envelope).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        debug!(%endpoint, status = status.as_u16(), "envelope delivered");
        Ok(())
    }
}
