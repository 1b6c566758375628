//! Packing and delivering outbound messages.

use crate::error::Result;
use crate::transport::OutboundTransport;
use pairwise_protocol::{EnvelopeCodec, OutboundMessage, ProtocolError};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct MessageSender {
    codec: EnvelopeCodec,
    transport: Arc<dyn OutboundTransport>,
}

impl MessageSender {
    pub fn new(codec: EnvelopeCodec, transport: Arc<dyn OutboundTransport>) -> Self {
        Self { codec, transport }
    }

    /// Pack `outbound` from its connection key, wrap it for the recipient's
    /// routing keys and hand it to the transport.
    pub async fn send(&self, outbound: &OutboundMessage) -> Result<()> {
        let recipient = outbound.recipient_keys.first().ok_or_else(|| {
            ProtocolError::MissingField(format!(
                "recipient keys for connection {}",
                outbound.connection.verkey
            ))
        })?;

        let payload = outbound.payload.to_bytes()?;
        let packed = self
            .codec
            .wrap(&payload, &outbound.recipient_keys, Some(&outbound.sender_verkey))
            .await?;
        let envelope = self
            .codec
            .wrap_for_routing(packed, recipient, &outbound.routing_keys)
            .await?;

        self.transport
            .send(&envelope, outbound.endpoint.as_deref())
            .await?;

        info!(
            kind = outbound.kind(),
            connection = %outbound.connection.verkey,
            endpoint = outbound.endpoint.as_deref().unwrap_or("<inbox>"),
            hops = outbound.routing_keys.len(),
            "sent message"
        );
        Ok(())
    }
}
