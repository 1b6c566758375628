//! Envelope codec.
//!
//! Packing and unpacking go through the wallet. Routed envelopes are onions:
//! each routing key adds one anonymous `Forward` layer, the first routing key
//! being the outermost.

use crate::error::{ProtocolError, Result};
use crate::messages::{message_type, AgentMessage, Forward};
use pairwise_core::{PackedMessage, Verkey, Wallet};
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

/// A fully unwrapped inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub message: AgentMessage,
    /// Sender of the innermost envelope, when it was authenticated.
    pub sender_verkey: Option<Verkey>,
    /// Local key the innermost envelope was addressed to. `None` for
    /// plaintext messages.
    pub recipient_verkey: Option<Verkey>,
}

impl InboundMessage {
    /// A message that arrived without an envelope.
    pub fn plaintext(message: AgentMessage) -> Self {
        Self {
            message,
            sender_verkey: None,
            recipient_verkey: None,
        }
    }

    pub fn recipient(&self) -> Result<&Verkey> {
        self.recipient_verkey
            .as_ref()
            .ok_or_else(|| ProtocolError::MissingField("recipient verkey".to_string()))
    }
}

#[derive(Clone)]
pub struct EnvelopeCodec {
    wallet: Arc<dyn Wallet>,
}

impl EnvelopeCodec {
    pub fn new(wallet: Arc<dyn Wallet>) -> Self {
        Self { wallet }
    }

    /// Pack `payload` for `recipient_keys`; anonymous when there is no sender.
    pub async fn wrap(
        &self,
        payload: &[u8],
        recipient_keys: &[Verkey],
        sender_verkey: Option<&Verkey>,
    ) -> Result<PackedMessage> {
        Ok(self.wallet.pack(payload, recipient_keys, sender_verkey).await?)
    }

    /// Wrap `inner` in one `Forward` layer per routing key.
    ///
    /// Unwrapping the result with the first routing key yields a forward to the
    /// second, and so on; the last routing key yields a forward to
    /// `recipient_key` carrying `inner`.
    pub async fn wrap_for_routing(
        &self,
        inner: PackedMessage,
        recipient_key: &Verkey,
        routing_keys: &[Verkey],
    ) -> Result<PackedMessage> {
        let mut envelope = inner;
        let mut to = recipient_key.clone();

        for key in routing_keys.iter().rev() {
            let forward = AgentMessage::Forward(Forward::new(to, envelope));
            let payload = serde_json::to_vec(&forward)?;
            envelope = self.wrap(&payload, std::slice::from_ref(key), None).await?;
            to = key.clone();
        }
        Ok(envelope)
    }

    /// Unpack layer after layer until a typed message appears.
    ///
    /// Fails with [`ProtocolError::MalformedEnvelope`] if a layer is neither a
    /// message nor an envelope, or if more than `max_layers` layers are needed.
    pub async fn unwrap(&self, envelope: PackedMessage, max_layers: usize) -> Result<InboundMessage> {
        let mut current = envelope;

        for layer in 1..=max_layers {
            let unpacked = self.wallet.unpack(&current).await?;
            let value: Value = serde_json::from_slice(&unpacked.message).map_err(|e| {
                ProtocolError::MalformedEnvelope(format!("layer {layer} is not JSON: {e}"))
            })?;

            if message_type(&value).is_some() {
                let message = AgentMessage::decode(value)?;
                trace!(layer, message_type = message.message_type(), "unwrapped message");
                return Ok(InboundMessage {
                    message,
                    sender_verkey: unpacked.sender_verkey,
                    recipient_verkey: Some(unpacked.recipient_verkey),
                });
            }

            current = serde_json::from_value(value).map_err(|e| {
                ProtocolError::MalformedEnvelope(format!(
                    "layer {layer} is neither a message nor an envelope: {e}"
                ))
            })?;
            trace!(layer, "unwrapped nested envelope");
        }

        Err(ProtocolError::MalformedEnvelope(format!(
            "envelope nested deeper than {max_layers} layers"
        )))
    }
}
