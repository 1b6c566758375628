//! Messages on their way out.

use crate::connection::Connection;
use crate::error::{ProtocolError, Result};
use crate::messages::AgentMessage;
use pairwise_core::{PackedMessage, Verkey};

/// What gets sent.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPayload {
    /// A plaintext message to pack.
    Message(AgentMessage),
    /// An already packed envelope, passed on by a mediator.
    Envelope(PackedMessage),
}

impl OutboundPayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Self::Message(message) => serde_json::to_vec(message)?,
            Self::Envelope(envelope) => serde_json::to_vec(envelope)?,
        };
        Ok(bytes)
    }
}

impl From<AgentMessage> for OutboundPayload {
    fn from(message: AgentMessage) -> Self {
        Self::Message(message)
    }
}

/// A payload addressed to the other side of a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub connection: Connection,
    pub payload: OutboundPayload,
    pub recipient_keys: Vec<Verkey>,
    pub routing_keys: Vec<Verkey>,
    pub endpoint: Option<String>,
    pub sender_verkey: Verkey,
}

impl OutboundMessage {
    /// Address `payload` using the delivery metadata stored on `connection`.
    pub fn for_connection(connection: &Connection, payload: impl Into<OutboundPayload>) -> Result<Self> {
        if connection.recipient_keys.is_empty() {
            return Err(ProtocolError::MissingField(format!(
                "recipient keys for connection {}",
                connection.verkey
            )));
        }
        Ok(Self {
            connection: connection.clone(),
            payload: payload.into(),
            recipient_keys: connection.recipient_keys.clone(),
            routing_keys: connection.routing_keys.clone(),
            endpoint: connection.their_endpoint.clone(),
            sender_verkey: connection.verkey.clone(),
        })
    }

    /// Human-readable kind, for logs.
    pub fn kind(&self) -> &str {
        match &self.payload {
            OutboundPayload::Message(message) => message.message_type(),
            OutboundPayload::Envelope(_) => "envelope",
        }
    }
}
