//! Protocol message types.
//!
//! Every message carries an `@type` discriminant and an `@id`. Inbound JSON
//! is decoded into the closed [`AgentMessage`] union; types this agent does
//! not implement land in [`AgentMessage::Unknown`].

use crate::error::{ProtocolError, Result};
use chrono::{DateTime, Utc};
use pairwise_core::{Did, DidDoc, PackedMessage, Verkey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type strings.
pub mod types {
    pub const INVITATION: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/connections/1.0/invitation";
    pub const REQUEST: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/connections/1.0/request";
    pub const RESPONSE: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/connections/1.0/response";
    pub const ACK: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/notification/1.0/ack";
    pub const BASIC_MESSAGE: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/basicmessage/1.0/message";
    pub const FORWARD: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/routing/1.0/forward";
    pub const ROUTE_UPDATE: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/routing/1.0/route-update";
    pub const SIGNATURE: &str = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/signature/1.0/ed25519Sha512_single";
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Out-of-band invitation to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInvitation {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(rename = "@id")]
    pub id: String,
    /// Human-readable name of the inviter.
    pub label: String,
    /// Keys the connection request must be packed for.
    pub recipient_keys: Vec<Verkey>,
    /// Mediator keys in front of the inviter, outermost first.
    #[serde(default)]
    pub routing_keys: Vec<Verkey>,
    /// Where to post the request. Absent for inbox-only agents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<String>,
}

impl ConnectionInvitation {
    pub fn new(
        label: String,
        recipient_keys: Vec<Verkey>,
        routing_keys: Vec<Verkey>,
        service_endpoint: Option<String>,
    ) -> Self {
        Self {
            type_: types::INVITATION.to_string(),
            id: new_id(),
            label,
            recipient_keys,
            routing_keys,
            service_endpoint,
        }
    }
}

/// Request sent by the invitee to the invitation's recipient keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(rename = "@id")]
    pub id: String,
    /// Human-readable name of the invitee.
    pub label: String,
    /// The invitee's new pairwise DID.
    pub did: Did,
    /// The invitee's connection key; replies are packed for it.
    pub verkey: Verkey,
    /// Describes `did` and how to reach it.
    pub did_doc: DidDoc,
}

impl ConnectionRequest {
    pub fn new(label: String, did: Did, verkey: Verkey, did_doc: DidDoc) -> Self {
        Self {
            type_: types::REQUEST.to_string(),
            id: new_id(),
            label,
            did,
            verkey,
            did_doc,
        }
    }
}

/// The connection data covered by a response signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedConnection {
    /// The inviter's pairwise DID.
    pub did: Did,
    /// The inviter's connection key.
    pub verkey: Verkey,
    pub did_doc: DidDoc,
}

/// Signature over [`SignedConnection`], made with the invitation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSignature {
    #[serde(rename = "@type")]
    pub type_: String,
    /// The invitation key that made the signature.
    pub signer: Verkey,
    /// Base64url signed data: timestamp prefix plus canonical JSON.
    pub sig_data: String,
    /// Base64url ed25519 signature over the decoded `sig_data`.
    pub signature: String,
}

impl ConnectionSignature {
    pub fn new(signer: Verkey, sig_data: String, signature: String) -> Self {
        Self {
            type_: types::SIGNATURE.to_string(),
            signer,
            sig_data,
            signature,
        }
    }
}

/// Response sent by the inviter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResponse {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(rename = "@id")]
    pub id: String,
    pub did: Did,
    pub verkey: Verkey,
    pub did_doc: DidDoc,
    /// Covers `did`, `verkey` and `did_doc`; they must match what it signs.
    #[serde(rename = "connection~sig")]
    pub signature: ConnectionSignature,
}

impl ConnectionResponse {
    pub fn new(connection: SignedConnection, signature: ConnectionSignature) -> Self {
        Self {
            type_: types::RESPONSE.to_string(),
            id: new_id(),
            did: connection.did,
            verkey: connection.verkey,
            did_doc: connection.did_doc,
            signature,
        }
    }

    /// The connection data as it appears outside the signature.
    pub fn connection(&self) -> SignedConnection {
        SignedConnection {
            did: self.did.clone(),
            verkey: self.verkey.clone(),
            did_doc: self.did_doc.clone(),
        }
    }
}

/// Acknowledgement that completes the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(rename = "@id")]
    pub id: String,
    /// Always `OK`; failures are not acked.
    pub status: String,
}

impl Ack {
    pub fn new() -> Self {
        Self {
            type_: types::ACK.to_string(),
            id: new_id(),
            status: "OK".to_string(),
        }
    }
}

impl Default for Ack {
    fn default() -> Self {
        Self::new()
    }
}

/// Chat message between connected agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicMessage {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(rename = "@id")]
    pub id: String,
    pub content: String,
    /// Sender's clock at send time.
    pub sent_time: DateTime<Utc>,
}

impl BasicMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            type_: types::BASIC_MESSAGE.to_string(),
            id: new_id(),
            content: content.into(),
            sent_time: Utc::now(),
        }
    }
}

/// Instruction to a mediator to pass `msg` on to the owner of `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forward {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(rename = "@id")]
    pub id: String,
    /// The next hop: a routing key or the final recipient key.
    pub to: Verkey,
    /// Opaque envelope for `to`.
    pub msg: PackedMessage,
}

impl Forward {
    pub fn new(to: Verkey, msg: PackedMessage) -> Self {
        Self {
            type_: types::FORWARD.to_string(),
            id: new_id(),
            to,
            msg,
        }
    }
}

/// What a route update does with its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    Add,
    Remove,
}

/// Route registration sent by a mediated agent to its agency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteUpdate {
    #[serde(rename = "@type")]
    pub type_: String,
    #[serde(rename = "@id")]
    pub id: String,
    /// A connection key of the sending agent.
    pub verkey: Verkey,
    pub action: RouteAction,
}

impl RouteUpdate {
    pub fn new(verkey: Verkey, action: RouteAction) -> Self {
        Self {
            type_: types::ROUTE_UPDATE.to_string(),
            id: new_id(),
            verkey,
            action,
        }
    }
}

/// Every message kind an agent understands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AgentMessage {
    Invitation(ConnectionInvitation),
    Request(ConnectionRequest),
    Response(ConnectionResponse),
    Ack(Ack),
    BasicMessage(BasicMessage),
    Forward(Forward),
    RouteUpdate(RouteUpdate),
    /// A well-formed message of a type this agent has no handler for.
    Unknown(Value),
}

impl AgentMessage {
    /// Decode a plaintext message by its `@type`.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        let message = match message_type(&value) {
            Some(types::INVITATION) => Self::Invitation(serde_json::from_value(value)?),
            Some(types::REQUEST) => Self::Request(serde_json::from_value(value)?),
            Some(types::RESPONSE) => Self::Response(serde_json::from_value(value)?),
            Some(types::ACK) => Self::Ack(serde_json::from_value(value)?),
            Some(types::BASIC_MESSAGE) => Self::BasicMessage(serde_json::from_value(value)?),
            Some(types::FORWARD) => Self::Forward(serde_json::from_value(value)?),
            Some(types::ROUTE_UPDATE) => Self::RouteUpdate(serde_json::from_value(value)?),
            _ => Self::Unknown(value),
        };
        Ok(message)
    }

    /// Decode an inbound message. A known `@type` with a body that does not
    /// fit it is malformed.
    pub fn decode(value: Value) -> Result<Self> {
        Self::from_value(value)
            .map_err(|e| ProtocolError::MalformedEnvelope(format!("invalid message body: {e}")))
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// The `@type` of this message.
    pub fn message_type(&self) -> &str {
        match self {
            Self::Invitation(m) => &m.type_,
            Self::Request(m) => &m.type_,
            Self::Response(m) => &m.type_,
            Self::Ack(m) => &m.type_,
            Self::BasicMessage(m) => &m.type_,
            Self::Forward(m) => &m.type_,
            Self::RouteUpdate(m) => &m.type_,
            Self::Unknown(value) => message_type(value).unwrap_or_default(),
        }
    }
}

/// The `@type` of a plaintext JSON message, if it has one.
pub fn message_type(value: &Value) -> Option<&str> {
    value.get("@type")?.as_str()
}
