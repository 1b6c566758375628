//! Connection records and handshake states.

use crate::error::{ProtocolError, Result};
use crate::messages::{BasicMessage, ConnectionInvitation};
use chrono::{DateTime, Utc};
use pairwise_core::{Did, DidDoc, Verkey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handshake progress of a connection. States only ever advance by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Invited,
    Requested,
    Responded,
    Complete,
}

impl ConnectionState {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Invited => Some(Self::Requested),
            Self::Requested => Some(Self::Responded),
            Self::Responded => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    pub fn previous(self) -> Option<Self> {
        match self {
            Self::Invited => None,
            Self::Requested => Some(Self::Invited),
            Self::Responded => Some(Self::Requested),
            Self::Complete => Some(Self::Responded),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invited => "invited",
            Self::Requested => "requested",
            Self::Responded => "responded",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// A basic message received on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    pub content: String,
    /// When the sender says it sent the message.
    pub sent_time: DateTime<Utc>,
    /// When this agent recorded it.
    pub received_at: DateTime<Utc>,
}

impl From<BasicMessage> for ReceivedMessage {
    fn from(message: BasicMessage) -> Self {
        Self {
            content: message.content,
            sent_time: message.sent_time,
            received_at: Utc::now(),
        }
    }
}

/// One side of a pairwise relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Random identifier assigned at creation.
    pub id: String,
    pub state: ConnectionState,
    /// Our DID for this relationship, never reused.
    pub did: Did,
    /// Primary key: unique among an agent's connections.
    pub verkey: Verkey,
    /// The other side's DID, once learned from its request or response.
    pub their_did: Option<Did>,
    /// The other side's connection key. Authenticated messages on this
    /// connection must come from it.
    pub their_key: Option<Verkey>,
    /// Present only while the connection is `Invited`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitation: Option<ConnectionInvitation>,
    /// Where to deliver; `None` means the other side picks up from an inbox.
    pub their_endpoint: Option<String>,
    /// Keys outbound messages are packed for.
    pub recipient_keys: Vec<Verkey>,
    /// Mediator keys to wrap outbound messages for, outermost first.
    pub routing_keys: Vec<Verkey>,
    /// Received basic messages, oldest first.
    pub messages: Vec<ReceivedMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// A new connection in the `Invited` state.
    pub fn new(did: Did, verkey: Verkey, invitation: Option<ConnectionInvitation>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: ConnectionState::Invited,
            did,
            verkey,
            their_did: None,
            their_key: None,
            invitation,
            their_endpoint: None,
            recipient_keys: Vec::new(),
            routing_keys: Vec::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fail unless the connection is in `expected`.
    pub fn expect_state(&self, expected: ConnectionState) -> Result<()> {
        if self.state != expected {
            return Err(ProtocolError::UnexpectedState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Move to `target`, which must be the immediate successor of the current state.
    pub fn advance(&mut self, target: ConnectionState) -> Result<()> {
        if self.state.next() != Some(target) {
            return Err(ProtocolError::UnexpectedState {
                expected: target.previous().unwrap_or(target),
                actual: self.state,
            });
        }
        if self.state == ConnectionState::Invited {
            self.invitation = None;
        }
        self.state = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record where and how to reach the other side.
    pub fn set_delivery(
        &mut self,
        endpoint: Option<String>,
        recipient_keys: Vec<Verkey>,
        routing_keys: Vec<Verkey>,
    ) {
        self.their_endpoint = endpoint;
        self.recipient_keys = recipient_keys;
        self.routing_keys = routing_keys;
    }

    /// Record the other side's identity and delivery service from its DID doc.
    pub fn set_their_identity(&mut self, did: Did, verkey: Verkey, did_doc: &DidDoc) {
        match did_doc.agent_service() {
            Some(service) if !service.recipient_keys.is_empty() => self.set_delivery(
                service.service_endpoint.clone(),
                service.recipient_keys.clone(),
                service.routing_keys.clone(),
            ),
            Some(service) => self.set_delivery(
                service.service_endpoint.clone(),
                vec![verkey.clone()],
                service.routing_keys.clone(),
            ),
            None => self.set_delivery(None, vec![verkey.clone()], Vec::new()),
        }
        self.their_did = Some(did);
        self.their_key = Some(verkey);
    }

    /// Fail unless `sender` is the other side's key.
    pub fn expect_sender(&self, sender: Option<&Verkey>) -> Result<()> {
        match (sender, self.their_key.as_ref()) {
            (Some(sender), Some(their_key)) if sender == their_key => Ok(()),
            _ => Err(ProtocolError::InvalidSignature),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == ConnectionState::Complete
    }
}
