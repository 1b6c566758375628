//! Error types for the connection protocol.

use crate::connection::ConnectionState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Wallet error: {0}")]
    Wallet(#[from] pairwise_core::Error),

    #[error("No connection for verkey {0}")]
    ConnectionNotFound(String),

    #[error("No route registered for verkey {0}")]
    RouteNotFound(String),

    #[error("Unexpected connection state: expected {expected}, got {actual}")]
    UnexpectedState {
        expected: ConnectionState,
        actual: ConnectionState,
    },

    #[error("Connection verkey {0} already in use")]
    DuplicateVerkey(String),

    #[error("Signature or sender does not match the expected key")]
    InvalidSignature,

    #[error("No handler for message type \"{0}\"")]
    UnhandledMessageType(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Invalid invitation: {0}")]
    InvalidInvitation(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Not-found conditions are reportable outcomes rather than faults.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ConnectionNotFound(_) | Self::RouteNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
