//! Agent errors.

use crate::transport::TransportError;
use pairwise_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Agent is already bound to an agency")]
    AgencyAlreadyBound,

    #[error("Connection {0} has no invitation")]
    NoInvitation(String),

    #[error("Agent is not bound to an agency")]
    NoAgency,
}

impl From<pairwise_core::Error> for AgentError {
    fn from(err: pairwise_core::Error) -> Self {
        Self::Protocol(ProtocolError::Wallet(err))
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(ProtocolError::Serialization(err))
    }
}

impl AgentError {
    /// The protocol error underneath, if any.
    pub fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
