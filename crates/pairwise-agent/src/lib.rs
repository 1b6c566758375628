//! A pairwise agent.
//!
//! [`Agent`] ties the wallet, the connection service, the mediator routing
//! table and an outbound transport together. Inbound payloads go through
//! [`Agent::receive_message`]; at most one reply goes out per inbound message.

pub mod agent;
pub mod basic_message;
pub mod config;
pub mod consumer;
pub mod error;
pub mod sender;
pub mod transport;

pub use agent::{Agent, PublicDid};
pub use config::AgentConfig;
pub use consumer::ConsumerRoutingService;
pub use error::{AgentError, Result};
pub use sender::MessageSender;
pub use transport::{HttpTransport, OutboundTransport, TransportError};
