//! # pairwise
//!
//! Authenticated pairwise channels between agents, optionally relayed
//! through a mediating agency that forwards envelopes it cannot read.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pairwise::{Agent, AgentConfig, HttpTransport, InMemoryWallet};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let agent = Agent::new(
//!     AgentConfig::new("Alice").with_endpoint("http://localhost:3000/msg"),
//!     Arc::new(InMemoryWallet::new("alice")),
//!     Arc::new(HttpTransport::new()?),
//! );
//! agent.init().await?;
//! println!("{}", agent.create_invitation_url().await?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`core`] - Keys, DIDs, envelopes and the wallet
//! - [`protocol`] - Messages, the connection handshake, routing and the envelope codec
//! - [`agent`] - The agent, its dispatcher and transports

pub use pairwise_agent as agent;
pub use pairwise_core as core;
pub use pairwise_protocol as protocol;

// Re-export common types at root
pub use pairwise_agent::{Agent, AgentConfig, AgentError, HttpTransport, OutboundTransport};
pub use pairwise_core::{Did, InMemoryWallet, PackedMessage, Verkey, Wallet};
pub use pairwise_protocol::{
    Agency, AgentMessage, Connection, ConnectionState, ProtocolError, RouteRecord,
};
