//! Connection protocol for pairwise agents.
//!
//! - [`messages`]: the wire messages and the closed [`AgentMessage`] union
//! - [`invitation`]: out-of-band invitation URLs
//! - [`connection`] / [`store`] / [`service`]: connection records and the
//!   handshake state machine
//! - [`routing`]: the mediator's routing table
//! - [`codec`]: envelope wrapping, onion routing and bounded unwrapping

pub mod codec;
pub mod connection;
pub mod error;
pub mod invitation;
pub mod messages;
pub mod outbound;
pub mod routing;
pub mod service;
pub mod store;

pub use codec::{EnvelopeCodec, InboundMessage};
pub use connection::{Connection, ConnectionState, ReceivedMessage};
pub use error::{ProtocolError, Result};
pub use invitation::{decode_invitation_url, encode_invitation_url};
pub use messages::AgentMessage;
pub use outbound::{OutboundMessage, OutboundPayload};
pub use routing::{Agency, RouteRecord, RoutingTable};
pub use service::ConnectionService;
pub use store::ConnectionStore;
