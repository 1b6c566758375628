//! Basic messages between connected agents.

use pairwise_protocol::messages::BasicMessage;
use pairwise_protocol::{AgentMessage, Connection, ConnectionState, OutboundMessage, Result};

/// Address a basic message with `content` to the other side of `connection`.
///
/// Only complete connections carry basic messages.
pub fn compose(connection: &Connection, content: impl Into<String>) -> Result<OutboundMessage> {
    connection.expect_state(ConnectionState::Complete)?;
    let message = AgentMessage::BasicMessage(BasicMessage::new(content));
    OutboundMessage::for_connection(connection, message)
}
