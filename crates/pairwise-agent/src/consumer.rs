//! Route registration at an agency.

use crate::error::Result;
use crate::sender::MessageSender;
use pairwise_core::Verkey;
use pairwise_protocol::messages::{RouteAction, RouteUpdate};
use pairwise_protocol::{AgentMessage, Agency, OutboundMessage};
use tracing::info;

/// Registers this agent's connection keys with its agency.
#[derive(Clone)]
pub struct ConsumerRoutingService {
    sender: MessageSender,
}

impl ConsumerRoutingService {
    pub fn new(sender: MessageSender) -> Self {
        Self { sender }
    }

    /// Ask `agency` to forward messages for `verkey` to this agent.
    pub async fn create_route(&self, verkey: &Verkey, agency: &Agency) -> Result<()> {
        self.update(verkey, agency, RouteAction::Add).await?;
        info!(%verkey, agency = %agency.verkey, "route requested");
        Ok(())
    }

    /// Ask `agency` to stop forwarding messages for `verkey`.
    pub async fn remove_route(&self, verkey: &Verkey, agency: &Agency) -> Result<()> {
        self.update(verkey, agency, RouteAction::Remove).await?;
        info!(%verkey, agency = %agency.verkey, "route removal requested");
        Ok(())
    }

    async fn update(&self, verkey: &Verkey, agency: &Agency, action: RouteAction) -> Result<()> {
        let update = RouteUpdate::new(verkey.clone(), action);
        let outbound =
            OutboundMessage::for_connection(&agency.connection, AgentMessage::RouteUpdate(update))?;
        self.sender.send(&outbound).await
    }
}
