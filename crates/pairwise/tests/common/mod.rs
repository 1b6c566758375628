//! An in-process network of agents.

use async_trait::async_trait;
use pairwise::agent::TransportError;
use pairwise::{Agent, AgentConfig, AgentError, InMemoryWallet, OutboundTransport, PackedMessage, Wallet};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const AGENCY_ENDPOINT: &str = "http://agency.local/msg";
pub const AGENCY_SEED: &str = "0000000000000000000000000Agency1";

/// Queues envelopes on send and delivers them when pumped.
#[derive(Default)]
pub struct Network {
    queue: Mutex<VecDeque<(String, PackedMessage)>>,
    agents: Mutex<HashMap<String, Arc<Agent>>>,
}

#[async_trait]
impl OutboundTransport for Network {
    async fn send(&self, envelope: &PackedMessage, endpoint: Option<&str>) -> Result<(), TransportError> {
        let endpoint = endpoint.ok_or(TransportError::NoEndpoint)?;
        if !self.agents.lock().unwrap().contains_key(endpoint) {
            return Err(TransportError::Delivery(format!("nobody at {endpoint}")));
        }
        self.queue
            .lock()
            .unwrap()
            .push_back((endpoint.to_string(), envelope.clone()));
        Ok(())
    }
}

pub struct Node {
    pub agent: Arc<Agent>,
    pub wallet: Arc<InMemoryWallet>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start an agent listening at `endpoint`.
    pub async fn spawn(self: &Arc<Self>, config: AgentConfig) -> Node {
        let endpoint = config.endpoint.clone().expect("test agents need an endpoint");
        let wallet = Arc::new(InMemoryWallet::new(config.label.clone()));
        let agent = Arc::new(Agent::new(config, wallet.clone(), self.clone()));
        agent.init().await.unwrap();

        self.agents.lock().unwrap().insert(endpoint, agent.clone());
        Node { agent, wallet }
    }

    pub async fn spawn_agency(self: &Arc<Self>) -> Node {
        let config = AgentConfig::new("Agency")
            .with_endpoint(AGENCY_ENDPOINT)
            .with_public_did_seed(AGENCY_SEED);
        self.spawn(config).await
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Take the next queued envelope without delivering it.
    pub fn take(&self) -> Option<(String, PackedMessage)> {
        self.queue.lock().unwrap().pop_front()
    }

    /// Deliver queued envelopes, including replies, until none are left.
    pub async fn run(&self) -> Vec<AgentError> {
        let mut errors = Vec::new();
        while let Some((endpoint, envelope)) = self.take() {
            let agent = self.agents.lock().unwrap().get(&endpoint).cloned();
            let Some(agent) = agent else { continue };

            let payload = serde_json::to_value(&envelope).unwrap();
            if let Err(err) = agent.receive_message(payload).await {
                errors.push(err);
            }
        }
        errors
    }
}

impl Node {
    pub fn wallet(&self) -> Arc<dyn Wallet> {
        self.wallet.clone()
    }
}
