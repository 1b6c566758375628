//! Command-line and environment configuration.

use clap::Parser;
use pairwise::AgentConfig;
use std::time::Duration;

/// Pairwise agent service
#[derive(Debug, Parser)]
#[command(name = "pairwise-agent")]
#[command(about = "Run a pairwise connection agent or agency")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Label shown in invitations and requests
    #[arg(long, env = "AGENT_LABEL", default_value = "pairwise agent")]
    pub label: String,

    /// Public URL of this agent's /msg endpoint
    #[arg(long, env = "AGENT_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Base URL of an agency to receive through
    #[arg(long, env = "AGENCY_URL")]
    pub agency_url: Option<String>,

    /// Seed for the public DID (32 bytes); agencies use it as their routing key
    #[arg(long, env = "PUBLIC_DID_SEED")]
    pub public_did_seed: Option<String>,

    /// Agency inbox polling interval in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "1000")]
    pub poll_interval_ms: u64,

    /// Maximum envelope layers to unwrap
    #[arg(long, env = "MAX_UNWRAP_LAYERS")]
    pub max_unwrap_layers: Option<usize>,

    /// Log as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    pub fn agent_config(&self) -> AgentConfig {
        let mut config = AgentConfig::new(self.label.clone());
        config.endpoint = self.endpoint.clone();
        config.public_did_seed = self.public_did_seed.clone();
        config.max_unwrap_layers = self.max_unwrap_layers;
        config
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
