//! Pairwise Agent Service
//!
//! Runs an agent over HTTP. With a public DID seed it can act as an agency
//! for other agents; with `--agency-url` it receives through one.

mod agency;
mod api;
mod config;
mod inbox;

use agency::{join_agency, poll_inbox, AgencyClient};
use anyhow::Result;
use api::{build_router, AppState};
use clap::Parser;
use config::Args;
use inbox::{Inbox, InboxTransport};
use pairwise::{Agent, HttpTransport, InMemoryWallet, Wallet};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = args.agent_config();
    let inbox = Arc::new(Inbox::new());
    let transport = InboxTransport::new(HttpTransport::new()?, inbox.clone());
    let wallet: Arc<dyn Wallet> = Arc::new(InMemoryWallet::new(config.label.clone()));
    let agent = Arc::new(Agent::new(config, wallet.clone(), Arc::new(transport)));
    agent.init().await?;

    if let Some(public) = agent.public_did() {
        info!(did = %public.did, verkey = %public.verkey, "public DID");
    }

    if let Some(agency_url) = args.agency_url.clone() {
        let agent = agent.clone();
        let interval = args.poll_interval();
        tokio::spawn(async move {
            let client = match AgencyClient::new(&agency_url, wallet) {
                Ok(client) => client,
                Err(err) => {
                    error!(error = %err, "invalid agency client");
                    return;
                }
            };
            match join_agency(&agent, &client, interval).await {
                Ok(verkey) => {
                    info!(%agency_url, "receiving through agency");
                    poll_inbox(agent, client, verkey, interval).await;
                }
                Err(err) => error!(error = %err, %agency_url, "failed to join agency"),
            }
        });
    }

    let app = build_router(AppState { agent, inbox });
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Pairwise agent listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
