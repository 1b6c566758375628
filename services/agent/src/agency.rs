//! Joining an agency and polling its inbox.

use crate::inbox::{pickup_payload, PICKUP_SIGNATURE_HEADER, PICKUP_TIMESTAMP_HEADER};
use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use pairwise::protocol::decode_invitation_url;
use pairwise::{Agency, Agent, PackedMessage, Verkey, Wallet};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct AgencyDid {
    verkey: Verkey,
}

/// HTTP client for an agency service. Inbox fetches are signed with keys
/// from `wallet`.
#[derive(Clone)]
pub struct AgencyClient {
    client: Client,
    base_url: String,
    wallet: Arc<dyn Wallet>,
}

impl AgencyClient {
    pub fn new(base_url: &str, wallet: Arc<dyn Wallet>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            wallet,
        })
    }

    /// The agency's routing key.
    pub async fn routing_key(&self) -> Result<Verkey> {
        let did: AgencyDid = self
            .client
            .get(format!("{}/did", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(did.verkey)
    }

    pub async fn invitation_url(&self) -> Result<String> {
        let url = self
            .client
            .get(format!("{}/invitation", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(url)
    }

    /// Next queued envelope for `verkey`, if any.
    pub async fn fetch(&self, verkey: &Verkey) -> Result<Option<PackedMessage>> {
        let timestamp = Utc::now().timestamp();
        let signature = self
            .wallet
            .sign(verkey, &pickup_payload(verkey, timestamp))
            .await
            .context("signing inbox pickup")?;
        let response = self
            .client
            .get(format!("{}/inbox/{verkey}", self.base_url))
            .header(PICKUP_TIMESTAMP_HEADER, timestamp.to_string())
            .header(PICKUP_SIGNATURE_HEADER, URL_SAFE_NO_PAD.encode(signature))
            .send()
            .await?
            .error_for_status()?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(response.json().await?))
    }
}

/// Deliver everything queued for `verkey` to `agent`.
pub async fn drain_inbox(agent: &Agent, client: &AgencyClient, verkey: &Verkey) -> Result<usize> {
    let mut delivered = 0;
    while let Some(envelope) = client.fetch(verkey).await? {
        delivered += 1;
        if let Err(err) = agent.receive_message(serde_json::to_value(&envelope)?).await {
            warn!(error = %err, "failed to process message from agency");
        }
    }
    Ok(delivered)
}

/// Poll the agency inbox for `verkey` at a fixed interval.
pub async fn poll_inbox(agent: Arc<Agent>, client: AgencyClient, verkey: Verkey, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match drain_inbox(&agent, &client, &verkey).await {
            Ok(0) => {}
            Ok(count) => debug!(count, "fetched messages from agency"),
            Err(err) => warn!(error = %err, "polling agency failed"),
        }
    }
}

/// Connect to the agency, wait for the connection to complete and bind it.
///
/// Returns the verkey whose inbox the agent must keep polling.
pub async fn join_agency(agent: &Agent, client: &AgencyClient, interval: Duration) -> Result<Verkey> {
    let routing_key = client.routing_key().await.context("fetching agency DID")?;
    let url = client
        .invitation_url()
        .await
        .context("fetching agency invitation")?;
    let endpoint = decode_invitation_url(&url)?
        .service_endpoint
        .context("agency invitation has no endpoint")?;

    let connection = agent.accept_invitation_url(&url).await?;
    let verkey = connection.verkey.clone();
    info!(agency = %routing_key, %endpoint, "connecting to agency");

    for _ in 0..60 {
        drain_inbox(agent, client, &verkey).await?;
        let connection = agent.get_connection(&verkey)?;
        if connection.is_complete() {
            agent.bind_agency(Agency::new(routing_key, endpoint, connection))?;
            return Ok(verkey);
        }
        tokio::time::sleep(interval).await;
    }
    bail!("agency connection did not complete")
}
