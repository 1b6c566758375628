//! Pairwise CLI - talk to a running pairwise agent.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pairwise::core::KeyPair;
use pairwise::protocol::connection::ReceivedMessage;
use pairwise::protocol::decode_invitation_url;
use pairwise::Connection;
use reqwest::Client;

/// Pairwise agent CLI
#[derive(Parser)]
#[command(name = "pairwise")]
#[command(about = "Pairwise agents - invitations, connections and messages", long_about = None)]
struct Cli {
    /// Base URL of the agent service
    #[arg(short, long, global = true, env = "PAIRWISE_AGENT_URL", default_value = "http://localhost:3000")]
    agent: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invitation handling
    Invitation {
        #[command(subcommand)]
        action: InvitationAction,
    },
    /// List the agent's connections
    Connections,
    /// Send a basic message on a connection
    Send {
        /// Local verkey of the connection
        verkey: String,
        /// Message content
        message: String,
    },
    /// Show messages received on a connection
    Messages {
        /// Local verkey of the connection
        verkey: String,
    },
    /// DID utilities
    Did {
        #[command(subcommand)]
        action: DidAction,
    },
}

#[derive(Subcommand)]
enum InvitationAction {
    /// Decode an invitation URL (or text containing one)
    Decode {
        text: String,
    },
    /// Ask the agent for a new invitation URL
    Create,
    /// Have the agent accept an invitation
    Accept {
        url: String,
    },
}

#[derive(Subcommand)]
enum DidAction {
    /// Generate a DID and verkey, deterministically from a 32-byte seed if given
    Generate {
        #[arg(short, long)]
        seed: Option<String>,
    },
}

struct AgentClient {
    client: Client,
    base_url: String,
}

impl AgentClient {
    fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let response = self.client.get(self.url(path)).send().await?;
        Ok(response.error_for_status()?.text().await?)
    }

    async fn post_text(&self, path: &str, body: String) -> Result<String> {
        let response = self.client.post(self.url(path)).body(body).send().await?;
        Ok(response.error_for_status()?.text().await?)
    }
}

fn cmd_invitation_decode(text: &str) -> Result<()> {
    let invitation = decode_invitation_url(text)?;
    println!("{}", serde_json::to_string_pretty(&invitation)?);
    Ok(())
}

async fn cmd_invitation_create(agent: &AgentClient) -> Result<()> {
    let url = agent.get_text("/invitation").await?;
    println!("{url}");
    Ok(())
}

async fn cmd_invitation_accept(agent: &AgentClient, url: String) -> Result<()> {
    decode_invitation_url(&url).context("Not an invitation")?;
    let body = agent.post_text("/invitation", url).await?;
    let connection: Connection = serde_json::from_str(&body)?;

    println!("Accepted invitation:");
    println!("  Verkey: {}", connection.verkey);
    println!("  State: {}", connection.state);
    Ok(())
}

async fn cmd_connections(agent: &AgentClient) -> Result<()> {
    let body = agent.get_text("/connections").await?;
    let connections: Vec<Connection> = serde_json::from_str(&body)?;

    if connections.is_empty() {
        println!("No connections.");
        return Ok(());
    }
    for connection in connections {
        let their_did = connection
            .their_did
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<10} their DID: {}  messages: {}",
            connection.verkey,
            connection.state,
            their_did,
            connection.messages.len()
        );
    }
    Ok(())
}

async fn cmd_send(agent: &AgentClient, verkey: &str, message: String) -> Result<()> {
    agent
        .post_text(&format!("/api/connections/{verkey}/send-message"), message)
        .await?;
    println!("Sent.");
    Ok(())
}

async fn cmd_messages(agent: &AgentClient, verkey: &str) -> Result<()> {
    let body = agent
        .get_text(&format!("/api/connections/{verkey}/messages"))
        .await?;
    let messages: Vec<ReceivedMessage> = serde_json::from_str(&body)?;

    for message in messages {
        println!("[{}] {}", message.sent_time.to_rfc3339(), message.content);
    }
    Ok(())
}

fn cmd_did_generate(seed: Option<String>) -> Result<()> {
    let key = match seed {
        Some(seed) => KeyPair::from_seed(seed.as_bytes()).context("Seed must be 32 bytes")?,
        None => KeyPair::generate(),
    };

    println!("DID: {}", key.did());
    println!("  Qualified: {}", key.did().qualified());
    println!("  Verkey: {}", key.verkey());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let agent = AgentClient::new(&cli.agent);

    match cli.command {
        Commands::Invitation { action } => match action {
            InvitationAction::Decode { text } => cmd_invitation_decode(&text),
            InvitationAction::Create => cmd_invitation_create(&agent).await,
            InvitationAction::Accept { url } => cmd_invitation_accept(&agent, url).await,
        },
        Commands::Connections => cmd_connections(&agent).await,
        Commands::Send { verkey, message } => cmd_send(&agent, &verkey, message).await,
        Commands::Messages { verkey } => cmd_messages(&agent, &verkey).await,
        Commands::Did { action } => match action {
            DidAction::Generate { seed } => cmd_did_generate(seed),
        },
    }
}
