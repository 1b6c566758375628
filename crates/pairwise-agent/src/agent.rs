//! The agent and its message dispatcher.

use crate::basic_message;
use crate::config::AgentConfig;
use crate::consumer::ConsumerRoutingService;
use crate::error::{AgentError, Result};
use crate::sender::MessageSender;
use crate::transport::OutboundTransport;
use pairwise_core::{Did, Error as WalletError, PackedMessage, Verkey, Wallet};
use pairwise_protocol::messages::{message_type, ConnectionInvitation, RouteAction};
use pairwise_protocol::{
    decode_invitation_url, encode_invitation_url, Agency, AgentMessage, Connection,
    ConnectionService, EnvelopeCodec, InboundMessage, OutboundMessage, OutboundPayload,
    ProtocolError, RouteRecord, RoutingTable,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Base URL for invitations from agents without an endpoint.
const DEFAULT_INVITATION_BASE: &str = "https://example.com/ssi";

/// The agent's public DID, used by agencies as their routing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicDid {
    pub did: Did,
    pub verkey: Verkey,
}

pub struct Agent {
    config: AgentConfig,
    wallet: Arc<dyn Wallet>,
    codec: EnvelopeCodec,
    connections: ConnectionService,
    routes: RoutingTable,
    sender: MessageSender,
    consumer: ConsumerRoutingService,
    public_did: OnceLock<PublicDid>,
    agency: OnceLock<Agency>,
}

impl Agent {
    pub fn new(config: AgentConfig, wallet: Arc<dyn Wallet>, transport: Arc<dyn OutboundTransport>) -> Self {
        let codec = EnvelopeCodec::new(wallet.clone());
        let sender = MessageSender::new(codec.clone(), transport);
        let connections =
            ConnectionService::new(wallet.clone(), config.label.clone(), config.endpoint.clone());

        info!(label = %config.label, endpoint = ?config.endpoint, "creating agent");
        Self {
            consumer: ConsumerRoutingService::new(sender.clone()),
            config,
            wallet,
            codec,
            connections,
            routes: RoutingTable::new(),
            sender,
            public_did: OnceLock::new(),
            agency: OnceLock::new(),
        }
    }

    /// Open the wallet and set up the public DID when a seed is configured.
    ///
    /// A seed whose DID is already in the wallet reuses the stored key.
    pub async fn init(&self) -> Result<()> {
        self.wallet.init().await?;

        let Some(seed) = self.config.public_did_seed.as_deref() else {
            return Ok(());
        };
        if self.public_did.get().is_some() {
            return Ok(());
        }

        let (did, verkey) = match self.wallet.create_did(Some(seed)).await {
            Ok(created) => created,
            Err(WalletError::DidAlreadyExists(existing)) => {
                debug!(did = %existing, "public DID already in wallet");
                let did: Did = existing.parse()?;
                let verkey = self.wallet.key_for_local_did(&did).await?;
                (did, verkey)
            }
            Err(err) => return Err(err.into()),
        };

        info!(%did, %verkey, "public DID ready");
        let _ = self.public_did.set(PublicDid { did, verkey });
        Ok(())
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn public_did(&self) -> Option<&PublicDid> {
        self.public_did.get()
    }

    /// Route this agent's traffic through `agency` from now on. An agent is
    /// bound at most once.
    pub fn bind_agency(&self, agency: Agency) -> Result<()> {
        let verkey = agency.verkey.clone();
        self.agency
            .set(agency)
            .map_err(|_| AgentError::AgencyAlreadyBound)?;
        info!(agency = %verkey, "bound to agency");
        Ok(())
    }

    pub fn agency(&self) -> Option<&Agency> {
        self.agency.get()
    }

    /// How many envelope layers inbound messages may have.
    pub fn max_unwrap_layers(&self) -> usize {
        self.config.max_unwrap_layers.unwrap_or_else(|| {
            1 + self.agency().map_or(0, |agency| agency.routing_keys().len())
        })
    }

    /// Create a connection and return its invitation as a URL.
    ///
    /// With an agency bound, the route for the new key is registered before
    /// the URL is handed out.
    pub async fn create_invitation_url(&self) -> Result<String> {
        let connection = self
            .connections
            .create_connection_with_invitation(self.agency())
            .await?;
        let invitation = connection
            .invitation
            .as_ref()
            .ok_or_else(|| AgentError::NoInvitation(connection.verkey.to_string()))?;

        if let Some(agency) = self.agency() {
            self.consumer.create_route(&connection.verkey, agency).await?;
        }

        let base = self
            .config
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_INVITATION_BASE);
        Ok(encode_invitation_url(invitation, base)?)
    }

    /// Accept the invitation embedded in `text` and send the connection request.
    pub async fn accept_invitation_url(&self, text: &str) -> Result<Connection> {
        let invitation = decode_invitation_url(text)?;
        self.accept_invitation(invitation).await
    }

    pub async fn accept_invitation(&self, invitation: ConnectionInvitation) -> Result<Connection> {
        let (connection, outbound) = self.handle_invitation(invitation).await?;
        self.sender.send(&outbound).await?;
        Ok(connection)
    }

    /// Handle one inbound payload: a packed envelope or a plaintext message.
    ///
    /// Returns the verkey of the connection a reply was sent on, if any.
    pub async fn receive_message(&self, payload: Value) -> Result<Option<Verkey>> {
        let inbound = if message_type(&payload).is_some() {
            InboundMessage::plaintext(AgentMessage::decode(payload)?)
        } else {
            let envelope: PackedMessage = serde_json::from_value(payload)
                .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;
            self.codec.unwrap(envelope, self.max_unwrap_layers()).await?
        };

        info!(
            label = %self.config.label,
            message_type = inbound.message.message_type(),
            recipient = ?inbound.recipient_verkey.as_ref().map(ToString::to_string),
            "received message"
        );

        let Some(outbound) = self.dispatch(inbound).await? else {
            return Ok(None);
        };
        self.sender.send(&outbound).await?;
        Ok(Some(outbound.connection.verkey))
    }

    /// Route a decoded message to its handler. Returns the reply, if any.
    pub async fn dispatch(&self, inbound: InboundMessage) -> Result<Option<OutboundMessage>> {
        let recipient = inbound.recipient().cloned();
        let sender = inbound.sender_verkey;

        let outbound = match inbound.message {
            AgentMessage::Invitation(invitation) => {
                let (_, outbound) = self.handle_invitation(invitation).await?;
                Some(outbound)
            }
            AgentMessage::Request(request) => {
                let (_, outbound) = self
                    .connections
                    .process_request(request, &recipient?, self.agency())
                    .await?;
                Some(outbound)
            }
            AgentMessage::Response(response) => {
                let (_, outbound) = self
                    .connections
                    .process_response(response, &recipient?)
                    .await?;
                Some(outbound)
            }
            AgentMessage::Ack(_) => {
                self.connections.process_ack(&recipient?, sender.as_ref())?;
                None
            }
            AgentMessage::BasicMessage(message) => {
                self.connections
                    .record_message(&recipient?, sender.as_ref(), message)?;
                None
            }
            AgentMessage::Forward(forward) => {
                let route = self.routes.forward(&forward.to)?;
                let owner = self.connections.get_connection(&route.owner_verkey)?;
                debug!(to = %forward.to, owner = %owner.verkey, "forwarding envelope");
                Some(OutboundMessage::for_connection(
                    &owner,
                    OutboundPayload::Envelope(forward.msg),
                )?)
            }
            AgentMessage::RouteUpdate(update) => {
                let owner = self.connections.get_connection(&recipient?)?;
                if let Err(err) = owner.expect_sender(sender.as_ref()) {
                    warn!(verkey = %update.verkey, "route update not sent by the connection's key");
                    return Err(err.into());
                }
                match update.action {
                    RouteAction::Add => {
                        self.routes.register_route(update.verkey, &owner);
                    }
                    RouteAction::Remove => {
                        self.routes.remove_route(&update.verkey, &owner)?;
                    }
                }
                None
            }
            AgentMessage::Unknown(value) => {
                let message_type = message_type(&value).unwrap_or_default().to_string();
                warn!(%message_type, "no handler for message");
                return Err(ProtocolError::UnhandledMessageType(message_type).into());
            }
        };
        Ok(outbound)
    }

    /// Send a basic message on a complete connection.
    pub async fn send_message_to_connection(&self, verkey: &Verkey, content: &str) -> Result<()> {
        let connection = self.connections.get_connection(verkey)?;
        let outbound = basic_message::compose(&connection, content)?;
        self.sender.send(&outbound).await
    }

    /// Ask the bound agency to stop forwarding for `verkey`.
    pub async fn remove_route(&self, verkey: &Verkey) -> Result<()> {
        let agency = self.agency().ok_or(AgentError::NoAgency)?;
        self.consumer.remove_route(verkey, agency).await
    }

    pub fn get_connections(&self) -> Vec<Connection> {
        self.connections.get_connections()
    }

    pub fn get_connection(&self, verkey: &Verkey) -> Result<Connection> {
        Ok(self.connections.get_connection(verkey)?)
    }

    pub fn find_connection_by_my_key(&self, verkey: &Verkey) -> Option<Connection> {
        self.connections.find_by_verkey(verkey)
    }

    pub fn find_connection_by_their_key(&self, verkey: &Verkey) -> Option<Connection> {
        self.connections.find_by_their_key(verkey)
    }

    pub fn get_routes(&self) -> Vec<RouteRecord> {
        self.routes.get_routes()
    }

    async fn handle_invitation(
        &self,
        invitation: ConnectionInvitation,
    ) -> Result<(Connection, OutboundMessage)> {
        let (connection, outbound) = self
            .connections
            .process_invitation(invitation, self.agency())
            .await?;

        if let Some(agency) = self.agency() {
            self.consumer.create_route(&connection.verkey, agency).await?;
        }
        Ok((connection, outbound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use pairwise_core::{InMemoryWallet, KeyPair};
    use pairwise_protocol::messages::{types, BasicMessage};
    use serde_json::json;
    use std::sync::Mutex;

    const SEED: &str = "000000000000000000000000000Agent";

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(PackedMessage, Option<String>)>>,
    }

    #[async_trait]
    impl OutboundTransport for Recorder {
        async fn send(&self, envelope: &PackedMessage, endpoint: Option<&str>) -> std::result::Result<(), TransportError> {
            self.sent
                .lock()
                .unwrap()
                .push((envelope.clone(), endpoint.map(str::to_string)));
            Ok(())
        }
    }

    fn agent(config: AgentConfig) -> (Agent, Arc<Recorder>) {
        let transport = Arc::new(Recorder::default());
        let agent = Agent::new(config, Arc::new(InMemoryWallet::new("test")), transport.clone());
        (agent, transport)
    }

    #[tokio::test]
    async fn test_init_with_seed_is_repeatable() {
        let wallet: Arc<dyn Wallet> = Arc::new(InMemoryWallet::new("agency"));
        let config = AgentConfig::new("Agency").with_public_did_seed(SEED);

        let first = Agent::new(config.clone(), wallet.clone(), Arc::new(Recorder::default()));
        first.init().await.unwrap();
        let second = Agent::new(config, wallet, Arc::new(Recorder::default()));
        second.init().await.unwrap();

        let expected = KeyPair::from_seed(SEED.as_bytes()).unwrap().verkey();
        assert_eq!(first.public_did().unwrap().verkey, expected);
        assert_eq!(second.public_did(), first.public_did());
    }

    #[tokio::test]
    async fn test_init_without_seed_has_no_public_did() {
        let (agent, _) = agent(AgentConfig::new("Alice"));
        agent.init().await.unwrap();
        assert!(agent.public_did().is_none());
    }

    #[tokio::test]
    async fn test_bind_agency_once() {
        let (agent, _) = agent(AgentConfig::new("Alice"));
        let key = KeyPair::generate();
        let conn = Connection::new(key.did(), key.verkey(), None);

        assert_eq!(agent.max_unwrap_layers(), 1);
        agent
            .bind_agency(Agency::new(key.verkey(), "http://agency", conn.clone()))
            .unwrap();
        assert_eq!(agent.max_unwrap_layers(), 2);

        let err = agent
            .bind_agency(Agency::new(key.verkey(), "http://other", conn))
            .unwrap_err();
        assert!(matches!(err, AgentError::AgencyAlreadyBound));
        assert_eq!(agent.agency().unwrap().endpoint(), "http://agency");
    }

    #[tokio::test]
    async fn test_configured_unwrap_depth_wins() {
        let (agent, _) = agent(AgentConfig::new("Alice").with_max_unwrap_layers(4));
        assert_eq!(agent.max_unwrap_layers(), 4);
    }

    #[tokio::test]
    async fn test_unknown_type_is_unhandled() {
        let (agent, transport) = agent(AgentConfig::new("Alice"));
        let payload = json!({"@type": "https://didcomm.org/trust_ping/1.0/ping", "@id": "1"});

        let err = agent.receive_message(payload).await.unwrap_err();
        assert!(matches!(
            err.protocol(),
            Some(ProtocolError::UnhandledMessageType(t)) if t == "https://didcomm.org/trust_ping/1.0/ping"
        ));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_garbage_payload_is_malformed() {
        let (agent, _) = agent(AgentConfig::new("Alice"));

        let err = agent.receive_message(json!({"hello": "world"})).await.unwrap_err();
        assert!(matches!(err.protocol(), Some(ProtocolError::MalformedEnvelope(_))));
    }

    #[tokio::test]
    async fn test_plaintext_basic_message_needs_recipient() {
        let (agent, _) = agent(AgentConfig::new("Alice"));
        let payload = serde_json::to_value(BasicMessage::new("hi")).unwrap();
        assert_eq!(payload["@type"], types::BASIC_MESSAGE);

        let err = agent.receive_message(payload).await.unwrap_err();
        assert!(matches!(err.protocol(), Some(ProtocolError::MissingField(_))));
    }

    #[tokio::test]
    async fn test_plaintext_with_bad_body_is_malformed() {
        let (agent, _) = agent(AgentConfig::new("Alice"));
        let payload = json!({"@type": types::FORWARD, "@id": "1", "to": "nope"});

        let err = agent.receive_message(payload).await.unwrap_err();
        assert!(matches!(err.protocol(), Some(ProtocolError::MalformedEnvelope(_))));
    }

    #[tokio::test]
    async fn test_remove_route_needs_agency() {
        let (agent, transport) = agent(AgentConfig::new("Alice"));
        let key = KeyPair::generate().verkey();

        let err = agent.remove_route(&key).await.unwrap_err();
        assert!(matches!(err, AgentError::NoAgency));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invitation_url_roundtrip_sends_request() {
        let (alice, _) = agent(AgentConfig::new("Alice").with_endpoint("http://alice/msg"));
        let (bob, transport) = agent(AgentConfig::new("Bob").with_endpoint("http://bob/msg"));

        let url = alice.create_invitation_url().await.unwrap();
        assert!(url.starts_with("http://alice/msg?c_i="));

        let connection = bob.accept_invitation_url(&format!("Join me: {url} !")).await.unwrap();
        assert_eq!(connection.their_endpoint.as_deref(), Some("http://alice/msg"));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.as_deref(), Some("http://alice/msg"));
    }
}
