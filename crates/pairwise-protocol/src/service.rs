//! The connection handshake.
//!
//! The inviter creates an invitation, answers the invitee's request with a
//! signed response and completes on the ack. The invitee sends the request,
//! verifies the response and acks it.
//!
//! Handlers never hold the store lock across wallet calls. They check the
//! state on a snapshot, do their crypto, then re-check and transition inside
//! [`ConnectionStore::update`]. Of two racing requests for one invitation only
//! the first to reach the store wins; the other sees `UnexpectedState`.

use crate::connection::{Connection, ConnectionState};
use crate::error::{ProtocolError, Result};
use crate::messages::{
    Ack, AgentMessage, BasicMessage, ConnectionInvitation, ConnectionRequest, ConnectionResponse,
    ConnectionSignature, SignedConnection,
};
use crate::outbound::OutboundMessage;
use crate::routing::Agency;
use crate::store::ConnectionStore;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use pairwise_core::signing::{decode_signed_data, encode_signed_data};
use pairwise_core::{Did, DidDoc, Verkey, Wallet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ConnectionService {
    wallet: Arc<dyn Wallet>,
    store: ConnectionStore,
    label: String,
    endpoint: Option<String>,
}

impl ConnectionService {
    pub fn new(wallet: Arc<dyn Wallet>, label: impl Into<String>, endpoint: Option<String>) -> Self {
        Self {
            wallet,
            store: ConnectionStore::new(),
            label: label.into(),
            endpoint,
        }
    }

    /// Create a connection in `Invited` along with the invitation for it.
    pub async fn create_connection_with_invitation(&self, agency: Option<&Agency>) -> Result<Connection> {
        let (did, verkey) = self.wallet.create_did(None).await?;
        let (endpoint, routing_keys) = self.delivery(agency);

        let invitation = ConnectionInvitation::new(
            self.label.clone(),
            vec![verkey.clone()],
            routing_keys,
            endpoint,
        );
        let connection = Connection::new(did, verkey, Some(invitation));
        self.store.insert(connection.clone())?;

        info!(verkey = %connection.verkey, "created invitation");
        Ok(connection)
    }

    /// Accept someone else's invitation. Returns the new `Requested`
    /// connection and the request to send.
    pub async fn process_invitation(
        &self,
        invitation: ConnectionInvitation,
        agency: Option<&Agency>,
    ) -> Result<(Connection, OutboundMessage)> {
        if invitation.recipient_keys.is_empty() {
            return Err(ProtocolError::InvalidInvitation(
                "invitation has no recipient keys".to_string(),
            ));
        }

        let (did, verkey) = self.wallet.create_did(None).await?;
        let mut connection = Connection::new(did.clone(), verkey.clone(), None);
        connection.set_delivery(
            invitation.service_endpoint,
            invitation.recipient_keys,
            invitation.routing_keys,
        );
        connection.advance(ConnectionState::Requested)?;

        let did_doc = self.did_doc(&did, &verkey, agency);
        let request = ConnectionRequest::new(self.label.clone(), did, verkey, did_doc);
        self.store.insert(connection.clone())?;

        info!(verkey = %connection.verkey, inviter = %invitation.label, "accepted invitation");
        let outbound = OutboundMessage::for_connection(&connection, AgentMessage::Request(request))?;
        Ok((connection, outbound))
    }

    /// Answer a request received on the invitation key `recipient_verkey`.
    pub async fn process_request(
        &self,
        request: ConnectionRequest,
        recipient_verkey: &Verkey,
        agency: Option<&Agency>,
    ) -> Result<(Connection, OutboundMessage)> {
        let snapshot = self.store.get(recipient_verkey)?;
        snapshot.expect_state(ConnectionState::Invited)?;
        check_did_doc(&request.did, &request.verkey, &request.did_doc)?;

        let signed = SignedConnection {
            did: snapshot.did.clone(),
            verkey: snapshot.verkey.clone(),
            did_doc: self.did_doc(&snapshot.did, &snapshot.verkey, agency),
        };
        let signature = self.sign_connection(&signed, &snapshot.verkey).await?;

        let (connection, ()) = self.store.update(recipient_verkey, |c| {
            c.expect_state(ConnectionState::Invited)?;
            c.set_their_identity(request.did.clone(), request.verkey.clone(), &request.did_doc);
            c.advance(ConnectionState::Requested)?;
            c.advance(ConnectionState::Responded)
        })?;

        info!(
            verkey = %connection.verkey,
            their_did = %request.did,
            requester = %request.label,
            "responded to connection request"
        );
        let response = ConnectionResponse::new(signed, signature);
        let outbound = OutboundMessage::for_connection(&connection, AgentMessage::Response(response))?;
        Ok((connection, outbound))
    }

    /// Verify a response and complete the connection. Returns the ack to send.
    pub async fn process_response(
        &self,
        response: ConnectionResponse,
        recipient_verkey: &Verkey,
    ) -> Result<(Connection, OutboundMessage)> {
        let snapshot = self.store.get(recipient_verkey)?;
        snapshot.expect_state(ConnectionState::Requested)?;

        let invitation_key = snapshot
            .recipient_keys
            .first()
            .ok_or_else(|| ProtocolError::MissingField("invitation key".to_string()))?;
        let signed = self.verify_connection(&response.signature, invitation_key).await?;
        if signed != response.connection() {
            warn!(verkey = %recipient_verkey, "response body differs from signed data");
            return Err(ProtocolError::InvalidSignature);
        }
        check_did_doc(&signed.did, &signed.verkey, &signed.did_doc)?;

        let (connection, ()) = self.store.update(recipient_verkey, |c| {
            c.expect_state(ConnectionState::Requested)?;
            c.set_their_identity(signed.did.clone(), signed.verkey.clone(), &signed.did_doc);
            c.advance(ConnectionState::Responded)?;
            c.advance(ConnectionState::Complete)
        })?;

        info!(verkey = %connection.verkey, their_did = %signed.did, "connection complete");
        let outbound = OutboundMessage::for_connection(&connection, AgentMessage::Ack(Ack::new()))?;
        Ok((connection, outbound))
    }

    /// Complete the inviter's side of the connection. The ack must come from
    /// the key the requester connected with.
    pub fn process_ack(&self, recipient_verkey: &Verkey, sender_verkey: Option<&Verkey>) -> Result<Connection> {
        let (connection, ()) = self.store.update(recipient_verkey, |c| {
            c.expect_state(ConnectionState::Responded)?;
            c.expect_sender(sender_verkey)?;
            c.advance(ConnectionState::Complete)
        })?;

        info!(verkey = %connection.verkey, "connection complete");
        Ok(connection)
    }

    /// Append a received basic message to its connection.
    pub fn record_message(
        &self,
        recipient_verkey: &Verkey,
        sender_verkey: Option<&Verkey>,
        message: BasicMessage,
    ) -> Result<Connection> {
        let (connection, ()) = self.store.update(recipient_verkey, |c| {
            c.expect_sender(sender_verkey)?;
            c.messages.push(message.into());
            c.updated_at = Utc::now();
            Ok(())
        })?;

        debug!(verkey = %connection.verkey, count = connection.messages.len(), "message received");
        Ok(connection)
    }

    pub fn find_by_verkey(&self, verkey: &Verkey) -> Option<Connection> {
        self.store.find_by_verkey(verkey)
    }

    pub fn find_by_their_key(&self, their_key: &Verkey) -> Option<Connection> {
        self.store.find_by_their_key(their_key)
    }

    pub fn get_connection(&self, verkey: &Verkey) -> Result<Connection> {
        self.store.get(verkey)
    }

    pub fn get_connections(&self) -> Vec<Connection> {
        self.store.all()
    }

    /// Where and through whom this agent receives.
    fn delivery(&self, agency: Option<&Agency>) -> (Option<String>, Vec<Verkey>) {
        match agency {
            Some(agency) => (Some(agency.endpoint().to_string()), agency.routing_keys()),
            None => (self.endpoint.clone(), Vec::new()),
        }
    }

    fn did_doc(&self, did: &Did, verkey: &Verkey, agency: Option<&Agency>) -> DidDoc {
        let (endpoint, routing_keys) = self.delivery(agency);
        DidDoc::new(did, verkey).with_service(endpoint, routing_keys)
    }

    async fn sign_connection(
        &self,
        connection: &SignedConnection,
        signer: &Verkey,
    ) -> Result<ConnectionSignature> {
        let timestamp = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        let data = encode_signed_data(timestamp, connection)?;
        let signature = self.wallet.sign(signer, &data).await?;

        Ok(ConnectionSignature::new(
            signer.clone(),
            URL_SAFE_NO_PAD.encode(&data),
            URL_SAFE_NO_PAD.encode(&signature),
        ))
    }

    async fn verify_connection(
        &self,
        signature: &ConnectionSignature,
        expected_signer: &Verkey,
    ) -> Result<SignedConnection> {
        if signature.signer != *expected_signer {
            warn!(signer = %signature.signer, expected = %expected_signer, "unexpected signer");
            return Err(ProtocolError::InvalidSignature);
        }

        let data = decode_b64(&signature.sig_data)?;
        let sig = decode_b64(&signature.signature)?;
        if !self.wallet.verify(&signature.signer, &data, &sig).await? {
            warn!(signer = %signature.signer, "connection signature does not verify");
            return Err(ProtocolError::InvalidSignature);
        }

        let (_, value) = decode_signed_data(&data)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// A connection DID document must describe the DID and key it travels with.
fn check_did_doc(did: &Did, verkey: &Verkey, did_doc: &DidDoc) -> Result<()> {
    let doc_did = did_doc
        .did()
        .map_err(|e| ProtocolError::MalformedEnvelope(format!("DID document id: {e}")))?;
    let doc_verkey = did_doc
        .verkey()
        .map_err(|e| ProtocolError::MalformedEnvelope(format!("DID document key: {e}")))?;
    if doc_did != *did || doc_verkey != verkey {
        return Err(ProtocolError::MalformedEnvelope(format!(
            "DID document does not describe {did}"
        )));
    }
    Ok(())
}

fn decode_b64(value: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|_| ProtocolError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::OutboundPayload;
    use pairwise_core::InMemoryWallet;

    fn service(label: &str, endpoint: &str) -> ConnectionService {
        ConnectionService::new(
            Arc::new(InMemoryWallet::new(label)),
            label,
            Some(endpoint.to_string()),
        )
    }

    fn invitation_of(connection: &Connection) -> ConnectionInvitation {
        connection.invitation.clone().unwrap()
    }

    fn request_of(outbound: OutboundMessage) -> ConnectionRequest {
        match outbound.payload {
            OutboundPayload::Message(AgentMessage::Request(request)) => request,
            other => panic!("expected request, got {other:?}"),
        }
    }

    fn response_of(outbound: OutboundMessage) -> ConnectionResponse {
        match outbound.payload {
            OutboundPayload::Message(AgentMessage::Response(response)) => response,
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invitation_advertises_own_endpoint() {
        let alice = service("Alice", "http://alice");
        let conn = alice.create_connection_with_invitation(None).await.unwrap();
        let invitation = invitation_of(&conn);

        assert_eq!(conn.state, ConnectionState::Invited);
        assert_eq!(invitation.recipient_keys, vec![conn.verkey.clone()]);
        assert!(invitation.routing_keys.is_empty());
        assert_eq!(invitation.service_endpoint.as_deref(), Some("http://alice"));
    }

    #[tokio::test]
    async fn test_invitation_through_agency() {
        let alice = service("Alice", "http://alice");
        let agency_key = pairwise_core::KeyPair::generate();
        let agency_conn = Connection::new(agency_key.did(), agency_key.verkey(), None);
        let agency = Agency::new(agency_key.verkey(), "http://agency", agency_conn);

        let conn = alice.create_connection_with_invitation(Some(&agency)).await.unwrap();
        let invitation = invitation_of(&conn);

        assert_eq!(invitation.routing_keys, vec![agency_key.verkey()]);
        assert_eq!(invitation.service_endpoint.as_deref(), Some("http://agency"));
    }

    #[tokio::test]
    async fn test_handshake() {
        let alice = service("Alice", "http://alice");
        let bob = service("Bob", "http://bob");

        let invited = alice.create_connection_with_invitation(None).await.unwrap();
        let (bob_conn, outbound) = bob.process_invitation(invitation_of(&invited), None).await.unwrap();
        assert_eq!(bob_conn.state, ConnectionState::Requested);
        assert_eq!(outbound.endpoint.as_deref(), Some("http://alice"));
        assert_eq!(outbound.recipient_keys, vec![invited.verkey.clone()]);

        let (alice_conn, outbound) = alice
            .process_request(request_of(outbound), &invited.verkey, None)
            .await
            .unwrap();
        assert_eq!(alice_conn.state, ConnectionState::Responded);
        assert_eq!(alice_conn.their_key, Some(bob_conn.verkey.clone()));
        assert_eq!(outbound.endpoint.as_deref(), Some("http://bob"));

        let (bob_conn, outbound) = bob
            .process_response(response_of(outbound), &bob_conn.verkey)
            .await
            .unwrap();
        assert_eq!(bob_conn.state, ConnectionState::Complete);
        assert_eq!(bob_conn.their_did, Some(alice_conn.did.clone()));
        assert!(matches!(outbound.payload, OutboundPayload::Message(AgentMessage::Ack(_))));

        let alice_conn = alice
            .process_ack(&alice_conn.verkey, Some(&bob_conn.verkey))
            .unwrap();
        assert_eq!(alice_conn.state, ConnectionState::Complete);
        assert_eq!(alice_conn.their_did, Some(bob_conn.did));
    }

    #[tokio::test]
    async fn test_request_for_unknown_key() {
        let alice = service("Alice", "http://alice");
        let bob = service("Bob", "http://bob");
        let invited = alice.create_connection_with_invitation(None).await.unwrap();
        let (_, outbound) = bob.process_invitation(invitation_of(&invited), None).await.unwrap();

        let stranger = pairwise_core::KeyPair::generate().verkey();
        let err = alice
            .process_request(request_of(outbound), &stranger, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_request_is_rejected() {
        let alice = service("Alice", "http://alice");
        let bob = service("Bob", "http://bob");
        let invited = alice.create_connection_with_invitation(None).await.unwrap();
        let (_, outbound) = bob.process_invitation(invitation_of(&invited), None).await.unwrap();
        let request = request_of(outbound);

        alice.process_request(request.clone(), &invited.verkey, None).await.unwrap();
        let err = alice
            .process_request(request, &invited.verkey, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProtocolError::UnexpectedState {
                expected: ConnectionState::Invited,
                actual: ConnectionState::Responded,
            }
        ));
    }

    #[tokio::test]
    async fn test_tampered_response_leaves_connection_untouched() {
        let alice = service("Alice", "http://alice");
        let bob = service("Bob", "http://bob");
        let invited = alice.create_connection_with_invitation(None).await.unwrap();
        let (bob_conn, outbound) = bob.process_invitation(invitation_of(&invited), None).await.unwrap();
        let (_, outbound) = alice
            .process_request(request_of(outbound), &invited.verkey, None)
            .await
            .unwrap();

        let mut response = response_of(outbound);
        let mallory = pairwise_core::KeyPair::generate();
        response.verkey = mallory.verkey();

        let err = bob.process_response(response, &bob_conn.verkey).await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidSignature));

        let stored = bob.get_connection(&bob_conn.verkey).unwrap();
        assert_eq!(stored.state, ConnectionState::Requested);
        assert!(stored.their_did.is_none());
    }

    #[tokio::test]
    async fn test_ack_before_response() {
        let alice = service("Alice", "http://alice");
        let invited = alice.create_connection_with_invitation(None).await.unwrap();

        let err = alice.process_ack(&invited.verkey, None).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnexpectedState {
                expected: ConnectionState::Responded,
                actual: ConnectionState::Invited,
            }
        ));
    }

    #[tokio::test]
    async fn test_invitation_without_keys() {
        let bob = service("Bob", "http://bob");
        let invitation = ConnectionInvitation::new("Alice".into(), vec![], vec![], None);

        let err = bob.process_invitation(invitation, None).await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidInvitation(_)));
        assert!(bob.get_connections().is_empty());
    }

    /// Run a handshake up to the point where Alice waits for the ack.
    async fn responded() -> (ConnectionService, Connection, Connection) {
        let alice = service("Alice", "http://alice");
        let bob = service("Bob", "http://bob");
        let invited = alice.create_connection_with_invitation(None).await.unwrap();
        let (_, outbound) = bob.process_invitation(invitation_of(&invited), None).await.unwrap();
        let (alice_conn, outbound) = alice
            .process_request(request_of(outbound), &invited.verkey, None)
            .await
            .unwrap();
        let bob_key = alice_conn.their_key.clone().unwrap();
        let (bob_conn, _) = bob.process_response(response_of(outbound), &bob_key).await.unwrap();
        (alice, alice_conn, bob_conn)
    }

    #[tokio::test]
    async fn test_ack_from_stranger_is_rejected() {
        let (alice, alice_conn, _) = responded().await;
        let stranger = pairwise_core::KeyPair::generate().verkey();

        let err = alice.process_ack(&alice_conn.verkey, Some(&stranger)).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidSignature));
        let err = alice.process_ack(&alice_conn.verkey, None).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidSignature));

        let stored = alice.get_connection(&alice_conn.verkey).unwrap();
        assert_eq!(stored.state, ConnectionState::Responded);
    }

    #[tokio::test]
    async fn test_record_message() {
        let (alice, alice_conn, bob_conn) = responded().await;
        let bob_key = Some(&bob_conn.verkey);

        alice.record_message(&alice_conn.verkey, bob_key, BasicMessage::new("one")).unwrap();
        let conn = alice
            .record_message(&alice_conn.verkey, bob_key, BasicMessage::new("two"))
            .unwrap();

        let contents: Vec<_> = conn.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two"]);
    }

    #[tokio::test]
    async fn test_message_from_stranger_is_rejected() {
        let (alice, alice_conn, _) = responded().await;
        let stranger = pairwise_core::KeyPair::generate().verkey();

        let err = alice
            .record_message(&alice_conn.verkey, Some(&stranger), BasicMessage::new("hi"))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidSignature));
        let err = alice
            .record_message(&alice_conn.verkey, None, BasicMessage::new("hi"))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidSignature));

        assert!(alice.get_connection(&alice_conn.verkey).unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_request_with_foreign_did_doc() {
        let alice = service("Alice", "http://alice");
        let bob = service("Bob", "http://bob");
        let invited = alice.create_connection_with_invitation(None).await.unwrap();
        let (_, outbound) = bob.process_invitation(invitation_of(&invited), None).await.unwrap();

        let mut request = request_of(outbound);
        let other = pairwise_core::KeyPair::generate();
        request.did_doc = DidDoc::new(&other.did(), &other.verkey());

        let err = alice
            .process_request(request, &invited.verkey, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEnvelope(_)));
        assert_eq!(
            alice.get_connection(&invited.verkey).unwrap().state,
            ConnectionState::Invited
        );
    }
}
