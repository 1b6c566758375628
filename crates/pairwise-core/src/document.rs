//! Connection DID documents.
//!
//! A connection DID document carries the key and delivery service one side
//! of a relationship advertises to the other: its verkey, its endpoint, and
//! the routing keys of any mediator in front of it.

use crate::{Did, Error, Result, Verkey};
use serde::{Deserialize, Serialize};

/// JSON-LD context for connection DID documents.
pub const DID_DOC_CONTEXT: &str = "https://w3id.org/did/v1";

/// Service type for DIDComm agents.
pub const AGENT_SERVICE_TYPE: &str = "IndyAgent";

/// A public key entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub controller: String,
    pub public_key_base58: Verkey,
}

/// Authentication reference to a public key entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    #[serde(rename = "type")]
    pub type_: String,
    pub public_key: String,
}

/// Delivery service for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub priority: u32,
    pub recipient_keys: Vec<Verkey>,
    #[serde(default)]
    pub routing_keys: Vec<Verkey>,
    /// Absent for agents that receive only through their mediator's inbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<String>,
}

/// A DID document describing one side of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDoc {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    pub public_key: Vec<PublicKeyEntry>,
    pub authentication: Vec<Authentication>,
    #[serde(default)]
    pub service: Vec<Service>,
}

impl DidDoc {
    /// Create a document for `did` with `verkey` as its only key.
    pub fn new(did: &Did, verkey: &Verkey) -> Self {
        let key_id = format!("{}#1", did.qualified());
        Self {
            context: DID_DOC_CONTEXT.to_string(),
            id: did.qualified(),
            public_key: vec![PublicKeyEntry {
                id: key_id.clone(),
                type_: "Ed25519VerificationKey2018".to_string(),
                controller: did.qualified(),
                public_key_base58: verkey.clone(),
            }],
            authentication: vec![Authentication {
                type_: "Ed25519SignatureAuthentication2018".to_string(),
                public_key: key_id,
            }],
            service: Vec::new(),
        }
    }

    /// Add the agent delivery service.
    pub fn with_service(mut self, endpoint: Option<String>, routing_keys: Vec<Verkey>) -> Self {
        let recipient_keys = self
            .public_key
            .iter()
            .map(|k| k.public_key_base58.clone())
            .collect();
        self.service.push(Service {
            id: format!("{};indy", self.id),
            type_: AGENT_SERVICE_TYPE.to_string(),
            priority: 0,
            recipient_keys,
            routing_keys,
            service_endpoint: endpoint,
        });
        self
    }

    /// The DID this document describes.
    pub fn did(&self) -> Result<Did> {
        self.id.parse()
    }

    /// The first verkey in the document.
    pub fn verkey(&self) -> Result<&Verkey> {
        self.public_key
            .first()
            .map(|k| &k.public_key_base58)
            .ok_or_else(|| Error::InvalidVerkey("DID document has no public key".into()))
    }

    /// The highest-priority agent service, if any.
    pub fn agent_service(&self) -> Option<&Service> {
        self.service
            .iter()
            .filter(|s| s.type_ == AGENT_SERVICE_TYPE)
            .min_by_key(|s| s.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    #[test]
    fn test_document_creation() {
        let key = KeyPair::generate();
        let doc = DidDoc::new(&key.did(), &key.verkey());

        assert_eq!(doc.id, key.did().qualified());
        assert_eq!(doc.did().unwrap(), key.did());
        assert_eq!(doc.verkey().unwrap(), &key.verkey());
        assert!(doc.agent_service().is_none());
    }

    #[test]
    fn test_service_carries_routing() {
        let key = KeyPair::generate();
        let mediator = KeyPair::generate();
        let doc = DidDoc::new(&key.did(), &key.verkey()).with_service(
            Some("http://agency.example/msg".to_string()),
            vec![mediator.verkey()],
        );

        let service = doc.agent_service().unwrap();
        assert_eq!(service.recipient_keys, vec![key.verkey()]);
        assert_eq!(service.routing_keys, vec![mediator.verkey()]);
        assert_eq!(
            service.service_endpoint.as_deref(),
            Some("http://agency.example/msg")
        );
    }

    #[test]
    fn test_json_shape() {
        let key = KeyPair::generate();
        let doc = DidDoc::new(&key.did(), &key.verkey()).with_service(None, vec![]);
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["@context"], DID_DOC_CONTEXT);
        assert_eq!(json["publicKey"][0]["publicKeyBase58"], key.verkey().to_string());
        assert!(json["service"][0].get("serviceEndpoint").is_none());

        let back: DidDoc = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }
}
