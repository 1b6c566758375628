//! Error types for pairwise-core.
//!
//! Every variant here surfaces to the protocol layer as a wallet error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid DID: {0}")]
    InvalidDid(String),

    #[error("Invalid verkey: {0}")]
    InvalidVerkey(String),

    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("DID already exists in wallet: {0}")]
    DidAlreadyExists(String),

    #[error("No local key for {0}")]
    KeyNotFound(String),

    #[error("Envelope error: {0}")]
    Envelope(String),

    #[error("Crypto failure: {0}")]
    Crypto(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid base58 encoding: {0}")]
    Base58(String),

    #[error("Invalid base64 encoding: {0}")]
    Base64(String),
}
