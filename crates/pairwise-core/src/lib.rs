//! # pairwise-core
//!
//! Identity and wallet primitives for pairwise DIDComm agents.
//!
//! This crate provides:
//! - Ed25519 key pairs, one per relationship
//! - Pairwise DIDs and verkeys
//! - Connection DID documents
//! - Canonical JSON and signed-data encoding
//! - Authenticated and anonymous envelope packing
//! - The [`Wallet`] capability and an in-memory implementation

pub mod did;
pub mod document;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod signing;
pub mod wallet;

pub use did::{Did, Verkey};
pub use document::DidDoc;
pub use envelope::PackedMessage;
pub use error::Error;
pub use keys::KeyPair;
pub use wallet::{InMemoryWallet, UnpackedMessage, Wallet};

/// Result type for pairwise-core operations.
pub type Result<T> = std::result::Result<T, Error>;
