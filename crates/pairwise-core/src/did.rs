//! Pairwise DIDs and verification keys.
//!
//! A verkey is the base58 encoding of a 32-byte ed25519 public key. The
//! pairwise DID derived from it is the base58 encoding of the key's first
//! 16 bytes. Qualified DIDs (`did:sov:<id>`) are accepted on input.

use crate::{Error, Result};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of verkey bytes that make up a pairwise DID.
pub const DID_LENGTH: usize = 16;

/// Method prefix used when a DID is rendered in qualified form.
pub const DID_METHOD_PREFIX: &str = "did:sov:";

/// An unqualified pairwise DID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Derive the DID for a verkey.
    pub fn from_verkey(verkey: &Verkey) -> Self {
        Self(bs58::encode(&verkey.as_bytes()[..DID_LENGTH]).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The DID with its method prefix.
    pub fn qualified(&self) -> String {
        format!("{}{}", DID_METHOD_PREFIX, self.0)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id = s.strip_prefix(DID_METHOD_PREFIX).unwrap_or(s);
        if id.is_empty() {
            return Err(Error::InvalidDid("empty identifier".into()));
        }

        let bytes = bs58::decode(id)
            .into_vec()
            .map_err(|e| Error::Base58(e.to_string()))?;

        if bytes.len() != DID_LENGTH {
            return Err(Error::InvalidDid(format!(
                "identifier must be {} bytes, got {}",
                DID_LENGTH,
                bytes.len()
            )));
        }

        Ok(Self(id.to_string()))
    }
}

impl TryFrom<String> for Did {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

/// An ed25519 verification key, rendered in base58.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Verkey {
    bytes: [u8; 32],
}

impl Verkey {
    pub fn new(public_key: VerifyingKey) -> Self {
        Self {
            bytes: public_key.to_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Decode into an ed25519 public key.
    pub fn public_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.bytes).map_err(|e| Error::InvalidVerkey(e.to_string()))
    }

    /// Build from raw key bytes, checking they form a valid curve point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::InvalidVerkey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        let verkey = Self { bytes };
        verkey.public_key()?;
        Ok(verkey)
    }
}

impl fmt::Display for Verkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(&self.bytes).into_string())
    }
}

impl FromStr for Verkey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| Error::Base58(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl TryFrom<String> for Verkey {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Verkey> for String {
    fn from(verkey: Verkey) -> Self {
        verkey.to_string()
    }
}
