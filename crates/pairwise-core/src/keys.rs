//! Key pairs for pairwise relationships.
//!
//! # Security
//!
//! Every connection gets its own [`KeyPair`], so two relationships never
//! share a verkey. The same ed25519 secret is used for signatures and,
//! converted to its X25519 form, for envelope key agreement.

use crate::{Did, Error, Result, Verkey};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};

/// Length of a wallet seed in bytes.
pub const SEED_LENGTH: usize = 32;

/// An ed25519 key pair owned by the wallet.
///
/// The `Debug` implementation only shows the verkey.
pub struct KeyPair {
    signing_key: SigningKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("verkey", &self.verkey().to_string())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Derive a key pair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let seed: [u8; SEED_LENGTH] = seed.try_into().map_err(|_| {
            Error::InvalidSeed(format!(
                "seed must be {} bytes, got {}",
                SEED_LENGTH,
                seed.len()
            ))
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    pub fn verkey(&self) -> Verkey {
        Verkey::new(self.signing_key.verifying_key())
    }

    /// The pairwise DID derived from this key.
    pub fn did(&self) -> Did {
        Did::from_verkey(&self.verkey())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// X25519 secret used for envelope key agreement.
    pub(crate) fn agreement_secret(&self) -> StaticSecret {
        StaticSecret::from(self.signing_key.to_scalar_bytes())
    }
}

/// X25519 public key matching a verkey's agreement secret.
pub(crate) fn agreement_public(verkey: &Verkey) -> Result<PublicKey> {
    Ok(PublicKey::from(verkey.public_key()?.to_montgomery().to_bytes()))
}

/// Verify a signature against a public key.
pub fn verify(public_key: &VerifyingKey, message: &[u8], signature: &Signature) -> Result<()> {
    public_key
        .verify(message, signature)
        .map_err(|_| Error::InvalidSignature)
}

/// Verify a raw 64-byte signature made by `verkey`.
pub fn verify_bytes(verkey: &Verkey, message: &[u8], signature: &[u8]) -> Result<()> {
    let bytes = <[u8; 64]>::try_from(signature).map_err(|_| Error::InvalidSignature)?;
    verify(&verkey.public_key()?, message, &Signature::from_bytes(&bytes))
}
