//! The wallet capability.
//!
//! Agents never touch secret keys directly. Key generation, envelope
//! packing and signatures all go through a [`Wallet`].

use crate::envelope::{self, PackedMessage};
use crate::{Did, Error, KeyPair, Result, Verkey};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// A decrypted envelope.
#[derive(Debug, Clone)]
pub struct UnpackedMessage {
    pub message: Vec<u8>,
    /// Present for authenticated envelopes.
    pub sender_verkey: Option<Verkey>,
    pub recipient_verkey: Verkey,
}

/// Key management and envelope crypto consumed by the agent.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Open the wallet.
    async fn init(&self) -> Result<()>;

    /// Create a DID and its key pair, deterministically when `seed` is given.
    ///
    /// Fails with [`Error::DidAlreadyExists`] if the DID is already stored.
    async fn create_did(&self, seed: Option<&str>) -> Result<(Did, Verkey)>;

    async fn key_for_local_did(&self, did: &Did) -> Result<Verkey>;

    /// Pack `payload` for `recipient_keys`; anonymous when `sender_verkey` is `None`.
    async fn pack(
        &self,
        payload: &[u8],
        recipient_keys: &[Verkey],
        sender_verkey: Option<&Verkey>,
    ) -> Result<PackedMessage>;

    /// Unpack with the first addressed key the wallet holds.
    async fn unpack(&self, packed: &PackedMessage) -> Result<UnpackedMessage>;

    async fn sign(&self, verkey: &Verkey, data: &[u8]) -> Result<Vec<u8>>;

    /// Returns `Ok(false)` when the signature does not match.
    async fn verify(&self, verkey: &Verkey, data: &[u8], signature: &[u8]) -> Result<bool>;
}

#[derive(Debug, Default)]
struct WalletState {
    keys: HashMap<Verkey, KeyPair>,
    dids: HashMap<Did, Verkey>,
}

/// A wallet that keeps its keys in process memory.
#[derive(Debug)]
pub struct InMemoryWallet {
    id: String,
    state: RwLock<WalletState>,
}

impl InMemoryWallet {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: RwLock::new(WalletState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn with_key<T>(&self, verkey: &Verkey, f: impl FnOnce(&KeyPair) -> Result<T>) -> Result<T> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let key = state
            .keys
            .get(verkey)
            .ok_or_else(|| Error::KeyNotFound(verkey.to_string()))?;
        f(key)
    }
}

#[async_trait]
impl Wallet for InMemoryWallet {
    async fn init(&self) -> Result<()> {
        debug!(wallet = %self.id, "wallet opened");
        Ok(())
    }

    async fn create_did(&self, seed: Option<&str>) -> Result<(Did, Verkey)> {
        let key = match seed {
            Some(seed) => KeyPair::from_seed(seed.as_bytes())?,
            None => KeyPair::generate(),
        };
        let did = key.did();
        let verkey = key.verkey();

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.dids.contains_key(&did) {
            return Err(Error::DidAlreadyExists(did.to_string()));
        }
        state.dids.insert(did.clone(), verkey.clone());
        state.keys.insert(verkey.clone(), key);

        debug!(wallet = %self.id, %did, "created DID");
        Ok((did, verkey))
    }

    async fn key_for_local_did(&self, did: &Did) -> Result<Verkey> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .dids
            .get(did)
            .cloned()
            .ok_or_else(|| Error::KeyNotFound(did.to_string()))
    }

    async fn pack(
        &self,
        payload: &[u8],
        recipient_keys: &[Verkey],
        sender_verkey: Option<&Verkey>,
    ) -> Result<PackedMessage> {
        match sender_verkey {
            Some(sender) => {
                self.with_key(sender, |key| envelope::seal(payload, recipient_keys, Some(key)))
            }
            None => envelope::seal(payload, recipient_keys, None),
        }
    }

    async fn unpack(&self, packed: &PackedMessage) -> Result<UnpackedMessage> {
        let addressed = envelope::recipient_keys(packed)?;
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);

        let (recipient_verkey, key) = addressed
            .iter()
            .find_map(|kid| state.keys.get(kid).map(|key| (kid.clone(), key)))
            .ok_or_else(|| {
                let kids: Vec<String> = addressed.iter().map(ToString::to_string).collect();
                Error::KeyNotFound(kids.join(","))
            })?;

        let opened = envelope::open(packed, key)?;
        Ok(UnpackedMessage {
            message: opened.message,
            sender_verkey: opened.sender_verkey,
            recipient_verkey,
        })
    }

    async fn sign(&self, verkey: &Verkey, data: &[u8]) -> Result<Vec<u8>> {
        self.with_key(verkey, |key| Ok(key.sign(data).to_bytes().to_vec()))
    }

    async fn verify(&self, verkey: &Verkey, data: &[u8], signature: &[u8]) -> Result<bool> {
        Ok(crate::keys::verify_bytes(verkey, data, signature).is_ok())
    }
}
