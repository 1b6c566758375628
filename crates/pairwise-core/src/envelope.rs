//! Envelope packing.
//!
//! A packed message is a JWE-like JSON object. The payload is encrypted once
//! with a random content key; the content key is wrapped separately for each
//! recipient under a key derived from an ephemeral X25519 exchange.
//!
//! Anonymous envelopes use only the ephemeral exchange. Authenticated
//! envelopes also mix in the exchange between the sender's static key and
//! the recipient, and carry the sender verkey encrypted to the recipient, so
//! only the holder of the sender key could have produced them.

use crate::keys::agreement_public;
use crate::{Error, KeyPair, Result, Verkey};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

const ENC: &str = "chacha20poly1305_ietf";
const TYP: &str = "JWM/1.0";
const ALG_AUTHCRYPT: &str = "Authcrypt";
const ALG_ANONCRYPT: &str = "Anoncrypt";

const LABEL_SENDER: &[u8] = b"pairwise/sender";
const LABEL_AUTHCRYPT: &[u8] = b"pairwise/authcrypt";
const LABEL_ANONCRYPT: &[u8] = b"pairwise/anoncrypt";

/// An encrypted envelope as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedMessage {
    pub protected: String,
    pub iv: String,
    pub ciphertext: String,
    pub tag: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProtectedHeader {
    enc: String,
    typ: String,
    alg: String,
    recipients: Vec<Recipient>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Recipient {
    encrypted_key: String,
    header: RecipientHeader,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecipientHeader {
    kid: Verkey,
    epk: String,
    iv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender: Option<String>,
}

/// Plaintext recovered from an envelope.
#[derive(Debug, Clone)]
pub struct Opened {
    pub message: Vec<u8>,
    pub sender_verkey: Option<Verkey>,
}

/// Encrypt `payload` for every key in `recipients`.
pub fn seal(payload: &[u8], recipients: &[Verkey], sender: Option<&KeyPair>) -> Result<PackedMessage> {
    if recipients.is_empty() {
        return Err(Error::Envelope("no recipient keys".into()));
    }

    let mut cek = [0u8; 32];
    OsRng.fill_bytes(&mut cek);

    let recipients = recipients
        .iter()
        .map(|kid| wrap_content_key(&cek, kid, sender))
        .collect::<Result<Vec<_>>>()?;

    let header = ProtectedHeader {
        enc: ENC.to_string(),
        typ: TYP.to_string(),
        alg: (if sender.is_some() { ALG_AUTHCRYPT } else { ALG_ANONCRYPT }).to_string(),
        recipients,
    };
    let protected = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);

    let iv = random_nonce();
    let mut sealed = encrypt(&cek, &iv, payload, protected.as_bytes())?;
    let tag = sealed.split_off(sealed.len() - TAG_LENGTH);

    Ok(PackedMessage {
        protected,
        iv: URL_SAFE_NO_PAD.encode(iv),
        ciphertext: URL_SAFE_NO_PAD.encode(sealed),
        tag: URL_SAFE_NO_PAD.encode(tag),
    })
}

/// The verkeys an envelope is addressed to.
pub fn recipient_keys(packed: &PackedMessage) -> Result<Vec<Verkey>> {
    Ok(decode_header(packed)?
        .recipients
        .into_iter()
        .map(|r| r.header.kid)
        .collect())
}

/// Decrypt an envelope with the recipient's key pair.
pub fn open(packed: &PackedMessage, recipient: &KeyPair) -> Result<Opened> {
    let header = decode_header(packed)?;
    let own_verkey = recipient.verkey();
    let entry = header
        .recipients
        .iter()
        .find(|r| r.header.kid == own_verkey)
        .ok_or_else(|| Error::KeyNotFound(own_verkey.to_string()))?;

    let secret = recipient.agreement_secret();
    let own_public = agreement_public(&own_verkey)?;
    let epk = PublicKey::from(decode_array::<32>(&entry.header.epk)?);
    let ephemeral_shared = secret.diffie_hellman(&epk);

    let (kek, sender_verkey) = match &entry.header.sender {
        Some(sealed_sender) => {
            let sender_key = derive_key(
                LABEL_SENDER,
                &[ephemeral_shared.as_bytes(), epk.as_bytes(), own_public.as_bytes()],
            );
            let raw = decode(sealed_sender)?;
            if raw.len() <= NONCE_LENGTH {
                return Err(Error::Envelope("sender field too short".into()));
            }
            let (nonce, sealed) = raw.split_at(NONCE_LENGTH);
            let sender_verkey = Verkey::from_bytes(&decrypt(&sender_key, nonce, sealed, &[])?)?;

            let static_shared = secret.diffie_hellman(&agreement_public(&sender_verkey)?);
            let kek = derive_key(
                LABEL_AUTHCRYPT,
                &[
                    ephemeral_shared.as_bytes(),
                    static_shared.as_bytes(),
                    epk.as_bytes(),
                    own_public.as_bytes(),
                ],
            );
            (kek, Some(sender_verkey))
        }
        None => {
            let kek = derive_key(
                LABEL_ANONCRYPT,
                &[ephemeral_shared.as_bytes(), epk.as_bytes(), own_public.as_bytes()],
            );
            (kek, None)
        }
    };

    let key_iv = decode(&entry.header.iv)?;
    let cek: [u8; 32] = decrypt(&kek, &key_iv, &decode(&entry.encrypted_key)?, &[])?
        .try_into()
        .map_err(|_| Error::Envelope("content key has wrong length".into()))?;

    let mut sealed = decode(&packed.ciphertext)?;
    sealed.extend(decode(&packed.tag)?);
    let message = decrypt(&cek, &decode(&packed.iv)?, &sealed, packed.protected.as_bytes())?;

    Ok(Opened {
        message,
        sender_verkey,
    })
}

fn wrap_content_key(cek: &[u8; 32], kid: &Verkey, sender: Option<&KeyPair>) -> Result<Recipient> {
    let recipient_public = agreement_public(kid)?;
    let ephemeral = StaticSecret::random_from_rng(OsRng);
    let epk = PublicKey::from(&ephemeral);
    let ephemeral_shared = ephemeral.diffie_hellman(&recipient_public);

    let (kek, sealed_sender) = match sender {
        Some(sender) => {
            let sender_key = derive_key(
                LABEL_SENDER,
                &[ephemeral_shared.as_bytes(), epk.as_bytes(), recipient_public.as_bytes()],
            );
            let nonce = random_nonce();
            let mut sealed_sender = nonce.to_vec();
            sealed_sender.extend(encrypt(&sender_key, &nonce, sender.verkey().as_bytes(), &[])?);

            let static_shared = sender.agreement_secret().diffie_hellman(&recipient_public);
            let kek = derive_key(
                LABEL_AUTHCRYPT,
                &[
                    ephemeral_shared.as_bytes(),
                    static_shared.as_bytes(),
                    epk.as_bytes(),
                    recipient_public.as_bytes(),
                ],
            );
            (kek, Some(URL_SAFE_NO_PAD.encode(sealed_sender)))
        }
        None => {
            let kek = derive_key(
                LABEL_ANONCRYPT,
                &[ephemeral_shared.as_bytes(), epk.as_bytes(), recipient_public.as_bytes()],
            );
            (kek, None)
        }
    };

    let key_iv = random_nonce();
    let encrypted_key = encrypt(&kek, &key_iv, cek, &[])?;

    Ok(Recipient {
        encrypted_key: URL_SAFE_NO_PAD.encode(encrypted_key),
        header: RecipientHeader {
            kid: kid.clone(),
            epk: URL_SAFE_NO_PAD.encode(epk.as_bytes()),
            iv: URL_SAFE_NO_PAD.encode(key_iv),
            sender: sealed_sender,
        },
    })
}

fn decode_header(packed: &PackedMessage) -> Result<ProtectedHeader> {
    let header: ProtectedHeader = serde_json::from_slice(&decode(&packed.protected)?)?;
    if header.enc != ENC {
        return Err(Error::Envelope(format!("unsupported encryption {}", header.enc)));
    }
    Ok(header)
}

fn derive_key(label: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(label);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn random_nonce() -> [u8; NONCE_LENGTH] {
    let mut nonce = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn encrypt(key: &[u8; 32], nonce: &[u8], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    ChaCha20Poly1305::new(Key::from_slice(key))
        .encrypt(Nonce::from_slice(nonce), Payload { msg, aad })
        .map_err(|_| Error::Crypto("encryption failed".into()))
}

fn decrypt(key: &[u8; 32], nonce: &[u8], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LENGTH {
        return Err(Error::Envelope("nonce has wrong length".into()));
    }
    ChaCha20Poly1305::new(Key::from_slice(key))
        .decrypt(Nonce::from_slice(nonce), Payload { msg, aad })
        .map_err(|_| Error::Crypto("decryption failed".into()))
}

fn decode(value: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| Error::Base64(e.to_string()))
}

fn decode_array<const N: usize>(value: &str) -> Result<[u8; N]> {
    decode(value)?
        .try_into()
        .map_err(|_| Error::Envelope(format!("expected {} bytes", N)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anoncrypt_roundtrip() {
        let bob = KeyPair::generate();
        let packed = seal(b"{\"hello\":1}", &[bob.verkey()], None).unwrap();

        let opened = open(&packed, &bob).unwrap();
        assert_eq!(opened.message, b"{\"hello\":1}");
        assert!(opened.sender_verkey.is_none());
    }

    #[test]
    fn test_authcrypt_reveals_sender() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let packed = seal(b"hi", &[bob.verkey()], Some(&alice)).unwrap();

        let opened = open(&packed, &bob).unwrap();
        assert_eq!(opened.sender_verkey, Some(alice.verkey()));
    }

    #[test]
    fn test_multiple_recipients() {
        let bob = KeyPair::generate();
        let carol = KeyPair::generate();
        let packed = seal(b"both", &[bob.verkey(), carol.verkey()], None).unwrap();

        assert_eq!(recipient_keys(&packed).unwrap(), vec![bob.verkey(), carol.verkey()]);
        assert_eq!(open(&packed, &bob).unwrap().message, b"both");
        assert_eq!(open(&packed, &carol).unwrap().message, b"both");
    }

    #[test]
    fn test_wrong_recipient_cannot_open() {
        let bob = KeyPair::generate();
        let eve = KeyPair::generate();
        let packed = seal(b"secret", &[bob.verkey()], None).unwrap();

        assert!(matches!(open(&packed, &eve), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let bob = KeyPair::generate();
        let mut packed = seal(b"secret payload", &[bob.verkey()], None).unwrap();

        let mut bytes = decode(&packed.ciphertext).unwrap();
        bytes[0] ^= 0x01;
        packed.ciphertext = URL_SAFE_NO_PAD.encode(bytes);

        assert!(matches!(open(&packed, &bob), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_empty_recipients_rejected() {
        assert!(seal(b"x", &[], None).is_err());
    }
}
