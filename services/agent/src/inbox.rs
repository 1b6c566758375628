//! Pickup queues for agents without an endpoint.
//!
//! Envelopes sent to a connection with no endpoint are queued under their
//! first recipient key until the owner fetches them from `/inbox/{verkey}`.
//! A fetch must be signed by that key: the signature covers
//! [`pickup_payload`] and the timestamp must be within [`PICKUP_WINDOW_SECS`].

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use pairwise::agent::TransportError;
use pairwise::core::{envelope, keys};
use pairwise::{HttpTransport, OutboundTransport, PackedMessage, Verkey};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Envelopes kept per recipient before the oldest are dropped.
pub const DEFAULT_CAPACITY: usize = 256;

pub const PICKUP_TIMESTAMP_HEADER: &str = "x-pickup-timestamp";
pub const PICKUP_SIGNATURE_HEADER: &str = "x-pickup-signature";

/// How far a pickup timestamp may be from the server clock.
pub const PICKUP_WINDOW_SECS: i64 = 300;

/// The bytes a pickup for `verkey` at `timestamp` is signed over.
pub fn pickup_payload(verkey: &Verkey, timestamp: i64) -> Vec<u8> {
    format!("pickup:{verkey}:{timestamp}").into_bytes()
}

/// Check a base64url pickup signature made by `verkey`.
pub fn verify_pickup(verkey: &Verkey, timestamp: i64, signature: &str, now: i64) -> bool {
    if (now - timestamp).abs() > PICKUP_WINDOW_SECS {
        return false;
    }
    let Ok(signature) = URL_SAFE_NO_PAD.decode(signature) else {
        return false;
    };
    keys::verify_bytes(verkey, &pickup_payload(verkey, timestamp), &signature).is_ok()
}

#[derive(Debug)]
pub struct Inbox {
    queues: Mutex<HashMap<Verkey, VecDeque<PackedMessage>>>,
    capacity: usize,
}

impl Default for Inbox {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Queue `envelope`, dropping the oldest one when the queue is full.
    pub fn push(&self, recipient: Verkey, envelope: PackedMessage) {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = queues.entry(recipient.clone()).or_default();
        if queue.len() >= self.capacity {
            queue.pop_front();
            warn!(%recipient, capacity = self.capacity, "inbox full, dropped oldest envelope");
        }
        queue.push_back(envelope);
        debug!(%recipient, queued = queue.len(), "envelope queued");
    }

    /// Oldest envelope for `recipient`.
    pub fn take(&self, recipient: &Verkey) -> Option<PackedMessage> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = queues.get_mut(recipient)?;
        let envelope = queue.pop_front();
        if queue.is_empty() {
            queues.remove(recipient);
        }
        envelope
    }

    pub fn len(&self, recipient: &Verkey) -> usize {
        let queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.get(recipient).map_or(0, VecDeque::len)
    }
}

/// HTTP delivery, falling back to the inbox when there is no endpoint.
pub struct InboxTransport {
    http: HttpTransport,
    inbox: Arc<Inbox>,
}

impl InboxTransport {
    pub fn new(http: HttpTransport, inbox: Arc<Inbox>) -> Self {
        Self { http, inbox }
    }
}

#[async_trait]
impl OutboundTransport for InboxTransport {
    async fn send(&self, envelope: &PackedMessage, endpoint: Option<&str>) -> Result<(), TransportError> {
        if endpoint.is_some() {
            return self.http.send(envelope, endpoint).await;
        }

        let recipient = envelope::recipient_keys(envelope)
            .map_err(|e| TransportError::Delivery(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Delivery("envelope has no recipients".to_string()))?;
        self.inbox.push(recipient, envelope.clone());
        Ok(())
    }
}
