//! Fuzz target for inbound message decoding.
//!
//! Plaintext messages are classified by `@type`; malformed bodies and unknown
//! types must never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pairwise_core::PackedMessage;
use pairwise_protocol::AgentMessage;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = AgentMessage::from_slice(data) {
        let _ = message.message_type();
    }

    if let Ok(envelope) = serde_json::from_slice::<PackedMessage>(data) {
        let _ = pairwise_core::envelope::recipient_keys(&envelope);
    }
});
