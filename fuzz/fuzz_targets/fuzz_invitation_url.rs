//! Fuzz target for invitation URL decoding.
//!
//! Any text may be pasted as an invitation; decoding must fail cleanly.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = pairwise_protocol::decode_invitation_url(input);
    }
});
