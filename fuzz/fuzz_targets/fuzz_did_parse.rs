//! Fuzz target for DID and verkey parsing.
//!
//! `Did::from_str` and `Verkey::from_str` must reject arbitrary input
//! without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pairwise_core::{Did, Verkey};
use std::str::FromStr;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = Did::from_str(input);
        let _ = Verkey::from_str(input);
    }
});
