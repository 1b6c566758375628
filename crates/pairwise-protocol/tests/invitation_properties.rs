//! Property tests for invitation URLs.

use pairwise_core::{KeyPair, Verkey};
use pairwise_protocol::messages::ConnectionInvitation;
use pairwise_protocol::{decode_invitation_url, encode_invitation_url};
use proptest::prelude::*;

fn verkey_strategy() -> impl Strategy<Value = Verkey> {
    prop::array::uniform32(any::<u8>()).prop_map(|seed| KeyPair::from_seed(&seed).unwrap().verkey())
}

fn endpoint_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of("https?://[a-z0-9.-]{1,20}(:[0-9]{2,5})?/[a-z/]{0,12}")
}

fn invitation_strategy() -> impl Strategy<Value = ConnectionInvitation> {
    (
        "\\PC{0,40}",
        prop::collection::vec(verkey_strategy(), 1..4),
        prop::collection::vec(verkey_strategy(), 0..3),
        endpoint_strategy(),
    )
        .prop_map(|(label, recipient_keys, routing_keys, endpoint)| {
            ConnectionInvitation::new(label, recipient_keys, routing_keys, endpoint)
        })
}

proptest! {
    #[test]
    fn prop_url_roundtrip(
        invitation in invitation_strategy(),
        base in "https://[a-z]{1,10}\\.example/[a-z]{0,8}",
    ) {
        let url = encode_invitation_url(&invitation, &base).unwrap();
        prop_assert!(url.starts_with(&base));
        prop_assert_eq!(decode_invitation_url(&url).unwrap(), invitation);
    }

    #[test]
    fn prop_url_found_in_surrounding_text(
        invitation in invitation_strategy(),
        prefix in "[A-Za-z ,.!]{0,20}",
        suffix in "[A-Za-z ,.!]{0,20}",
    ) {
        let url = encode_invitation_url(&invitation, "https://example.com/ssi").unwrap();
        let text = format!("{prefix} {url} {suffix}");
        prop_assert_eq!(decode_invitation_url(&text).unwrap(), invitation);
    }

    #[test]
    fn prop_decode_never_panics(text in "\\PC{0,200}") {
        let _ = decode_invitation_url(&text);
    }
}
