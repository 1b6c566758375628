//! Invitation URLs.
//!
//! An invitation travels out of band as `<base>?c_i=<base64 JSON>`. The
//! decoder finds the `c_i` parameter anywhere in the surrounding text.

use crate::error::{ProtocolError, Result};
use crate::messages::{types, ConnectionInvitation};
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;

/// Query parameter carrying the encoded invitation.
pub const INVITATION_PARAM: &str = "c_i=";

/// Encode an invitation as a URL below `base_url`.
pub fn encode_invitation_url(invitation: &ConnectionInvitation, base_url: &str) -> Result<String> {
    let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(invitation)?);
    let separator = if base_url.contains('?') { '&' } else { '?' };
    Ok(format!("{base_url}{separator}{INVITATION_PARAM}{encoded}"))
}

/// Decode the invitation embedded in `text`.
pub fn decode_invitation_url(text: &str) -> Result<ConnectionInvitation> {
    let start = text
        .find(INVITATION_PARAM)
        .map(|i| i + INVITATION_PARAM.len())
        .ok_or_else(|| ProtocolError::InvalidInvitation("missing c_i parameter".into()))?;

    let raw: String = text[start..]
        .chars()
        .take_while(|c| !matches!(c, '&' | '#' | '"' | '\'' | '<' | '>') && !c.is_whitespace())
        .collect();

    let decoded = urlencoding::decode(&raw)
        .map_err(|e| ProtocolError::InvalidInvitation(e.to_string()))?;
    let trimmed = decoded.trim_end_matches('=');

    // Accept both alphabets; older encoders emit standard base64 with padding.
    let bytes = if trimmed.contains(|c: char| c == '+' || c == '/') {
        STANDARD_NO_PAD.decode(trimmed)
    } else {
        URL_SAFE_NO_PAD.decode(trimmed)
    }
    .map_err(|e| ProtocolError::InvalidInvitation(e.to_string()))?;

    let invitation: ConnectionInvitation = serde_json::from_slice(&bytes)
        .map_err(|e| ProtocolError::InvalidInvitation(e.to_string()))?;

    if invitation.type_ != types::INVITATION {
        return Err(ProtocolError::InvalidInvitation(format!(
            "unexpected message type {}",
            invitation.type_
        )));
    }
    if invitation.recipient_keys.is_empty() {
        return Err(ProtocolError::InvalidInvitation("no recipient keys".into()));
    }

    Ok(invitation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use pairwise_core::KeyPair;

    fn invitation() -> ConnectionInvitation {
        ConnectionInvitation::new(
            "Alice".to_string(),
            vec![KeyPair::generate().verkey()],
            vec![KeyPair::generate().verkey()],
            Some("http://agency.example/msg".to_string()),
        )
    }

    #[test]
    fn test_roundtrip() {
        let invitation = invitation();
        let url = encode_invitation_url(&invitation, "https://example.com/ssi").unwrap();
        assert!(url.starts_with("https://example.com/ssi?c_i="));

        assert_eq!(decode_invitation_url(&url).unwrap(), invitation);
    }

    #[test]
    fn test_tolerates_surrounding_text() {
        let invitation = invitation();
        let url = encode_invitation_url(&invitation, "https://example.com/ssi?lang=en").unwrap();
        let text = format!("Join me: {url}&utm=mail#top and see you there");

        assert_eq!(decode_invitation_url(&text).unwrap(), invitation);
    }

    #[test]
    fn test_accepts_padded_standard_base64() {
        let invitation = invitation();
        let encoded = STANDARD.encode(serde_json::to_vec(&invitation).unwrap());
        let url = format!("https://example.com/ssi?c_i={}", urlencoding::encode(&encoded));

        assert_eq!(decode_invitation_url(&url).unwrap(), invitation);
    }

    #[test]
    fn test_rejects_missing_param() {
        assert!(matches!(
            decode_invitation_url("https://example.com/ssi"),
            Err(ProtocolError::InvalidInvitation(_))
        ));
    }

    #[test]
    fn test_rejects_empty_recipient_keys() {
        let mut invitation = invitation();
        invitation.recipient_keys.clear();
        let url = encode_invitation_url(&invitation, "https://example.com/ssi").unwrap();

        assert!(decode_invitation_url(&url).is_err());
    }
}
