//! C2: opaque, tamper-evident round-trip of the IdP `state` parameter.
//!
//! The upstream source round-tripped this as bare `base64(json)`, which it
//! itself flagged as insufficient — anyone could forge a state value. This
//! implementation authenticates the payload with an HMAC-SHA256 tag keyed
//! by the same signing secret used for JWT issuance, per the design notes'
//! "AEAD... or an HMAC tag" guidance.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::DiracError;

type HmacSha256 = Hmac<Sha256>;

/// The small mapping round-tripped through the upstream IdP's `state` query
/// parameter across both flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMap {
    pub grant_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
}

pub struct StateCodec {
    secret: Vec<u8>,
}

impl StateCodec {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn encode(&self, map: &StateMap) -> String {
        let payload = serde_json::to_vec(map).expect("StateMap always serializes");
        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload);

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(payload_b64.as_bytes());
        let tag = mac.finalize().into_bytes();
        let tag_b64 = URL_SAFE_NO_PAD.encode(tag);

        format!("{}.{}", payload_b64, tag_b64)
    }

    pub fn decode(&self, state: &str) -> Result<StateMap, DiracError> {
        let (payload_b64, tag_b64) = state
            .split_once('.')
            .ok_or_else(|| DiracError::InvalidRequest("malformed state parameter".to_string()))?;

        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| DiracError::InvalidRequest("malformed state tag".to_string()))?;

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| DiracError::InvalidRequest("state tag verification failed".to_string()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| DiracError::InvalidRequest("malformed state payload".to_string()))?;

        serde_json::from_slice(&payload)
            .map_err(|_| DiracError::InvalidRequest("malformed state payload".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StateMap {
        StateMap {
            grant_type: "device_code".to_string(),
            user_code: Some("ABCD1234".to_string()),
            uuid: None,
            external_state: None,
            code_verifier: None,
        }
    }

    #[test]
    fn round_trips() {
        let codec = StateCodec::new(b"super-secret".to_vec());
        let encoded = codec.encode(&sample());
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn rejects_foreign_value() {
        let codec = StateCodec::new(b"super-secret".to_vec());
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&sample()).unwrap());
        let forged = format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(b"not-a-real-tag-1234"));
        assert!(codec.decode(&forged).is_err());
    }

    #[test]
    fn rejects_tampered_payload() {
        let codec = StateCodec::new(b"super-secret".to_vec());
        let mut encoded = codec.encode(&sample());
        // Flip a character in the payload segment, leaving the tag intact.
        let tag_start = encoded.find('.').unwrap() + 1;
        encoded.replace_range(0..1, if encoded.starts_with('A') { "B" } else { "A" });
        assert!(tag_start > 0);
        assert!(codec.decode(&encoded).is_err());
    }

    #[test]
    fn rejects_malformed_string() {
        let codec = StateCodec::new(b"super-secret".to_vec());
        assert!(codec.decode("not-a-valid-state").is_err());
    }

    #[test]
    fn different_secret_cannot_decode() {
        let codec = StateCodec::new(b"secret-a".to_vec());
        let other = StateCodec::new(b"secret-b".to_vec());
        let encoded = codec.encode(&sample());
        assert!(other.decode(&encoded).is_err());
    }
}
