//! Base64 header codecs
//!
//! All three protocol headers carry base64-encoded JSON. Decoding failures
//! surface as [`PaylaneError::MalformedHeader`] with the header named.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use paylane_types::{PaylaneError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a header value as base64 JSON
pub fn encode_header<T: Serialize>(header: &str, value: &T) -> Result<String> {
    let json = serde_json::to_string(value).map_err(|e| PaylaneError::MalformedHeader {
        header: header.to_string(),
        reason: e.to_string(),
    })?;
    Ok(STANDARD.encode(json))
}

/// Decode a base64 JSON header value
pub fn decode_header<T: DeserializeOwned>(header: &str, encoded: &str) -> Result<T> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| PaylaneError::MalformedHeader {
            header: header.to_string(),
            reason: e.to_string(),
        })?;
    let json = String::from_utf8(bytes).map_err(|e| PaylaneError::MalformedHeader {
        header: header.to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&json).map_err(|e| PaylaneError::MalformedHeader {
        header: header.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentChallenge, PriceRequirement};
    use crate::HEADER_PAYMENT_REQUIRED;
    use paylane_types::Price;

    #[test]
    fn test_challenge_header_decodes_to_original() {
        let req = PriceRequirement::exact(
            "eip155:5042002",
            Price::from_minor(5000),
            "0xpayee",
            "0xasset",
            90,
        );
        let challenge = PaymentChallenge::single(req);

        let encoded = encode_header(HEADER_PAYMENT_REQUIRED, &challenge).unwrap();
        let decoded: PaymentChallenge =
            decode_header(HEADER_PAYMENT_REQUIRED, &encoded).unwrap();
        assert_eq!(decoded, challenge);
    }

    #[test]
    fn test_garbage_header_is_malformed() {
        let result: Result<PaymentChallenge> =
            decode_header(HEADER_PAYMENT_REQUIRED, "not base64!!!");
        assert!(matches!(
            result,
            Err(PaylaneError::MalformedHeader { ref header, .. }) if header == HEADER_PAYMENT_REQUIRED
        ));
    }

    #[test]
    fn test_valid_base64_invalid_json_is_malformed() {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        let encoded = STANDARD.encode("{\"not\": \"a challenge\"}");
        let result: Result<PaymentChallenge> = decode_header(HEADER_PAYMENT_REQUIRED, &encoded);
        assert!(result.is_err());
    }
}
