//! The verifier seam
//!
//! [`PaymentVerifier`] is where settlement internals hide: the envelope
//! asks "is this payment good?" and "settle it", never how. The shipped
//! implementations are [`FacilitatorClient`] (HTTP, for a facilitator
//! service running elsewhere) and the in-process
//! [`LocalFacilitator`](crate::facilitator::LocalFacilitator).

use async_trait::async_trait;
use paylane_types::{PaylaneError, Result};
use serde::{Deserialize, Serialize};

use crate::types::{PaymentPayload, PriceRequirement};

/// Outcome of verification. `success == false` carries the reason the
/// facilitator gave; the payment has not been settled either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// Recovered payer address when verification succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// Outcome of settlement. A successful settlement always carries a
/// transaction reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// Verifies and settles payments on behalf of a payee.
///
/// Verification is read-only and repeatable; settlement burns the
/// authorization nonce and moves value at most once.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// Check a payment against the requirement it claims to answer
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirement: &PriceRequirement,
    ) -> Result<VerifyOutcome>;

    /// Execute the transfer the payment authorizes
    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirement: &PriceRequirement,
    ) -> Result<SettleOutcome>;
}

// ============ HTTP facilitator client ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FacilitatorRequest<'a> {
    payment_payload: &'a PaymentPayload,
    payment_requirements: &'a PriceRequirement,
}

/// [`PaymentVerifier`] over a facilitator's REST endpoints
/// (`POST {base}/v1/x402/verify`, `POST {base}/v1/x402/settle`).
pub struct FacilitatorClient {
    base_url: String,
    http: reqwest::Client,
}

impl FacilitatorClient {
    /// Client for a facilitator at `base_url` (no trailing slash needed)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        payload: &PaymentPayload,
        requirement: &PriceRequirement,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let body = FacilitatorRequest {
            payment_payload: payload,
            payment_requirements: requirement,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaylaneError::transport(format!("facilitator request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaylaneError::transport(format!(
                "facilitator returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PaylaneError::transport(format!("invalid facilitator response: {e}")))
    }
}

#[async_trait]
impl PaymentVerifier for FacilitatorClient {
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirement: &PriceRequirement,
    ) -> Result<VerifyOutcome> {
        self.post("/v1/x402/verify", payload, requirement).await
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirement: &PriceRequirement,
    ) -> Result<SettleOutcome> {
        self.post("/v1/x402/settle", payload, requirement).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_shape() {
        let outcome = VerifyOutcome {
            success: false,
            error_reason: Some("insufficient_funds".into()),
            payer: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorReason"], "insufficient_funds");
        assert!(json.get("payer").is_none());
    }

    #[test]
    fn test_settle_outcome_decodes_sparse_body() {
        let outcome: SettleOutcome =
            serde_json::from_str(r#"{"success":true,"transaction":"0xabc"}"#).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.transaction.as_deref(), Some("0xabc"));
        assert!(outcome.error_reason.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = FacilitatorClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }
}
