//! The paid caller

use std::sync::Arc;
use std::time::Duration;

use paylane_types::{PaylaneError, Result};
use paylane_x402::{
    decode_header, encode_header, PaymentChallenge, PaymentSigner, PriceRequirement,
    SettlementReceipt, HEADER_PAYMENT, HEADER_PAYMENT_REQUIRED, HEADER_PAYMENT_RESPONSE,
    SCHEME_EXACT,
};
use serde::Serialize;
use tracing::{debug, warn};

/// What the caller is willing to pay for. A challenge that strays from
/// this policy is rejected before the signer is ever consulted.
#[derive(Debug, Clone)]
pub struct CallerPolicy {
    /// Network the caller settles on, `eip155:<chain id>` form
    pub network: String,
    /// Verifying contract of the settlement asset
    pub asset: String,
    /// Hard cap in minor units; `None` accepts any amount
    pub max_amount_minor: Option<u64>,
}

impl CallerPolicy {
    pub fn new(network: impl Into<String>, asset: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            asset: asset.into(),
            max_amount_minor: None,
        }
    }

    /// Refuse challenges above this amount in minor units
    pub fn with_max_amount(mut self, max_amount_minor: u64) -> Self {
        self.max_amount_minor = Some(max_amount_minor);
        self
    }

    fn check(&self, requirement: &PriceRequirement) -> Result<()> {
        let mismatch = |reason: String| PaylaneError::ChallengeMismatch { reason };

        if requirement.scheme != SCHEME_EXACT {
            return Err(mismatch(format!(
                "unsupported scheme: {}",
                requirement.scheme
            )));
        }
        if requirement.network != self.network {
            return Err(mismatch(format!(
                "expected network {}, challenge names {}",
                self.network, requirement.network
            )));
        }
        if !requirement.asset.eq_ignore_ascii_case(&self.asset) {
            return Err(mismatch(format!(
                "expected asset {}, challenge names {}",
                self.asset, requirement.asset
            )));
        }

        let Some(amount) = requirement.amount_minor() else {
            return Err(mismatch(format!(
                "unparseable amount: {}",
                requirement.max_amount_required
            )));
        };
        if let Some(cap) = self.max_amount_minor {
            if amount > cap {
                return Err(mismatch(format!(
                    "amount {amount} exceeds caller cap {cap}"
                )));
            }
        }

        Ok(())
    }
}

/// A response released by a gated endpoint, with the settlement receipt
/// when one was paid for
#[derive(Debug, Clone)]
pub struct PaidResponse {
    pub status: u16,
    pub body: serde_json::Value,
    /// Present when the request went through the payment cycle
    pub receipt: Option<SettlementReceipt>,
}

/// HTTP caller that answers x402 challenges.
///
/// One instance serves any number of endpoints; each call runs the full
/// probe/sign/retry cycle independently.
pub struct PaidCaller {
    http: reqwest::Client,
    signer: Arc<dyn PaymentSigner>,
    policy: CallerPolicy,
    request_timeout: Option<Duration>,
}

impl PaidCaller {
    pub fn new(signer: Arc<dyn PaymentSigner>, policy: CallerPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            signer,
            policy,
            request_timeout: None,
        }
    }

    /// Cap each HTTP round-trip. The timeout applies per request (the
    /// probe and the paid retry independently), never to the signing wait.
    /// Expiry drops the in-flight call and surfaces as
    /// [`PaylaneError::Timeout`].
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.post(url);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }

    fn request_error(&self, context: &str, e: reqwest::Error) -> PaylaneError {
        if e.is_timeout() {
            PaylaneError::Timeout {
                waiting_for: context.to_string(),
                elapsed_secs: self.request_timeout.map(|t| t.as_secs()).unwrap_or(0),
            }
        } else {
            PaylaneError::transport(format!("{context} failed: {e}"))
        }
    }

    /// Address payments will be drawn from
    pub fn payer_address(&self) -> &str {
        self.signer.address()
    }

    /// POST a JSON body to a gated endpoint, paying if challenged.
    ///
    /// A non-402 error status from either attempt surfaces as
    /// [`PaylaneError::UpstreamOperationFailed`]; a 402 on the paid retry
    /// surfaces as [`PaylaneError::RepeatedChallenge`].
    pub async fn post_json<B: Serialize>(&self, url: &str, body: &B) -> Result<PaidResponse> {
        let probe = self
            .request(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.request_error("endpoint probe", e))?;

        if probe.status() != reqwest::StatusCode::PAYMENT_REQUIRED {
            return read_response(probe, None).await;
        }

        let requirement = challenge_requirement(&probe)?;
        self.policy.check(&requirement)?;
        debug!(
            url,
            amount = %requirement.max_amount_required,
            "challenge accepted, requesting signature"
        );

        let payment = self.signer.sign_payment(&requirement).await?;
        let payment_header = encode_header(HEADER_PAYMENT, &payment)?;

        let paid = self
            .request(url)
            .json(body)
            .header(HEADER_PAYMENT, payment_header)
            .send()
            .await
            .map_err(|e| self.request_error("paid operation", e))?;

        if paid.status() == reqwest::StatusCode::PAYMENT_REQUIRED {
            warn!(url, "endpoint challenged a request that carried a payment");
            return Err(PaylaneError::RepeatedChallenge);
        }

        let receipt = settlement_receipt(&paid);
        read_response(paid, receipt).await
    }
}

/// Decode the challenge a 402 response carries
fn challenge_requirement(response: &reqwest::Response) -> Result<PriceRequirement> {
    let header = response
        .headers()
        .get(HEADER_PAYMENT_REQUIRED)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PaylaneError::MalformedHeader {
            header: HEADER_PAYMENT_REQUIRED.to_string(),
            reason: "missing on 402 response".to_string(),
        })?;

    let challenge: PaymentChallenge = decode_header(HEADER_PAYMENT_REQUIRED, header)?;
    challenge
        .requirement()
        .cloned()
        .ok_or_else(|| PaylaneError::ChallengeMismatch {
            reason: "challenge offers no requirements".to_string(),
        })
}

/// Decode the settlement receipt header, if the response carries one
fn settlement_receipt(response: &reqwest::Response) -> Option<SettlementReceipt> {
    let header = response
        .headers()
        .get(HEADER_PAYMENT_RESPONSE)?
        .to_str()
        .ok()?;
    match decode_header(HEADER_PAYMENT_RESPONSE, header) {
        Ok(receipt) => Some(receipt),
        Err(e) => {
            warn!(error = %e, "undecodable settlement receipt header");
            None
        }
    }
}

async fn read_response(
    response: reqwest::Response,
    receipt: Option<SettlementReceipt>,
) -> Result<PaidResponse> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| PaylaneError::transport(format!("failed to read response body: {e}")))?;

    if !status.is_success() {
        return Err(PaylaneError::UpstreamOperationFailed {
            status: status.as_u16(),
            body: text,
        });
    }

    let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
    Ok(PaidResponse {
        status: status.as_u16(),
        body,
        receipt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::{middleware, routing::post, Json, Router};
    use paylane_gate::{payment_gate, PaymentGate};
    use paylane_types::Price;
    use paylane_x402::{LocalFacilitator, LocalSigner, PaymentPayload};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PAYER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const PAYER_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
    const PAYEE: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
    const ASSET: &str = "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913";
    const NETWORK: &str = "eip155:5042002";

    fn requirement() -> PriceRequirement {
        PriceRequirement::exact(NETWORK, Price::from_minor(5000), PAYEE, ASSET, 90)
    }

    fn policy() -> CallerPolicy {
        CallerPolicy::new(NETWORK, ASSET)
    }

    fn caller() -> PaidCaller {
        let signer = LocalSigner::new(PAYER_KEY, 60).unwrap();
        PaidCaller::new(Arc::new(signer), policy())
    }

    async fn handler() -> Json<serde_json::Value> {
        Json(serde_json::json!({ "output": "analysis complete" }))
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn gated_url(facilitator: Arc<LocalFacilitator>, req: PriceRequirement) -> String {
        let gate = Arc::new(PaymentGate::new(req, facilitator));
        let app = Router::new()
            .route("/run", post(handler))
            .layer(middleware::from_fn_with_state(gate, payment_gate));
        let base = serve(app).await;
        format!("{base}/run")
    }

    #[tokio::test]
    async fn test_full_payment_cycle() {
        let facilitator = Arc::new(LocalFacilitator::new(NETWORK));
        facilitator.deposit(PAYER_ADDRESS, 100_000);
        let url = gated_url(facilitator.clone(), requirement()).await;

        let response = caller()
            .post_json(&url, &serde_json::json!({ "input": "task" }))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body["output"], "analysis complete");
        let receipt = response.receipt.unwrap();
        assert!(receipt.success);
        assert!(receipt.transaction.starts_with("0x"));
        assert_eq!(facilitator.balance(PAYEE), 5000);
    }

    #[tokio::test]
    async fn test_ungated_endpoint_needs_no_payment() {
        let app = Router::new().route("/run", post(handler));
        let base = serve(app).await;

        let response = caller()
            .post_json(&format!("{base}/run"), &serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(response.receipt.is_none());
    }

    #[tokio::test]
    async fn test_wrong_network_challenge_is_rejected_before_signing() {
        struct CountingSigner {
            inner: LocalSigner,
            calls: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl PaymentSigner for CountingSigner {
            fn address(&self) -> &str {
                self.inner.address()
            }
            async fn sign_payment(&self, requirement: &PriceRequirement) -> Result<PaymentPayload> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.inner.sign_payment(requirement).await
            }
        }

        let facilitator = Arc::new(LocalFacilitator::new("eip155:1"));
        let foreign =
            PriceRequirement::exact("eip155:1", Price::from_minor(5000), PAYEE, ASSET, 90);
        let url = gated_url(facilitator, foreign).await;

        let signer = Arc::new(CountingSigner {
            inner: LocalSigner::new(PAYER_KEY, 60).unwrap(),
            calls: AtomicUsize::new(0),
        });
        let caller = PaidCaller::new(signer.clone(), policy());

        let err = caller
            .post_json(&url, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PaylaneError::ChallengeMismatch { .. }));
        assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_amount_above_cap_is_rejected() {
        let facilitator = Arc::new(LocalFacilitator::new(NETWORK));
        let url = gated_url(facilitator, requirement()).await;

        let signer = LocalSigner::new(PAYER_KEY, 60).unwrap();
        let caller = PaidCaller::new(Arc::new(signer), policy().with_max_amount(1000));

        let err = caller
            .post_json(&url, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PaylaneError::ChallengeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_second_challenge_is_hard_failure() {
        // Unfunded payer: the gate re-challenges the paid retry.
        let facilitator = Arc::new(LocalFacilitator::new(NETWORK));
        let url = gated_url(facilitator, requirement()).await;

        let err = caller()
            .post_json(&url, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PaylaneError::RepeatedChallenge));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        async fn slow() -> Json<serde_json::Value> {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            Json(serde_json::json!({}))
        }
        let app = Router::new().route("/run", post(slow));
        let base = serve(app).await;

        let signer = LocalSigner::new(PAYER_KEY, 60).unwrap();
        let caller = PaidCaller::new(Arc::new(signer), policy())
            .with_request_timeout(std::time::Duration::from_millis(100));

        let err = caller
            .post_json(&format!("{base}/run"), &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PaylaneError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_upstream_error_surfaces_with_status() {
        async fn broken() -> (StatusCode, Json<serde_json::Value>) {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "boom" })),
            )
        }
        let app = Router::new().route("/run", post(broken));
        let base = serve(app).await;

        let err = caller()
            .post_json(&format!("{base}/run"), &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaylaneError::UpstreamOperationFailed { status: 500, .. }
        ));
    }
}
