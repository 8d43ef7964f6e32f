//! Facilitator REST surface
//!
//! Thin HTTP wrapper over the in-process ledger. Verification and
//! settlement accept the same request body the
//! [`FacilitatorClient`](paylane_x402::FacilitatorClient) sends; the
//! balance and deposit endpoints exist so a demo ledger can be inspected
//! and funded from outside.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use paylane_types::PaylaneError;
use paylane_x402::{
    LocalFacilitator, PaymentPayload, PaymentVerifier, PriceRequirement, SCHEME_EXACT,
    X402_VERSION,
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Verify/settle request body, the shape the facilitator client sends
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentRequest {
    payment_payload: PaymentPayload,
    payment_requirements: PriceRequirement,
}

#[derive(Debug, Deserialize)]
struct DepositRequest {
    address: String,
    amount: u64,
}

pub fn router(facilitator: Arc<LocalFacilitator>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/x402/supported", get(supported))
        .route("/v1/x402/verify", post(verify))
        .route("/v1/x402/settle", post(settle))
        .route("/balance/:address", get(balance))
        .route("/deposit", post(deposit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(facilitator)
}

async fn health(State(facilitator): State<Arc<LocalFacilitator>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "facilitator",
        "network": facilitator.network(),
    }))
}

async fn supported(State(facilitator): State<Arc<LocalFacilitator>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "kinds": [{
            "x402Version": X402_VERSION,
            "scheme": SCHEME_EXACT,
            "network": facilitator.network(),
        }]
    }))
}

async fn verify(
    State(facilitator): State<Arc<LocalFacilitator>>,
    Json(request): Json<PaymentRequest>,
) -> Response {
    match facilitator
        .verify(&request.payment_payload, &request.payment_requirements)
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => internal_error("verification failed", e),
    }
}

async fn settle(
    State(facilitator): State<Arc<LocalFacilitator>>,
    Json(request): Json<PaymentRequest>,
) -> Response {
    match facilitator
        .settle(&request.payment_payload, &request.payment_requirements)
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => internal_error("settlement failed", e),
    }
}

async fn balance(
    State(facilitator): State<Arc<LocalFacilitator>>,
    Path(address): Path<String>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "address": address,
        "balance": facilitator.balance(&address),
    }))
}

async fn deposit(
    State(facilitator): State<Arc<LocalFacilitator>>,
    Json(request): Json<DepositRequest>,
) -> Json<serde_json::Value> {
    let balance = facilitator.deposit(&request.address, request.amount);
    info!(address = %request.address, balance, "deposit credited");
    Json(serde_json::json!({
        "address": request.address,
        "balance": balance,
    }))
}

fn internal_error(context: &str, e: PaylaneError) -> Response {
    warn!(error = %e, context, "facilitator operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": context, "reason": e.to_string() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use paylane_types::Price;
    use paylane_x402::{LocalSigner, PaymentSigner, SettleOutcome, VerifyOutcome};

    const PAYER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const PAYER_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
    const PAYEE: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
    const ASSET: &str = "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913";
    const NETWORK: &str = "eip155:5042002";

    fn requirement() -> PriceRequirement {
        PriceRequirement::exact(NETWORK, Price::from_minor(5000), PAYEE, ASSET, 90)
    }

    fn server(facilitator: Arc<LocalFacilitator>) -> TestServer {
        TestServer::new(router(facilitator)).unwrap()
    }

    async fn signed_request() -> serde_json::Value {
        let signer = LocalSigner::new(PAYER_KEY, 60).unwrap();
        let payload = signer.sign_payment(&requirement()).await.unwrap();
        serde_json::json!({
            "paymentPayload": payload,
            "paymentRequirements": requirement(),
        })
    }

    #[tokio::test]
    async fn test_supported_kinds() {
        let server = server(Arc::new(LocalFacilitator::new(NETWORK)));
        let response = server.get("/v1/x402/supported").await;
        response.assert_status_ok();

        let body: serde_json::Value = response.json();
        assert_eq!(body["kinds"][0]["scheme"], "exact");
        assert_eq!(body["kinds"][0]["network"], NETWORK);
        assert_eq!(body["kinds"][0]["x402Version"], 1);
    }

    #[tokio::test]
    async fn test_deposit_then_balance() {
        let server = server(Arc::new(LocalFacilitator::new(NETWORK)));

        let deposited = server
            .post("/deposit")
            .json(&serde_json::json!({ "address": PAYER_ADDRESS, "amount": 25_000 }))
            .await;
        deposited.assert_status_ok();
        assert_eq!(deposited.json::<serde_json::Value>()["balance"], 25_000);

        let balance = server.get(&format!("/balance/{PAYER_ADDRESS}")).await;
        assert_eq!(balance.json::<serde_json::Value>()["balance"], 25_000);
    }

    #[tokio::test]
    async fn test_verify_then_settle_over_http() {
        let facilitator = Arc::new(LocalFacilitator::new(NETWORK));
        facilitator.deposit(PAYER_ADDRESS, 100_000);
        let server = server(facilitator.clone());
        let request = signed_request().await;

        let verified: VerifyOutcome = server.post("/v1/x402/verify").json(&request).await.json();
        assert!(verified.success);
        assert_eq!(verified.payer.as_deref(), Some(PAYER_ADDRESS));

        let settled: SettleOutcome = server.post("/v1/x402/settle").json(&request).await.json();
        assert!(settled.success);
        assert!(settled.transaction.unwrap().starts_with("0x"));
        assert_eq!(facilitator.balance(PAYEE), 5000);
    }

    #[tokio::test]
    async fn test_unfunded_verify_is_rejected_not_an_error() {
        let server = server(Arc::new(LocalFacilitator::new(NETWORK)));
        let request = signed_request().await;

        let response = server.post("/v1/x402/verify").json(&request).await;
        response.assert_status_ok();

        let verified: VerifyOutcome = response.json();
        assert!(!verified.success);
        assert!(verified.error_reason.unwrap().contains("insufficient"));
    }
}
