//! Payment gate middleware

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use paylane_x402::{
    decode_header, encode_header, PaymentChallenge, PaymentPayload, PaymentVerifier,
    PriceRequirement, SettlementReceipt, HEADER_PAYMENT, HEADER_PAYMENT_REQUIRED,
    HEADER_PAYMENT_RESPONSE,
};
use tracing::{debug, warn};

/// One gated price point: the requirement every request must answer and
/// the verifier that judges answers. Built once at router construction,
/// immutable afterwards.
pub struct PaymentGate {
    requirement: PriceRequirement,
    verifier: Arc<dyn PaymentVerifier>,
}

impl PaymentGate {
    pub fn new(requirement: PriceRequirement, verifier: Arc<dyn PaymentVerifier>) -> Self {
        Self {
            requirement,
            verifier,
        }
    }

    /// The requirement this gate charges
    pub fn requirement(&self) -> &PriceRequirement {
        &self.requirement
    }

    /// 402 response carrying the encoded challenge header
    fn challenge_response(&self, reason: Option<&str>) -> Response {
        let challenge = PaymentChallenge::single(self.requirement.clone());
        let encoded = match encode_header(HEADER_PAYMENT_REQUIRED, &challenge) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "failed to encode payment challenge");
                return json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "challenge encoding failed" }),
                );
            }
        };

        let body = match reason {
            Some(reason) => serde_json::json!({ "error": "payment required", "reason": reason }),
            None => serde_json::json!({ "error": "payment required" }),
        };

        Response::builder()
            .status(StatusCode::PAYMENT_REQUIRED)
            .header(header::CONTENT_TYPE, "application/json")
            .header(HEADER_PAYMENT_REQUIRED, encoded)
            .body(Body::from(body.to_string()))
            .unwrap_or_else(|_| Response::new(Body::empty()))
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

/// The gate itself. Apply with
/// `axum::middleware::from_fn_with_state(gate, payment_gate)`.
pub async fn payment_gate(
    State(gate): State<Arc<PaymentGate>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(header_value) = req.headers().get(HEADER_PAYMENT) else {
        debug!(path = %req.uri().path(), "no payment header, issuing challenge");
        return gate.challenge_response(None);
    };

    let encoded = match header_value.to_str() {
        Ok(value) => value,
        Err(_) => return gate.challenge_response(Some("payment header is not valid ASCII")),
    };

    let payload: PaymentPayload = match decode_header(HEADER_PAYMENT, encoded) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, "malformed payment header");
            return gate.challenge_response(Some(&e.to_string()));
        }
    };

    let verified = match gate.verifier.verify(&payload, &gate.requirement).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "verifier unreachable");
            return json_response(
                StatusCode::BAD_GATEWAY,
                serde_json::json!({ "error": "payment verification unavailable" }),
            );
        }
    };
    if !verified.success {
        let reason = verified.error_reason.unwrap_or_else(|| "rejected".to_string());
        debug!(%reason, "payment rejected at verification");
        return gate.challenge_response(Some(&reason));
    }

    // The payment is good. Run the protected operation; settlement only
    // happens if the operation itself succeeded.
    let response = next.run(req).await;
    if !response.status().is_success() {
        debug!(status = %response.status(), "handler failed, payment not settled");
        return response;
    }

    let settled = match gate.verifier.settle(&payload, &gate.requirement).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "settlement transport failure, withholding result");
            return json_response(
                StatusCode::PAYMENT_REQUIRED,
                serde_json::json!({ "error": "settlement failed", "reason": e.to_string() }),
            );
        }
    };
    if !settled.success {
        let reason = settled.error_reason.unwrap_or_else(|| "rejected".to_string());
        warn!(%reason, "settlement rejected, withholding result");
        return json_response(
            StatusCode::PAYMENT_REQUIRED,
            serde_json::json!({ "error": "settlement failed", "reason": reason }),
        );
    }

    let receipt = SettlementReceipt {
        success: true,
        transaction: settled.transaction.unwrap_or_default(),
        network: gate.requirement.network.clone(),
        payer: settled.payer,
    };

    let mut response = response;
    match encode_header(HEADER_PAYMENT_RESPONSE, &receipt) {
        Ok(encoded) => match encoded.parse() {
            Ok(value) => {
                response.headers_mut().insert(HEADER_PAYMENT_RESPONSE, value);
            }
            Err(_) => warn!("settlement receipt is not a valid header value"),
        },
        Err(e) => warn!(error = %e, "failed to encode settlement receipt"),
    }

    debug!(transaction = %receipt.transaction, "payment settled, releasing result");
    response
}
