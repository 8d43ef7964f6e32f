//! Gated agent endpoints
//!
//! Each agent is one paid skill behind its own payment gate. The
//! personas differ; the wire contract is shared: `POST /run` with
//! `{"input": ...}` returns `{"step": ..., "result": ...}` once the
//! payment settles. `/health` stays ungated.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use paylane_gate::{payment_gate, PaymentGate};
use paylane_llm::{CompletionRequest, LLMProvider, Message};
use paylane_types::StepId;
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct AgentState {
    step: StepId,
    llm: Arc<dyn LLMProvider>,
}

#[derive(Debug, Deserialize)]
struct RunStepRequest {
    input: String,
}

fn persona(step: StepId) -> &'static str {
    match step {
        StepId::Research => {
            "You are a research agent. Gather the key facts, figures, and context \
             for the task you are given. Answer as a list of concrete findings."
        }
        StepId::Analyst => {
            "You are an analysis agent. Identify the trends, tensions, and \
             implications in the findings you are given. Answer as structured analysis."
        }
        StepId::Writer => {
            "You are a writing agent. Synthesize the findings and analysis you are \
             given into a clear markdown report with headed sections."
        }
    }
}

pub fn router(step: StepId, llm: Arc<dyn LLMProvider>, gate: Arc<PaymentGate>) -> Router {
    let state = Arc::new(AgentState { step, llm });
    let gated = Router::new()
        .route("/run", post(run_step))
        .layer(middleware::from_fn_with_state(gate, payment_gate))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health))
        .with_state(state)
        .merge(gated)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn health(State(state): State<Arc<AgentState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": state.step.as_str(),
        "provider": state.llm.name(),
    }))
}

async fn run_step(
    State(state): State<Arc<AgentState>>,
    Json(request): Json<RunStepRequest>,
) -> Response {
    let completion = CompletionRequest::new(vec![Message::user(request.input)])
        .with_system(persona(state.step))
        .with_temperature(0.3)
        .with_max_tokens(2048);

    match state.llm.complete(completion).await {
        Ok(response) => {
            info!(
                step = %state.step,
                tokens = response.usage.total_tokens,
                "step completed"
            );
            Json(serde_json::json!({
                "step": state.step,
                "result": response.content,
            }))
            .into_response()
        }
        Err(e) => {
            warn!(step = %state.step, error = %e, "completion failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({
                    "error": "completion failed",
                    "reason": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
