//! Public pipeline API
//!
//! The one surface a buyer talks to. `POST /run` streams pipeline
//! progress as SSE frames while the orchestrator pays its way through
//! the gated agents; `POST /agent/:step/run` proxies a single step for
//! callers that bring their own payment header.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use paylane_pipeline::{Orchestrator, ProgressPublisher};
use paylane_types::StepId;
use paylane_x402::{
    chain_id_from_network, HEADER_PAYMENT, HEADER_PAYMENT_REQUIRED, HEADER_PAYMENT_RESPONSE,
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::config::StackConfig;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct PublicState {
    orchestrator: Orchestrator,
    config: StackConfig,
    http: reqwest::Client,
}

impl PublicState {
    pub fn new(orchestrator: Orchestrator, config: StackConfig) -> Self {
        Self {
            orchestrator,
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    task: String,
}

pub fn router(state: Arc<PublicState>) -> Router {
    Router::new()
        .route("/run", post(run))
        .route("/agent/:step/run", post(proxy_agent))
        .route("/health", get(health))
        .route("/health/stack", get(health_stack))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Start a pipeline run and stream its progress events.
///
/// The run is spawned off the request handler; the response body is the
/// event stream and ends after the terminal frame, when the run's
/// publisher drops.
async fn run(State(state): State<Arc<PublicState>>, Json(request): Json<RunRequest>) -> Response {
    let task = request.task.trim().to_string();
    if task.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "task must not be empty" })),
        )
            .into_response();
    }

    let (publisher, rx) = ProgressPublisher::channel();
    let runner = state.clone();
    tokio::spawn(async move {
        if let Err(e) = runner.orchestrator.run(&task, &publisher).await {
            error!(error = %e, "pipeline run aborted before any step");
        }
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Event::default().json_data(&event), rx))
    });
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Forward one step call, payment header and all, to the gated agent.
///
/// The proxy never inspects the payment; it moves the raw header bytes
/// both ways so the gate and the caller negotiate exactly as if they
/// were talking directly.
async fn proxy_agent(
    State(state): State<Arc<PublicState>>,
    Path(step): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(step) = StepId::parse(&step) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "unknown step", "step": step })),
        )
            .into_response();
    };

    let mut upstream_request = state
        .http
        .post(state.config.agent_run_url(step))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body.to_vec());
    if let Some(payment) = headers.get(HEADER_PAYMENT) {
        upstream_request = upstream_request.header(HEADER_PAYMENT, payment.as_bytes());
    }

    let upstream = match upstream_request.send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(step = %step, error = %e, "agent unreachable");
            return (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "agent unreachable", "step": step })),
            )
                .into_response();
        }
    };

    let mut builder = Response::builder().status(upstream.status().as_u16());
    for header in [HEADER_PAYMENT_REQUIRED, HEADER_PAYMENT_RESPONSE] {
        if let Some(value) = upstream.headers().get(header) {
            builder = builder.header(header, value.as_bytes());
        }
    }
    let bytes = upstream.bytes().await.unwrap_or_default();
    builder
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(bytes.to_vec()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

async fn health(State(state): State<Arc<PublicState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "paylane",
        "agents": StepId::ALL.map(|step| step.as_str()),
        "network": state.config.network,
        "chainId": chain_id_from_network(&state.config.network),
    }))
}

/// Probe every component's health endpoint and report the stack as a whole
async fn health_stack(State(state): State<Arc<PublicState>>) -> Json<serde_json::Value> {
    let facilitator_up = probe(
        &state.http,
        &format!("{}/health", state.config.facilitator_url()),
    )
    .await;

    let mut components = serde_json::Map::new();
    components.insert("facilitator".to_string(), facilitator_up.into());

    let mut healthy = facilitator_up;
    for step in StepId::ALL {
        let up = probe(&state.http, &state.config.agent_health_url(step)).await;
        healthy &= up;
        components.insert(step.as_str().to_string(), up.into());
    }

    Json(serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "components": components,
    }))
}

async fn probe(http: &reqwest::Client, url: &str) -> bool {
    match http.get(url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}
