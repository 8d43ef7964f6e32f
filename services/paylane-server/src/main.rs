//! Paylane demo stack
//!
//! One binary, five listeners:
//!
//! - the facilitator ledger on port 3000
//! - three payment-gated agents on ports 3001-3003
//! - the public pipeline API on port 4000
//!
//! Components talk real HTTP to each other. The agent gates verify and
//! settle against the facilitator's REST surface, so the wire loop a
//! remote deployment would run is exercised end to end in one process.

mod agents;
mod config;
mod facilitator;
mod public;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use paylane_client::CallerPolicy;
use paylane_gate::PaymentGate;
use paylane_llm::provider_from_env;
use paylane_pipeline::{Orchestrator, PipelineConfig};
use paylane_types::StepId;
use paylane_x402::{
    FacilitatorClient, LocalFacilitator, LocalSigner, PaymentSigner, PriceRequirement,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::StackConfig;
use crate::public::PublicState;

#[derive(Debug, Parser)]
#[command(
    name = "paylane-server",
    about = "Paylane demo stack - facilitator, gated agents, and the public pipeline API"
)]
pub struct Args {
    /// Host every service binds and dials
    #[arg(long, default_value = "127.0.0.1", env = "PAYLANE_HOST")]
    pub host: String,

    #[arg(long, default_value_t = 3000, env = "PAYLANE_FACILITATOR_PORT")]
    pub facilitator_port: u16,

    #[arg(long, default_value_t = 3001, env = "PAYLANE_RESEARCH_PORT")]
    pub research_port: u16,

    #[arg(long, default_value_t = 3002, env = "PAYLANE_ANALYST_PORT")]
    pub analyst_port: u16,

    #[arg(long, default_value_t = 3003, env = "PAYLANE_WRITER_PORT")]
    pub writer_port: u16,

    #[arg(long, default_value_t = 4000, env = "PAYLANE_PUBLIC_PORT")]
    pub public_port: u16,

    /// Private key of the demo payer wallet
    #[arg(
        long,
        default_value = config::DEFAULT_PAYER_KEY,
        env = "PAYLANE_PAYER_KEY",
        hide_default_value = true
    )]
    pub payer_key: String,

    /// Payee address credited by settlements
    #[arg(long, default_value = config::DEFAULT_PAYEE, env = "PAYLANE_PAYEE")]
    pub payee: String,

    /// CAIP-2 network identifier
    #[arg(long, default_value = config::DEFAULT_NETWORK, env = "PAYLANE_NETWORK")]
    pub network: String,

    /// Settlement asset contract address
    #[arg(long, default_value = config::DEFAULT_ASSET, env = "PAYLANE_ASSET")]
    pub asset: String,

    /// Demo balance credited to the payer at startup, minor units
    #[arg(long, default_value_t = 1_000_000, env = "PAYLANE_DEPOSIT")]
    pub deposit: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PAYLANE_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty", env = "PAYLANE_LOG_FORMAT")]
    pub log_format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let config = StackConfig::from_args(&args);

    let signer: Arc<dyn PaymentSigner> = Arc::new(
        LocalSigner::new(&config.payer_key, config.clock_skew_secs)
            .context("invalid payer key")?,
    );

    let ledger = Arc::new(LocalFacilitator::new(config.network.clone()));
    let balance = ledger.deposit(signer.address(), config.initial_deposit);
    info!(payer = %signer.address(), balance, "demo wallet funded");

    let llm = provider_from_env();
    info!(provider = llm.name(), "LLM provider selected");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut servers = Vec::new();

    servers.push(
        spawn_server(
            "facilitator",
            config.bind_addr(config.facilitator_port),
            facilitator::router(ledger.clone()),
            shutdown_rx.clone(),
        )
        .await?,
    );

    // Each agent gate settles over HTTP against the facilitator service,
    // not the in-process ledger.
    for step in StepId::ALL {
        let verifier = Arc::new(FacilitatorClient::new(config.facilitator_url()));
        let requirement = PriceRequirement::exact(
            &config.network,
            config.price(step),
            &config.payee,
            &config.asset,
            config.max_timeout_secs,
        )
        .with_resource("/run");
        let gate = Arc::new(PaymentGate::new(requirement, verifier));
        servers.push(
            spawn_server(
                step.as_str(),
                config.bind_addr(config.agent_port(step)),
                agents::router(step, llm.clone(), gate),
                shutdown_rx.clone(),
            )
            .await?,
        );
    }

    let pipeline = PipelineConfig::new(
        config.agent_run_url(StepId::Research),
        config.agent_run_url(StepId::Analyst),
        config.agent_run_url(StepId::Writer),
        config.prices,
    )?;
    let policy = CallerPolicy::new(&config.network, &config.asset)
        .with_max_amount(config.max_step_price().minor());
    let orchestrator = Orchestrator::new(pipeline, signer, policy, llm);

    let state = Arc::new(PublicState::new(orchestrator, config.clone()));
    servers.push(
        spawn_server(
            "public",
            config.bind_addr(config.public_port),
            public::router(state),
            shutdown_rx,
        )
        .await?,
    );

    info!(
        facilitator = config.facilitator_port,
        public = config.public_port,
        network = %config.network,
        "paylane stack ready"
    );

    shutdown_signal().await;
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    futures::future::join_all(servers).await;

    Ok(())
}

async fn spawn_server(
    name: &'static str,
    addr: SocketAddr,
    app: axum::Router,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {name} on {addr}"))?;
    info!(service = name, %addr, "listening");

    Ok(tokio::spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        });
        if let Err(e) = serve.await {
            error!(service = name, error = %e, "server exited with error");
        }
    }))
}

fn init_logging(level: &str, format: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().pretty().with_target(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
