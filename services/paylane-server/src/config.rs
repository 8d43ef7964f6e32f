//! Stack configuration
//!
//! Everything is assembled once at startup and immutable afterwards.
//! Prices, the payee, and the network are fixed for the life of the
//! process; there is no per-request or per-run configuration.

use std::net::SocketAddr;

use paylane_pipeline::DEFAULT_PRICES;
use paylane_types::{Price, StepId};

use crate::Args;

/// Hardhat's first default account. Publicly known; never holds value
/// outside a local demo ledger.
pub const DEFAULT_PAYER_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Demo payee credited by settlements
pub const DEFAULT_PAYEE: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

/// Arc Testnet
pub const DEFAULT_NETWORK: &str = "eip155:5042002";

/// USDC verifying contract
pub const DEFAULT_ASSET: &str = "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913";

/// Immutable settings shared by all five services in the stack
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub host: String,
    pub facilitator_port: u16,
    pub research_port: u16,
    pub analyst_port: u16,
    pub writer_port: u16,
    pub public_port: u16,
    pub network: String,
    pub asset: String,
    pub payee: String,
    pub payer_key: String,
    /// Demo balance credited to the payer at startup, minor units
    pub initial_deposit: u64,
    /// Clock skew allowance when anchoring authorization windows
    pub clock_skew_secs: u64,
    /// Longest authorization validity window the agents accept
    pub max_timeout_secs: u64,
    /// Per-step prices in pipeline order
    pub prices: [Price; 3],
}

impl StackConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            host: args.host.clone(),
            facilitator_port: args.facilitator_port,
            research_port: args.research_port,
            analyst_port: args.analyst_port,
            writer_port: args.writer_port,
            public_port: args.public_port,
            network: args.network.clone(),
            asset: args.asset.clone(),
            payee: args.payee.clone(),
            payer_key: args.payer_key.clone(),
            initial_deposit: args.deposit,
            clock_skew_secs: 60,
            max_timeout_secs: 90,
            prices: DEFAULT_PRICES.map(Price::from_minor),
        }
    }

    /// Socket address for one of the stack's ports
    pub fn bind_addr(&self, port: u16) -> SocketAddr {
        format!("{}:{}", self.host, port)
            .parse()
            .expect("invalid bind address")
    }

    pub fn agent_port(&self, step: StepId) -> u16 {
        match step {
            StepId::Research => self.research_port,
            StepId::Analyst => self.analyst_port,
            StepId::Writer => self.writer_port,
        }
    }

    /// Gated run endpoint of an agent
    pub fn agent_run_url(&self, step: StepId) -> String {
        format!("http://{}:{}/run", self.host, self.agent_port(step))
    }

    /// Ungated health endpoint of an agent
    pub fn agent_health_url(&self, step: StepId) -> String {
        format!("http://{}:{}/health", self.host, self.agent_port(step))
    }

    /// Facilitator base URL
    pub fn facilitator_url(&self) -> String {
        format!("http://{}:{}", self.host, self.facilitator_port)
    }

    pub fn price(&self, step: StepId) -> Price {
        match step {
            StepId::Research => self.prices[0],
            StepId::Analyst => self.prices[1],
            StepId::Writer => self.prices[2],
        }
    }

    /// Largest configured step price; the caller refuses anything above it
    pub fn max_step_price(&self) -> Price {
        self.prices.into_iter().max().unwrap_or(Price::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config() -> StackConfig {
        StackConfig::from_args(&Args::parse_from(["paylane-server"]))
    }

    #[test]
    fn test_default_ports() {
        let config = config();
        assert_eq!(config.facilitator_port, 3000);
        assert_eq!(config.agent_port(StepId::Research), 3001);
        assert_eq!(config.agent_port(StepId::Analyst), 3002);
        assert_eq!(config.agent_port(StepId::Writer), 3003);
        assert_eq!(config.public_port, 4000);
    }

    #[test]
    fn test_agent_urls() {
        let config = config();
        assert_eq!(
            config.agent_run_url(StepId::Analyst),
            "http://127.0.0.1:3002/run"
        );
        assert_eq!(
            config.agent_health_url(StepId::Writer),
            "http://127.0.0.1:3003/health"
        );
        assert_eq!(config.facilitator_url(), "http://127.0.0.1:3000");
    }

    #[test]
    fn test_price_table() {
        let config = config();
        assert_eq!(config.price(StepId::Research), Price::from_minor(5000));
        assert_eq!(config.price(StepId::Analyst), Price::from_minor(3000));
        assert_eq!(config.price(StepId::Writer), Price::from_minor(8000));
        assert_eq!(config.max_step_price(), Price::from_minor(8000));
    }
}
