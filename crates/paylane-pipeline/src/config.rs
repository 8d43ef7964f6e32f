//! Pipeline configuration
//!
//! One immutable value wired at startup. The receipt total is computed
//! here, once, from the configured prices; runs never re-derive it.

use std::time::Duration;

use paylane_types::{Price, Result, StepId};

/// Default per-step prices in minor units: research, analyst, writer
pub const DEFAULT_PRICES: [u64; 3] = [5000, 3000, 8000];

/// Default cap on a single agent HTTP round-trip
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(80);

/// Default cap on a single signature wait
pub const DEFAULT_SIGNING_TIMEOUT: Duration = Duration::from_secs(90);

/// Immutable settings for every run of the three-step pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    prices: [Price; 3],
    total: Price,
    research_url: String,
    analyst_url: String,
    writer_url: String,
    step_timeout: Duration,
    signing_timeout: Duration,
}

impl PipelineConfig {
    /// Build a config over the three agent endpoints.
    ///
    /// Fails with [`paylane_types::PaylaneError::PriceOverflow`] when the
    /// prices do not sum in `u64`, so a running pipeline can always
    /// produce its receipt total.
    pub fn new(
        research_url: impl Into<String>,
        analyst_url: impl Into<String>,
        writer_url: impl Into<String>,
        prices: [Price; 3],
    ) -> Result<Self> {
        let total = Price::checked_sum(prices)?;
        Ok(Self {
            prices,
            total,
            research_url: research_url.into(),
            analyst_url: analyst_url.into(),
            writer_url: writer_url.into(),
            step_timeout: DEFAULT_STEP_TIMEOUT,
            signing_timeout: DEFAULT_SIGNING_TIMEOUT,
        })
    }

    /// Override both timeouts
    pub fn with_timeouts(mut self, step_timeout: Duration, signing_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self.signing_timeout = signing_timeout;
        self
    }

    /// Price of a single step
    pub fn price(&self, step: StepId) -> Price {
        match step {
            StepId::Research => self.prices[0],
            StepId::Analyst => self.prices[1],
            StepId::Writer => self.prices[2],
        }
    }

    /// All three prices in pipeline order
    pub fn prices(&self) -> [Price; 3] {
        self.prices
    }

    /// The static receipt total, the sum of the three configured prices
    pub fn total_price(&self) -> Price {
        self.total
    }

    /// Endpoint the step's paid call goes to
    pub fn agent_url(&self, step: StepId) -> &str {
        match step {
            StepId::Research => &self.research_url,
            StepId::Analyst => &self.analyst_url,
            StepId::Writer => &self.writer_url,
        }
    }

    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    pub fn signing_timeout(&self) -> Duration {
        self.signing_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paylane_types::PaylaneError;

    fn prices() -> [Price; 3] {
        DEFAULT_PRICES.map(Price::from_minor)
    }

    #[test]
    fn test_total_is_static_sum() {
        let config = PipelineConfig::new("a", "b", "c", prices()).unwrap();
        assert_eq!(config.total_price(), Price::from_minor(16000));
        assert_eq!(config.total_price().to_decimal().to_string(), "0.016");
    }

    #[test]
    fn test_per_step_lookup() {
        let config = PipelineConfig::new("http://r", "http://a", "http://w", prices()).unwrap();
        assert_eq!(config.price(StepId::Analyst), Price::from_minor(3000));
        assert_eq!(config.agent_url(StepId::Writer), "http://w");
    }

    #[test]
    fn test_overflowing_prices_are_rejected() {
        let result = PipelineConfig::new(
            "a",
            "b",
            "c",
            [Price::from_minor(u64::MAX), Price::from_minor(1), Price::zero()],
        );
        assert!(matches!(result, Err(PaylaneError::PriceOverflow)));
    }
}
