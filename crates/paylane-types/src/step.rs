//! Step identity and lifecycle types
//!
//! The pipeline has exactly three steps, executed in fixed order:
//! research (produces raw findings), analyst (transforms findings into
//! structured analysis), writer (synthesizes findings and analysis into a
//! report). Step k+1 never begins before step k completes.

use serde::{Deserialize, Serialize};

use crate::price::Price;

/// Identity of a pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepId {
    /// Producer: gathers raw findings for the task
    Research,
    /// Transformer: turns research output into structured analysis
    Analyst,
    /// Synthesizer: combines research and analysis into the final report
    Writer,
}

impl StepId {
    /// All steps in execution order
    pub const ALL: [StepId; 3] = [StepId::Research, StepId::Analyst, StepId::Writer];

    /// Wire name of the step
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Research => "research",
            StepId::Analyst => "analyst",
            StepId::Writer => "writer",
        }
    }

    /// Parse a wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "research" => Some(StepId::Research),
            "analyst" => Some(StepId::Analyst),
            "writer" => Some(StepId::Writer),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of one step within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet started
    Pending,
    /// Paid call in flight
    Running,
    /// Suspended on the external signer
    AwaitingSignature,
    /// Completed and settled
    Complete,
    /// Failed; the run halts here
    Failed,
}

/// One step's record, owned by the orchestrator for a run's lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Which step this record tracks
    pub step: StepId,
    /// Current lifecycle status
    pub status: StepStatus,
    /// Settlement transaction reference, present once complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    /// Fixed configured price for this step
    pub price: Price,
}

impl StepRecord {
    /// Create a pending record for a step at its configured price
    pub fn pending(step: StepId, price: Price) -> Self {
        Self {
            step,
            status: StepStatus::Pending,
            tx_ref: None,
            price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order() {
        assert_eq!(
            StepId::ALL,
            [StepId::Research, StepId::Analyst, StepId::Writer]
        );
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(StepId::Research.as_str(), "research");
        assert_eq!(StepId::parse("writer"), Some(StepId::Writer));
        assert_eq!(StepId::parse("unknown"), None);
    }

    #[test]
    fn test_step_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&StepId::Analyst).unwrap(),
            "\"analyst\""
        );
        assert_eq!(
            serde_json::to_string(&StepStatus::AwaitingSignature).unwrap(),
            "\"awaiting_signature\""
        );
    }
}
