//! Run types
//!
//! A `PipelineRun` is created per invocation and discarded after
//! completion. There is no cross-run persistence and no shared mutable
//! state between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::price::Price;
use crate::step::{StepId, StepRecord};

/// Unique identifier for one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a fresh run id
    pub fn new() -> Self {
        Self(format!("run_{}", Uuid::new_v4()))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Orchestrator state machine
///
/// `Idle -> Running(research) -> Running(analyst) -> Running(writer)
/// -> Receipted -> Reported -> Done`, or `Failed(step)` from any
/// Running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running { step: StepId },
    Receipted,
    Reported,
    Done,
    Failed { step: StepId },
}

impl RunState {
    /// Whether the run has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed { .. })
    }
}

/// Aggregate receipt: the static price sum plus the three settlement refs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReceipt {
    /// Sum of the three configured step prices
    pub total: Price,
    pub research_tx: String,
    pub analyst_tx: String,
    pub writer_tx: String,
}

/// Terminal report: synthesizer output plus the summarizer's digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub markdown: String,
    pub summary: String,
}

/// One pipeline invocation, owned by the orchestrator for its lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: RunId,
    /// The caller's task input
    pub task: String,
    /// Current state machine position
    pub state: RunState,
    /// Ordered step records (research, analyst, writer)
    pub steps: Vec<StepRecord>,
    /// Present once all three steps settled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<RunReceipt>,
    /// Present once the summarizer returned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    pub started_at: DateTime<Utc>,
}

impl PipelineRun {
    /// Create a fresh run for a task with the given per-step prices
    pub fn new(task: impl Into<String>, prices: [Price; 3]) -> Self {
        let steps = StepId::ALL
            .iter()
            .zip(prices)
            .map(|(step, price)| StepRecord::pending(*step, price))
            .collect();

        Self {
            run_id: RunId::new(),
            task: task.into(),
            state: RunState::Idle,
            steps,
            receipt: None,
            report: None,
            started_at: Utc::now(),
        }
    }

    /// Record for a given step
    pub fn step(&self, step: StepId) -> &StepRecord {
        self.steps
            .iter()
            .find(|r| r.step == step)
            .expect("run always holds all three step records")
    }

    /// Mutable record for a given step
    pub fn step_mut(&mut self, step: StepId) -> &mut StepRecord {
        self.steps
            .iter_mut()
            .find(|r| r.step == step)
            .expect("run always holds all three step records")
    }
}
