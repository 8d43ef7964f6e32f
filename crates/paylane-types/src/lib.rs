//! Paylane Types - Canonical domain types for the payment-gated pipeline
//!
//! This crate contains all foundational types for Paylane with zero
//! dependencies on other paylane crates. It defines:
//!
//! - Step identity and lifecycle types (StepId, StepStatus, StepRecord)
//! - Run types (PipelineRun, RunReceipt, RunReport, RunState)
//! - The progress event union streamed to clients
//! - Price arithmetic in minor units
//! - The error taxonomy shared by the gate, the caller, and the orchestrator
//!
//! # Architectural Invariants
//!
//! 1. A payment payload is honored at most once per price requirement
//! 2. Steps execute in fixed order, never concurrently
//! 3. A run halts on its first step failure - exactly one error event
//! 4. Receipt totals are static sums of configured prices, never derived
//!    from operation content

pub mod error;
pub mod event;
pub mod price;
pub mod run;
pub mod step;

pub use error::*;
pub use event::*;
pub use price::*;
pub use run::*;
pub use step::*;
