//! Paylane pipeline - Orchestrator and progress publisher
//!
//! Runs the three-step paid workflow:
//!
//! - research, analyst, and writer steps execute strictly in order, each
//!   behind its own payment gate
//! - progress streams as an append-only event sequence; the receipt total
//!   is always the static sum of the configured prices
//! - the first step failure halts the run with exactly one error event;
//!   already-settled steps are not compensated
//!
//! Orchestration is decoupled from transport: the orchestrator pushes
//! [`ProgressEvent`](paylane_types::ProgressEvent)s into a
//! [`ProgressPublisher`], and whatever drains the channel (SSE, a test
//! collector) decides delivery. A disconnected subscriber silently drops
//! events and never disturbs a run in flight.

pub mod config;
pub mod orchestrator;
pub mod publisher;

pub use config::*;
pub use orchestrator::*;
pub use publisher::*;
