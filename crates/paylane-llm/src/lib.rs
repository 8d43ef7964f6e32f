//! Paylane LLM - Provider abstraction for the pipeline's collaborators
//!
//! Every agent step and the terminal summarizer go through one interface:
//!
//! - Hermes (OpenAI-compatible chat completions) when configured
//! - Deterministic fallback when no endpoint is available
//!
//! LLM outputs are content only; they never touch payment state. A failed
//! completion surfaces as an error on the step that requested it.

pub mod providers;
pub mod types;

pub use providers::*;
pub use types::*;
