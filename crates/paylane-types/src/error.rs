//! Error taxonomy shared by the gate, the caller, and the orchestrator
//!
//! Every failure that crosses into orchestrator-level reporting is wrapped
//! with its originating step id first (`StepError`), so the terminal error
//! event can always attribute the failure.

use thiserror::Error;

use crate::step::StepId;

/// Result type for paylane operations
pub type Result<T> = std::result::Result<T, PaylaneError>;

/// Paylane error taxonomy
#[derive(Debug, Clone, Error)]
pub enum PaylaneError {
    // ========================================================================
    // Payment protocol errors
    // ========================================================================
    /// Decoded requirement fails the expected network/contract check;
    /// rejected before signing
    #[error("Challenge mismatch: {reason}")]
    ChallengeMismatch { reason: String },

    /// External signer declined; surfaced verbatim, never retried
    #[error("Signing rejected: {reason}")]
    SigningRejected { reason: String },

    /// Payload invalid or insufficient; the operation was never invoked
    #[error("Payment verification failed: {reason}")]
    VerificationFailed { reason: String },

    /// Post-success settlement could not finalize
    #[error("Settlement failed: {reason}")]
    SettlementFailed { reason: String },

    /// A wait was abandoned; the run is over
    #[error("Timed out after {elapsed_secs}s waiting for {waiting_for}")]
    Timeout {
        waiting_for: String,
        elapsed_secs: u64,
    },

    /// The protected operation itself raised; unsettled
    #[error("Upstream operation failed with status {status}: {body}")]
    UpstreamOperationFailed { status: u16, body: String },

    /// A second challenge arrived on the retried request
    #[error("Received a payment challenge on a request that already carried a payment")]
    RepeatedChallenge,

    // ========================================================================
    // Envelope errors
    // ========================================================================
    /// A protocol header could not be decoded
    #[error("Malformed {header} header: {reason}")]
    MalformedHeader { header: String, reason: String },

    /// Transport-level failure talking to an agent or the facilitator
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    // ========================================================================
    // Run errors
    // ========================================================================
    /// The caller submitted an empty task
    #[error("Task must not be empty")]
    EmptyTask,

    /// Price arithmetic overflowed
    #[error("Price overflow during arithmetic operation")]
    PriceOverflow,
}

impl PaylaneError {
    /// Stable machine-readable code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ChallengeMismatch { .. } => "CHALLENGE_MISMATCH",
            Self::SigningRejected { .. } => "SIGNING_REJECTED",
            Self::VerificationFailed { .. } => "VERIFICATION_FAILED",
            Self::SettlementFailed { .. } => "SETTLEMENT_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::UpstreamOperationFailed { .. } => "UPSTREAM_OPERATION_FAILED",
            Self::RepeatedChallenge => "REPEATED_CHALLENGE",
            Self::MalformedHeader { .. } => "MALFORMED_HEADER",
            Self::Transport { .. } => "TRANSPORT",
            Self::EmptyTask => "EMPTY_TASK",
            Self::PriceOverflow => "PRICE_OVERFLOW",
        }
    }

    /// Shorthand for a transport failure
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

/// A failure attributed to the step where it originated
#[derive(Debug, Clone, Error)]
#[error("Step {step} failed: {source}")]
pub struct StepError {
    pub step: StepId,
    #[source]
    pub source: PaylaneError,
}

impl StepError {
    pub fn new(step: StepId, source: PaylaneError) -> Self {
        Self { step, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let err = PaylaneError::ChallengeMismatch {
            reason: "wrong network".into(),
        };
        assert_eq!(err.error_code(), "CHALLENGE_MISMATCH");
        assert_eq!(PaylaneError::EmptyTask.error_code(), "EMPTY_TASK");
    }

    #[test]
    fn test_step_error_attribution() {
        let err = StepError::new(
            StepId::Analyst,
            PaylaneError::SigningRejected {
                reason: "user declined".into(),
            },
        );
        assert_eq!(err.step, StepId::Analyst);
        assert!(err.to_string().contains("analyst"));
        assert!(err.to_string().contains("Signing rejected"));
    }
}
