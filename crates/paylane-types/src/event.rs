//! Progress events streamed to the invoking client
//!
//! Events are append-only and strictly ordered; a stream terminates with
//! exactly one `report` or `error` frame. The publisher matches this union
//! exhaustively - no ad hoc object shapes cross the transport boundary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::step::StepId;

/// One frame of run progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A step is about to execute at its fixed price
    StepStart { step: StepId, price: Decimal },
    /// A step completed and settled
    StepComplete {
        step: StepId,
        tx: String,
        amount: Decimal,
    },
    /// Aggregate receipt for the whole run
    Receipt {
        total: Decimal,
        #[serde(rename = "researchTx")]
        research_tx: String,
        #[serde(rename = "analystTx")]
        analyst_tx: String,
        #[serde(rename = "writerTx")]
        writer_tx: String,
    },
    /// Terminal success frame: synthesizer output plus summary
    Report { markdown: String, summary: String },
    /// Terminal failure frame, attributed to a step when one was active
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<StepId>,
    },
}

impl ProgressEvent {
    /// Whether this event terminates the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Report { .. } | ProgressEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price::Price;

    #[test]
    fn test_step_start_wire_shape() {
        let event = ProgressEvent::StepStart {
            step: StepId::Research,
            price: Price::from_minor(5000).to_decimal(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "step_start", "step": "research", "price": "0.005"})
        );
    }

    #[test]
    fn test_receipt_wire_shape() {
        let event = ProgressEvent::Receipt {
            total: Price::from_minor(16000).to_decimal(),
            research_tx: "tx1".into(),
            analyst_tx: "tx2".into(),
            writer_tx: "tx3".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "receipt");
        assert_eq!(json["total"], "0.016");
        assert_eq!(json["researchTx"], "tx1");
        assert_eq!(json["writerTx"], "tx3");
    }

    #[test]
    fn test_error_step_omitted_when_absent() {
        let event = ProgressEvent::Error {
            message: "empty task".into(),
            step: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("step").is_none());
    }

    #[test]
    fn test_terminal_frames() {
        assert!(ProgressEvent::Report {
            markdown: String::new(),
            summary: String::new()
        }
        .is_terminal());
        assert!(ProgressEvent::Error {
            message: String::new(),
            step: Some(StepId::Analyst)
        }
        .is_terminal());
        assert!(!ProgressEvent::StepStart {
            step: StepId::Research,
            price: Decimal::ZERO
        }
        .is_terminal());
    }
}
