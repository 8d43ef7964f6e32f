//! Progress event publisher
//!
//! Thin sending half of an unbounded channel. The orchestrator publishes
//! without ever awaiting; whoever holds the receiving half (an SSE
//! stream, a test collector) drains at its own pace. When the receiver
//! goes away the publisher keeps accepting events and drops them on the
//! floor, so a mid-run disconnect never fails or stalls the run.

use std::sync::atomic::{AtomicBool, Ordering};

use paylane_types::ProgressEvent;
use tokio::sync::mpsc;
use tracing::debug;

/// Sender for the append-only progress sequence of a single run
pub struct ProgressPublisher {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    dropped: AtomicBool,
}

impl ProgressPublisher {
    /// Create a publisher and the receiver that drains it
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                dropped: AtomicBool::new(false),
            },
            rx,
        )
    }

    /// Publish an event. Infallible: once the receiver is gone events
    /// are silently discarded, logged once per publisher.
    pub fn publish(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() && !self.dropped.swap(true, Ordering::Relaxed) {
            debug!("progress subscriber disconnected, dropping further events");
        }
    }

    /// Whether at least one event has been dropped on a closed channel
    pub fn is_disconnected(&self) -> bool {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paylane_types::{Price, StepId};

    fn start_event() -> ProgressEvent {
        ProgressEvent::StepStart {
            step: StepId::Research,
            price: Price::from_minor(5000).to_decimal(),
        }
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (publisher, mut rx) = ProgressPublisher::channel();
        publisher.publish(start_event());
        publisher.publish(ProgressEvent::StepComplete {
            step: StepId::Research,
            tx: "0xabc".into(),
            amount: Price::from_minor(5000).to_decimal(),
        });

        assert!(matches!(
            rx.recv().await,
            Some(ProgressEvent::StepStart { .. })
        ));
        assert!(matches!(
            rx.recv().await,
            Some(ProgressEvent::StepComplete { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_after_disconnect_is_silent() {
        let (publisher, rx) = ProgressPublisher::channel();
        drop(rx);

        publisher.publish(start_event());
        publisher.publish(start_event());
        assert!(publisher.is_disconnected());
    }

    #[tokio::test]
    async fn test_connected_publisher_reports_no_drops() {
        let (publisher, _rx) = ProgressPublisher::channel();
        publisher.publish(start_event());
        assert!(!publisher.is_disconnected());
    }
}
