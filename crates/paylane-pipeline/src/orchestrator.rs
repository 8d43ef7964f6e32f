//! The pipeline orchestrator
//!
//! Drives one run at a time through research, analyst, and writer,
//! paying each agent through the x402 cycle before its output is
//! released. Step outputs chain forward as inputs; the writer's output
//! is the report body. A local summarizer digest closes the run, with a
//! deterministic fallback when the model is unavailable so a settled
//! run always reaches its report.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use paylane_client::{CallerPolicy, PaidCaller};
use paylane_llm::{CompletionRequest, LLMProvider, Message};
use paylane_types::{
    PaylaneError, PipelineRun, ProgressEvent, Result, RunReceipt, RunReport, RunState, StepError,
    StepId, StepStatus,
};
use paylane_x402::{PaymentPayload, PaymentSigner, PriceRequirement};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::publisher::ProgressPublisher;

/// Longest fallback summary, in characters
const SUMMARY_EXCERPT_CHARS: usize = 200;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs the three-step paid workflow and publishes progress
pub struct Orchestrator {
    config: PipelineConfig,
    signer: Arc<dyn PaymentSigner>,
    policy: CallerPolicy,
    llm: Arc<dyn LLMProvider>,
}

struct StepOutcome {
    result: String,
    tx: String,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        signer: Arc<dyn PaymentSigner>,
        policy: CallerPolicy,
        llm: Arc<dyn LLMProvider>,
    ) -> Self {
        Self {
            config,
            signer,
            policy,
            llm,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one run for a task, publishing every event to `publisher`.
    ///
    /// An empty task is rejected up front, before any event is emitted.
    /// Once events flow the run always ends in exactly one terminal
    /// frame: a step failure publishes a single `error` attributed to
    /// that step and leaves earlier settlements untouched.
    pub async fn run(&self, task: &str, publisher: &ProgressPublisher) -> Result<PipelineRun> {
        let task = task.trim();
        if task.is_empty() {
            return Err(PaylaneError::EmptyTask);
        }

        let run = Arc::new(Mutex::new(PipelineRun::new(task, self.config.prices())));
        let current_step: Arc<Mutex<Option<StepId>>> = Arc::new(Mutex::new(None));
        let run_id = lock(&run).run_id.clone();

        let signer = Arc::new(TimedSigner {
            inner: self.signer.clone(),
            run: run.clone(),
            current_step: current_step.clone(),
            timeout: self.config.signing_timeout(),
        });
        let caller = PaidCaller::new(signer, self.policy.clone())
            .with_request_timeout(self.config.step_timeout());

        info!(%run_id, task, "pipeline run started");

        let mut outputs: Vec<String> = Vec::with_capacity(3);
        let mut txs: Vec<String> = Vec::with_capacity(3);

        for step in StepId::ALL {
            *lock(&current_step) = Some(step);
            {
                let mut run = lock(&run);
                run.state = RunState::Running { step };
                run.step_mut(step).status = StepStatus::Running;
            }

            let price = self.config.price(step);
            publisher.publish(ProgressEvent::StepStart {
                step,
                price: price.to_decimal(),
            });

            let input = step_input(step, task, &outputs);
            match self.execute_step(&caller, step, &input).await {
                Ok(outcome) => {
                    info!(%run_id, step = %step, tx = %outcome.tx, "step settled");
                    {
                        let mut run = lock(&run);
                        let record = run.step_mut(step);
                        record.status = StepStatus::Complete;
                        record.tx_ref = Some(outcome.tx.clone());
                    }
                    publisher.publish(ProgressEvent::StepComplete {
                        step,
                        tx: outcome.tx.clone(),
                        amount: price.to_decimal(),
                    });
                    outputs.push(outcome.result);
                    txs.push(outcome.tx);
                }
                Err(e) => {
                    let err = StepError::new(step, e);
                    warn!(%run_id, step = %step, error = %err, "pipeline run failed");
                    let mut run = lock(&run);
                    run.step_mut(step).status = StepStatus::Failed;
                    run.state = RunState::Failed { step };
                    publisher.publish(ProgressEvent::Error {
                        message: err.to_string(),
                        step: Some(step),
                    });
                    return Ok(run.clone());
                }
            }
        }

        let receipt = RunReceipt {
            total: self.config.total_price(),
            research_tx: txs[0].clone(),
            analyst_tx: txs[1].clone(),
            writer_tx: txs[2].clone(),
        };
        {
            let mut run = lock(&run);
            run.receipt = Some(receipt.clone());
            run.state = RunState::Receipted;
        }
        publisher.publish(ProgressEvent::Receipt {
            total: receipt.total.to_decimal(),
            research_tx: receipt.research_tx,
            analyst_tx: receipt.analyst_tx,
            writer_tx: receipt.writer_tx,
        });

        let markdown = outputs[2].clone();
        let summary = match self.summarize(task, &markdown).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(%run_id, error = %e, "summarizer unavailable, deriving summary locally");
                fallback_summary(&markdown)
            }
        };
        {
            let mut run = lock(&run);
            run.report = Some(RunReport {
                markdown: markdown.clone(),
                summary: summary.clone(),
            });
            run.state = RunState::Reported;
        }
        publisher.publish(ProgressEvent::Report { markdown, summary });

        let mut run = lock(&run);
        run.state = RunState::Done;
        info!(%run_id, total = %self.config.total_price(), "pipeline run complete");
        Ok(run.clone())
    }

    /// One paid agent call: POST the input, require a settled receipt
    /// alongside the result
    async fn execute_step(
        &self,
        caller: &PaidCaller,
        step: StepId,
        input: &str,
    ) -> Result<StepOutcome> {
        let url = self.config.agent_url(step);
        let body = serde_json::json!({ "input": input });
        let response = caller.post_json(url, &body).await?;

        let result = response
            .body
            .get("result")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                PaylaneError::transport(format!(
                    "agent {step} returned no result field: {}",
                    response.body
                ))
            })?
            .to_string();

        let receipt = response
            .receipt
            .ok_or_else(|| PaylaneError::SettlementFailed {
                reason: format!("agent {step} released a result without settling"),
            })?;
        if !receipt.success {
            return Err(PaylaneError::SettlementFailed {
                reason: format!("agent {step} reported an unsettled receipt"),
            });
        }

        Ok(StepOutcome {
            result,
            tx: receipt.transaction,
        })
    }

    async fn summarize(&self, task: &str, markdown: &str) -> std::result::Result<String, String> {
        let request = CompletionRequest::new(vec![Message::user(format!(
            "Summarize this report on \"{task}\" in two sentences:\n\n{markdown}"
        ))])
        .with_system("You are a concise editorial assistant.")
        .with_temperature(0.2)
        .with_max_tokens(256);

        let response = self.llm.complete(request).await.map_err(|e| e.to_string())?;
        let summary = response.content.trim().to_string();
        if summary.is_empty() {
            return Err("summarizer returned an empty completion".to_string());
        }
        Ok(summary)
    }
}

/// Input for a step: the task itself, then each step's output chained
/// into the next
fn step_input(step: StepId, task: &str, outputs: &[String]) -> String {
    match step {
        StepId::Research => task.to_string(),
        StepId::Analyst => outputs[0].clone(),
        StepId::Writer => format!(
            "Research findings:\n\n{}\n\nAnalysis:\n\n{}",
            outputs[0], outputs[1]
        ),
    }
}

/// Leading excerpt of the report body, whitespace-collapsed
fn fallback_summary(markdown: &str) -> String {
    let flat = markdown.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut summary: String = flat.chars().take(SUMMARY_EXCERPT_CHARS).collect();
    if flat.chars().count() > SUMMARY_EXCERPT_CHARS {
        summary.push_str("...");
    }
    summary
}

/// Signer wrapper that surfaces the signature wait on the step record
/// and bounds it with the configured timeout. The request timeout on the
/// caller never covers signing; this is the only clock on that wait.
struct TimedSigner {
    inner: Arc<dyn PaymentSigner>,
    run: Arc<Mutex<PipelineRun>>,
    current_step: Arc<Mutex<Option<StepId>>>,
    timeout: Duration,
}

impl TimedSigner {
    fn set_status(&self, step: Option<StepId>, status: StepStatus) {
        if let Some(step) = step {
            lock(&self.run).step_mut(step).status = status;
        }
    }
}

#[async_trait]
impl PaymentSigner for TimedSigner {
    fn address(&self) -> &str {
        self.inner.address()
    }

    async fn sign_payment(&self, requirement: &PriceRequirement) -> Result<PaymentPayload> {
        let step = *lock(&self.current_step);
        self.set_status(step, StepStatus::AwaitingSignature);

        let payload = tokio::time::timeout(self.timeout, self.inner.sign_payment(requirement))
            .await
            .map_err(|_| PaylaneError::Timeout {
                waiting_for: "payment signature".to_string(),
                elapsed_secs: self.timeout.as_secs(),
            })??;

        self.set_status(step, StepStatus::Running);
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_inputs_chain_forward() {
        let outputs = vec!["findings".to_string(), "analysis".to_string()];
        assert_eq!(step_input(StepId::Research, "rollups", &[]), "rollups");
        assert_eq!(step_input(StepId::Analyst, "rollups", &outputs), "findings");

        let writer = step_input(StepId::Writer, "rollups", &outputs);
        assert!(writer.contains("findings"));
        assert!(writer.contains("analysis"));
    }

    #[test]
    fn test_fallback_summary_truncates() {
        let short = fallback_summary("# Title\n\nbody text");
        assert_eq!(short, "# Title body text");

        let long = fallback_summary(&"word ".repeat(100));
        assert!(long.ends_with("..."));
        assert!(long.chars().count() <= SUMMARY_EXCERPT_CHARS + 3);
    }
}
