//! Enrichment fan-out executor
//!
//! Every task fans out to two structured model calls and the lexical heuristic,
//! joined on a single barrier. Each branch runs under its own timeout and lands in
//! its own error slot; `FailurePolicy` decides whether a failed slot sinks the task.

use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::timeout;

use super::{Analysis, EnrichedRecord, ModelClient, ModelKind, ModelRequest, aggregate, heuristics};
use crate::config::{EnrichmentConfig, FailurePolicy};
use crate::signal::DemandSignal;

#[derive(Debug, Clone)]
pub struct ProcessingTask {
    pub id: String,
    pub signal: DemandSignal,
}

impl ProcessingTask {
    pub fn new(id: impl Into<String>, signal: DemandSignal) -> Self {
        Self { id: id.into(), signal }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnrichmentError {
    #[error("{analysis} analysis failed: {reason}")]
    AnalysisFailed { analysis: String, reason: String },
    #[error("{analysis} analysis timed out after {after:?}")]
    TimedOut { analysis: String, after: Duration },
    #[error("no analysis succeeded ({})", .failures.join("; "))]
    NoAnalyses { failures: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub task_id: String,
    pub outcome: Result<EnrichedRecord, EnrichmentError>,
}

impl ProcessResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub processed: u64,
    pub errors: u64,
    pub avg_processing_ms: f64,
}

impl ExecutorStats {
    fn record(&mut self, elapsed: Duration, success: bool) {
        if success {
            self.processed += 1;
        } else {
            self.errors += 1;
        }
        let completed = (self.processed + self.errors) as f64;
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        self.avg_processing_ms += (elapsed_ms - self.avg_processing_ms) / completed;
    }
}

pub struct EnrichmentExecutor {
    sentiment_model: Arc<dyn ModelClient>,
    feature_model: Arc<dyn ModelClient>,
    config: EnrichmentConfig,
    stats: ExecutorStats,
}

impl EnrichmentExecutor {
    pub fn new(
        sentiment_model: Arc<dyn ModelClient>,
        feature_model: Arc<dyn ModelClient>,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            sentiment_model,
            feature_model,
            config,
            stats: ExecutorStats::default(),
        }
    }

    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }

    pub fn policy(&self) -> FailurePolicy {
        self.config.failure_policy
    }

    /// Run every task concurrently and wait for all of them
    pub async fn process_batch(&mut self, tasks: Vec<ProcessingTask>) -> Vec<ProcessResult> {
        let batch_size = tasks.len();
        let outcomes = join_all(tasks.into_iter().map(|task| self.run_task(task))).await;

        let mut results = Vec::with_capacity(batch_size);
        for (result, elapsed) in outcomes {
            self.stats.record(elapsed, result.is_success());
            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(
            "Enrichment batch finished: {} task(s), {} failed, avg {:.1}ms",
            batch_size, failed, self.stats.avg_processing_ms
        );
        results
    }

    pub async fn process(&mut self, task: ProcessingTask) -> ProcessResult {
        let (result, elapsed) = self.run_task(task).await;
        self.stats.record(elapsed, result.is_success());
        result
    }

    async fn run_task(&self, task: ProcessingTask) -> (ProcessResult, Duration) {
        let started = Instant::now();
        let text = task.signal.analysis_text();
        let topic_limit = self.config.top_topics;

        let (sentiment, features, lexical) = tokio::join!(
            self.call_model(&self.sentiment_model, ModelKind::Sentiment, &task, text.clone()),
            self.call_model(&self.feature_model, ModelKind::Features, &task, text.clone()),
            async { Ok::<Analysis, EnrichmentError>(heuristics::analyze(&text, topic_limit)) },
        );

        let outcome = self.resolve(&task, vec![sentiment, features, lexical]);
        if let Err(e) = &outcome {
            warn!("Enrichment task {} failed: {}", task.id, e);
        }

        (
            ProcessResult {
                task_id: task.id,
                outcome,
            },
            started.elapsed(),
        )
    }

    async fn call_model(
        &self,
        model: &Arc<dyn ModelClient>,
        kind: ModelKind,
        task: &ProcessingTask,
        text: String,
    ) -> Result<Analysis, EnrichmentError> {
        let analysis = format!("{:?}", kind).to_lowercase();
        let request = ModelRequest {
            kind,
            signal_id: task.signal.id.clone(),
            text,
        };
        let limit = self.config.branch_timeout();

        match timeout(limit, model.analyze(request)).await {
            Ok(Ok(result)) => {
                debug!("{} analysis done for task {}", analysis, task.id);
                Ok(result)
            }
            Ok(Err(e)) => Err(EnrichmentError::AnalysisFailed {
                analysis,
                reason: e.to_string(),
            }),
            Err(_) => Err(EnrichmentError::TimedOut { analysis, after: limit }),
        }
    }

    fn resolve(
        &self,
        task: &ProcessingTask,
        slots: Vec<Result<Analysis, EnrichmentError>>,
    ) -> Result<EnrichedRecord, EnrichmentError> {
        let mut analyses = Vec::new();
        let mut failures = Vec::new();

        for slot in slots {
            match slot {
                Ok(analysis) => analyses.push(analysis),
                Err(e) => {
                    if self.config.failure_policy == FailurePolicy::AllOrNothing {
                        return Err(e);
                    }
                    warn!("Task {} continuing without branch: {}", task.id, e);
                    failures.push(e.to_string());
                }
            }
        }

        if analyses.is_empty() {
            return Err(EnrichmentError::NoAnalyses { failures });
        }
        Ok(aggregate::combine(&task.signal.id, analyses))
    }
}
