//! Insight Coordinator
//!
//! Top-level façade over source and provider registries, the retention store and
//! the enrichment executor. It is the only component other subsystems address.
//! Partial failure never raises here: failing sources drop out of the merge and
//! failing providers are skipped.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::timeout;

use super::merge::{self, Insight, MergedInsight};
use super::provider::{DemandProvider, ProviderRegistry};
use super::source::{InsightChannel, InsightSource, RequestType};
use crate::config::EngineConfig;
use crate::enrichment::{EnrichmentExecutor, ExecutorStats, ProcessResult, ProcessingTask};
use crate::events::{Notification, NotificationBus};
use crate::ingestion::{CleanupReport, SignalStore, SubmitReceipt};
use crate::signal::{DemandSignal, SignalError};

/// Merged result of one coordination call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub target_id: String,
    pub request_type: RequestType,
    pub insights: Vec<MergedInsight>,
    pub sources: Vec<String>,
    pub failed_sources: Vec<String>,
}

impl InsightReport {
    pub fn get(&self, insight_type: &str) -> Option<&MergedInsight> {
        self.insights.iter().find(|i| i.insight_type == insight_type)
    }
}

pub struct InsightCoordinator {
    sources: HashMap<String, Arc<dyn InsightSource>>,
    channels: HashMap<String, Vec<InsightChannel>>,
    providers: ProviderRegistry,
    store: SignalStore,
    executor: Option<EnrichmentExecutor>,
    config: EngineConfig,
    bus: NotificationBus,
}

impl InsightCoordinator {
    pub fn new(config: EngineConfig) -> Self {
        let bus = NotificationBus::new(config.notification_capacity);
        let provider_timeout = config.coordination.branch_timeout();
        let store = SignalStore::new(
            config.retention.clone(),
            config.schedule.prediction_interval_minutes,
            provider_timeout,
            bus.clone(),
        );

        Self {
            sources: HashMap::new(),
            channels: HashMap::new(),
            providers: ProviderRegistry::new(provider_timeout, bus.clone()),
            store,
            executor: None,
            config,
            bus,
        }
    }

    /// Attach the fan-out executor used by `enrich_batch`
    pub fn with_executor(mut self, executor: EnrichmentExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.bus.subscribe()
    }

    pub fn store(&self) -> &SignalStore {
        &self.store
    }

    pub fn register_source(&mut self, source: Arc<dyn InsightSource>) -> Result<()> {
        let id = source.descriptor().id.clone();
        if self.sources.contains_key(&id) {
            return Err(anyhow!("Source {} is already registered", id));
        }

        info!(
            "Registered source {} ({:?}, {:?}, metadata_only={})",
            id,
            source.descriptor().origin,
            source.descriptor().access_level,
            source.descriptor().metadata_only
        );
        self.sources.insert(id.clone(), source);
        self.channels.insert(id.clone(), Vec::new());
        self.bus.publish(Notification::SourceRegistered { source_id: id });
        Ok(())
    }

    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sources.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn channels(&self, source_id: &str) -> &[InsightChannel] {
        self.channels.get(source_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Register a provider for `process_signal`; activated only if aligned
    pub async fn register_provider(&mut self, provider: Arc<dyn DemandProvider>) -> bool {
        self.providers.register(provider).await
    }

    /// Register a provider that enriches every submitted signal before retention
    pub async fn register_enricher(&mut self, provider: Arc<dyn DemandProvider>) -> bool {
        self.store.register_provider(provider).await
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Fan out to every relevant source and merge what comes back
    ///
    /// Returns `None` when no source produced a usable insight.
    pub async fn coordinate_insights(
        &mut self,
        target_id: &str,
        request: RequestType,
    ) -> Option<InsightReport> {
        let mut relevant: Vec<Arc<dyn InsightSource>> = self
            .sources
            .values()
            .filter(|source| source.descriptor().is_relevant_to(request))
            .cloned()
            .collect();
        relevant.sort_by(|a, b| a.descriptor().id.cmp(&b.descriptor().id));

        if relevant.is_empty() {
            debug!("No source relevant to {} request for {}", request, target_id);
            return None;
        }

        let outcomes = join_all(
            relevant
                .iter()
                .map(|source| self.fetch_insight(source.as_ref(), target_id, request)),
        )
        .await;

        for source in &relevant {
            let descriptor = source.descriptor();
            let mut metadata = HashMap::new();
            metadata.insert("target_id".to_string(), target_id.to_string());
            metadata.insert("origin".to_string(), format!("{:?}", descriptor.origin).to_lowercase());
            metadata.insert(
                "access_level".to_string(),
                format!("{:?}", descriptor.access_level).to_lowercase(),
            );
            self.channels.insert(
                descriptor.id.clone(),
                vec![InsightChannel {
                    source_id: descriptor.id.clone(),
                    request_type: request,
                    confidence: merge::source_reliability(descriptor.origin, &self.config.coordination),
                    metadata,
                }],
            );
        }

        let mut insights = Vec::new();
        let mut failed_sources = Vec::new();
        for (source_id, outcome) in outcomes {
            match outcome {
                Ok(insight) => insights.push(insight),
                Err(reason) => {
                    warn!("Source {} excluded from {} merge: {}", source_id, request, reason);
                    failed_sources.push(source_id);
                }
            }
        }

        if insights.is_empty() {
            info!("No usable insight for {} ({})", target_id, request);
            return None;
        }

        let sources: Vec<String> = insights.iter().map(|i| i.source_id.clone()).collect();
        let merged = merge::merge_insights(insights);

        self.bus.publish(Notification::InsightProcessed {
            target_id: target_id.to_string(),
            request_type: request,
            groups: merged.len(),
            sources: sources.clone(),
        });

        Some(InsightReport {
            target_id: target_id.to_string(),
            request_type: request,
            insights: merged,
            sources,
            failed_sources,
        })
    }

    async fn fetch_insight(
        &self,
        source: &dyn InsightSource,
        target_id: &str,
        request: RequestType,
    ) -> (String, Result<Insight, String>) {
        let descriptor = source.descriptor();
        let id = descriptor.id.clone();

        // Metadata-only sources are an access boundary: never fetch their data
        if descriptor.metadata_only {
            return (id, Ok(merge::metadata_stub(descriptor, &self.config.coordination)));
        }

        let limit = self.config.coordination.branch_timeout();
        let outcome = match timeout(limit, source.fetch(target_id, request)).await {
            Ok(Ok(raw)) => Ok(merge::transform(descriptor, raw, &self.config.coordination)),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", limit)),
        };
        (id, outcome)
    }

    /// Run relevant providers sequentially over a signal
    pub async fn process_signal(&self, signal: DemandSignal, request: RequestType) -> DemandSignal {
        let run = self.providers.apply_for(signal, request).await;

        self.bus.publish(Notification::SignalEnriched {
            signal_id: run.signal.id.clone(),
            request_type: request,
            providers: run.applied,
        });
        run.signal
    }

    pub async fn submit(&mut self, signal: DemandSignal) -> Result<SubmitReceipt, SignalError> {
        self.store.submit(signal).await
    }

    pub async fn submit_at(
        &mut self,
        signal: DemandSignal,
        now: DateTime<Utc>,
    ) -> Result<SubmitReceipt, SignalError> {
        self.store.submit_at(signal, now).await
    }

    /// Submit one raw JSON signal; parse failures publish `signal_error`
    pub async fn submit_json(&mut self, raw: &str) -> Result<SubmitReceipt, SignalError> {
        self.store.submit_json(raw).await
    }

    pub async fn submit_json_at(
        &mut self,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<SubmitReceipt, SignalError> {
        self.store.submit_json_at(raw, now).await
    }

    /// Run a batch through the fan-out executor
    pub async fn enrich_batch(&mut self, tasks: Vec<ProcessingTask>) -> Result<Vec<ProcessResult>> {
        let executor = self
            .executor
            .as_mut()
            .ok_or_else(|| anyhow!("No enrichment executor configured"))?;
        Ok(executor.process_batch(tasks).await)
    }

    pub fn executor_stats(&self) -> Option<&ExecutorStats> {
        self.executor.as_ref().map(EnrichmentExecutor::stats)
    }

    pub fn run_prediction_cycle(&mut self, now: DateTime<Utc>) -> usize {
        self.store.run_prediction_cycle(now)
    }

    pub fn cleanup(&mut self, now: DateTime<Utc>) -> CleanupReport {
        let report = self.store.cleanup(now);
        info!(
            "Cleanup removed {} signal(s), {} window(s), {} prediction(s)",
            report.signals_removed, report.windows_removed, report.predictions_removed
        );
        report
    }

    /// Log a one-line health summary
    pub fn log_status(&self) {
        let snapshot = self.store.snapshot();
        info!(
            "Status: {} source window(s), {} retained signal(s), {} prediction(s), {} enricher(s), {} provider(s) ({} rejected), {} insight source(s)",
            snapshot.sources,
            snapshot.retained_signals,
            snapshot.predictions,
            snapshot.providers,
            self.providers.len(),
            self.providers.rejected(),
            self.sources.len()
        );
        if let Some(stats) = self.executor_stats() {
            info!(
                "Enrichment: {} processed, {} errors, avg {:.1}ms",
                stats.processed, stats.errors, stats.avg_processing_ms
            );
        }
    }
}
