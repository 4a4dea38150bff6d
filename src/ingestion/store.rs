//! Signal ingestion and retention store
//!
//! Owns the per-source sliding windows and the prediction table. Callers must not
//! submit concurrently for the same source; the store takes `&mut self` so a single
//! owner serializes ingestion naturally.

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use super::prediction::{self, Prediction};
use crate::config::RetentionConfig;
use crate::coordination::provider::{DemandProvider, ProviderRegistry};
use crate::events::{Notification, NotificationBus};
use crate::signal::{DemandSignal, SignalError};
use crate::trend::{self, Correlation, Pattern, Trend};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub signal_id: String,
    pub source: String,
    pub ingestion_confidence: f64,
    pub window_size: usize,
    pub providers_applied: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub signals_removed: usize,
    pub windows_removed: usize,
    pub predictions_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAnalysis {
    pub source: String,
    pub correlations: Vec<Correlation>,
    pub trends: Vec<Trend>,
    pub patterns: Vec<Pattern>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub sources: usize,
    pub retained_signals: usize,
    pub predictions: usize,
    pub providers: usize,
}

/// `now - hours`, saturating at the earliest representable instant; negative
/// horizons count as zero
fn hours_before(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    TimeDelta::try_hours(hours.max(0))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn raw_signal_id(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|value| value.get("id")?.as_str().map(str::to_string))
        .unwrap_or_default()
}

pub struct SignalStore {
    windows: HashMap<String, Vec<DemandSignal>>,
    predictions: HashMap<(String, DateTime<Utc>), Prediction>,
    enrichers: ProviderRegistry,
    config: RetentionConfig,
    prediction_interval_minutes: u64,
    bus: NotificationBus,
}

impl SignalStore {
    pub fn new(
        config: RetentionConfig,
        prediction_interval_minutes: u64,
        provider_timeout: Duration,
        bus: NotificationBus,
    ) -> Self {
        Self {
            windows: HashMap::new(),
            predictions: HashMap::new(),
            enrichers: ProviderRegistry::new(provider_timeout, bus.clone()),
            config,
            prediction_interval_minutes,
            bus,
        }
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        hours_before(now, self.config.window_hours)
    }

    /// Add an enrichment provider; registration is additive only
    pub async fn register_provider(&mut self, provider: Arc<dyn DemandProvider>) -> bool {
        self.enrichers.register(provider).await
    }

    pub fn provider_count(&self) -> usize {
        self.enrichers.len()
    }

    pub async fn submit(&mut self, signal: DemandSignal) -> Result<SubmitReceipt, SignalError> {
        self.submit_at(signal, Utc::now()).await
    }

    pub async fn submit_json(&mut self, raw: &str) -> Result<SubmitReceipt, SignalError> {
        self.submit_json_at(raw, Utc::now()).await
    }

    /// Parse one inbound JSON signal and submit it
    ///
    /// Lines that do not parse are reported on the bus like any other rejected
    /// signal, under whatever `id` could be read from them.
    pub async fn submit_json_at(
        &mut self,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<SubmitReceipt, SignalError> {
        match DemandSignal::from_json(raw) {
            Ok(signal) => self.submit_at(signal, now).await,
            Err(e) => {
                let signal_id = raw_signal_id(raw);
                warn!("Rejected inbound signal {:?}: {}", signal_id, e);
                Err(self.reject(signal_id, e))
            }
        }
    }

    fn reject(&self, signal_id: String, error: SignalError) -> SignalError {
        self.bus.publish(Notification::SignalError {
            signal_id,
            reason: error.to_string(),
        });
        error
    }

    /// Validate, enrich through every provider, retain, and trim the window
    pub async fn submit_at(
        &mut self,
        signal: DemandSignal,
        now: DateTime<Utc>,
    ) -> Result<SubmitReceipt, SignalError> {
        if let Err(e) = signal.validate() {
            warn!("Rejected signal {:?} from {:?}: {}", signal.id, signal.source, e);
            return Err(self.reject(signal.id.clone(), e));
        }

        let source = signal.source.clone();
        let run = self.enrichers.apply_all(signal.clone()).await;
        let (enriched, providers_applied) = match run.signal.validate() {
            Ok(()) if run.signal.source == source && run.signal.id == signal.id => {
                (run.signal, run.applied)
            }
            Ok(()) => {
                warn!(
                    "Enrichers re-keyed signal {} ({} -> {}), retaining it as submitted",
                    signal.id, source, run.signal.source
                );
                (signal, Vec::new())
            }
            Err(e) => {
                warn!(
                    "Enrichers left signal {} invalid ({}), retaining it as submitted",
                    signal.id, e
                );
                (signal, Vec::new())
            }
        };
        let ingestion_confidence = enriched.ingestion_confidence();
        let signal_id = enriched.id.clone();
        let timestamp = enriched.timestamp;

        let cutoff = self.cutoff(now);
        let window = self.windows.entry(source.clone()).or_default();
        window.push(enriched);
        window.retain(|s| s.timestamp >= cutoff);
        let window_size = window.len();

        debug!(
            "Retained signal {} for {} (window {}, confidence {:.2})",
            signal_id, source, window_size, ingestion_confidence
        );
        self.bus.publish(Notification::SignalProcessed {
            source: source.clone(),
            timestamp,
            confidence: ingestion_confidence,
        });

        Ok(SubmitReceipt {
            signal_id,
            source,
            ingestion_confidence,
            window_size,
            providers_applied,
        })
    }

    pub fn window(&self, source: &str) -> &[DemandSignal] {
        self.windows.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.windows.keys().cloned().collect();
        sources.sort();
        sources
    }

    /// Recompute one prediction per non-empty window, replacing same-bucket values
    pub fn run_prediction_cycle(&mut self, now: DateTime<Utc>) -> usize {
        let mut updated = 0;

        for (source, window) in &self.windows {
            let Some(prediction) = prediction::predict(
                source,
                window,
                now,
                self.config.recent_signal_count,
                self.prediction_interval_minutes,
            ) else {
                continue;
            };

            debug!(
                "Prediction for {}: demand {:.3}, confidence {:.3}",
                source, prediction.predicted_demand, prediction.confidence
            );
            self.predictions
                .insert((source.clone(), prediction.bucket), prediction);
            updated += 1;
        }

        info!("Prediction cycle updated {} source(s)", updated);
        updated
    }

    /// Most recent prediction for a source
    pub fn latest_prediction(&self, source: &str) -> Option<&Prediction> {
        self.predictions
            .values()
            .filter(|p| p.source == source)
            .max_by_key(|p| p.bucket)
    }

    pub fn predictions(&self) -> impl Iterator<Item = &Prediction> {
        self.predictions.values()
    }

    /// Drop expired signals, emptied windows and stale predictions
    pub fn cleanup(&mut self, now: DateTime<Utc>) -> CleanupReport {
        let cutoff = self.cutoff(now);
        let mut report = CleanupReport::default();

        for window in self.windows.values_mut() {
            let before = window.len();
            window.retain(|s| s.timestamp >= cutoff);
            report.signals_removed += before - window.len();
        }

        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_empty());
        report.windows_removed = before - self.windows.len();

        let prediction_cutoff = hours_before(now, self.config.prediction_retention_hours);
        let before = self.predictions.len();
        self.predictions
            .retain(|(_, bucket), _| *bucket >= prediction_cutoff);
        report.predictions_removed = before - self.predictions.len();

        report
    }

    /// Correlation scan plus per-metric trend and pattern for one source
    pub fn analyze_source(&self, source: &str) -> Option<SourceAnalysis> {
        let window = self.windows.get(source).filter(|w| !w.is_empty())?;

        let mut metrics: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        metrics.insert(
            "confidence".to_string(),
            window.iter().map(|s| s.confidence).collect(),
        );
        metrics.insert(
            "urgency".to_string(),
            window.iter().map(|s| s.context.urgency).collect(),
        );
        metrics.insert(
            "sentiment".to_string(),
            window
                .iter()
                .map(|s| s.context.sentiment.unwrap_or(0.0))
                .collect(),
        );

        Some(SourceAnalysis {
            source: source.to_string(),
            correlations: trend::scan_correlations(&metrics),
            trends: metrics
                .iter()
                .map(|(name, values)| trend::analyze_trend(name, values))
                .collect(),
            patterns: metrics
                .iter()
                .map(|(name, values)| trend::detect_pattern(name, values))
                .collect(),
        })
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            sources: self.windows.len(),
            retained_signals: self.windows.values().map(Vec::len).sum(),
            predictions: self.predictions.len(),
            providers: self.enrichers.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{SignalContext, SignalKind};
    use chrono::TimeZone;

    fn store() -> (SignalStore, NotificationBus) {
        let bus = NotificationBus::new(64);
        let store = SignalStore::new(
            RetentionConfig::default(),
            15,
            Duration::from_secs(1),
            bus.clone(),
        );
        (store, bus)
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_window_drops_entries_older_than_a_day() {
        let (mut store, _bus) = store();
        let old = DemandSignal::new("old", "reddit", SignalKind::Implicit, 0.5)
            .with_timestamp(at(9, 0) - TimeDelta::hours(25));
        let fresh = DemandSignal::new("new", "reddit", SignalKind::Implicit, 0.5)
            .with_timestamp(at(8, 0));

        store.submit_at(old, at(9, 0) - TimeDelta::hours(2)).await.unwrap();
        assert_eq!(store.window("reddit").len(), 1);

        let receipt = store.submit_at(fresh, at(9, 0)).await.unwrap();
        assert_eq!(receipt.window_size, 1);
        assert_eq!(store.window("reddit")[0].id, "new");
    }

    #[tokio::test]
    async fn test_invalid_signal_publishes_error() {
        let (mut store, bus) = store();
        let mut rx = bus.subscribe();

        let bad = DemandSignal::new("", "reddit", SignalKind::Explicit, 0.5);
        assert_eq!(
            store.submit_at(bad, at(9, 0)).await,
            Err(SignalError::MissingField("id"))
        );
        assert_eq!(rx.recv().await.unwrap().name(), "signal_error");
        assert!(store.window("reddit").is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_json_publishes_error() {
        let (mut store, bus) = store();
        let mut rx = bus.subscribe();

        let raw = r#"{"id":"s9","source":"reddit","timestamp":"2024-05-02T09:00:00Z","confidence":0.5}"#;
        let outcome = store.submit_json_at(raw, at(9, 0)).await;
        assert!(matches!(outcome, Err(SignalError::Malformed(_))));

        match rx.recv().await.unwrap() {
            Notification::SignalError { signal_id, .. } => assert_eq!(signal_id, "s9"),
            other => panic!("unexpected notification {:?}", other),
        }
        assert!(store.sources().is_empty());

        assert!(store.submit_json_at("not json", at(9, 0)).await.is_err());
        match rx.recv().await.unwrap() {
            Notification::SignalError { signal_id, .. } => assert!(signal_id.is_empty()),
            other => panic!("unexpected notification {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_receipt_carries_ingestion_confidence() {
        let (mut store, bus) = store();
        let mut rx = bus.subscribe();

        let signal = DemandSignal::new("s1", "reddit", SignalKind::Explicit, 0.4).with_context(
            SignalContext {
                keywords: vec!["crm".to_string()],
                related_categories: Some(vec!["sales".to_string()]),
                ..Default::default()
            },
        );
        let receipt = store.submit_at(signal.with_timestamp(at(9, 0)), at(9, 0)).await.unwrap();
        assert_eq!(receipt.ingestion_confidence, 1.0);

        match rx.recv().await.unwrap() {
            Notification::SignalProcessed { source, confidence, .. } => {
                assert_eq!(source, "reddit");
                assert_eq!(confidence, 1.0);
            }
            other => panic!("unexpected notification {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_prediction_replaced_within_bucket() {
        let (mut store, _bus) = store();
        for i in 0..3 {
            let signal = DemandSignal::new(format!("s{}", i), "reddit", SignalKind::Explicit, 0.5)
                .with_timestamp(at(9, i));
            store.submit_at(signal, at(9, 5)).await.unwrap();
        }

        assert_eq!(store.run_prediction_cycle(at(9, 5)), 1);
        assert_eq!(store.run_prediction_cycle(at(9, 10)), 1);
        assert_eq!(store.predictions().count(), 1);
        assert_eq!(store.latest_prediction("reddit").unwrap().generated_at, at(9, 10));

        store.run_prediction_cycle(at(9, 20));
        assert_eq!(store.predictions().count(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_drops_stale_state() {
        let (mut store, _bus) = store();
        let signal = DemandSignal::new("s1", "hn", SignalKind::Explicit, 0.5).with_timestamp(at(1, 0));
        store.submit_at(signal, at(1, 0)).await.unwrap();
        store.run_prediction_cycle(at(1, 0));

        let report = store.cleanup(at(1, 0) + TimeDelta::hours(30));
        assert_eq!(report.signals_removed, 1);
        assert_eq!(report.windows_removed, 1);
        assert_eq!(report.predictions_removed, 1);
        assert_eq!(store.snapshot().sources, 0);
    }

    #[tokio::test]
    async fn test_oversized_horizons_saturate() {
        let config = RetentionConfig {
            window_hours: 10_000_000_000_000,
            prediction_retention_hours: i64::MAX,
            ..RetentionConfig::default()
        };
        let mut store = SignalStore::new(config, 15, Duration::from_secs(1), NotificationBus::new(8));

        let signal = DemandSignal::new("s1", "hn", SignalKind::Explicit, 0.5).with_timestamp(at(1, 0));
        let receipt = store.submit_at(signal, at(1, 0)).await.unwrap();
        assert_eq!(receipt.window_size, 1);

        store.run_prediction_cycle(at(1, 0));
        let report = store.cleanup(at(1, 0) + TimeDelta::hours(30));
        assert_eq!(report, CleanupReport::default());
    }

    #[tokio::test]
    async fn test_negative_prediction_retention_keeps_current_bucket() {
        let config = RetentionConfig {
            prediction_retention_hours: -5,
            ..RetentionConfig::default()
        };
        let mut store = SignalStore::new(config, 15, Duration::from_secs(1), NotificationBus::new(8));
        let signal = DemandSignal::new("s1", "hn", SignalKind::Explicit, 0.5).with_timestamp(at(1, 0));
        store.submit_at(signal, at(1, 0)).await.unwrap();
        store.run_prediction_cycle(at(1, 0));

        assert_eq!(store.cleanup(at(1, 0)).predictions_removed, 0);
    }

    #[tokio::test]
    async fn test_analyze_source_reports_metrics() {
        let (mut store, _bus) = store();
        for i in 0..6 {
            let confidence = 0.4 + 0.1 * i as f64;
            let signal = DemandSignal::new(format!("s{}", i), "reddit", SignalKind::Explicit, confidence)
                .with_timestamp(at(9, i))
                .with_context(SignalContext {
                    urgency: confidence,
                    ..Default::default()
                });
            store.submit_at(signal, at(9, 10)).await.unwrap();
        }

        let analysis = store.analyze_source("reddit").unwrap();
        assert_eq!(analysis.trends.len(), 3);
        assert!(
            analysis
                .correlations
                .iter()
                .any(|c| c.metrics == ("confidence".to_string(), "urgency".to_string()))
        );
        assert!(store.analyze_source("unknown").is_none());
    }
}
