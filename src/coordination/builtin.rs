//! Providers shipped with the engine

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

use super::provider::{DemandProvider, ProviderCategory};
use crate::signal::DemandSignal;

/// Lowercases, trims and de-duplicates keywords and related categories
pub struct KeywordNormalizer;

fn normalize_terms(terms: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .iter()
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty() && seen.insert(term.clone()))
        .collect()
}

#[async_trait]
impl DemandProvider for KeywordNormalizer {
    fn name(&self) -> &str {
        "keyword-normalizer"
    }

    fn category(&self) -> ProviderCategory {
        ProviderCategory::Processing
    }

    fn confidence(&self) -> f64 {
        0.95
    }

    async fn process_signal(&self, mut signal: DemandSignal) -> Result<DemandSignal> {
        signal.context.keywords = normalize_terms(&signal.context.keywords);
        signal.context.related_categories = signal
            .context
            .related_categories
            .take()
            .map(|categories| normalize_terms(&categories));
        Ok(signal)
    }

    async fn validate_alignment(&self) -> bool {
        true
    }
}

/// Pulls context scores back into their documented ranges
pub struct ConfidenceCalibrator;

#[async_trait]
impl DemandProvider for ConfidenceCalibrator {
    fn name(&self) -> &str {
        "confidence-calibrator"
    }

    fn category(&self) -> ProviderCategory {
        ProviderCategory::Validation
    }

    fn confidence(&self) -> f64 {
        0.9
    }

    async fn process_signal(&self, mut signal: DemandSignal) -> Result<DemandSignal> {
        signal.confidence = signal.confidence.clamp(0.0, 1.0);
        signal.context.urgency = if signal.context.urgency.is_finite() {
            signal.context.urgency.clamp(0.0, 1.0)
        } else {
            0.0
        };
        signal.context.sentiment = signal
            .context
            .sentiment
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(-1.0, 1.0));
        Ok(signal)
    }

    async fn validate_alignment(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{SignalContext, SignalKind};

    #[tokio::test]
    async fn test_keyword_normalizer_dedups() {
        let signal = DemandSignal::new("s1", "reddit", SignalKind::Explicit, 0.5)
            .with_keywords([" CRM ", "crm", "Invoicing", ""]);
        let out = KeywordNormalizer.process_signal(signal).await.unwrap();
        assert_eq!(out.context.keywords, vec!["crm", "invoicing"]);
    }

    #[tokio::test]
    async fn test_calibrator_clamps_context() {
        let signal = DemandSignal::new("s1", "reddit", SignalKind::Explicit, 0.5).with_context(
            SignalContext {
                urgency: 3.0,
                sentiment: Some(-4.0),
                ..Default::default()
            },
        );
        let out = ConfidenceCalibrator.process_signal(signal).await.unwrap();
        assert_eq!(out.context.urgency, 1.0);
        assert_eq!(out.context.sentiment, Some(-1.0));
    }
}
