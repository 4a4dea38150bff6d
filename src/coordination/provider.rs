//! Pluggable analysis providers and the alignment-gated registry

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use super::source::RequestType;
use crate::events::{Notification, NotificationBus};
use crate::signal::DemandSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCategory {
    Processing,
    Enrichment,
    Validation,
    Research,
    Monitoring,
}

/// Provider categories that may touch a signal for a given request type
pub fn relevant_categories(request: RequestType) -> &'static [ProviderCategory] {
    match request {
        RequestType::Demand => &[ProviderCategory::Processing, ProviderCategory::Research],
        RequestType::Market => &[
            ProviderCategory::Research,
            ProviderCategory::Enrichment,
            ProviderCategory::Validation,
        ],
        RequestType::Sentiment => &[ProviderCategory::Enrichment, ProviderCategory::Processing],
        RequestType::System => &[ProviderCategory::Monitoring],
    }
}

/// Contract every analysis provider implements
///
/// Providers should hand the input back unchanged for recoverable conditions
/// rather than returning an error.
#[async_trait]
pub trait DemandProvider: Send + Sync {
    fn name(&self) -> &str;

    fn category(&self) -> ProviderCategory;

    /// Self-reported confidence in the provider's output
    fn confidence(&self) -> f64;

    async fn process_signal(&self, signal: DemandSignal) -> Result<DemandSignal>;

    /// Checked once at registration; only aligned providers are activated
    async fn validate_alignment(&self) -> bool;
}

/// Outcome of running a signal through a provider chain
#[derive(Debug, Clone)]
pub struct ProviderRun {
    pub signal: DemandSignal,
    pub applied: Vec<String>,
    pub failed: Vec<String>,
}

/// Ordered set of activated providers
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn DemandProvider>>,
    rejected: usize,
    call_timeout: Duration,
    bus: NotificationBus,
}

impl ProviderRegistry {
    pub fn new(call_timeout: Duration, bus: NotificationBus) -> Self {
        Self {
            providers: Vec::new(),
            rejected: 0,
            call_timeout,
            bus,
        }
    }

    /// Register a provider, activating it only if it reports alignment
    pub async fn register(&mut self, provider: Arc<dyn DemandProvider>) -> bool {
        let name = provider.name().to_string();

        if !provider.validate_alignment().await {
            warn!("Provider {} failed alignment check, not activated", name);
            self.rejected += 1;
            return false;
        }

        info!(
            "Provider {} activated ({:?}, confidence {:.2})",
            name,
            provider.category(),
            provider.confidence()
        );
        self.providers.push(provider);
        self.bus.publish(Notification::ProviderAligned { provider: name });
        true
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Run every provider in registration order
    pub async fn apply_all(&self, signal: DemandSignal) -> ProviderRun {
        self.apply_where(signal, |_| true).await
    }

    /// Run providers relevant to the request type in registration order
    pub async fn apply_for(&self, signal: DemandSignal, request: RequestType) -> ProviderRun {
        let categories = relevant_categories(request);
        self.apply_where(signal, |provider| categories.contains(&provider.category()))
            .await
    }

    /// Sequential chain: each provider sees the previous output, and a failing or
    /// hung provider is skipped, leaving the signal as the prior provider left it.
    async fn apply_where<F>(&self, signal: DemandSignal, include: F) -> ProviderRun
    where
        F: Fn(&dyn DemandProvider) -> bool,
    {
        let mut current = signal;
        let mut applied = Vec::new();
        let mut failed = Vec::new();

        for provider in self.providers.iter().filter(|p| include(p.as_ref())) {
            let name = provider.name().to_string();

            match timeout(self.call_timeout, provider.process_signal(current.clone())).await {
                Ok(Ok(next)) => {
                    debug!("Provider {} processed signal {}", name, next.id);
                    current = next;
                    applied.push(name);
                }
                Ok(Err(e)) => {
                    warn!("Provider {} failed on signal {}: {}", name, current.id, e);
                    failed.push(name);
                }
                Err(_) => {
                    warn!(
                        "Provider {} timed out after {:?} on signal {}",
                        name, self.call_timeout, current.id
                    );
                    failed.push(name);
                }
            }
        }

        ProviderRun {
            signal: current,
            applied,
            failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalKind;
    use anyhow::anyhow;

    struct Tagger {
        name: &'static str,
        category: ProviderCategory,
        aligned: bool,
        fail: bool,
    }

    #[async_trait]
    impl DemandProvider for Tagger {
        fn name(&self) -> &str {
            self.name
        }

        fn category(&self) -> ProviderCategory {
            self.category
        }

        fn confidence(&self) -> f64 {
            0.8
        }

        async fn process_signal(&self, mut signal: DemandSignal) -> Result<DemandSignal> {
            if self.fail {
                return Err(anyhow!("{} unavailable", self.name));
            }
            signal.context.keywords.push(self.name.to_string());
            Ok(signal)
        }

        async fn validate_alignment(&self) -> bool {
            self.aligned
        }
    }

    fn tagger(name: &'static str, category: ProviderCategory) -> Arc<dyn DemandProvider> {
        Arc::new(Tagger {
            name,
            category,
            aligned: true,
            fail: false,
        })
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(Duration::from_secs(1), NotificationBus::new(16))
    }

    #[tokio::test]
    async fn test_unaligned_provider_is_not_activated() {
        let mut registry = registry();
        let unaligned = Arc::new(Tagger {
            name: "rogue",
            category: ProviderCategory::Processing,
            aligned: false,
            fail: false,
        });

        assert!(!registry.register(unaligned).await);
        assert!(registry.register(tagger("ok", ProviderCategory::Processing)).await);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.rejected(), 1);
    }

    #[tokio::test]
    async fn test_chain_is_sequential_and_isolates_failures() {
        let mut registry = registry();
        registry.register(tagger("first", ProviderCategory::Processing)).await;
        registry
            .register(Arc::new(Tagger {
                name: "broken",
                category: ProviderCategory::Processing,
                aligned: true,
                fail: true,
            }))
            .await;
        registry.register(tagger("third", ProviderCategory::Research)).await;

        let signal = DemandSignal::new("s1", "reddit", SignalKind::Explicit, 0.5);
        let run = registry.apply_all(signal).await;

        assert_eq!(run.signal.context.keywords, vec!["first", "third"]);
        assert_eq!(run.applied, vec!["first", "third"]);
        assert_eq!(run.failed, vec!["broken"]);
    }

    #[tokio::test]
    async fn test_system_requests_only_reach_monitoring() {
        let mut registry = registry();
        registry.register(tagger("proc", ProviderCategory::Processing)).await;
        registry.register(tagger("watch", ProviderCategory::Monitoring)).await;

        let signal = DemandSignal::new("s1", "reddit", SignalKind::Explicit, 0.5);
        let run = registry.apply_for(signal, RequestType::System).await;
        assert_eq!(run.applied, vec!["watch"]);
    }
}
