//! Provider Coordination & Insight Merging
//!
//! Registries of capability-tagged sources and pluggable providers, typed relevance
//! tables, and the confidence-weighted merge behind `InsightCoordinator`.

pub mod builtin;
pub mod coordinator;
pub mod merge;
pub mod provider;
pub mod source;

pub use coordinator::{InsightCoordinator, InsightReport};
pub use merge::{Insight, MergedInsight, Restriction};
pub use provider::{DemandProvider, ProviderCategory, ProviderRegistry, ProviderRun};
pub use source::{
    AccessLevel, Capability, InsightChannel, InsightSource, IntelligenceSource, OriginClass,
    RawInsight, RequestType,
};
