//! Demand intelligence engine
//!
//! Ingests demand signals into per-source retention windows, enriches them through
//! pluggable providers and a concurrent analysis fan-out, merges insights from
//! capability-tagged sources with confidence weighting, and periodically emits
//! demand predictions.

pub mod config;
pub mod coordination;
pub mod enrichment;
pub mod events;
pub mod ingestion;
pub mod scheduler;
pub mod signal;
pub mod trend;

pub use config::EngineConfig;
pub use coordination::{InsightCoordinator, InsightReport, RequestType};
pub use events::{Notification, NotificationBus};
pub use signal::{DemandSignal, SignalError, SignalKind};
