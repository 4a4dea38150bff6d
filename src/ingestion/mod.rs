//! Signal Ingestion & Retention
//!
//! Per-source sliding windows of recent signals and the periodic prediction table.

pub mod prediction;
pub mod store;

pub use prediction::{FactorKind, Prediction, PredictionFactor};
pub use store::{CleanupReport, SignalStore, SourceAnalysis, StoreSnapshot, SubmitReceipt};
