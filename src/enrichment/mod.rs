//! Parallel Enrichment Fan-out
//!
//! Runs a fixed set of independent analyses over each signal concurrently and
//! normalizes their heterogeneous outputs into one `EnrichedRecord`.

pub mod aggregate;
pub mod executor;
pub mod heuristics;

pub use executor::{EnrichmentError, EnrichmentExecutor, ExecutorStats, ProcessResult, ProcessingTask};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub confidence: f64,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub category: String,
    pub name: String,
    pub sentiment: f64,
    pub confidence: f64,
    pub mentions: u32,
    pub context: Vec<String>,
}

/// Output shape shared by model calls and the in-process heuristic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub sentiment: f64, // -1.0 to +1.0
    pub confidence: f64,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub relationships: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub signal_id: String,
    pub sentiment: f64,
    pub confidence: f64,
    pub topics: Vec<Topic>,
    pub features: Vec<Feature>,
    pub relationships: Vec<String>,
    pub analyses_merged: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Sentiment,
    Features,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub kind: ModelKind,
    pub signal_id: String,
    pub text: String,
}

/// Structured model endpoint; opaque to the engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn analyze(&self, request: ModelRequest) -> Result<Analysis>;
}
