//! Intelligence sources and the request-type relevance table

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginClass {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Public,
    Private,
    Restricted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    DemandPrediction,
    PatternRecognition,
    TrendAnalysis,
    MarketResearch,
    CompetitorTracking,
    SentimentAnalysis,
    SystemMonitoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Demand,
    Market,
    Sentiment,
    System,
}

impl RequestType {
    pub fn all() -> [RequestType; 4] {
        [
            RequestType::Demand,
            RequestType::Market,
            RequestType::Sentiment,
            RequestType::System,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Demand => "demand",
            RequestType::Market => "market",
            RequestType::Sentiment => "sentiment",
            RequestType::System => "system",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities that make a source relevant to a request type
pub fn relevant_capabilities(request: RequestType) -> &'static [Capability] {
    match request {
        RequestType::Demand => &[
            Capability::DemandPrediction,
            Capability::PatternRecognition,
            Capability::TrendAnalysis,
        ],
        RequestType::Market => &[
            Capability::MarketResearch,
            Capability::TrendAnalysis,
            Capability::CompetitorTracking,
        ],
        RequestType::Sentiment => &[Capability::SentimentAnalysis, Capability::PatternRecognition],
        RequestType::System => &[Capability::SystemMonitoring],
    }
}

/// Descriptive record of a source; read-only once registered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceSource {
    pub id: String,
    pub origin: OriginClass,
    pub capabilities: BTreeSet<Capability>,
    pub access_level: AccessLevel,
    #[serde(default)]
    pub metadata_only: bool,
}

impl IntelligenceSource {
    pub fn new<I>(id: impl Into<String>, origin: OriginClass, access_level: AccessLevel, capabilities: I) -> Self
    where
        I: IntoIterator<Item = Capability>,
    {
        Self {
            id: id.into(),
            origin,
            capabilities: capabilities.into_iter().collect(),
            access_level,
            metadata_only: false,
        }
    }

    pub fn metadata_only(mut self) -> Self {
        self.metadata_only = true;
        self
    }

    pub fn is_relevant_to(&self, request: RequestType) -> bool {
        relevant_capabilities(request)
            .iter()
            .any(|capability| self.capabilities.contains(capability))
    }
}

/// Raw output of one source fetch, before confidence transform and redaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInsight {
    pub insight_type: String,
    pub value: f64,
    pub data_quality: f64, // 0.0 to 1.0
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RawInsight {
    pub fn new(insight_type: impl Into<String>, value: f64, data_quality: f64) -> Self {
        Self {
            insight_type: insight_type.into(),
            value,
            data_quality,
            metadata: HashMap::new(),
        }
    }
}

/// A producer of insights, addressed by the coordinator
#[async_trait]
pub trait InsightSource: Send + Sync {
    fn descriptor(&self) -> &IntelligenceSource;

    async fn fetch(&self, target_id: &str, request: RequestType) -> Result<RawInsight>;
}

/// Transient relevance link from a source to the request it served
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightChannel {
    pub source_id: String,
    pub request_type: RequestType,
    pub confidence: f64,
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_request_type_has_capabilities() {
        for request in RequestType::all() {
            assert!(!relevant_capabilities(request).is_empty(), "{} unmapped", request);
        }
    }

    #[test]
    fn test_demand_relevance() {
        let forecaster = IntelligenceSource::new(
            "forecaster",
            OriginClass::Internal,
            AccessLevel::Public,
            [Capability::PatternRecognition],
        );
        assert!(forecaster.is_relevant_to(RequestType::Demand));
        assert!(forecaster.is_relevant_to(RequestType::Sentiment));
        assert!(!forecaster.is_relevant_to(RequestType::System));
    }

    #[test]
    fn test_capabilities_deserialize_from_tags() {
        let source: IntelligenceSource = serde_json::from_str(
            r#"{"id":"trends","origin":"external","capabilities":["trend_analysis"],"access_level":"private"}"#,
        )
        .unwrap();
        assert!(!source.metadata_only);
        assert!(source.is_relevant_to(RequestType::Market));
    }
}
