//! Demand signal data model
//!
//! A demand signal is a single observed indicator of market interest. Signals are
//! immutable once built: enrichment returns a new value instead of editing in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the interest was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Explicit, // Stated outright ("looking for a tool that...")
    Implicit, // Behavioural (searches, upvotes)
    Inferred, // Derived by an upstream model
}

impl SignalKind {
    /// Base ingestion confidence before context boosts
    pub fn base_confidence(&self) -> f64 {
        match self {
            SignalKind::Explicit => 0.8,
            SignalKind::Implicit => 0.6,
            SignalKind::Inferred => 0.9,
        }
    }
}

/// Free-form context harvested alongside the signal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalContext {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f64>, // -1.0 to +1.0
    #[serde(default)]
    pub urgency: f64, // 0.0 to 1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<String>>,
}

/// Structured requirements attached to explicit demand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalRequirements {
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandSignal {
    pub id: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub kind: SignalKind,
    pub confidence: f64,
    #[serde(default)]
    pub context: SignalContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<SignalRequirements>,
}

/// Inbound signal rejected before retention
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("signal is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("signal confidence {0} is outside [0, 1]")]
    InvalidConfidence(f64),
    #[error("malformed signal: {0}")]
    Malformed(String),
}

impl DemandSignal {
    /// Create a signal stamped with the current time
    pub fn new(id: impl Into<String>, source: impl Into<String>, kind: SignalKind, confidence: f64) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            timestamp: Utc::now(),
            kind,
            confidence,
            context: SignalContext::default(),
            requirements: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_context(mut self, context: SignalContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_requirements(mut self, requirements: SignalRequirements) -> Self {
        self.requirements = Some(requirements);
        self
    }

    /// Parse an inbound JSON signal, failing fast on missing id/timestamp/kind
    pub fn from_json(raw: &str) -> Result<Self, SignalError> {
        let signal: DemandSignal =
            serde_json::from_str(raw).map_err(|e| SignalError::Malformed(e.to_string()))?;
        signal.validate()?;
        Ok(signal)
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        if self.id.trim().is_empty() {
            return Err(SignalError::MissingField("id"));
        }
        if self.source.trim().is_empty() {
            return Err(SignalError::MissingField("source"));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(SignalError::InvalidConfidence(self.confidence));
        }
        Ok(())
    }

    /// Confidence assigned at ingestion: kind base plus context boosts, capped at 1.0
    pub fn ingestion_confidence(&self) -> f64 {
        let mut confidence = self.kind.base_confidence();

        if !self.context.keywords.is_empty() {
            confidence += 0.2;
        }
        if self
            .context
            .related_categories
            .as_ref()
            .is_some_and(|categories| !categories.is_empty())
        {
            confidence += 0.2;
        }
        if self.context.sentiment.is_some() {
            confidence += 0.1;
        }

        confidence.clamp(0.0, 1.0)
    }

    /// Text used by the lexical and model analyses
    pub fn analysis_text(&self) -> String {
        let mut parts: Vec<&str> = self.context.keywords.iter().map(String::as_str).collect();
        if let Some(requirements) = &self.requirements {
            parts.push(requirements.description.as_str());
            parts.extend(requirements.features.iter().map(String::as_str));
        }
        parts.join(" ")
    }
}
