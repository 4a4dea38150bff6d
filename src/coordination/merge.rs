//! Confidence transform, access-level redaction and confidence-weighted merging

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::source::{AccessLevel, IntelligenceSource, OriginClass, RawInsight};
use crate::config::CoordinationConfig;

/// Insight type carried by metadata-only sources
pub const METADATA_INSIGHT: &str = "metadata";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Restriction {
    InternalOnly,
    MetadataOnly,
    AggregateOnly,
}

pub fn restrictions_for(level: AccessLevel) -> &'static [Restriction] {
    match level {
        AccessLevel::Public => &[],
        AccessLevel::Private => &[Restriction::InternalOnly],
        AccessLevel::Restricted => &[Restriction::MetadataOnly, Restriction::AggregateOnly],
    }
}

/// A processed, confidence-scored result attributable to one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub source_id: String,
    pub insight_type: String,
    pub value: f64,
    pub confidence: f64,
    pub restrictions: Vec<Restriction>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedInsight {
    pub insight_type: String,
    pub value: f64,
    pub confidence: f64,
    pub sources: Vec<String>,
    pub restrictions: BTreeSet<Restriction>,
}

pub fn source_reliability(origin: OriginClass, config: &CoordinationConfig) -> f64 {
    match origin {
        OriginClass::Internal => config.internal_reliability,
        OriginClass::External => config.external_reliability,
    }
}

fn descriptor_metadata(source: &IntelligenceSource) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("origin".to_string(), format!("{:?}", source.origin).to_lowercase());
    metadata.insert(
        "access_level".to_string(),
        format!("{:?}", source.access_level).to_lowercase(),
    );
    metadata
}

/// Apply the confidence transform and redaction to one successful fetch
pub fn transform(source: &IntelligenceSource, raw: RawInsight, config: &CoordinationConfig) -> Insight {
    let reliability = source_reliability(source.origin, config);
    let quality = if raw.data_quality.is_finite() {
        raw.data_quality.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let mut insight = Insight {
        source_id: source.id.clone(),
        insight_type: raw.insight_type,
        value: raw.value,
        confidence: (reliability + quality) / 2.0,
        restrictions: Vec::new(),
        metadata: raw.metadata,
    };
    redact(&mut insight, source.access_level);
    insight
}

/// Tag the insight with its access restrictions; restricted sources keep only
/// descriptor metadata so nothing but the aggregate value leaves the source.
pub fn redact(insight: &mut Insight, level: AccessLevel) {
    insight.restrictions = restrictions_for(level).to_vec();
    if level == AccessLevel::Restricted {
        insight.metadata.clear();
    }
}

/// The only thing a metadata-only source ever yields
pub fn metadata_stub(source: &IntelligenceSource, config: &CoordinationConfig) -> Insight {
    let mut metadata = descriptor_metadata(source);
    let capabilities: Vec<String> = source
        .capabilities
        .iter()
        .map(|c| format!("{:?}", c))
        .collect();
    metadata.insert("capabilities".to_string(), capabilities.join(","));

    Insight {
        source_id: source.id.clone(),
        insight_type: METADATA_INSIGHT.to_string(),
        value: 0.0,
        confidence: source_reliability(source.origin, config) / 2.0,
        restrictions: restrictions_for(source.access_level).to_vec(),
        metadata,
    }
}

/// Group by insight type and merge each group
///
/// Value is the confidence-weighted mean; group confidence is
/// `min(sum(confidence) / group_size, 1)`.
pub fn merge_insights(insights: Vec<Insight>) -> Vec<MergedInsight> {
    let mut groups: BTreeMap<String, Vec<Insight>> = BTreeMap::new();
    for insight in insights {
        groups.entry(insight.insight_type.clone()).or_default().push(insight);
    }

    groups
        .into_iter()
        .map(|(insight_type, group)| {
            let size = group.len() as f64;
            let total_confidence: f64 = group.iter().map(|i| i.confidence).sum();

            let value = if total_confidence > 0.0 {
                group.iter().map(|i| i.value * i.confidence).sum::<f64>() / total_confidence
            } else {
                group.iter().map(|i| i.value).sum::<f64>() / size
            };

            MergedInsight {
                insight_type,
                value,
                confidence: (total_confidence / size).min(1.0),
                sources: group.iter().map(|i| i.source_id.clone()).collect(),
                restrictions: group
                    .iter()
                    .flat_map(|i| i.restrictions.iter().copied())
                    .collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::source::Capability;

    fn insight(source: &str, value: f64, confidence: f64) -> Insight {
        Insight {
            source_id: source.to_string(),
            insight_type: "demand_score".to_string(),
            value,
            confidence,
            restrictions: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_weighted_merge() {
        let merged = merge_insights(vec![insight("a", 10.0, 0.6), insight("b", 20.0, 0.4)]);

        assert_eq!(merged.len(), 1);
        assert!((merged[0].value - 16.0).abs() < 1e-9);
        assert!((merged[0].confidence - 0.5).abs() < 1e-9);
        assert_eq!(merged[0].sources, vec!["a", "b"]);
    }

    #[test]
    fn test_group_confidence_capped() {
        let merged = merge_insights(vec![insight("a", 1.0, 1.0)]);
        assert_eq!(merged[0].confidence, 1.0);
    }

    #[test]
    fn test_groups_by_type() {
        let mut other = insight("c", 3.0, 0.5);
        other.insight_type = "trend".to_string();
        let merged = merge_insights(vec![insight("a", 1.0, 0.5), other]);
        let types: Vec<&str> = merged.iter().map(|m| m.insight_type.as_str()).collect();
        assert_eq!(types, vec!["demand_score", "trend"]);
    }

    #[test]
    fn test_transform_averages_reliability_and_quality() {
        let config = CoordinationConfig::default();
        let external = IntelligenceSource::new(
            "trends",
            OriginClass::External,
            AccessLevel::Public,
            [Capability::TrendAnalysis],
        );
        let out = transform(&external, RawInsight::new("trend", 2.0, 0.5), &config);
        assert!((out.confidence - 0.6).abs() < 1e-9);
        assert!(out.restrictions.is_empty());
    }

    #[test]
    fn test_restricted_sources_are_redacted() {
        let config = CoordinationConfig::default();
        let vault = IntelligenceSource::new(
            "vault",
            OriginClass::Internal,
            AccessLevel::Restricted,
            [Capability::DemandPrediction],
        );
        let mut raw = RawInsight::new("demand_score", 5.0, 0.9);
        raw.metadata.insert("customer".to_string(), "acme".to_string());

        let out = transform(&vault, raw, &config);
        assert_eq!(
            out.restrictions,
            vec![Restriction::MetadataOnly, Restriction::AggregateOnly]
        );
        assert!(out.metadata.is_empty());
    }

    #[test]
    fn test_private_sources_are_internal_only() {
        assert_eq!(restrictions_for(AccessLevel::Private), &[Restriction::InternalOnly]);
    }
}
