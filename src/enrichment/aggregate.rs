//! Normalizes heterogeneous analysis outputs into one record

use std::collections::{BTreeMap, HashSet};

use super::{Analysis, EnrichedRecord, Feature, Topic};

fn push_unique(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

/// Group by name, average confidence, union keywords
pub fn aggregate_topics(topics: impl IntoIterator<Item = Topic>) -> Vec<Topic> {
    let mut groups: BTreeMap<String, (f64, usize, Vec<String>)> = BTreeMap::new();

    for topic in topics {
        let entry = groups
            .entry(topic.name.clone())
            .or_insert_with(|| (0.0, 0, Vec::new()));
        entry.0 += topic.confidence;
        entry.1 += 1;
        push_unique(&mut entry.2, &topic.keywords);
    }

    let mut merged: Vec<Topic> = groups
        .into_iter()
        .map(|(name, (confidence_sum, count, keywords))| Topic {
            name,
            confidence: confidence_sum / count as f64,
            keywords,
        })
        .collect();
    merged.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then_with(|| a.name.cmp(&b.name)));
    merged
}

/// Group by (category, name), average sentiment and confidence, sum mentions,
/// union context
pub fn aggregate_features(features: impl IntoIterator<Item = Feature>) -> Vec<Feature> {
    let mut groups: BTreeMap<(String, String), (Feature, usize)> = BTreeMap::new();

    for feature in features {
        let key = (feature.category.clone(), feature.name.clone());
        match groups.get_mut(&key) {
            Some((acc, count)) => {
                acc.sentiment += feature.sentiment;
                acc.confidence += feature.confidence;
                acc.mentions = acc.mentions.saturating_add(feature.mentions);
                push_unique(&mut acc.context, &feature.context);
                *count += 1;
            }
            None => {
                groups.insert(key, (feature, 1));
            }
        }
    }

    groups
        .into_values()
        .map(|(mut feature, count)| {
            feature.sentiment /= count as f64;
            feature.confidence /= count as f64;
            feature
        })
        .collect()
}

/// Final record: unweighted means across analyses, duplicate-free relationships
pub fn combine(signal_id: &str, analyses: Vec<Analysis>) -> EnrichedRecord {
    let count = analyses.len().max(1) as f64;
    let sentiment = analyses.iter().map(|a| a.sentiment).sum::<f64>() / count;
    let confidence = analyses.iter().map(|a| a.confidence).sum::<f64>() / count;

    let mut seen = HashSet::new();
    let mut relationships = Vec::new();
    let mut topics = Vec::new();
    let mut features = Vec::new();
    let analyses_merged = analyses.len();

    for analysis in analyses {
        for relationship in analysis.relationships {
            if seen.insert(relationship.clone()) {
                relationships.push(relationship);
            }
        }
        topics.extend(analysis.topics);
        features.extend(analysis.features);
    }

    EnrichedRecord {
        signal_id: signal_id.to_string(),
        sentiment,
        confidence,
        topics: aggregate_topics(topics),
        features: aggregate_features(features),
        relationships,
        analyses_merged,
    }
}
