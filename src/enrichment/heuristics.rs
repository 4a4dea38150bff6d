//! In-process lexical analysis run alongside the model calls

use std::collections::HashMap;

use super::{Analysis, Topic};

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "love", "amazing", "best", "easy", "helpful", "awesome",
    "perfect", "recommend", "fast", "reliable", "useful", "want",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "hate", "awful", "worst", "broken", "slow", "expensive", "difficult",
    "frustrating", "problem", "issue", "bug", "annoying", "poor",
];

/// Tokens this short carry no topical meaning
const MIN_TOPIC_TOKEN_LEN: usize = 4;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Word-list sentiment squashed into [-1, 1] with tanh, plus match count
pub fn lexical_sentiment(text: &str) -> (f64, usize) {
    let tokens = tokenize(text);
    let positive = tokens
        .iter()
        .filter(|t| POSITIVE_WORDS.contains(&t.as_str()))
        .count();
    let negative = tokens
        .iter()
        .filter(|t| NEGATIVE_WORDS.contains(&t.as_str()))
        .count();

    ((positive as f64 - negative as f64).tanh(), positive + negative)
}

/// Most frequent tokens longer than three characters
pub fn top_topics(text: &str, limit: usize) -> Vec<Topic> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total = 0usize;

    for token in tokenize(text) {
        if token.chars().count() < MIN_TOPIC_TOKEN_LEN {
            continue;
        }
        *counts.entry(token).or_insert(0) += 1;
        total += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ranked
        .into_iter()
        .take(limit)
        .map(|(name, count)| Topic {
            keywords: vec![name.clone()],
            name,
            confidence: count as f64 / total as f64,
        })
        .collect()
}

pub fn analyze(text: &str, topic_limit: usize) -> Analysis {
    let (sentiment, matched) = lexical_sentiment(text);

    Analysis {
        sentiment,
        // Lexical evidence is weak; more matched words earn a little more trust
        confidence: (0.3 + 0.1 * matched as f64).min(0.8),
        topics: top_topics(text, topic_limit),
        features: Vec::new(),
        relationships: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_is_bounded_and_signed() {
        let (positive, _) = lexical_sentiment("great tool, love it, easy and reliable");
        let (negative, _) = lexical_sentiment("slow, expensive and broken");
        let (neutral, matched) = lexical_sentiment("an invoice arrived");

        assert!(positive > 0.9 && positive <= 1.0);
        assert!(negative < -0.9 && negative >= -1.0);
        assert_eq!(neutral, 0.0);
        assert_eq!(matched, 0);
    }

    #[test]
    fn test_topics_skip_short_tokens() {
        let topics = top_topics("the crm crm crm invoice invoice automation", 5);
        let names: Vec<&str> = topics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["invoice", "automation"]);
        assert!((topics[0].confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_topics_limited() {
        let topics = top_topics("alpha bravo charlie delta echoes foxtrot golfing", 5);
        assert_eq!(topics.len(), 5);
    }

    #[test]
    fn test_analyze_confidence_grows_with_evidence() {
        assert!((analyze("plain words here", 5).confidence - 0.3).abs() < 1e-9);
        assert!((analyze("great great great great great great", 5).confidence - 0.8).abs() < 1e-9);
    }
}
