//! Demand prediction factors
//!
//! A prediction combines three confidence-weighted factors computed from one
//! source's retention window: recent strength, market trend and seasonal impact.

use chrono::{DateTime, DurationRound, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::signal::DemandSignal;
use crate::trend;

/// Confidence attached to the recent-strength factor
pub const RECENT_STRENGTH_CONFIDENCE: f64 = 0.9;

/// Confidence attached to the market-trend factor
pub const MARKET_TREND_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    RecentStrength,
    MarketTrend,
    Seasonal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionFactor {
    pub kind: FactorKind,
    pub impact: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub source: String,
    pub bucket: DateTime<Utc>,
    pub predicted_demand: f64,
    pub confidence: f64,
    pub factors: Vec<PredictionFactor>,
    pub generated_at: DateTime<Utc>,
}

/// Start of the bucket a timestamp falls into
pub fn bucket_start(timestamp: DateTime<Utc>, interval_minutes: u64) -> DateTime<Utc> {
    let minutes = i64::try_from(interval_minutes.max(1)).unwrap_or(i64::MAX);
    TimeDelta::try_minutes(minutes)
        .and_then(|interval| timestamp.duration_trunc(interval).ok())
        .unwrap_or(timestamp)
}

/// Mean confidence of the most recent `count` signals
pub fn recent_strength(window: &[DemandSignal], count: usize) -> PredictionFactor {
    let recent = &window[window.len().saturating_sub(count)..];
    let impact = if recent.is_empty() {
        0.0
    } else {
        recent.iter().map(|s| s.confidence).sum::<f64>() / recent.len() as f64
    };

    PredictionFactor {
        kind: FactorKind::RecentStrength,
        impact,
        confidence: RECENT_STRENGTH_CONFIDENCE,
    }
}

/// Arrival rate over the last hour relative to the window's average hourly rate
pub fn velocity(window: &[DemandSignal], now: DateTime<Utc>) -> f64 {
    let (Some(oldest), Some(newest)) = (
        window.iter().map(|s| s.timestamp).min(),
        window.iter().map(|s| s.timestamp).max(),
    ) else {
        return 0.0;
    };

    let hour_ago = now - TimeDelta::hours(1);
    let last_hour = window.iter().filter(|s| s.timestamp > hour_ago).count() as f64;
    let span_hours = ((newest - oldest).num_seconds() as f64 / 3600.0).max(1.0);
    let hourly_rate = window.len() as f64 / span_hours;

    last_hour / hourly_rate
}

/// Trend of the confidence series scaled by arrival velocity
pub fn market_trend(window: &[DemandSignal], now: DateTime<Utc>) -> PredictionFactor {
    let confidences: Vec<f64> = window.iter().map(|s| s.confidence).collect();

    PredictionFactor {
        kind: FactorKind::MarketTrend,
        impact: trend::trend(&confidences) * velocity(window, now),
        confidence: MARKET_TREND_CONFIDENCE,
    }
}

/// Mean confidence of signals seen at the current hour of day
///
/// Factor confidence grows with the bucket's sample size: `min(count / 10, 1)`.
pub fn seasonal_impact(window: &[DemandSignal], now: DateTime<Utc>) -> PredictionFactor {
    let mut sums = [0.0f64; 24];
    let mut counts = [0usize; 24];

    for signal in window {
        let hour = signal.timestamp.hour() as usize;
        sums[hour] += signal.confidence;
        counts[hour] += 1;
    }

    let hour = now.hour() as usize;
    let count = counts[hour];
    let impact = if count > 0 { sums[hour] / count as f64 } else { 0.0 };

    PredictionFactor {
        kind: FactorKind::Seasonal,
        impact,
        confidence: (count as f64 / 10.0).min(1.0),
    }
}

/// Confidence-weighted demand and the unweighted mean of factor confidences
pub fn combine_factors(factors: &[PredictionFactor]) -> (f64, f64) {
    if factors.is_empty() {
        return (0.0, 0.0);
    }

    let total_confidence: f64 = factors.iter().map(|f| f.confidence).sum();
    let demand = if total_confidence > 0.0 {
        factors.iter().map(|f| f.impact * f.confidence).sum::<f64>() / total_confidence
    } else {
        0.0
    };

    (demand, total_confidence / factors.len() as f64)
}

pub fn predict(
    source: &str,
    window: &[DemandSignal],
    now: DateTime<Utc>,
    recent_count: usize,
    interval_minutes: u64,
) -> Option<Prediction> {
    if window.is_empty() {
        return None;
    }

    let factors = vec![
        recent_strength(window, recent_count),
        market_trend(window, now),
        seasonal_impact(window, now),
    ];
    let (predicted_demand, confidence) = combine_factors(&factors);

    Some(Prediction {
        source: source.to_string(),
        bucket: bucket_start(now, interval_minutes),
        predicted_demand,
        confidence,
        factors,
        generated_at: now,
    })
}
