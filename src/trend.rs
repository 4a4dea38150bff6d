//! Correlation, trend and seasonality estimates
//!
//! Pure, stateless functions over time series. Nothing here allocates state that
//! outlives the call, and every function is total: short or degenerate series
//! yield zero rather than an error.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Minimum absolute correlation kept by the multi-metric scan
pub const CORRELATION_THRESHOLD: f64 = 0.3;

/// Trend magnitude beyond which a series counts as moving
pub const TREND_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationDirection {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

impl TrendDirection {
    pub fn from_magnitude(magnitude: f64) -> Self {
        if magnitude > TREND_THRESHOLD {
            TrendDirection::Up
        } else if magnitude < -TREND_THRESHOLD {
            TrendDirection::Down
        } else {
            TrendDirection::Stable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub metrics: (String, String),
    pub strength: f64, // -1.0 to +1.0
    pub direction: CorrelationDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub metric: String,
    pub magnitude: f64,
    pub direction: TrendDirection,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub metric: String,
    pub seasonal_strength: f64,
}

/// Pearson correlation over the common prefix of two series
///
/// Returns 0.0 for fewer than two paired points or a constant series.
pub fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }

    let x = &x[..n];
    let y = &y[..n];
    let mean_x = x.mean();
    let mean_y = y.mean();

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;

    for (a, b) in x.iter().zip(y.iter()) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x > 0.0 && var_y > 0.0 {
        (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Correlation of the series against its index sequence
pub fn trend(values: &[f64]) -> f64 {
    let index: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    correlation(&index, values)
}

/// Strongest absolute autocorrelation over lags 2..=n/2
///
/// An approximate periodicity strength, not a spectral estimate.
pub fn seasonality(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 4 {
        return 0.0;
    }

    (2..=n / 2)
        .map(|lag| correlation(&values[..n - lag], &values[lag..]).abs())
        .fold(0.0, f64::max)
}

pub fn prediction_confidence(values: &[f64], trend: f64, seasonality: f64) -> f64 {
    let data_quality = (values.len() as f64 / 10.0).min(1.0);
    trend.abs() * 0.4 + seasonality * 0.4 + data_quality * 0.2
}

pub fn analyze_trend(metric: &str, values: &[f64]) -> Trend {
    let magnitude = trend(values);
    let seasonal = seasonality(values);

    Trend {
        metric: metric.to_string(),
        magnitude,
        direction: TrendDirection::from_magnitude(magnitude),
        confidence: prediction_confidence(values, magnitude, seasonal),
    }
}

pub fn detect_pattern(metric: &str, values: &[f64]) -> Pattern {
    Pattern {
        metric: metric.to_string(),
        seasonal_strength: seasonality(values),
    }
}

/// Correlate every unordered metric pair, keeping the meaningful ones
pub fn scan_correlations(metrics: &BTreeMap<String, Vec<f64>>) -> Vec<Correlation> {
    let names: Vec<&String> = metrics.keys().collect();
    let mut correlations = Vec::new();

    for (i, first) in names.iter().enumerate() {
        for second in names.iter().skip(i + 1) {
            let strength = correlation(&metrics[*first], &metrics[*second]);
            if strength.abs() > CORRELATION_THRESHOLD {
                correlations.push(Correlation {
                    metrics: ((*first).clone(), (*second).clone()),
                    strength,
                    direction: if strength >= 0.0 {
                        CorrelationDirection::Positive
                    } else {
                        CorrelationDirection::Negative
                    },
                });
            }
        }
    }

    correlations
}
