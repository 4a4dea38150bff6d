use anyhow::{Result, anyhow};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Upper bound for retention horizons (ten years)
pub const MAX_HORIZON_HOURS: i64 = 24 * 365 * 10;

/// Upper bound for schedule intervals (one week)
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    #[serde(default = "default_recent_signal_count")]
    pub recent_signal_count: usize,
    #[serde(default = "default_prediction_retention_hours")]
    pub prediction_retention_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_prediction_interval_minutes")]
    pub prediction_interval_minutes: u64,
    #[serde(default = "default_monitoring_interval_minutes")]
    pub monitoring_interval_minutes: u64,
    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    #[serde(default = "default_internal_reliability")]
    pub internal_reliability: f64,
    #[serde(default = "default_external_reliability")]
    pub external_reliability: f64,
    #[serde(default = "default_branch_timeout_ms")]
    pub branch_timeout_ms: u64,
}

/// How the enrichment fan-out treats a failed analysis branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Merge whatever analyses succeeded; fail only when none did
    Isolated,
    /// Any failed analysis fails the whole task
    AllOrNothing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_branch_timeout_ms")]
    pub branch_timeout_ms: u64,
    #[serde(default = "default_failure_policy")]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_top_topics")]
    pub top_topics: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention: RetentionConfig::default(),
            schedule: ScheduleConfig::default(),
            coordination: CoordinationConfig::default(),
            enrichment: EnrichmentConfig::default(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            recent_signal_count: default_recent_signal_count(),
            prediction_retention_hours: default_prediction_retention_hours(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            prediction_interval_minutes: default_prediction_interval_minutes(),
            monitoring_interval_minutes: default_monitoring_interval_minutes(),
            cleanup_interval_minutes: default_cleanup_interval_minutes(),
        }
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            internal_reliability: default_internal_reliability(),
            external_reliability: default_external_reliability(),
            branch_timeout_ms: default_branch_timeout_ms(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            branch_timeout_ms: default_branch_timeout_ms(),
            failure_policy: default_failure_policy(),
            top_topics: default_top_topics(),
        }
    }
}

fn default_notification_capacity() -> usize {
    256
}

fn default_window_hours() -> i64 {
    24 // Signals older than a day drop out of the window
}

fn default_recent_signal_count() -> usize {
    6
}

fn default_prediction_retention_hours() -> i64 {
    24
}

fn default_prediction_interval_minutes() -> u64 {
    15
}

fn default_monitoring_interval_minutes() -> u64 {
    5
}

fn default_cleanup_interval_minutes() -> u64 {
    60
}

fn default_internal_reliability() -> f64 {
    0.9
}

fn default_external_reliability() -> f64 {
    0.7
}

fn default_branch_timeout_ms() -> u64 {
    30_000
}

fn default_failure_policy() -> FailurePolicy {
    FailurePolicy::Isolated
}

fn default_top_topics() -> usize {
    5
}

impl CoordinationConfig {
    pub fn branch_timeout(&self) -> Duration {
        Duration::from_millis(self.branch_timeout_ms)
    }
}

impl EnrichmentConfig {
    pub fn branch_timeout(&self) -> Duration {
        Duration::from_millis(self.branch_timeout_ms)
    }
}

impl EngineConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let config = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str::<EngineConfig>(&raw)?,
            Err(e) => {
                warn!("Config file {} not readable ({}), using defaults", path, e);
                EngineConfig::default()
            }
        };

        config.validate()?;
        info!(
            "Loaded config: {}h retention window, {}min prediction cycle",
            config.retention.window_hours, config.schedule.prediction_interval_minutes
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, hours) in [
            ("window_hours", self.retention.window_hours),
            ("prediction_retention_hours", self.retention.prediction_retention_hours),
        ] {
            if !(1..=MAX_HORIZON_HOURS).contains(&hours) {
                return Err(anyhow!(
                    "{} must be between 1 and {}, got: {}h",
                    name,
                    MAX_HORIZON_HOURS,
                    hours
                ));
            }
        }
        if self.retention.recent_signal_count == 0 {
            return Err(anyhow!("Recent signal count must be at least 1"));
        }
        for (name, value) in [
            ("internal_reliability", self.coordination.internal_reliability),
            ("external_reliability", self.coordination.external_reliability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be between 0.0 and 1.0, got: {}", name, value));
            }
        }
        for (name, minutes) in [
            ("prediction_interval_minutes", self.schedule.prediction_interval_minutes),
            ("monitoring_interval_minutes", self.schedule.monitoring_interval_minutes),
            ("cleanup_interval_minutes", self.schedule.cleanup_interval_minutes),
        ] {
            if !(1..=MAX_INTERVAL_MINUTES).contains(&minutes) {
                return Err(anyhow!(
                    "{} must be between 1 and {}, got: {}",
                    name,
                    MAX_INTERVAL_MINUTES,
                    minutes
                ));
            }
        }
        if self.notification_capacity == 0 {
            return Err(anyhow!("Notification capacity must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retention.window_hours, 24);
        assert_eq!(config.schedule.prediction_interval_minutes, 15);
        assert_eq!(config.coordination.internal_reliability, 0.9);
        assert_eq!(config.enrichment.failure_policy, FailurePolicy::Isolated);
        assert_eq!(config.notification_capacity, 256);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"enrichment": {{"failure_policy": "all_or_nothing"}}, "retention": {{"window_hours": 12}}}}"#
        )
        .unwrap();

        let config = EngineConfig::load_from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.retention.window_hours, 12);
        assert_eq!(config.retention.recent_signal_count, 6);
        assert_eq!(config.enrichment.failure_policy, FailurePolicy::AllOrNothing);
        assert_eq!(config.enrichment.top_topics, 5);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = EngineConfig::load_from_file("/nonexistent/demand-intel.json").unwrap();
        assert_eq!(config.coordination.external_reliability, 0.7);
    }

    #[test]
    fn test_rejects_unbounded_horizons() {
        let mut config = EngineConfig::default();
        config.retention.window_hours = 10_000_000_000_000;
        assert!(config.validate().is_err());

        for hours in [-5, 0, i64::MAX] {
            let mut config = EngineConfig::default();
            config.retention.prediction_retention_hours = hours;
            assert!(config.validate().is_err(), "{}h accepted", hours);
        }
    }

    #[test]
    fn test_rejects_oversized_intervals() {
        let mut config = EngineConfig::default();
        config.schedule.prediction_interval_minutes = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.schedule.cleanup_interval_minutes = MAX_INTERVAL_MINUTES;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_reliability() {
        let mut config = EngineConfig::default();
        config.coordination.external_reliability = 1.4;
        assert!(config.validate().is_err());
    }
}
