//! Periodic engine tasks
//!
//! Ingestion, prediction recompute, monitoring and cleanup all run on one task
//! that owns the coordinator, so mutation only ever happens between suspension
//! points of a single loop. A long fan-out delays the next tick rather than
//! overlapping with it.

use chrono::Utc;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::config::ScheduleConfig;
use crate::coordination::InsightCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub prediction: Duration,
    pub monitoring: Duration,
    pub cleanup: Duration,
}

fn minutes(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(60))
}

impl From<&ScheduleConfig> for Schedule {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            prediction: minutes(config.prediction_interval_minutes),
            monitoring: minutes(config.monitoring_interval_minutes),
            cleanup: minutes(config.cleanup_interval_minutes),
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Drive the engine until the inbound channel closes
///
/// Each message is one raw JSON signal. Signals are submitted strictly in arrival
/// order. A final prediction cycle runs once the channel is exhausted.
pub async fn run(
    coordinator: &mut InsightCoordinator,
    schedule: Schedule,
    mut inbound: mpsc::Receiver<String>,
) {
    info!(
        "Starting scheduler (prediction {:?}, monitoring {:?}, cleanup {:?})",
        schedule.prediction, schedule.monitoring, schedule.cleanup
    );

    let mut prediction_timer = ticker(schedule.prediction);
    let mut monitoring_timer = ticker(schedule.monitoring);
    let mut cleanup_timer = ticker(schedule.cleanup);

    loop {
        tokio::select! {
            received = inbound.recv() => {
                let Some(line) = received else {
                    info!("Inbound signal channel closed");
                    break;
                };
                match coordinator.submit_json(&line).await {
                    Ok(receipt) => debug!(
                        "Accepted {} from {} (window {})",
                        receipt.signal_id, receipt.source, receipt.window_size
                    ),
                    Err(e) => warn!("Signal rejected: {}", e),
                }
            }
            _ = prediction_timer.tick() => {
                coordinator.run_prediction_cycle(Utc::now());
            }
            _ = monitoring_timer.tick() => {
                coordinator.log_status();
            }
            _ = cleanup_timer.tick() => {
                coordinator.cleanup(Utc::now());
            }
        }
    }

    coordinator.run_prediction_cycle(Utc::now());
    coordinator.log_status();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::signal::{DemandSignal, SignalKind};

    fn fast_schedule() -> Schedule {
        Schedule {
            prediction: Duration::from_millis(10),
            monitoring: Duration::from_millis(10),
            cleanup: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_schedule_from_config() {
        let schedule = Schedule::from(&ScheduleConfig::default());
        assert_eq!(schedule.prediction, Duration::from_secs(15 * 60));
        assert_eq!(schedule.monitoring, Duration::from_secs(5 * 60));
        assert_eq!(schedule.cleanup, Duration::from_secs(60 * 60));
    }

    #[test]
    fn test_schedule_saturates_huge_intervals() {
        let config = ScheduleConfig {
            prediction_interval_minutes: u64::MAX,
            ..ScheduleConfig::default()
        };
        assert_eq!(Schedule::from(&config).prediction, Duration::from_secs(u64::MAX));
    }

    #[tokio::test]
    async fn test_ingests_until_channel_closes() {
        let mut coordinator = InsightCoordinator::new(EngineConfig::default());
        let (tx, rx) = mpsc::channel(16);

        let sender = tokio::spawn(async move {
            for i in 0..4 {
                let source = if i % 2 == 0 { "reddit" } else { "hn" };
                let signal = DemandSignal::new(format!("s{}", i), source, SignalKind::Implicit, 0.5);
                tx.send(serde_json::to_string(&signal).unwrap()).await.unwrap();
                tokio::time::sleep(Duration::from_millis(15)).await;
            }
            // invalid signals are rejected without stopping the loop
            tx.send(r#"{"id":"s9","source":"reddit"}"#.to_string()).await.unwrap();
        });

        run(&mut coordinator, fast_schedule(), rx).await;
        sender.await.unwrap();

        assert_eq!(coordinator.store().window("reddit").len(), 2);
        assert_eq!(coordinator.store().window("hn").len(), 2);
        assert!(coordinator.store().latest_prediction("reddit").is_some());
        assert!(coordinator.store().latest_prediction("hn").is_some());
    }
}
