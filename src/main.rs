use demand_intel::coordination::builtin::{ConfidenceCalibrator, KeywordNormalizer};
use demand_intel::scheduler::{self, Schedule};
use demand_intel::{EngineConfig, InsightCoordinator};

use anyhow::Result;
use log::{error, info, warn};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

#[tokio::main]
async fn main() -> Result<()> {
    // Default to info level when RUST_LOG is not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting demand intelligence engine");

    // Config file from the first argument, or the default path
    let args: Vec<String> = env::args().collect();
    let config_file = args.get(1).map(String::as_str).unwrap_or("demand-intel.json");

    info!("Loading configuration from: {}", config_file);
    let config = EngineConfig::load_from_file(config_file)?;
    let schedule = Schedule::from(&config.schedule);

    let mut coordinator = InsightCoordinator::new(config);
    coordinator.register_enricher(Arc::new(ConfidenceCalibrator)).await;
    coordinator.register_enricher(Arc::new(KeywordNormalizer)).await;
    coordinator.register_provider(Arc::new(KeywordNormalizer)).await;
    coordinator.register_provider(Arc::new(ConfidenceCalibrator)).await;

    // Forward notifications to the log
    let mut notifications = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => match serde_json::to_string(&notification) {
                    Ok(json) => info!("event {}", json),
                    Err(e) => warn!("Failed to serialize {}: {}", notification.name(), e),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Notification log lagged, skipped {} event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Newline-delimited JSON signals on stdin
    let (tx, rx) = mpsc::channel::<String>(1000);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    scheduler::run(&mut coordinator, schedule, rx).await;

    for source in coordinator.store().sources() {
        if let Some(prediction) = coordinator.store().latest_prediction(&source) {
            println!("{}", serde_json::to_string(prediction)?);
        }
    }

    info!("Engine stopped");
    Ok(())
}
