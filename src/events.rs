//! Publish/subscribe notifications for observability collaborators
//!
//! Backed by a bounded broadcast channel: publishers never block, and a subscriber
//! that falls behind sees `RecvError::Lagged` instead of stalling the engine.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::coordination::source::RequestType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    SourceRegistered {
        source_id: String,
    },
    ProviderAligned {
        provider: String,
    },
    SignalProcessed {
        source: String,
        timestamp: DateTime<Utc>,
        confidence: f64,
    },
    SignalError {
        signal_id: String,
        reason: String,
    },
    InsightProcessed {
        target_id: String,
        request_type: RequestType,
        groups: usize,
        sources: Vec<String>,
    },
    SignalEnriched {
        signal_id: String,
        request_type: RequestType,
        providers: Vec<String>,
    },
}

impl Notification {
    pub fn name(&self) -> &'static str {
        match self {
            Notification::SourceRegistered { .. } => "source_registered",
            Notification::ProviderAligned { .. } => "provider_aligned",
            Notification::SignalProcessed { .. } => "signal_processed",
            Notification::SignalError { .. } => "signal_error",
            Notification::InsightProcessed { .. } => "insight_processed",
            Notification::SignalEnriched { .. } => "signal_enriched",
        }
    }
}

/// Cloneable publishing handle shared by the store and the coordinator
#[derive(Debug, Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<Notification>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers; having none is not an error
    pub fn publish(&self, notification: Notification) {
        let name = notification.name();
        match self.sender.send(notification) {
            Ok(receivers) => debug!("Published {} to {} subscriber(s)", name, receivers),
            Err(_) => debug!("Published {} with no subscribers", name),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
