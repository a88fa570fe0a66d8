use chrono::{DateTime, Utc};

/// A message addressed to one rider's notification channel.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct Notification {
    pub destination: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            message: message.into(),
            sent_at: Utc::now(),
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BusDelayedEvent {
    pub bus_id: i64,
    pub delay_minutes: i64,
    pub message: String,
    pub delivered: usize,
    pub failed: usize,
    pub timestamp: i64,
}
