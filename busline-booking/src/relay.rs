use std::sync::Arc;

use busline_core::{destination_for, CoreResult, Notifier};
use serde::Serialize;

use crate::manager::ReservationLedger;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Fans a bus delay out to the personal channel of every booked user.
pub struct NotificationRelay {
    ledger: Arc<ReservationLedger>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationRelay {
    pub fn new(ledger: Arc<ReservationLedger>, notifier: Arc<dyn Notifier>) -> Self {
        Self { ledger, notifier }
    }

    pub async fn notify_delay(&self, bus_id: i64, message: &str) -> CoreResult<DeliveryReport> {
        let mut report = DeliveryReport::default();
        for user_id in self.ledger.passengers_on_bus(bus_id).await? {
            let destination = destination_for(user_id);
            match self.notifier.send(&destination, message).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(user_id, %destination, "delay notification failed: {}", e);
                    report.failed += 1;
                }
            }
        }
        tracing::info!(bus_id, delivered = report.delivered, failed = report.failed, "delay relayed");
        Ok(report)
    }
}
