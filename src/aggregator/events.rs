// Ledger event reaction: out-of-cycle refreshes scoped to what changed.

use tracing::{debug, info, warn};

use super::MetricsAggregator;
use crate::ledger::{EventKind, LedgerEvent};

impl MetricsAggregator {
    /// Drains new ledger events and reacts to each in block order. Returns how
    /// many were processed.
    pub async fn poll_events(&self) -> usize {
        let events = self.ledger.get_recent_events(None).await;
        for event in &events {
            self.process_event(event).await;
        }
        if !events.is_empty() {
            debug!(events = events.len(), "processed ledger events");
        }
        events.len()
    }

    pub async fn process_event(&self, event: &LedgerEvent) {
        info!(
            event = event.kind.abi_name(),
            block = event.block_number,
            tx = %event.transaction_hash,
            "ledger event"
        );
        match event.kind {
            EventKind::DeviceRegistered => {
                self.update_device_metrics().await;
            }
            EventKind::DeviceRented | EventKind::DeviceRentalEnded => {
                self.update_device_metrics().await;
                self.update_system_metrics().await;
            }
            EventKind::GroupCreated => {
                self.update_group_metrics().await;
                self.update_system_metrics().await;
            }
            EventKind::DeviceAddedToGroup | EventKind::DeviceRemovedFromGroup => {
                self.update_device_metrics().await;
                self.update_group_metrics().await;
            }
            EventKind::DeviceMetricsUpdated => match event.device_id() {
                Some(device_id) => {
                    self.update_single_device(device_id).await;
                }
                None => {
                    warn!(
                        event = event.kind.abi_name(),
                        operation = "process_event",
                        "event without gpuId"
                    );
                }
            },
        }
    }
}
