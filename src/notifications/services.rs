use super::models::ChangeEvent;
use crate::alerts::models as alerts;
use chrono::NaiveDate;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

/// In-process publisher for change notifications.
///
/// Publishing never blocks or fails; events sent while nobody listens are
/// dropped and subscribers that fall behind skip what they missed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ChangeEvent) {
        let kind = event.kind();
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!("Published {kind} to {receivers} subscribers"),
            Err(_) => tracing::trace!("Dropped {kind}, no subscribers"),
        }
    }

    pub fn experiment_created(&self, experiment_id: Uuid, name: &str) {
        self.publish(ChangeEvent::ExperimentCreated {
            experiment_id,
            name: name.to_string(),
        });
    }

    pub fn rows_inserted(&self, experiment_id: Uuid, row_count: usize) {
        self.publish(ChangeEvent::RowsInserted {
            experiment_id,
            row_count,
        });
    }

    pub fn alert_created(&self, alert: &alerts::Model) {
        self.publish(ChangeEvent::AlertCreated {
            alert_id: alert.id,
            experiment_id: alert.experiment_id,
            alert_type: alert.alert_type.clone(),
            severity: alert.severity,
        });
    }

    pub fn alert_resolved(&self, alert_id: Uuid) {
        self.publish(ChangeEvent::AlertResolved { alert_id });
    }

    pub fn metrics_recomputed(&self, metric_date: NaiveDate) {
        self.publish(ChangeEvent::MetricsRecomputed { metric_date });
    }
}
