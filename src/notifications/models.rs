use crate::alerts::models::AlertSeverity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A write that dashboards should react to by re-fetching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    ExperimentCreated {
        experiment_id: Uuid,
        name: String,
    },
    RowsInserted {
        experiment_id: Uuid,
        row_count: usize,
    },
    AlertCreated {
        alert_id: Uuid,
        experiment_id: Option<Uuid>,
        alert_type: String,
        severity: AlertSeverity,
    },
    AlertResolved {
        alert_id: Uuid,
    },
    MetricsRecomputed {
        metric_date: NaiveDate,
    },
}

impl ChangeEvent {
    /// SSE event name
    pub const fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::ExperimentCreated { .. } => "experiment_created",
            ChangeEvent::RowsInserted { .. } => "rows_inserted",
            ChangeEvent::AlertCreated { .. } => "alert_created",
            ChangeEvent::AlertResolved { .. } => "alert_resolved",
            ChangeEvent::MetricsRecomputed { .. } => "metrics_recomputed",
        }
    }
}
