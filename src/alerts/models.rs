use chrono::{DateTime, Utc};
use sea_orm::{Set, entity::prelude::*};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "alert_severity")]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    #[sea_orm(string_value = "low")]
    Low,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "critical")]
    Critical,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "alerts")]
#[schema(as = Alert)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub experiment_id: Option<Uuid>,
    #[sea_orm(column_type = "Text")]
    pub alert_type: String,
    pub severity: AlertSeverity,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub threshold_value: Option<f64>,
    pub actual_value: Option<f64>,
    pub is_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::experiments::models::Entity",
        from = "Column::ExperimentId",
        to = "crate::experiments::models::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Experiments,
}

impl Related<crate::experiments::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Experiments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Upper bounds that raise an alert when exceeded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AlertThresholds {
    /// Volts
    pub voltage: f64,
    /// Amperes
    pub current: f64,
    /// Watts
    pub power: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            voltage: 30.0,
            current: 2.0,
            power: 50.0,
        }
    }
}

impl AlertThresholds {
    pub fn validate(&self) -> Result<(), String> {
        for metric in ThresholdMetric::ALL {
            let value = self.get(metric);
            if !value.is_finite() || value <= 0.0 {
                return Err(format!(
                    "{} threshold must be a positive number, got {value}",
                    metric.field()
                ));
            }
        }
        Ok(())
    }

    pub const fn get(&self, metric: ThresholdMetric) -> f64 {
        match metric {
            ThresholdMetric::Voltage => self.voltage,
            ThresholdMetric::Current => self.current,
            ThresholdMetric::Power => self.power,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMetric {
    Voltage,
    Current,
    Power,
}

impl ThresholdMetric {
    pub const ALL: [ThresholdMetric; 3] = [
        ThresholdMetric::Voltage,
        ThresholdMetric::Current,
        ThresholdMetric::Power,
    ];

    pub const fn field(self) -> &'static str {
        match self {
            ThresholdMetric::Voltage => "voltage",
            ThresholdMetric::Current => "current",
            ThresholdMetric::Power => "power",
        }
    }

    pub const fn alert_type(self) -> &'static str {
        match self {
            ThresholdMetric::Voltage => "voltage_threshold",
            ThresholdMetric::Current => "current_threshold",
            ThresholdMetric::Power => "power_threshold",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ThresholdMetric::Voltage => "电压",
            ThresholdMetric::Current => "电流",
            ThresholdMetric::Power => "功率",
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            ThresholdMetric::Voltage => "V",
            ThresholdMetric::Current => "A",
            ThresholdMetric::Power => "W",
        }
    }
}

/// An alert produced by the evaluator, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub experiment_id: Option<Uuid>,
    pub metric: ThresholdMetric,
    pub severity: AlertSeverity,
    pub message: String,
    pub threshold_value: f64,
    pub actual_value: f64,
}

impl AlertDraft {
    pub fn into_active_model(self) -> ActiveModel {
        ActiveModel {
            id: Set(Uuid::new_v4()),
            experiment_id: Set(self.experiment_id),
            alert_type: Set(self.metric.alert_type().to_string()),
            severity: Set(self.severity),
            message: Set(self.message),
            threshold_value: Set(Some(self.threshold_value)),
            actual_value: Set(Some(self.actual_value)),
            is_resolved: Set(false),
            resolved_at: Set(None),
            created_at: Set(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AlertQuery {
    pub is_resolved: Option<bool>,
    pub experiment_id: Option<Uuid>,
    /// Defaults to 50, capped at 500
    pub limit: Option<u64>,
}
