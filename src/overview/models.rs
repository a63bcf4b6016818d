use crate::alerts::models as alerts;
use crate::experiments::models::Experiment;
use crate::measurements::models as measurements;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Daily aggregate snapshot across every experiment
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "overview_metrics")]
#[schema(as = OverviewMetrics)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub metric_date: NaiveDate,
    pub total_experiments: i64,
    pub total_data_points: i64,
    pub min_voltage: f64,
    pub avg_voltage: f64,
    pub max_voltage: f64,
    pub min_current: f64,
    pub avg_current: f64,
    pub max_current: f64,
    pub min_power: f64,
    pub avg_power: f64,
    pub max_power: f64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Payload of the real-time display board
#[derive(Serialize, ToSchema)]
pub struct DisplayBoard {
    pub overview: Model,
    pub recent_alerts: Vec<alerts::Model>,
    pub latest_measurements: Vec<measurements::Model>,
    pub active_experiments: Vec<Experiment>,
}
