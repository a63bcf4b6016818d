use crate::services::processing::row_processing::NormalizedRow;
use chrono::{DateTime, Utc};
use sea_orm::{Set, entity::prelude::*};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "measurements")]
#[schema(as = Measurement)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub experiment_id: Uuid,
    /// Row order within the import that produced it
    pub sequence_number: i32,
    pub timestamp: DateTime<Utc>,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub resistance: Option<f64>,
    pub temperature: Option<f64>,
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

pub fn derived_power(voltage: f64, current: f64) -> f64 {
    voltage * current
}

impl ActiveModel {
    /// Build a row for insertion. Power is always derived from voltage and current.
    pub fn from_normalized(experiment_id: Uuid, row: &NormalizedRow) -> Self {
        Self {
            id: Set(Uuid::new_v4()),
            experiment_id: Set(experiment_id),
            sequence_number: Set(row.sequence_number),
            timestamp: Set(row.timestamp),
            voltage: Set(row.voltage),
            current: Set(row.current),
            power: Set(derived_power(row.voltage, row.current)),
            resistance: Set(row.resistance),
            temperature: Set(row.temperature),
            created_at: Set(Utc::now()),
        }
    }
}
