use super::models::{self as measurements, derived_power};
use crate::alerts::models::ThresholdMetric;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// min/max/avg of `values`; all zero for an empty slice
pub fn calculate_stats(values: &[f64]) -> Stats {
    if values.is_empty() {
        return Stats::default();
    }

    let (min, max, sum) = values.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, 0.0),
        |(min, max, sum), &value| (min.min(value), max.max(value), sum + value),
    );

    #[allow(clippy::cast_precision_loss)]
    let avg = sum / values.len() as f64;
    Stats { min, max, avg }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct MeasurementStats {
    pub count: usize,
    pub voltage: Stats,
    pub current: Stats,
    pub power: Stats,
}

impl MeasurementStats {
    pub const fn metric(&self, metric: ThresholdMetric) -> Stats {
        match metric {
            ThresholdMetric::Voltage => self.voltage,
            ThresholdMetric::Current => self.current,
            ThresholdMetric::Power => self.power,
        }
    }
}

/// Statistics triple for `(voltage, current)` readings, with power derived per reading
pub fn calculate_measurement_stats(readings: &[(f64, f64)]) -> MeasurementStats {
    let voltages: Vec<f64> = readings.iter().map(|(v, _)| *v).collect();
    let currents: Vec<f64> = readings.iter().map(|(_, c)| *c).collect();
    let powers: Vec<f64> = readings
        .iter()
        .map(|(v, c)| derived_power(*v, *c))
        .collect();

    MeasurementStats {
        count: readings.len(),
        voltage: calculate_stats(&voltages),
        current: calculate_stats(&currents),
        power: calculate_stats(&powers),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PowerBucket {
    pub range: String,
    pub count: usize,
}

const POWER_BUCKET_EDGES: [f64; 5] = [2.0, 4.0, 6.0, 8.0, 10.0];

/// Count powers into `0-2W, 2-4W, 4-6W, 6-8W, 8-10W, >10W` using half-open ranges
pub fn power_distribution(powers: impl IntoIterator<Item = f64>) -> Vec<PowerBucket> {
    let mut counts = [0usize; POWER_BUCKET_EDGES.len() + 1];
    for power in powers {
        let index = POWER_BUCKET_EDGES
            .iter()
            .position(|edge| power < *edge)
            .unwrap_or(POWER_BUCKET_EDGES.len());
        counts[index] += 1;
    }

    let mut lower = 0.0;
    let mut buckets = Vec::with_capacity(counts.len());
    for (index, count) in counts.into_iter().enumerate() {
        let range = match POWER_BUCKET_EDGES.get(index) {
            Some(upper) => {
                let label = format!("{lower}-{upper}W");
                lower = *upper;
                label
            }
            None => format!(">{lower}W"),
        };
        buckets.push(PowerBucket { range, count });
    }
    buckets
}

pub async fn rows_for_experiment<C: ConnectionTrait>(
    db: &C,
    experiment_id: Uuid,
    limit: Option<u64>,
) -> Result<Vec<measurements::Model>, DbErr> {
    let mut query = measurements::Entity::find()
        .filter(measurements::Column::ExperimentId.eq(experiment_id))
        .order_by_asc(measurements::Column::SequenceNumber)
        .order_by_asc(measurements::Column::Timestamp);
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    query.all(db).await
}

pub async fn latest_rows<C: ConnectionTrait>(
    db: &C,
    limit: u64,
) -> Result<Vec<measurements::Model>, DbErr> {
    measurements::Entity::find()
        .order_by_desc(measurements::Column::CreatedAt)
        .order_by_desc(measurements::Column::Timestamp)
        .limit(limit)
        .all(db)
        .await
}

pub async fn count_for_experiment<C: ConnectionTrait>(
    db: &C,
    experiment_id: Uuid,
) -> Result<u64, DbErr> {
    measurements::Entity::find()
        .filter(measurements::Column::ExperimentId.eq(experiment_id))
        .count(db)
        .await
}

/// Row counts for many experiments in one grouped query
pub async fn counts_for_experiments<C: ConnectionTrait>(
    db: &C,
    experiment_ids: &[Uuid],
) -> Result<HashMap<Uuid, u64>, DbErr> {
    if experiment_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Uuid, i64)> = measurements::Entity::find()
        .select_only()
        .column(measurements::Column::ExperimentId)
        .column_as(Expr::col(measurements::Column::Id).count(), "row_count")
        .filter(measurements::Column::ExperimentId.is_in(experiment_ids.iter().copied()))
        .group_by(measurements::Column::ExperimentId)
        .into_tuple()
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(id, count)| (id, u64::try_from(count).unwrap_or_default()))
        .collect())
}
