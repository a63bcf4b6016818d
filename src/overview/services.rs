use super::models::{self as overview, DisplayBoard};
use crate::alerts::services::recent_alerts;
use crate::common::state::AppState;
use crate::experiments::models::{self as experiments, ExperimentStatus};
use crate::measurements::{models as measurements, services::latest_rows};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
    sea_query::{Expr, Func, OnConflict, SimpleExpr},
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

pub const DISPLAY_ALERT_LIMIT: u64 = 5;
pub const DISPLAY_ROW_LIMIT: u64 = 20;

/// Aggregates over every stored measurement; `None` when there are no rows
#[derive(Debug, Default, FromQueryResult)]
struct MeasurementAggregate {
    total: i64,
    min_voltage: Option<f64>,
    avg_voltage: Option<f64>,
    max_voltage: Option<f64>,
    min_current: Option<f64>,
    avg_current: Option<f64>,
    max_current: Option<f64>,
    min_power: Option<f64>,
    avg_power: Option<f64>,
    max_power: Option<f64>,
}

fn avg(column: measurements::Column) -> SimpleExpr {
    SimpleExpr::from(Func::avg(Expr::col(column)))
}

async fn aggregate_measurements(db: &DatabaseConnection) -> Result<MeasurementAggregate, DbErr> {
    use measurements::Column;

    let aggregate = measurements::Entity::find()
        .select_only()
        .column_as(Expr::col(Column::Id).count(), "total")
        .column_as(Expr::col(Column::Voltage).min(), "min_voltage")
        .column_as(avg(Column::Voltage), "avg_voltage")
        .column_as(Expr::col(Column::Voltage).max(), "max_voltage")
        .column_as(Expr::col(Column::Current).min(), "min_current")
        .column_as(avg(Column::Current), "avg_current")
        .column_as(Expr::col(Column::Current).max(), "max_current")
        .column_as(Expr::col(Column::Power).min(), "min_power")
        .column_as(avg(Column::Power), "avg_power")
        .column_as(Expr::col(Column::Power).max(), "max_power")
        .into_model::<MeasurementAggregate>()
        .one(db)
        .await?;

    Ok(aggregate.unwrap_or_default())
}

pub async fn snapshot_for_date(
    db: &DatabaseConnection,
    metric_date: NaiveDate,
) -> Result<Option<overview::Model>, DbErr> {
    overview::Entity::find()
        .filter(overview::Column::MetricDate.eq(metric_date))
        .one(db)
        .await
}

/// Recompute today's snapshot, replacing any earlier one for the same date.
/// With no measurements every statistic is zero.
pub async fn recompute_overview(db: &DatabaseConnection) -> Result<overview::Model, DbErr> {
    let total_experiments = experiments::Entity::find().count(db).await?;
    let aggregate = aggregate_measurements(db).await?;
    let metric_date = Utc::now().date_naive();

    let snapshot = overview::ActiveModel {
        id: Set(Uuid::new_v4()),
        metric_date: Set(metric_date),
        total_experiments: Set(i64::try_from(total_experiments).unwrap_or(i64::MAX)),
        total_data_points: Set(aggregate.total),
        min_voltage: Set(aggregate.min_voltage.unwrap_or_default()),
        avg_voltage: Set(aggregate.avg_voltage.unwrap_or_default()),
        max_voltage: Set(aggregate.max_voltage.unwrap_or_default()),
        min_current: Set(aggregate.min_current.unwrap_or_default()),
        avg_current: Set(aggregate.avg_current.unwrap_or_default()),
        max_current: Set(aggregate.max_current.unwrap_or_default()),
        min_power: Set(aggregate.min_power.unwrap_or_default()),
        avg_power: Set(aggregate.avg_power.unwrap_or_default()),
        max_power: Set(aggregate.max_power.unwrap_or_default()),
        last_updated: Set(Utc::now()),
    };

    overview::Entity::insert(snapshot)
        .on_conflict(
            OnConflict::column(overview::Column::MetricDate)
                .update_columns([
                    overview::Column::TotalExperiments,
                    overview::Column::TotalDataPoints,
                    overview::Column::MinVoltage,
                    overview::Column::AvgVoltage,
                    overview::Column::MaxVoltage,
                    overview::Column::MinCurrent,
                    overview::Column::AvgCurrent,
                    overview::Column::MaxCurrent,
                    overview::Column::MinPower,
                    overview::Column::AvgPower,
                    overview::Column::MaxPower,
                    overview::Column::LastUpdated,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    tracing::debug!(
        "Overview for {metric_date}: {total_experiments} experiments, {} rows",
        aggregate.total
    );

    snapshot_for_date(db, metric_date).await?.ok_or_else(|| {
        DbErr::RecordNotFound(format!("Overview snapshot for {metric_date} not found"))
    })
}

pub async fn latest_snapshot(db: &DatabaseConnection) -> Result<Option<overview::Model>, DbErr> {
    overview::Entity::find()
        .order_by_desc(overview::Column::MetricDate)
        .one(db)
        .await
}

/// The latest snapshot, computed on demand when none exists yet
pub async fn current_snapshot(db: &DatabaseConnection) -> Result<overview::Model, DbErr> {
    match latest_snapshot(db).await? {
        Some(snapshot) => Ok(snapshot),
        None => recompute_overview(db).await,
    }
}

pub async fn display_board(db: &DatabaseConnection) -> Result<DisplayBoard, DbErr> {
    let overview = current_snapshot(db).await?;
    let recent_alerts = recent_alerts(db, DISPLAY_ALERT_LIMIT).await?;
    let latest_measurements = latest_rows(db, DISPLAY_ROW_LIMIT).await?;
    let active_experiments = experiments::Entity::find()
        .filter(experiments::Column::Status.eq(ExperimentStatus::Active))
        .order_by_desc(experiments::Column::CreatedAt)
        .all(db)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(DisplayBoard {
        overview,
        recent_alerts,
        latest_measurements,
        active_experiments,
    })
}

/// Recompute the overview every `overview_refresh_secs`; `None` when disabled
pub fn spawn_periodic_refresh(state: AppState) -> Option<JoinHandle<()>> {
    let period = state.config.overview_refresh_secs;
    if period == 0 {
        return None;
    }

    tracing::info!("Refreshing overview metrics every {period}s");
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(period));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match recompute_overview(&state.db).await {
                Ok(snapshot) => state.events.metrics_recomputed(snapshot.metric_date),
                Err(e) => tracing::warn!("Periodic overview refresh failed: {e}"),
            }
        }
    }))
}
