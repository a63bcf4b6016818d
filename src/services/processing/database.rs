//! Persistence seam for the import pipeline
//!
//! `ImportStore` names the writes an import performs. `DatabaseOperations`
//! is the sea-orm implementation; batches go through `insert_many` and, when
//! atomic file writes are enabled, inside a single transaction per file.

use crate::{
    alerts::{models as alerts, models::AlertDraft, services::create_alerts},
    experiments::models::{self as experiments, ExperimentStatus},
    measurements::models as measurements,
    overview::{models as overview, services::recompute_overview},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Set,
    TransactionTrait,
};
use std::fmt;
use uuid::Uuid;

use super::row_processing::NormalizedRow;

/// Metadata for the experiment an import creates
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentDraft {
    pub name: String,
    pub description: Option<String>,
    pub operator_id: Option<Uuid>,
    pub operator_name: String,
    pub device_address: String,
    pub device_type: String,
}

impl ExperimentDraft {
    pub fn into_active_model(self) -> experiments::ActiveModel {
        let now = Utc::now();
        experiments::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(self.name),
            description: Set(self.description),
            operator_id: Set(self.operator_id),
            operator_name: Set(Some(self.operator_name)),
            device_address: Set(Some(self.device_address)),
            device_type: Set(Some(self.device_type)),
            status: Set(ExperimentStatus::Active),
            created_at: Set(now),
            last_updated: Set(now),
        }
    }
}

/// A batch insert failed; earlier batches of the same file may be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWriteError {
    /// Rows that remain stored after the failure
    pub rows_written: usize,
    /// Zero-based index of the failing batch
    pub batch_index: usize,
    pub message: String,
}

impl fmt::Display for BatchWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch {} failed: {}", self.batch_index + 1, self.message)
    }
}

impl std::error::Error for BatchWriteError {}

#[async_trait]
pub trait ImportStore: Send + Sync {
    async fn create_experiment(&self, draft: ExperimentDraft) -> Result<experiments::Model, DbErr>;

    /// Write batches sequentially, returning the number of rows stored
    async fn write_batches(
        &self,
        experiment_id: Uuid,
        batches: Vec<Vec<NormalizedRow>>,
    ) -> Result<usize, BatchWriteError>;

    async fn record_alerts(&self, drafts: Vec<AlertDraft>) -> Result<Vec<alerts::Model>>;

    async fn refresh_overview(&self) -> Result<overview::Model>;
}

/// Database operations for spreadsheet imports
#[derive(Clone)]
pub struct DatabaseOperations {
    pub db: DatabaseConnection,
    /// Wrap every file's batches in one transaction
    pub atomic: bool,
}

impl DatabaseOperations {
    pub fn new(db: DatabaseConnection, atomic: bool) -> Self {
        Self { db, atomic }
    }
}

async fn insert_batches<C: ConnectionTrait>(
    conn: &C,
    experiment_id: Uuid,
    batches: &[Vec<NormalizedRow>],
) -> Result<usize, BatchWriteError> {
    let mut rows_written = 0;

    for (batch_index, batch) in batches.iter().enumerate() {
        let models = batch
            .iter()
            .map(|row| measurements::ActiveModel::from_normalized(experiment_id, row));

        measurements::Entity::insert_many(models)
            .exec_without_returning(conn)
            .await
            .map_err(|e| BatchWriteError {
                rows_written,
                batch_index,
                message: e.to_string(),
            })?;

        rows_written += batch.len();
        tracing::debug!(
            "Inserted batch {} ({} rows) for experiment {experiment_id}",
            batch_index + 1,
            batch.len()
        );
    }

    Ok(rows_written)
}

#[async_trait]
impl ImportStore for DatabaseOperations {
    async fn create_experiment(&self, draft: ExperimentDraft) -> Result<experiments::Model, DbErr> {
        draft.into_active_model().insert(&self.db).await
    }

    async fn write_batches(
        &self,
        experiment_id: Uuid,
        batches: Vec<Vec<NormalizedRow>>,
    ) -> Result<usize, BatchWriteError> {
        if !self.atomic {
            return insert_batches(&self.db, experiment_id, &batches).await;
        }

        let txn = self.db.begin().await.map_err(|e| BatchWriteError {
            rows_written: 0,
            batch_index: 0,
            message: format!("could not open transaction: {e}"),
        })?;

        match insert_batches(&txn, experiment_id, &batches).await {
            Ok(rows_written) => {
                txn.commit().await.map_err(|e| BatchWriteError {
                    rows_written: 0,
                    batch_index: batches.len().saturating_sub(1),
                    message: format!("commit failed: {e}"),
                })?;
                Ok(rows_written)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::warn!("Rollback failed for experiment {experiment_id}: {rollback_err}");
                }
                Err(BatchWriteError {
                    rows_written: 0,
                    ..err
                })
            }
        }
    }

    async fn record_alerts(&self, drafts: Vec<AlertDraft>) -> Result<Vec<alerts::Model>> {
        create_alerts(&self.db, drafts)
            .await
            .context("Failed to store threshold alerts")
    }

    async fn refresh_overview(&self) -> Result<overview::Model> {
        recompute_overview(&self.db)
            .await
            .context("Failed to recompute overview metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_helpers::setup_test_db;
    use crate::measurements::services::rows_for_experiment;
    use crate::services::processing::row_processing::partition_batches;
    use chrono::TimeZone;

    fn draft(name: &str) -> ExperimentDraft {
        ExperimentDraft {
            name: name.to_string(),
            description: None,
            operator_id: None,
            operator_name: "未知".to_string(),
            device_address: "1".to_string(),
            device_type: "未知".to_string(),
        }
    }

    fn rows(count: usize) -> Vec<NormalizedRow> {
        (1..=count)
            .map(|i| NormalizedRow {
                sequence_number: i32::try_from(i).unwrap(),
                timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
                voltage: 20.0,
                current: 0.5,
                resistance: None,
                temperature: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_create_experiment_defaults_to_active() {
        let db = setup_test_db().await;
        let store = DatabaseOperations::new(db, false);

        let experiment = store.create_experiment(draft("batch test")).await.unwrap();

        assert_eq!(experiment.status, ExperimentStatus::Active);
        assert_eq!(experiment.operator_name.as_deref(), Some("未知"));
        assert_eq!(experiment.device_address.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_write_batches_stores_every_row() {
        for atomic in [false, true] {
            let db = setup_test_db().await;
            let store = DatabaseOperations::new(db.clone(), atomic);
            let experiment = store.create_experiment(draft("rows")).await.unwrap();

            let batches = partition_batches(rows(250), 100);
            let written = store.write_batches(experiment.id, batches).await.unwrap();
            assert_eq!(written, 250);

            let stored = rows_for_experiment(&db, experiment.id, None).await.unwrap();
            assert_eq!(stored.len(), 250);
            assert_eq!(stored[0].sequence_number, 1);
            assert!((stored[0].power - 10.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_write_batches_reports_failing_batch() {
        let db = setup_test_db().await;
        let store = DatabaseOperations::new(db, false);

        // No such experiment: the foreign key rejects the first batch
        let err = store
            .write_batches(Uuid::new_v4(), vec![rows(2)])
            .await
            .unwrap_err();

        assert_eq!(err.rows_written, 0);
        assert_eq!(err.batch_index, 0);
        assert!(err.to_string().starts_with("batch 1 failed"));
    }
}
