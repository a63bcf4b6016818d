//! Multi-file spreadsheet import
//!
//! One import creates exactly one experiment. Files are then processed one
//! after another; a file that cannot be parsed or written becomes an error
//! entry in the report and the remaining files still run. Only a failure to
//! create the experiment aborts the whole import.

use crate::{
    alerts::{models::AlertThresholds, services::evaluate_thresholds},
    common::{
        errors::{BusinessResult, DbErrorExt},
        models::ProcessingStatus,
    },
    measurements::services::calculate_measurement_stats,
    notifications::services::EventBus,
    validation_error,
};
use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    ImportSettings,
    database::{ExperimentDraft, ImportStore},
    row_processing::{NormalizedRow, ParsePolicy, normalize_rows, partition_batches},
    structure::{EMPTY_OR_MALFORMED, data_rows, parse_sheet_structure},
    utils::{is_supported_file, load_sheet},
};

pub const UNKNOWN: &str = "未知";
pub const DEFAULT_DEVICE_ADDRESS: &str = "1";
const FILE_SUCCESS_MESSAGE: &str = "上传成功";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileImportResult {
    pub file_name: String,
    pub status: FileStatus,
    pub message: String,
    /// Rows stored from this file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImportReport {
    pub experiment_id: Uuid,
    pub status: ProcessingStatus,
    pub files: Vec<FileImportResult>,
    pub files_succeeded: usize,
    pub files_total: usize,
    pub rows_written: usize,
    pub alerts_created: usize,
    pub summary: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub processing_time_ms: u128,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub experiment_name: String,
    pub description: Option<String>,
    pub device_address: Option<String>,
    pub device_type: Option<String>,
    pub operator_id: Option<Uuid>,
    /// Display name of the requesting user
    pub operator_name: Option<String>,
    pub files: Vec<UploadedFile>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ImportRequest {
    fn into_parts(self) -> BusinessResult<(ExperimentDraft, Vec<UploadedFile>)> {
        let name = self.experiment_name.trim().to_string();
        if name.is_empty() {
            return Err(validation_error!("experiment_name", "Experiment name is required"));
        }
        if self.files.is_empty() {
            return Err(validation_error!("files", "At least one file is required"));
        }

        let draft = ExperimentDraft {
            name,
            description: non_blank(self.description),
            operator_id: self.operator_id,
            operator_name: non_blank(self.operator_name).unwrap_or_else(|| UNKNOWN.to_string()),
            device_address: non_blank(self.device_address)
                .unwrap_or_else(|| DEFAULT_DEVICE_ADDRESS.to_string()),
            device_type: non_blank(self.device_type).unwrap_or_else(|| UNKNOWN.to_string()),
        };
        Ok((draft, self.files))
    }
}

/// Parse and normalize one uploaded file
pub fn parse_file(
    file: UploadedFile,
    policy: ParsePolicy,
    zone: FixedOffset,
) -> Result<Vec<NormalizedRow>> {
    if !is_supported_file(&file.file_name) {
        bail!("unsupported file type");
    }

    let rows = load_sheet(file.data).map_err(|e| anyhow!("{EMPTY_OR_MALFORMED}: {e}"))?;
    let structure = parse_sheet_structure(&rows)?;
    let data = data_rows(&rows, &structure);
    if data.is_empty() {
        bail!(EMPTY_OR_MALFORMED);
    }

    normalize_rows(&data, &structure, policy, zone)
}

pub struct ImportPipeline<S> {
    store: S,
    events: EventBus,
    settings: ImportSettings,
    thresholds: AlertThresholds,
}

impl<S: ImportStore> ImportPipeline<S> {
    pub fn new(
        store: S,
        events: EventBus,
        settings: ImportSettings,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            store,
            events,
            settings,
            thresholds,
        }
    }

    pub async fn run(&self, request: ImportRequest) -> BusinessResult<ImportReport> {
        let started_at = Utc::now();
        let start_time = std::time::Instant::now();
        let (draft, files) = request.into_parts()?;

        let experiment = self
            .store
            .create_experiment(draft)
            .await
            .map_err(|e| e.to_business_error("experiment"))?;
        self.events.experiment_created(experiment.id, &experiment.name);
        tracing::info!(
            "Importing {} files into experiment {} ({})",
            files.len(),
            experiment.name,
            experiment.id
        );

        let files_total = files.len();
        let mut results = Vec::with_capacity(files_total);
        let mut written_readings: Vec<(f64, f64)> = Vec::new();

        for file in files {
            let file_name = file.file_name.clone();
            let (result, stored) = self.import_file(experiment.id, file).await;
            if result.status == FileStatus::Error {
                tracing::warn!("Import of {file_name} failed: {}", result.message);
            }
            if !stored.is_empty() {
                self.events.rows_inserted(experiment.id, stored.len());
                written_readings.extend(stored.iter().map(|row| (row.voltage, row.current)));
            }
            results.push(result);
        }

        let files_succeeded = results
            .iter()
            .filter(|r| r.status == FileStatus::Success)
            .count();
        let rows_written = written_readings.len();
        let alerts_created = self
            .after_import(experiment.id, &written_readings)
            .await;

        let summary =
            format!("成功上传 {files_succeeded}/{files_total} 个文件，共 {rows_written} 条数据");
        tracing::info!("Import into {}: {summary}", experiment.id);

        Ok(ImportReport {
            experiment_id: experiment.id,
            status: if files_succeeded > 0 {
                ProcessingStatus::Completed
            } else {
                ProcessingStatus::Failed
            },
            files: results,
            files_succeeded,
            files_total,
            rows_written,
            alerts_created,
            summary,
            started_at,
            completed_at: Utc::now(),
            processing_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Returns the file's report entry and the rows that ended up stored
    async fn import_file(
        &self,
        experiment_id: Uuid,
        file: UploadedFile,
    ) -> (FileImportResult, Vec<NormalizedRow>) {
        let file_name = file.file_name.clone();
        let policy = self.settings.parse_policy;
        let zone = self.settings.zone_offset;

        let parsed = tokio::task::spawn_blocking(move || parse_file(file, policy, zone))
            .await
            .context("Spreadsheet parser task failed")
            .and_then(|result| result);

        let mut rows = match parsed {
            Ok(rows) => rows,
            Err(e) => return (error_result(file_name, e.to_string(), 0), Vec::new()),
        };

        let batches = partition_batches(rows.clone(), self.settings.effective_batch_size());
        tracing::debug!(
            "{file_name}: {} rows in {} batches",
            rows.len(),
            batches.len()
        );

        match self.store.write_batches(experiment_id, batches).await {
            Ok(row_count) => {
                rows.truncate(row_count);
                let result = FileImportResult {
                    file_name,
                    status: FileStatus::Success,
                    message: FILE_SUCCESS_MESSAGE.to_string(),
                    row_count: Some(row_count),
                };
                (result, rows)
            }
            Err(e) => {
                rows.truncate(e.rows_written);
                (error_result(file_name, e.to_string(), e.rows_written), rows)
            }
        }
    }

    /// Threshold evaluation and overview refresh. Failures are logged only.
    async fn after_import(&self, experiment_id: Uuid, readings: &[(f64, f64)]) -> usize {
        if readings.is_empty() {
            return 0;
        }

        let stats = calculate_measurement_stats(readings);
        let drafts = evaluate_thresholds(Some(experiment_id), &stats, &self.thresholds);
        let alerts_created = if drafts.is_empty() {
            0
        } else {
            match self.store.record_alerts(drafts).await {
                Ok(alerts) => {
                    for alert in &alerts {
                        self.events.alert_created(alert);
                    }
                    alerts.len()
                }
                Err(e) => {
                    tracing::warn!("Alert evaluation for {experiment_id} failed: {e:#}");
                    0
                }
            }
        };

        match self.store.refresh_overview().await {
            Ok(snapshot) => self.events.metrics_recomputed(snapshot.metric_date),
            Err(e) => tracing::warn!("Overview refresh after import failed: {e:#}"),
        }

        alerts_created
    }
}

fn error_result(file_name: String, message: String, rows_stored: usize) -> FileImportResult {
    FileImportResult {
        file_name,
        status: FileStatus::Error,
        message,
        row_count: (rows_stored > 0).then_some(rows_stored),
    }
}
