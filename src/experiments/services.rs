use super::models::{self as experiments, ExperimentStatus};
use crate::alerts::models::{AlertThresholds, ThresholdMetric};
use crate::alerts::services::evaluate_thresholds;
use crate::measurements::models as measurements;
use crate::measurements::services::{
    MeasurementStats, PowerBucket, calculate_measurement_stats, power_distribution,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub const EXPORT_HEADERS: [&str; 6] = ["序号", "时间戳", "电压(V)", "电流(A)", "功率(W)", "阻值(Ω)"];
pub const REPORT_HEADERS: [&str; 7] = [
    "序号",
    "时间戳",
    "电压(V)",
    "电流(A)",
    "功率(W)",
    "阻值(Ω)",
    "温度(℃)",
];
const UNKNOWN: &str = "未知";
const NO_ANOMALIES: &str = "未检测到异常数据";
const BOM: &str = "\u{feff}";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExperimentStatistics {
    pub experiment_id: Uuid,
    pub statistics: MeasurementStats,
    pub power_distribution: Vec<PowerBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportExperimentInfo {
    pub id: Uuid,
    pub name: String,
    pub operator_name: String,
    pub device_type: String,
    pub device_address: String,
    pub status: ExperimentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExperimentReport {
    pub experiment: ReportExperimentInfo,
    pub data_point_count: usize,
    pub statistics: MeasurementStats,
    pub anomalies: Vec<String>,
    pub conclusions: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

fn readings(rows: &[measurements::Model]) -> Vec<(f64, f64)> {
    rows.iter().map(|row| (row.voltage, row.current)).collect()
}

pub fn build_statistics(
    experiment_id: Uuid,
    rows: &[measurements::Model],
) -> ExperimentStatistics {
    ExperimentStatistics {
        experiment_id,
        statistics: calculate_measurement_stats(&readings(rows)),
        power_distribution: power_distribution(rows.iter().map(|row| row.power)),
    }
}

fn anomaly_line(metric: ThresholdMetric, value: f64) -> String {
    match metric {
        ThresholdMetric::Voltage => format!("检测到高电压值: {value:.2} V"),
        ThresholdMetric::Current => format!("检测到高电流值: {value:.3} A"),
        ThresholdMetric::Power => format!("检测到高功率值: {value:.2} W"),
    }
}

fn or_unknown(value: Option<&String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .map_or_else(|| UNKNOWN.to_string(), Clone::clone)
}

pub fn build_report(
    experiment: &experiments::Model,
    rows: &[measurements::Model],
    thresholds: &AlertThresholds,
) -> ExperimentReport {
    let statistics = calculate_measurement_stats(&readings(rows));

    let mut anomalies: Vec<String> = evaluate_thresholds(Some(experiment.id), &statistics, thresholds)
        .into_iter()
        .map(|draft| anomaly_line(draft.metric, draft.actual_value))
        .collect();
    if anomalies.is_empty() {
        anomalies.push(NO_ANOMALIES.to_string());
    }

    let conclusions = vec![
        format!("实验共采集 {} 个数据点，数据完整性良好。", rows.len()),
        format!("电压平均值为 {:.2} V，在正常范围内。", statistics.voltage.avg),
        format!("功率输出稳定，平均功率为 {:.2} W。", statistics.power.avg),
        "建议继续监控设备运行状态，确保长期稳定性。".to_string(),
    ];

    ExperimentReport {
        experiment: ReportExperimentInfo {
            id: experiment.id,
            name: experiment.name.clone(),
            operator_name: or_unknown(experiment.operator_name.as_ref()),
            device_type: or_unknown(experiment.device_type.as_ref()),
            device_address: or_unknown(experiment.device_address.as_ref()),
            status: experiment.status,
            created_at: experiment.created_at,
        },
        data_point_count: rows.len(),
        statistics,
        anomalies,
        conclusions,
        generated_at: Utc::now(),
    }
}

fn optional_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn measurement_cells(row: &measurements::Model) -> Vec<String> {
    vec![
        row.sequence_number.to_string(),
        row.timestamp.to_rfc3339(),
        row.voltage.to_string(),
        row.current.to_string(),
        row.power.to_string(),
        optional_cell(row.resistance),
    ]
}

/// Data export: one header row, then one line per measurement
pub fn export_csv(rows: &[measurements::Model]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADERS)?;
    for row in rows {
        writer.write_record(measurement_cells(row))?;
    }
    finish(writer)
}

/// Report CSV: BOM, experiment header block, then the data table with temperature
pub fn report_csv(report: &ExperimentReport, rows: &[measurements::Model]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    let info = &report.experiment;
    let created_at = info.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
    writer.write_record(["实验报告"])?;
    writer.write_record([""])?;
    writer.write_record(["实验名称:", info.name.as_str()])?;
    writer.write_record(["操作员:", info.operator_name.as_str()])?;
    writer.write_record(["设备类型:", info.device_type.as_str()])?;
    writer.write_record(["设备地址:", info.device_address.as_str()])?;
    writer.write_record(["创建时间:", created_at.as_str()])?;
    writer.write_record([""])?;
    writer.write_record(REPORT_HEADERS)?;
    for row in rows {
        let mut cells = measurement_cells(row);
        cells.push(optional_cell(row.temperature));
        writer.write_record(cells)?;
    }

    Ok(format!("{BOM}{}", finish(writer)?))
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {e}"))?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn experiment() -> experiments::Model {
        experiments::Model {
            id: Uuid::new_v4(),
            name: "关断器耐压测试".to_string(),
            description: None,
            operator_id: None,
            operator_name: Some("张工".to_string()),
            device_address: Some("1".to_string()),
            device_type: None,
            status: ExperimentStatus::Active,
            created_at: Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0).unwrap(),
            last_updated: Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0).unwrap(),
            data_point_count: None,
        }
    }

    fn row(experiment_id: Uuid, sequence: i32, voltage: f64, current: f64) -> measurements::Model {
        measurements::Model {
            id: Uuid::new_v4(),
            experiment_id,
            sequence_number: sequence,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
            voltage,
            current,
            power: voltage * current,
            resistance: None,
            temperature: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_report_without_anomalies() {
        let experiment = experiment();
        let rows = vec![
            row(experiment.id, 1, 20.355, 0.11),
            row(experiment.id, 2, 20.681, 0.26),
        ];

        let report = build_report(&experiment, &rows, &AlertThresholds::default());

        assert_eq!(report.data_point_count, 2);
        assert_eq!(report.anomalies, vec![NO_ANOMALIES.to_string()]);
        assert_eq!(report.conclusions.len(), 4);
        assert!(report.conclusions[0].contains("2 个数据点"));
        assert!(report.conclusions[1].contains("20.52 V"));
        assert!(report.conclusions[2].contains("3.81 W"));
        assert_eq!(report.experiment.operator_name, "张工");
        assert_eq!(report.experiment.device_type, UNKNOWN);
    }

    #[test]
    fn test_report_lists_anomalies() {
        let experiment = experiment();
        let rows = vec![
            row(experiment.id, 1, 35.5, 0.5),
            row(experiment.id, 2, 25.0, 2.5),
        ];

        let report = build_report(&experiment, &rows, &AlertThresholds::default());

        assert_eq!(
            report.anomalies,
            vec![
                "检测到高电压值: 35.50 V".to_string(),
                "检测到高电流值: 2.500 A".to_string(),
                "检测到高功率值: 62.50 W".to_string(),
            ]
        );
    }

    #[test]
    fn test_report_for_empty_experiment_uses_zero_statistics() {
        let report = build_report(&experiment(), &[], &AlertThresholds::default());
        assert_eq!(report.data_point_count, 0);
        assert_eq!(report.statistics, MeasurementStats::default());
        assert_eq!(report.anomalies, vec![NO_ANOMALIES.to_string()]);
    }

    #[test]
    fn test_export_csv_layout() {
        let experiment = experiment();
        let mut first = row(experiment.id, 1, 20.0, 0.5);
        first.resistance = Some(40.0);
        let rows = vec![first, row(experiment.id, 2, 21.0, 0.25)];

        let csv = export_csv(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "序号,时间戳,电压(V),电流(A),功率(W),阻值(Ω)");
        assert_eq!(lines[1], "1,2025-01-15T10:00:00+00:00,20,0.5,10,40");
        assert_eq!(lines[2], "2,2025-01-15T10:00:00+00:00,21,0.25,5.25,");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_report_csv_layout() {
        let experiment = experiment();
        let mut only = row(experiment.id, 1, 20.0, 0.5);
        only.temperature = Some(36.5);
        let rows = vec![only];
        let report = build_report(&experiment, &rows, &AlertThresholds::default());

        let csv = report_csv(&report, &rows).unwrap();
        assert!(csv.starts_with('\u{feff}'));

        let lines: Vec<&str> = csv.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(lines[0], "实验报告");
        assert_eq!(lines[2], "实验名称:,关断器耐压测试");
        assert_eq!(lines[3], "操作员:,张工");
        assert_eq!(lines[4], "设备类型:,未知");
        assert_eq!(lines[5], "设备地址:,1");
        assert_eq!(lines[6], "创建时间:,2025-01-15 09:30:00");
        assert_eq!(lines[8], "序号,时间戳,电压(V),电流(A),功率(W),阻值(Ω),温度(℃)");
        assert_eq!(lines[9], "1,2025-01-15T10:00:00+00:00,20,0.5,10,,36.5");
    }
}
