use crate::common::auth::Role;
use crate::config::test_helpers::{setup_test_app, setup_test_app_with_config, test_config};
use crate::services::processing::row_processing::ParsePolicy;
use crate::services::processing::structure::SheetColumn;
use crate::test_helpers::{
    MultipartBody, extract_response_body, extract_response_bytes, get, import_readings,
    measurement_workbook,
};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::FixedOffset;
use rust_xlsxwriter::Workbook;
use serde_json::Value;
use std::io::Cursor;
use tower::ServiceExt;

async fn post(app: &axum::Router, body: MultipartBody) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(body.into_request("/api/imports"))
        .await
        .unwrap();
    extract_response_body(response).await
}

fn header_only_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, column) in (0u16..).zip(SheetColumn::ALL) {
        sheet.write_string(0, col, column.header()).unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

/// Two readings, the second with an unparseable timestamp
fn bad_timestamp_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in (0u16..).zip(["序号", "电流 (A)", "电压 (V)", "时间戳"]) {
        sheet.write_string(0, col, header).unwrap();
    }
    for (row, timestamp) in (1u32..).zip(["2025-01-15 10:00:00", "not a time"]) {
        sheet.write_number(row, 0, f64::from(row)).unwrap();
        sheet.write_number(row, 1, 0.5).unwrap();
        sheet.write_number(row, 2, 20.0).unwrap();
        sheet.write_string(row, 3, timestamp).unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

#[tokio::test]
async fn test_single_file_import() {
    let app = setup_test_app().await;

    let (status, report) = import_readings(&app, "关断器测试", &[(20.355, 0.11), (20.681, 0.26), (20.5, 0.2)]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "completed");
    assert_eq!(report["files_total"], 1);
    assert_eq!(report["files_succeeded"], 1);
    assert_eq!(report["rows_written"], 3);
    assert_eq!(report["summary"], "成功上传 1/1 个文件，共 3 条数据");
    assert_eq!(report["files"][0]["file_name"], "readings.xlsx");
    assert_eq!(report["files"][0]["status"], "success");
    assert_eq!(report["files"][0]["message"], "上传成功");
    assert_eq!(report["files"][0]["row_count"], 3);

    let id = report["experiment_id"].as_str().unwrap();
    let (status, experiment) = get(&app, &format!("/api/experiments/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(experiment["name"], "关断器测试");
    assert_eq!(experiment["status"], "active");
    assert_eq!(experiment["operator_name"], "未知");
    assert_eq!(experiment["device_address"], "1");
    assert_eq!(experiment["device_type"], "未知");
    assert_eq!(experiment["data_point_count"], 3);

    let (_, rows) = get(&app, &format!("/api/experiments/{id}/data")).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["sequence_number"], 1);
    // Source power column is ignored, power is derived
    assert!((rows[0]["power"].as_f64().unwrap() - 20.355 * 0.11).abs() < 1e-9);
}

#[tokio::test]
async fn test_form_fields_become_experiment_metadata() {
    let app = setup_test_app().await;

    let (status, report) = post(
        &app,
        MultipartBody::new()
            .text("experiment_name", "  耐压测试  ")
            .text("description", "第二批样品")
            .text("device_address", "7")
            .text("device_type", "SD-200")
            .text("unrelated", "ignored")
            .file("file", "batch.xlsx", &measurement_workbook(&[(20.0, 0.5)])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let id = report["experiment_id"].as_str().unwrap();
    let (_, experiment) = get(&app, &format!("/api/experiments/{id}")).await;
    assert_eq!(experiment["name"], "耐压测试");
    assert_eq!(experiment["description"], "第二批样品");
    assert_eq!(experiment["device_address"], "7");
    assert_eq!(experiment["device_type"], "SD-200");
}

#[tokio::test]
async fn test_failed_file_does_not_stop_the_others() {
    let app = setup_test_app().await;

    let (status, report) = post(
        &app,
        MultipartBody::new()
            .text("experiment_name", "mixed")
            .file("files", "first.xlsx", &measurement_workbook(&[(20.0, 0.5), (21.0, 0.5)]))
            .file("files", "notes.csv", b"a,b,c")
            .file("files", "broken.xlsx", b"not a zip archive")
            .file("files", "empty.xlsx", &header_only_workbook())
            .file("files", "last.xlsx", &measurement_workbook(&[(22.0, 0.5)])),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "completed");
    assert_eq!(report["files_total"], 5);
    assert_eq!(report["files_succeeded"], 2);
    assert_eq!(report["rows_written"], 3);
    assert_eq!(report["summary"], "成功上传 2/5 个文件，共 3 条数据");

    let files = report["files"].as_array().unwrap();
    let names: Vec<&str> = files.iter().map(|f| f["file_name"].as_str().unwrap()).collect();
    assert_eq!(names, ["first.xlsx", "notes.csv", "broken.xlsx", "empty.xlsx", "last.xlsx"]);

    assert_eq!(files[1]["status"], "error");
    assert_eq!(files[1]["message"], "unsupported file type");
    assert!(files[1].get("row_count").is_none());
    assert!(
        files[2]["message"]
            .as_str()
            .unwrap()
            .starts_with("file is empty or malformed")
    );
    assert_eq!(files[3]["message"], "file is empty or malformed");
    assert_eq!(files[4]["status"], "success");
}

#[tokio::test]
async fn test_import_with_no_usable_file_fails_but_keeps_experiment() {
    let app = setup_test_app().await;

    let (status, report) = post(
        &app,
        MultipartBody::new()
            .text("experiment_name", "nothing usable")
            .file("files", "notes.txt", b"hello"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "failed");
    assert_eq!(report["files_succeeded"], 0);
    assert_eq!(report["rows_written"], 0);
    assert_eq!(report["alerts_created"], 0);

    let id = report["experiment_id"].as_str().unwrap();
    let (status, experiment) = get(&app, &format!("/api/experiments/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(experiment["data_point_count"], 0);
}

#[tokio::test]
async fn test_missing_name_or_files_is_rejected() {
    let app = setup_test_app().await;

    let (status, body) = post(
        &app,
        MultipartBody::new()
            .text("experiment_name", "   ")
            .file("files", "a.xlsx", &measurement_workbook(&[(20.0, 0.5)])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = post(&app, MultipartBody::new().text("experiment_name", "no files")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("files"));

    // Neither request created an experiment
    let (_, experiments) = get(&app, "/api/experiments").await;
    assert!(experiments.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_lenient_policy_substitutes_bad_timestamps() {
    let app = setup_test_app().await;

    let (_, report) = post(
        &app,
        MultipartBody::new()
            .text("experiment_name", "lenient")
            .file("files", "bad.xlsx", &bad_timestamp_workbook()),
    )
    .await;

    assert_eq!(report["files"][0]["status"], "success");
    assert_eq!(report["rows_written"], 2);
}

#[tokio::test]
async fn test_strict_policy_rejects_file_with_bad_rows() {
    let mut config = test_config();
    config.import.parse_policy = ParsePolicy::Strict;
    let (app, _db) = setup_test_app_with_config(config).await;

    let (status, report) = post(
        &app,
        MultipartBody::new()
            .text("experiment_name", "strict")
            .file("files", "bad.xlsx", &bad_timestamp_workbook())
            .file("files", "good.xlsx", &measurement_workbook(&[(20.0, 0.5)])),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["files"][0]["status"], "error");
    assert!(report["files"][0]["message"].as_str().unwrap().contains("rejected"));
    assert_eq!(report["files"][1]["status"], "success");
    assert_eq!(report["rows_written"], 1);
}

#[tokio::test]
async fn test_import_offset_applies_to_text_timestamps() {
    let mut config = test_config();
    config.import.zone_offset = FixedOffset::east_opt(8 * 3600).unwrap();
    let (app, _db) = setup_test_app_with_config(config).await;

    let (_, report) = import_readings(&app, "上海时间", &[(20.0, 0.5)]).await;

    let id = report["experiment_id"].as_str().unwrap();
    let (_, rows) = get(&app, &format!("/api/experiments/{id}/data")).await;
    // 2025-01-15 10:00:00 read at +08:00
    assert!(
        rows[0]["timestamp"]
            .as_str()
            .unwrap()
            .starts_with("2025-01-15T02:00:00"),
        "{rows}"
    );
}

#[tokio::test]
async fn test_small_batches_store_every_row() {
    let mut config = test_config();
    config.import.batch_size = 7;
    let (app, _db) = setup_test_app_with_config(config).await;
    let readings: Vec<(f64, f64)> = (0..50).map(|i| (20.0, 0.01 * f64::from(i))).collect();

    let (_, report) = import_readings(&app, "batched", &readings).await;

    assert_eq!(report["rows_written"], 50);
    let id = report["experiment_id"].as_str().unwrap();
    let (_, rows) = get(&app, &format!("/api/experiments/{id}/data")).await;
    let sequence: Vec<i64> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["sequence_number"].as_i64().unwrap())
        .collect();
    assert_eq!(sequence, (1..=50).collect::<Vec<i64>>());
}

#[tokio::test]
async fn test_oversized_batch_setting_still_imports() {
    let mut config = test_config();
    config.import.batch_size = 5000;
    let (app, _db) = setup_test_app_with_config(config).await;
    // One 3500-row insert would exceed the SQLite bind-variable limit
    let readings: Vec<(f64, f64)> = (0..3500).map(|_| (20.0, 0.5)).collect();

    let (status, report) = import_readings(&app, "large", &readings).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["files"][0]["status"], "success", "{report}");
    assert_eq!(report["rows_written"], 3500);
}

#[tokio::test]
async fn test_template_download_is_importable() {
    let app = setup_test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/imports/template")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let (status, headers, bytes) = extract_response_bytes(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers["content-type"],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    assert!(
        headers["content-disposition"]
            .to_str()
            .unwrap()
            .contains("pvsd-import-template.xlsx")
    );

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.clone())).unwrap();
    let range = workbook.worksheet_range_at(0).unwrap().unwrap();
    assert_eq!(range.get((0, 0)), Some(&Data::String("序号".to_string())));

    let (status, report) = post(
        &app,
        MultipartBody::new()
            .text("experiment_name", "from template")
            .file("files", "pvsd-import-template.xlsx", &bytes),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["rows_written"], 3);
}

#[tokio::test]
async fn test_viewer_can_fetch_template_but_not_import() {
    let mut config = test_config();
    config.local_user_role = Role::Viewer;
    let (app, _db) = setup_test_app_with_config(config).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/imports/template")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = import_readings(&app, "denied", &[(20.0, 0.5)]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
