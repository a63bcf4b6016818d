/// Shared test helpers for driving the router
///
/// Imports are the only way measurement rows enter the system, so most
/// integration tests start by building a workbook and posting it as multipart.
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use rust_xlsxwriter::Workbook;
use serde_json::{Value, json};
use tower::ServiceExt;

const BOUNDARY: &str = "----pvsd-test-boundary";

/// Extract response body as JSON for testing
pub async fn extract_response_body(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    let body: Value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| json!({"error": "Invalid JSON response"}));
    (status, body)
}

/// Status, headers and raw body, for CSV and xlsx downloads
pub async fn extract_response_bytes(
    response: axum::response::Response,
) -> (StatusCode, HeaderMap, Vec<u8>) {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    (status, headers, bytes.to_vec())
}

pub async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    extract_response_body(app.clone().oneshot(request).await.unwrap()).await
}

pub async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, None).await
}

/// Hand-built multipart/form-data body
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn into_request(mut self, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

/// Workbook with the standard headers and one row per (voltage, current).
/// Timestamps are written as text one minute apart.
pub fn measurement_workbook(readings: &[(f64, f64)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let headers = ["序号", "电流 (A)", "电压 (V)", "功率 (W)", "时间戳"];
    for (col, header) in (0u16..).zip(headers) {
        sheet.write_string(0, col, header).unwrap();
    }
    for (row, (voltage, current)) in (1u32..).zip(readings) {
        sheet.write_number(row, 0, f64::from(row)).unwrap();
        sheet.write_number(row, 1, *current).unwrap();
        sheet.write_number(row, 2, *voltage).unwrap();
        // Source power is ignored by the importer
        sheet.write_number(row, 3, -1.0).unwrap();
        sheet
            .write_string(row, 4, format!("2025-01-15 10:{:02}:00", (row - 1) % 60))
            .unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

/// Import one workbook into a new experiment, returning the report
pub async fn import_readings(
    app: &axum::Router,
    experiment_name: &str,
    readings: &[(f64, f64)],
) -> (StatusCode, Value) {
    let request = MultipartBody::new()
        .text("experiment_name", experiment_name)
        .file("files", "readings.xlsx", &measurement_workbook(readings))
        .into_request("/api/imports");

    extract_response_body(app.clone().oneshot(request).await.unwrap()).await
}

/// Import readings and return the new experiment id
pub async fn create_experiment_with_readings(
    app: &axum::Router,
    experiment_name: &str,
    readings: &[(f64, f64)],
) -> String {
    let (status, report) = import_readings(app, experiment_name, readings).await;
    assert_eq!(status, StatusCode::OK, "Import failed: {report}");
    report["experiment_id"].as_str().unwrap().to_string()
}
