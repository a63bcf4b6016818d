#!/usr/bin/env cargo
//! PVSD Database Seeder
//!
//! Generates measurement spreadsheets for simulated shutdown-device test runs
//! and uploads them through the import endpoint, so the data lands exactly as
//! an operator's upload would.
//!
//! Usage:
//!   `cargo run --bin seed_database -- --url http://localhost:3000 --token YOUR_JWT_TOKEN`
//!
//! The token may be omitted when the API runs without token authentication.

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use clap::{Arg, Command, value_parser};
use console::style;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use reqwest::{Client, RequestBuilder, multipart};
use rust_xlsxwriter::Workbook;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Duration;

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const MAX_CONCURRENT_UPLOADS: usize = 4;

const DEVICE_TYPES: [&str; 4] = ["SD-100", "SD-200", "RSD-Mini", "RSD-Pro"];
const RUN_NOTES: [&str; 4] = ["常温耐压测试", "高温老化测试", "关断响应测试", "长时稳定性测试"];

#[derive(Debug, Clone)]
pub struct SeedingConfig {
    pub base_url: String,
    pub jwt_token: Option<String>,
    pub client: Client,
}

impl SeedingConfig {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.jwt_token {
            Some(token) => request.header("authorization", format!("Bearer {token}")),
            None => request,
        }
    }
}

/// One simulated test run
#[derive(Debug, Clone)]
pub struct SeedExperiment {
    pub name: String,
    pub description: String,
    pub device_address: String,
    pub device_type: String,
    /// Files to upload, each already rendered as xlsx
    pub files: Vec<(String, Vec<u8>)>,
}

#[derive(Debug, Default)]
pub struct SeedResults {
    pub reports: Vec<Value>,
    pub failures: Vec<String>,
}

impl SeedResults {
    fn total(&self, field: &str) -> u64 {
        self.reports
            .iter()
            .filter_map(|report| report[field].as_u64())
            .sum()
    }
}

/// Readings for one file: a steady operating point with noise and, when
/// `spike` is set, a short excursion above the default alert thresholds.
fn generate_readings(rows: usize, spike: bool) -> Vec<(f64, f64)> {
    let mut rng = rand::rng();
    let base_voltage = rng.random_range(19.5_f64..21.5);
    let base_current = rng.random_range(0.1_f64..0.4);
    let spike_at = rows / 2;

    (0..rows)
        .map(|i| {
            if spike && (spike_at..spike_at + 3).contains(&i) {
                (rng.random_range(32.0..40.0), rng.random_range(2.1..2.8))
            } else {
                (
                    base_voltage + rng.random_range(-0.3..0.3),
                    (base_current + rng.random_range(-0.05..0.05)).max(0.0),
                )
            }
        })
        .collect()
}

fn render_workbook(readings: &[(f64, f64)], start: NaiveDateTime) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    let headers = ["序号", "电流 (A)", "电压 (V)", "功率 (W)", "时间戳", "温度 (℃)"];
    for (col, header) in (0u16..).zip(headers) {
        sheet.write_string(0, col, header)?;
    }

    let mut rng = rand::rng();
    for (row, (voltage, current)) in (1u32..).zip(readings) {
        let timestamp = start + ChronoDuration::seconds(i64::from(row - 1) * 10);
        sheet.write_number(row, 0, f64::from(row))?;
        sheet.write_number(row, 1, (current * 1000.0).round() / 1000.0)?;
        sheet.write_number(row, 2, (voltage * 1000.0).round() / 1000.0)?;
        sheet.write_number(row, 3, voltage * current)?;
        sheet.write_string(row, 4, timestamp.format("%Y-%m-%d %H:%M:%S").to_string())?;
        sheet.write_number(row, 5, rng.random_range(24.0..38.0))?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn generate_experiments(count: usize, rows: usize) -> Result<Vec<SeedExperiment>, Box<dyn std::error::Error>> {
    let mut rng = rand::rng();
    let day = NaiveDate::from_ymd_opt(2025, 1, 15).ok_or("invalid seed date")?;

    (0..count)
        .map(|index| -> Result<SeedExperiment, Box<dyn std::error::Error>> {
            let start = day
                .and_hms_opt(8, 0, 0)
                .ok_or("invalid seed time")?
                + ChronoDuration::days(i64::try_from(index)?);
            let file_count: u32 = rng.random_range(1..=3);
            let spike = rng.random_bool(0.3);

            let files = (0..file_count)
                .map(|file| {
                    let readings = generate_readings(rows, spike && file == 0);
                    let offset = ChronoDuration::hours(i64::from(file));
                    render_workbook(&readings, start + offset)
                        .map(|bytes| (format!("run-{:02}-part-{}.xlsx", index + 1, file + 1), bytes))
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(SeedExperiment {
                name: format!("关断器测试 #{:03}", index + 1),
                description: RUN_NOTES[index % RUN_NOTES.len()].to_string(),
                device_address: rng.random_range(1..=16).to_string(),
                device_type: DEVICE_TYPES[rng.random_range(0..DEVICE_TYPES.len())].to_string(),
                files,
            })
        })
        .collect()
}

pub struct DatabaseSeeder {
    config: SeedingConfig,
    results: SeedResults,
}

impl DatabaseSeeder {
    pub fn new(base_url: &str, jwt_token: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            config: SeedingConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                jwt_token,
                client,
            },
            results: SeedResults::default(),
        })
    }

    async fn upload(config: SeedingConfig, experiment: SeedExperiment) -> Result<Value, String> {
        let mut form = multipart::Form::new()
            .text("experiment_name", experiment.name.clone())
            .text("description", experiment.description)
            .text("device_address", experiment.device_address)
            .text("device_type", experiment.device_type);

        for (file_name, bytes) in experiment.files {
            let part = multipart::Part::bytes(bytes)
                .file_name(file_name)
                .mime_str(XLSX_MIME)
                .map_err(|e| format!("Invalid mime type: {e}"))?;
            form = form.part("files", part);
        }

        let url = format!("{}/api/imports", config.base_url);
        let response = config
            .authorize(config.client.post(&url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("Request error for {}: {e}", experiment.name))?;

        if response.status().is_success() {
            response
                .json::<Value>()
                .await
                .map_err(|e| format!("JSON parse error: {e}"))
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            Err(format!("HTTP {status} for {}: {error_text}", experiment.name))
        }
    }

    pub async fn check_connection(&self) -> Result<(), Box<dyn std::error::Error>> {
        println!("{} Checking API...", style("[1/3]").bold().dim());

        let url = format!("{}/api/settings/thresholds", self.config.base_url);
        let response = self.config.authorize(self.config.client.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(format!("HTTP {} from {url}", response.status()).into());
        }

        let thresholds: Value = response.json().await?;
        println!(
            "  {} Alert thresholds: {} V / {} A / {} W",
            style("✓").green(),
            thresholds["voltage"],
            thresholds["current"],
            thresholds["power"]
        );
        Ok(())
    }

    pub async fn upload_experiments(
        &mut self,
        experiments: Vec<SeedExperiment>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        println!(
            "{} Importing {} experiments...",
            style("[2/3]").bold().dim(),
            experiments.len()
        );

        let pb = ProgressBar::new(experiments.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_UPLOADS));
        let tasks = experiments.into_iter().map(|experiment| {
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();
            let pb = pb.clone();
            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| format!("Semaphore closed: {e}"))?;
                pb.set_message(experiment.name.clone());
                let result = Self::upload(config, experiment).await;
                pb.inc(1);
                result
            })
        });

        for joined in join_all(tasks).await {
            match joined {
                Ok(Ok(report)) => self.results.reports.push(report),
                Ok(Err(e)) => self.results.failures.push(e),
                Err(e) => self.results.failures.push(format!("Task join error: {e}")),
            }
        }

        pb.finish_with_message("done");
        println!(
            "  {} {} imported, {} failed",
            style("✓").green(),
            self.results.reports.len(),
            self.results.failures.len()
        );
        Ok(())
    }

    /// Needs the admin role; a refusal is reported, not fatal
    pub async fn recompute_overview(&self) -> Result<(), Box<dyn std::error::Error>> {
        println!("{} Recomputing overview...", style("[3/3]").bold().dim());

        let url = format!("{}/api/overview/recompute", self.config.base_url);
        let response = self.config.authorize(self.config.client.post(&url)).send().await?;
        if response.status().is_success() {
            let overview: Value = response.json().await?;
            println!(
                "  {} {} experiments, {} data points",
                style("✓").green(),
                overview["total_experiments"],
                overview["total_data_points"]
            );
        } else {
            println!(
                "  {} Overview not recomputed (HTTP {}), it refreshes after each import anyway",
                style("!").yellow(),
                response.status()
            );
        }
        Ok(())
    }

    fn display_summary(&self) {
        println!();
        println!("{}", style("Seeding complete").bold().green());
        println!("{}", style("═".repeat(50)).dim());

        let summary_data = [
            ("Experiments", self.results.reports.len() as u64),
            ("Files", self.results.total("files_succeeded")),
            ("Rows", self.results.total("rows_written")),
            ("Alerts", self.results.total("alerts_created")),
        ];
        for (name, count) in summary_data {
            println!("{:.<20} {}", style(name).cyan(), style(count).bold().green());
        }

        for failure in &self.results.failures {
            println!("  {} {failure}", style("✗").red());
        }
        println!();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("PVSD Database Seeder")
        .version("1.0")
        .about("Uploads generated shutdown-device measurement spreadsheets through the import API")
        .arg(
            Arg::new("url")
                .short('u')
                .long("url")
                .value_name("URL")
                .help("API base URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new("token")
                .short('t')
                .long("token")
                .value_name("JWT_TOKEN")
                .help("JWT authentication token, omit when token auth is disabled"),
        )
        .arg(
            Arg::new("experiments")
                .short('n')
                .long("experiments")
                .value_name("COUNT")
                .help("Number of experiments to create")
                .value_parser(value_parser!(usize))
                .default_value("10"),
        )
        .arg(
            Arg::new("rows")
                .short('r')
                .long("rows")
                .value_name("ROWS")
                .help("Measurement rows per file")
                .value_parser(value_parser!(usize))
                .default_value("120"),
        )
        .get_matches();

    let base_url = matches
        .get_one::<String>("url")
        .cloned()
        .unwrap_or_default();
    let jwt_token = matches.get_one::<String>("token").cloned();
    let count = matches.get_one::<usize>("experiments").copied().unwrap_or(10);
    let rows = matches.get_one::<usize>("rows").copied().unwrap_or(120);

    println!("{}", style("PVSD Database Seeder v1.0").bold());
    println!("{}", style("━".repeat(40)).dim());
    println!("API URL: {}", style(&base_url).cyan());
    match &jwt_token {
        Some(token) => println!(
            "Token:   {}...{}",
            style("*".repeat(8)).dim(),
            style(&token[token.len().saturating_sub(8)..]).dim()
        ),
        None => println!("Token:   {}", style("none").dim()),
    }
    println!();

    let mut seeder = DatabaseSeeder::new(&base_url, jwt_token)?;
    seeder.check_connection().await?;

    let experiments = generate_experiments(count, rows.max(1))?;
    seeder.upload_experiments(experiments).await?;
    seeder.recompute_overview().await?;
    seeder.display_summary();

    Ok(())
}
