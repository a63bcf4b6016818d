use crate::alerts::models::AlertThresholds;
use crate::common::auth::Role;
use crate::services::processing::ImportSettings;
use crate::services::processing::row_processing::ParsePolicy;
use chrono::{Offset, Utc};
use dotenvy::dotenv;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: Option<String>,
    pub app_name: String,
    pub keycloak_ui_id: String,
    pub keycloak_url: String,
    pub keycloak_realm: String,
    pub deployment: String,
    pub tests_running: bool,
    /// Role granted to every request while token auth is disabled
    pub local_user_role: Role,
    pub thresholds: AlertThresholds,
    pub import: ImportSettings,
    /// Seconds between background overview recomputations, 0 disables
    pub overview_refresh_secs: u64,
}

/// Read an optional variable, falling back to `default` when unset or blank
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} has an invalid value '{value}': {e}")),
        _ => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok(); // Load from .env file if available
        let db_url = env::var("DB_URL").ok().or_else(|| {
            Some(format!(
                "{}://{}:{}@{}:{}/{}",
                env::var("DB_PREFIX").unwrap_or_else(|_| "postgresql".to_string()),
                env::var("DB_USER").expect("DB_USER must be set"),
                env::var("DB_PASSWORD").expect("DB_PASSWORD must be set"),
                env::var("DB_HOST").expect("DB_HOST must be set"),
                env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string()),
                env::var("DB_NAME").expect("DB_NAME must be set"),
            ))
        });

        let defaults = AlertThresholds::default();
        let thresholds = AlertThresholds {
            voltage: env_or("VOLTAGE_THRESHOLD", defaults.voltage),
            current: env_or("CURRENT_THRESHOLD", defaults.current),
            power: env_or("POWER_THRESHOLD", defaults.power),
        };
        if let Err(e) = thresholds.validate() {
            panic!("Invalid alert thresholds in environment: {e}");
        }

        let parse_policy = if env_or("IMPORT_STRICT_PARSING", false) {
            ParsePolicy::Strict
        } else {
            ParsePolicy::Lenient
        };

        Config {
            app_name: env::var("APP_NAME").expect("APP_NAME must be set"),
            keycloak_ui_id: env::var("KEYCLOAK_UI_ID").expect("KEYCLOAK_UI_ID must be set"),
            keycloak_url: env::var("KEYCLOAK_URL")
                .expect("KEYCLOAK_URL must be set, leave it empty to disable token auth"),
            keycloak_realm: env::var("KEYCLOAK_REALM").expect("KEYCLOAK_REALM must be set"),
            deployment: env::var("DEPLOYMENT")
                .expect("DEPLOYMENT must be set, this can be local, dev, stage, or prod"),
            tests_running: false,
            local_user_role: env_or("LOCAL_USER_ROLE", Role::Admin),
            thresholds,
            import: ImportSettings {
                batch_size: ImportSettings::clamp_batch_size(env_or(
                    "IMPORT_BATCH_SIZE",
                    ImportSettings::DEFAULT_BATCH_SIZE,
                )),
                atomic_files: env_or("IMPORT_ATOMIC_FILES", false),
                parse_policy,
                zone_offset: env_or("IMPORT_UTC_OFFSET", Utc.fix()),
            },
            overview_refresh_secs: env_or("OVERVIEW_REFRESH_SECS", 0),
            db_url,
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            app_name: "pvsd-api-test".to_string(),
            keycloak_ui_id: "test-ui".to_string(),
            keycloak_url: "http://localhost:8080".to_string(),
            keycloak_realm: "test-realm".to_string(),
            deployment: "test".to_string(),
            tests_running: true,
            local_user_role: Role::Admin,
            thresholds: AlertThresholds::default(),
            import: ImportSettings::default(),
            overview_refresh_secs: 0,
            db_url: Some("sqlite::memory:".to_string()),
        }
    }
}
