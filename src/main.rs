mod common;
mod config;
mod routes;
mod services;

mod alerts;
mod experiments;
mod imports;
mod measurements;
mod notifications;
mod overview;
mod users;

#[cfg(test)]
mod test_helpers;

use crate::config::Config;
use anyhow::{Context, Result};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

#[tokio::main]
async fn main() -> Result<()> {
    // Set up tracing/logging
    tracing_subscriber::fmt::init();
    tracing::info!("Starting server...");

    // Load configuration and environment variables to pass to the application
    let config: Config = Config::from_env();

    let db_url = config.db_url.as_deref().context("DB_URL is not configured")?;
    let db: DatabaseConnection = Database::connect(db_url)
        .await
        .context("Failed to connect to the database")?;

    if db.ping().await.is_ok() {
        tracing::info!("Connected to the database");
    } else {
        tracing::warn!("Could not connect to the database");
    }

    Migrator::up(&db, None)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("DB migrations complete");

    tracing::info!(
        "Starting server {} ({} deployment) ...",
        config.app_name,
        config.deployment.to_uppercase()
    );

    let state = routes::build_state(&db, &config);
    let refresh_task = overview::services::spawn_periodic_refresh(state.clone());
    let router = routes::router_for_state(&state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], 3000).into();
    tracing::info!("Listening on {addr}");

    axum::serve(
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?,
        router.into_make_service(),
    )
    .await
    .context("Server error")?;

    if let Some(task) = refresh_task {
        task.abort();
    }

    Ok(())
}
