pub use super::models::{Experiment, router as crudrouter};
use super::models as experiments;
use super::services::{self, ExperimentReport, ExperimentStatistics};
use crate::common::auth::protect;
use crate::common::errors::{BusinessError, BusinessResult, DbErrorExt};
use crate::common::state::AppState;
use crate::measurements::models as measurements;
use crate::measurements::services::rows_for_experiment;
use crate::not_found;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use crudcrate::CRUDResource;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::{router::OpenApiRouter, routes};
use uuid::Uuid;

const MAX_DATA_LIMIT: u64 = 10_000;

pub fn router(state: &AppState) -> OpenApiRouter
where
    Experiment: CRUDResource,
{
    let data_routes = OpenApiRouter::new()
        .routes(routes!(get_experiment_data))
        .routes(routes!(get_experiment_statistics))
        .routes(routes!(export_experiment_data))
        .routes(routes!(get_experiment_report))
        .with_state(state.clone());

    let router = crudrouter(&state.db.clone()).merge(data_routes);

    protect(router, state, Experiment::RESOURCE_NAME_PLURAL)
}

async fn find_experiment(db: &DatabaseConnection, id: Uuid) -> BusinessResult<experiments::Model> {
    experiments::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(|e| e.to_business_error("experiment"))?
        .ok_or_else(|| not_found!("experiment", id))
}

async fn load_rows(
    db: &DatabaseConnection,
    id: Uuid,
    limit: Option<u64>,
) -> BusinessResult<Vec<measurements::Model>> {
    rows_for_experiment(db, id, limit)
        .await
        .map_err(|e| e.to_business_error("measurement"))
}

fn csv_response(body: String, file_name: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    )
        .into_response()
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DataQuery {
    /// Maximum number of rows, ordered by sequence number
    pub limit: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/{id}/data",
    params(("id" = Uuid, Path, description = "Experiment ID"), DataQuery),
    responses(
        (status = 200, description = "Measurement rows ordered by sequence number", body = [measurements::Model]),
        (status = 404, description = "Experiment not found")
    ),
    tag = "experiments"
)]
pub async fn get_experiment_data(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DataQuery>,
) -> BusinessResult<Json<Vec<measurements::Model>>> {
    find_experiment(&state.db, id).await?;
    let limit = query.limit.map(|limit| limit.clamp(1, MAX_DATA_LIMIT));
    Ok(Json(load_rows(&state.db, id, limit).await?))
}

#[utoipa::path(
    get,
    path = "/{id}/statistics",
    params(("id" = Uuid, Path, description = "Experiment ID")),
    responses(
        (status = 200, description = "Statistics triple and power distribution", body = ExperimentStatistics),
        (status = 404, description = "Experiment not found")
    ),
    tag = "experiments"
)]
pub async fn get_experiment_statistics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> BusinessResult<Json<ExperimentStatistics>> {
    find_experiment(&state.db, id).await?;
    let rows = load_rows(&state.db, id, None).await?;
    Ok(Json(services::build_statistics(id, &rows)))
}

#[utoipa::path(
    get,
    path = "/{id}/export",
    params(("id" = Uuid, Path, description = "Experiment ID")),
    responses(
        (status = 200, description = "Measurement rows as CSV", content_type = "text/csv", body = String),
        (status = 404, description = "Experiment not found")
    ),
    tag = "experiments"
)]
pub async fn export_experiment_data(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> BusinessResult<Response> {
    find_experiment(&state.db, id).await?;
    let rows = load_rows(&state.db, id, None).await?;
    let body = services::export_csv(&rows)?;
    Ok(csv_response(body, &format!("experiment-{id}-data.csv")))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReportQuery {
    /// `json` (default) or `csv`
    pub format: Option<String>,
}

#[utoipa::path(
    get,
    path = "/{id}/report",
    params(("id" = Uuid, Path, description = "Experiment ID"), ReportQuery),
    responses(
        (status = 200, description = "Experiment report", body = ExperimentReport),
        (status = 400, description = "Unknown report format"),
        (status = 404, description = "Experiment not found")
    ),
    tag = "experiments"
)]
pub async fn get_experiment_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ReportQuery>,
) -> BusinessResult<Response> {
    let format = query.format.as_deref().unwrap_or("json").to_ascii_lowercase();
    if format != "json" && format != "csv" {
        return Err(BusinessError::ValidationError {
            field: "format".to_string(),
            message: format!("unsupported report format '{format}', expected json or csv"),
        });
    }

    let experiment = find_experiment(&state.db, id).await?;
    let rows = load_rows(&state.db, id, None).await?;
    let thresholds = state.current_thresholds().await;
    let report = services::build_report(&experiment, &rows, &thresholds);

    if format == "csv" {
        let body = services::report_csv(&report, &rows)?;
        return Ok(csv_response(body, &format!("experiment-{id}-report.csv")));
    }

    Ok(Json(report).into_response())
}
