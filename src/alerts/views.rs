use super::models::{self as alerts, AlertQuery, AlertThresholds};
use super::services;
use crate::common::auth::protect;
use crate::common::errors::{BusinessResult, DbErrorExt};
use crate::common::state::AppState;
use crate::{not_found, validation_error};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use sea_orm::EntityTrait;
use utoipa_axum::{router::OpenApiRouter, routes};
use uuid::Uuid;

pub fn router(state: &AppState) -> OpenApiRouter {
    let router = OpenApiRouter::new()
        .routes(routes!(list_alerts))
        .routes(routes!(get_alert))
        .routes(routes!(resolve_alert))
        .with_state(state.clone());

    protect(router, state, "alerts")
}

pub fn settings_router(state: &AppState) -> OpenApiRouter {
    let router = OpenApiRouter::new()
        .routes(routes!(get_thresholds, replace_thresholds))
        .with_state(state.clone());

    protect(router, state, "settings")
}

#[utoipa::path(
    get,
    path = "/",
    params(AlertQuery),
    responses(
        (status = 200, description = "Alerts, newest first", body = [alerts::Model])
    ),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> BusinessResult<Json<Vec<alerts::Model>>> {
    let found = services::list_alerts(&state.db, &query)
        .await
        .map_err(|e| e.to_business_error("alert"))?;
    Ok(Json(found))
}

#[utoipa::path(
    get,
    path = "/{id}",
    params(("id" = Uuid, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "The alert", body = alerts::Model),
        (status = 404, description = "Alert not found")
    ),
    tag = "alerts"
)]
pub async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> BusinessResult<Json<alerts::Model>> {
    let alert = alerts::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(|e| e.to_business_error("alert"))?
        .ok_or_else(|| not_found!("alert", id))?;
    Ok(Json(alert))
}

#[utoipa::path(
    post,
    path = "/{id}/resolve",
    params(("id" = Uuid, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Alert resolved (idempotent)", body = alerts::Model),
        (status = 404, description = "Alert not found")
    ),
    tag = "alerts"
)]
pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> BusinessResult<Json<alerts::Model>> {
    let (alert, changed) = services::resolve_alert(&state.db, id)
        .await
        .map_err(|e| e.to_business_error("alert"))?;

    if changed {
        tracing::info!("Resolved alert {id} ({})", alert.alert_type);
        state.events.alert_resolved(id);
    }

    Ok(Json(alert))
}

#[utoipa::path(
    get,
    path = "/thresholds",
    responses(
        (status = 200, description = "Current alert thresholds", body = AlertThresholds)
    ),
    tag = "settings"
)]
pub async fn get_thresholds(State(state): State<AppState>) -> Json<AlertThresholds> {
    Json(state.current_thresholds().await)
}

#[utoipa::path(
    put,
    path = "/thresholds",
    request_body = AlertThresholds,
    responses(
        (status = 200, description = "Thresholds replaced", body = AlertThresholds),
        (status = 400, description = "A threshold is not a positive number")
    ),
    tag = "settings"
)]
pub async fn replace_thresholds(
    State(state): State<AppState>,
    Json(thresholds): Json<AlertThresholds>,
) -> BusinessResult<Json<AlertThresholds>> {
    thresholds
        .validate()
        .map_err(|message| validation_error!("thresholds", message))?;

    *state.thresholds.write().await = thresholds;
    tracing::info!(
        "Alert thresholds set to {} V / {} A / {} W",
        thresholds.voltage,
        thresholds.current,
        thresholds.power
    );

    Ok(Json(thresholds))
}
