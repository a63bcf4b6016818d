use super::models::{self as overview, DisplayBoard};
use super::services;
use crate::common::auth::{CurrentUser, Role, protect};
use crate::common::errors::{BusinessResult, DbErrorExt};
use crate::common::state::AppState;
use axum::{Extension, Json, extract::State};
use utoipa_axum::{router::OpenApiRouter, routes};

pub fn router(state: &AppState) -> OpenApiRouter {
    let router = OpenApiRouter::new()
        .routes(routes!(get_overview))
        .routes(routes!(recompute_overview))
        .with_state(state.clone());

    protect(router, state, "overview")
}

pub fn display_router(state: &AppState) -> OpenApiRouter {
    let router = OpenApiRouter::new()
        .routes(routes!(get_display_board))
        .with_state(state.clone());

    protect(router, state, "display")
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Latest overview snapshot", body = overview::Model)
    ),
    tag = "overview"
)]
pub async fn get_overview(State(state): State<AppState>) -> BusinessResult<Json<overview::Model>> {
    let snapshot = services::current_snapshot(&state.db)
        .await
        .map_err(|e| e.to_business_error("overview"))?;
    Ok(Json(snapshot))
}

#[utoipa::path(
    post,
    path = "/recompute",
    responses(
        (status = 200, description = "Today's snapshot, recomputed", body = overview::Model),
        (status = 403, description = "Admin role required")
    ),
    tag = "overview"
)]
pub async fn recompute_overview(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> BusinessResult<Json<overview::Model>> {
    user.require(Role::Admin, "recompute", "overview")?;

    let snapshot = services::recompute_overview(&state.db)
        .await
        .map_err(|e| e.to_business_error("overview"))?;
    tracing::info!("Overview for {} recomputed on request", snapshot.metric_date);
    state.events.metrics_recomputed(snapshot.metric_date);

    Ok(Json(snapshot))
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Snapshot, five newest alerts, twenty newest rows and active experiments", body = DisplayBoard)
    ),
    tag = "display"
)]
pub async fn get_display_board(State(state): State<AppState>) -> BusinessResult<Json<DisplayBoard>> {
    let board = services::display_board(&state.db)
        .await
        .map_err(|e| e.to_business_error("display"))?;
    Ok(Json(board))
}
