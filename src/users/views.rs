use super::models::{self as users, ProfileUpdate, RoleUpdate};
use crate::common::auth::{CurrentUser, Role, protect};
use crate::common::errors::{BusinessError, BusinessResult, DbErrorExt};
use crate::common::state::AppState;
use crate::{not_found, validation_error};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, QueryOrder, Set};
use utoipa_axum::{router::OpenApiRouter, routes};
use uuid::Uuid;

pub fn router(state: &AppState) -> OpenApiRouter {
    let router = OpenApiRouter::new()
        .routes(routes!(get_me, update_me))
        .routes(routes!(list_users))
        .routes(routes!(update_user_role))
        .with_state(state.clone());

    protect(router, state, "users")
}

#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "The calling user", body = CurrentUser),
        (status = 401, description = "Unauthorized")
    ),
    tag = "users"
)]
pub async fn get_me(Extension(user): Extension<CurrentUser>) -> Json<CurrentUser> {
    Json(user)
}

#[utoipa::path(
    patch,
    path = "/me",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Profile updated", body = users::Model),
        (status = 400, description = "Empty name"),
        (status = 422, description = "The local user has no stored profile")
    ),
    tag = "users"
)]
pub async fn update_me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(update): Json<ProfileUpdate>,
) -> BusinessResult<Json<users::Model>> {
    let name = update.name.trim();
    if name.is_empty() {
        return Err(validation_error!("name", "must not be empty"));
    }

    let Some(id) = user.id else {
        return Err(BusinessError::BusinessRuleViolation {
            rule: "stored_profile".to_string(),
            message: "the local user has no stored profile".to_string(),
        });
    };

    let model = users::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(|e| e.to_business_error("user"))?
        .ok_or_else(|| not_found!("user", id))?;

    let mut active = model.into_active_model();
    active.name = Set(Some(name.to_string()));
    active.last_updated = Set(Utc::now());
    let updated = active
        .update(&state.db)
        .await
        .map_err(|e| e.to_business_error("user"))?;

    Ok(Json(updated))
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "All registered users", body = [users::Model]),
        (status = 403, description = "Admin role required")
    ),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> BusinessResult<Json<Vec<users::Model>>> {
    user.require(Role::Admin, "list", "users")?;

    let all = users::Entity::find()
        .order_by_asc(users::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(|e| e.to_business_error("user"))?;

    Ok(Json(all))
}

#[utoipa::path(
    patch,
    path = "/{id}/role",
    request_body = RoleUpdate,
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Role changed", body = users::Model),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "User not found")
    ),
    tag = "users"
)]
pub async fn update_user_role(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(update): Json<RoleUpdate>,
) -> BusinessResult<Json<users::Model>> {
    user.require(Role::Admin, "change roles of", "users")?;

    let model = users::Entity::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(|e| e.to_business_error("user"))?
        .ok_or_else(|| not_found!("user", id))?;

    let previous = model.role;
    let mut active = model.into_active_model();
    active.role = Set(update.role);
    active.last_updated = Set(Utc::now());
    let updated = active
        .update(&state.db)
        .await
        .map_err(|e| e.to_business_error("user"))?;

    tracing::info!("Changed role of user {id} from {previous} to {}", updated.role);
    Ok(Json(updated))
}
