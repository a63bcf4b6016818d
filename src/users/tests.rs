use super::models as users;
use crate::common::auth::Role;
use crate::config::test_helpers::{setup_test_app, setup_test_app_with_config, setup_test_app_with_db, test_config};
use crate::test_helpers::{get, send};
use axum::http::StatusCode;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::json;
use uuid::Uuid;

async fn insert_user(db: &sea_orm::DatabaseConnection, role: Role) -> users::Model {
    users::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(Some("lab@example.com".to_string())),
        name: Set(Some("Lab Tech".to_string())),
        role: Set(role),
        created_at: Set(Utc::now()),
        last_updated: Set(Utc::now()),
    }
    .insert(db)
    .await
    .unwrap()
}

#[tokio::test]
async fn test_me_returns_local_user() {
    let app = setup_test_app().await;

    let (status, body) = get(&app, "/api/users/me").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["id"].is_null());
    assert_eq!(body["role"], "admin");
}

#[tokio::test]
async fn test_local_user_has_no_profile_to_update() {
    let app = setup_test_app().await;

    let (status, body) = send(&app, "PATCH", "/api/users/me", Some(json!({"name": "Operator"}))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "BUSINESS_RULE_VIOLATION");
}

#[tokio::test]
async fn test_profile_name_must_not_be_blank() {
    let app = setup_test_app().await;

    let (status, body) = send(&app, "PATCH", "/api/users/me", Some(json!({"name": "   "}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_admin_lists_and_promotes_users() {
    let (app, db) = setup_test_app_with_db().await;
    let user = insert_user(&db, Role::Viewer).await;

    let (status, body) = get(&app, "/api/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["role"], "viewer");

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/users/{}/role", user.id),
        Some(json!({"role": "researcher"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "researcher");
    assert_eq!(body["id"], user.id.to_string());
}

#[tokio::test]
async fn test_role_change_for_unknown_user() {
    let app = setup_test_app().await;

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/users/{}/role", Uuid::new_v4()),
        Some(json!({"role": "admin"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_researcher_cannot_manage_users() {
    let mut config = test_config();
    config.local_user_role = Role::Researcher;
    let (app, db) = setup_test_app_with_config(config).await;
    let user = insert_user(&db, Role::Viewer).await;

    let (status, body) = get(&app, "/api/users").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/users/{}/role", user.id),
        Some(json!({"role": "admin"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_viewer_reads_but_cannot_modify() {
    let mut config = test_config();
    config.local_user_role = Role::Viewer;
    let (app, _db) = setup_test_app_with_config(config).await;

    let (status, body) = get(&app, "/api/users/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "viewer");

    let (status, _) = send(&app, "PATCH", "/api/users/me", Some(json!({"name": "x"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
