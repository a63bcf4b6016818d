use crate::common::state::AppState;
use crate::config::Config;
use crate::{alerts, experiments, imports, notifications, overview, users};
use axum::{Router, extract::DefaultBodyLimit};
use axum_keycloak_auth::{Url, instance::KeycloakAuthInstance, instance::KeycloakConfig};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable};

/// Spreadsheet uploads may carry several files
const MAX_BODY_BYTES: usize = 30 * 1024 * 1024;

pub fn build_state(db: &DatabaseConnection, config: &Config) -> AppState {
    let keycloak_instance: Option<Arc<KeycloakAuthInstance>> = if config.keycloak_url.is_empty() {
        // Token auth disabled, requests run as the local user
        None
    } else {
        Some(Arc::new(KeycloakAuthInstance::new(
            KeycloakConfig::builder()
                .server(Url::parse(&config.keycloak_url).expect("KEYCLOAK_URL must be a valid URL"))
                .realm(String::from(&config.keycloak_realm))
                .build(),
        )))
    };

    AppState::new(db.clone(), config.clone(), keycloak_instance)
}

pub fn router_for_state(app_state: &AppState) -> Router {
    #[derive(OpenApi)]
    #[openapi(
        modifiers(&SecurityAddon),
        security(
            ("bearerAuth" = [])
        ),
        info(
            title = "pvsd-api",
            description = "Measurement import, statistics and alerting for photovoltaic shutdown-device tests"
        )
    )]
    struct ApiDoc;

    struct SecurityAddon;

    impl utoipa::Modify for SecurityAddon {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            if let Some(components) = openapi.components.as_mut() {
                components.add_security_scheme(
                    "bearerAuth",
                    utoipa::openapi::security::SecurityScheme::Http(
                        utoipa::openapi::security::HttpBuilder::new()
                            .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                            .bearer_format("JWT")
                            .build(),
                    ),
                );
            }
        }
    }

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(crate::common::views::router(app_state)) // Root routes
        .nest("/api/users", users::views::router(app_state))
        .nest("/api/experiments", experiments::views::router(app_state))
        .nest("/api/imports", imports::views::router(app_state))
        .nest("/api/alerts", alerts::views::router(app_state))
        .nest("/api/settings", alerts::views::settings_router(app_state))
        .nest("/api/overview", overview::views::router(app_state))
        .nest("/api/display", overview::views::display_router(app_state))
        .nest("/api/events", notifications::views::router(app_state))
        .split_for_parts();

    router
        .merge(Scalar::with_url("/api/docs", api))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

pub fn build_router(db: &DatabaseConnection, config: &Config) -> Router {
    router_for_state(&build_state(db, config))
}
