use crate::alerts::models::AlertThresholds;
use crate::config::Config;
use crate::notifications::services::EventBus;
use axum_keycloak_auth::instance::KeycloakAuthInstance;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub keycloak_auth_instance: Option<Arc<KeycloakAuthInstance>>,
    pub events: EventBus,
    /// Operator-editable alert thresholds, seeded from configuration
    pub thresholds: Arc<RwLock<AlertThresholds>>,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        config: Config,
        keycloak_auth_instance: Option<Arc<KeycloakAuthInstance>>,
    ) -> Self {
        let thresholds = Arc::new(RwLock::new(config.thresholds));
        Self {
            db,
            config,
            keycloak_auth_instance,
            events: EventBus::default(),
            thresholds,
        }
    }

    pub async fn current_thresholds(&self) -> AlertThresholds {
        *self.thresholds.read().await
    }
}
