use crate::common::errors::{BusinessError, BusinessResult, DbErrorExt};
use crate::common::state::AppState;
use crate::forbidden;
use crate::users::models as users;
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::{self, Next},
    response::Response,
};
use axum_keycloak_auth::{PassthroughMode, decode::KeycloakToken, layer::KeycloakAuthLayer};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, entity::prelude::*};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

/// Flat role enumeration. Permission checks compare `level()` values.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "user_role")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "researcher")]
    Researcher,
    #[sea_orm(string_value = "viewer")]
    Viewer,
}

impl Role {
    pub const fn level(self) -> u8 {
        match self {
            Role::Viewer => 1,
            Role::Researcher => 2,
            Role::Admin => 3,
        }
    }

    pub const fn permits(self, required: Role) -> bool {
        self.level() >= required.level()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Researcher => "researcher",
            Role::Viewer => "viewer",
        }
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> Ordering {
        self.level().cmp(&other.level())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "researcher" => Ok(Role::Researcher),
            "viewer" => Ok(Role::Viewer),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Role claim as carried in a Keycloak token
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TokenRole {
    Known(Role),
    Unknown(String),
}

impl axum_keycloak_auth::role::Role for TokenRole {}

impl fmt::Display for TokenRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenRole::Known(role) => write!(f, "{role}"),
            TokenRole::Unknown(unknown) => write!(f, "Unknown role: {unknown}"),
        }
    }
}

impl From<String> for TokenRole {
    fn from(value: String) -> Self {
        match value.parse::<Role>() {
            Ok(role) => TokenRole::Known(role),
            Err(_) => TokenRole::Unknown(value),
        }
    }
}

/// The caller of the current request, inserted into request extensions by [`authorize`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    /// `None` for the local user when token auth is disabled
    pub id: Option<Uuid>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Role,
}

impl CurrentUser {
    pub fn local(role: Role) -> Self {
        Self {
            id: None,
            email: None,
            name: None,
            role,
        }
    }

    pub fn require(&self, required: Role, action: &str, resource: &str) -> BusinessResult<()> {
        if self.role.permits(required) {
            Ok(())
        } else {
            Err(forbidden!(action, resource))
        }
    }
}

impl From<users::Model> for CurrentUser {
    fn from(model: users::Model) -> Self {
        Self {
            id: Some(model.id),
            email: model.email,
            name: model.name,
            role: model.role,
        }
    }
}

/// Minimum role for a request: reads need viewer, everything else researcher
pub fn required_role(method: &Method) -> Role {
    if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
        Role::Viewer
    } else {
        Role::Researcher
    }
}

/// Resolve the caller and enforce the method-level role before the handler runs
pub async fn authorize(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, BusinessError> {
    let token = request
        .extensions()
        .get::<KeycloakToken<TokenRole>>()
        .cloned();

    let user = match token {
        Some(token) => resolve_token_user(&state.db, &token).await?,
        None if state.keycloak_auth_instance.is_none() => {
            CurrentUser::local(state.config.local_user_role)
        }
        None => {
            return Err(BusinessError::Unauthorized {
                message: "missing bearer token".to_string(),
            });
        }
    };

    let required = required_role(request.method());
    let action = if required == Role::Viewer {
        "read"
    } else {
        "modify"
    };
    user.require(required, action, request.uri().path())?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Highest known role among token claims; `Viewer` when none is recognised
pub fn highest_token_role<'a>(claims: impl IntoIterator<Item = &'a TokenRole>) -> Role {
    claims
        .into_iter()
        .filter_map(|claim| match claim {
            TokenRole::Known(role) => Some(*role),
            TokenRole::Unknown(_) => None,
        })
        .max()
        .unwrap_or(Role::Viewer)
}

/// Profile used to register a token subject on first sight
#[derive(Debug, Clone, PartialEq)]
pub struct TokenProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Role,
}

impl TokenProfile {
    fn from_token(token: &KeycloakToken<TokenRole>) -> Result<Self, BusinessError> {
        let id = Uuid::parse_str(&token.subject).map_err(|_| BusinessError::Unauthorized {
            message: "token subject is not a valid user id".to_string(),
        })?;

        let profile = &token.extra.profile;
        let name = profile
            .full_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| Some(profile.preferred_username.clone()));
        let email = Some(token.extra.email.email.clone()).filter(|email| !email.is_empty());

        Ok(Self {
            id,
            email,
            name,
            role: highest_token_role(token.roles.iter().map(|claim| claim.role())),
        })
    }
}

async fn resolve_token_user(
    db: &DatabaseConnection,
    token: &KeycloakToken<TokenRole>,
) -> Result<CurrentUser, BusinessError> {
    find_or_register_user(db, TokenProfile::from_token(token)?).await
}

/// The stored user for `profile.id`, registering it on first sight.
///
/// An existing row wins over the token, so role changes made by an admin stick.
pub async fn find_or_register_user(
    db: &DatabaseConnection,
    profile: TokenProfile,
) -> Result<CurrentUser, BusinessError> {
    let id = profile.id;
    if let Some(existing) = users::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(|e| e.to_business_error("user"))?
    {
        return Ok(existing.into());
    }

    let now = Utc::now();
    let role = profile.role;
    let user = users::ActiveModel {
        id: Set(id),
        email: Set(profile.email),
        name: Set(profile.name),
        role: Set(role),
        created_at: Set(now),
        last_updated: Set(now),
    };

    match user.insert(db).await {
        Ok(model) => {
            tracing::info!("Registered user {id} with role {role}");
            Ok(model.into())
        }
        // A concurrent request may have registered the same subject
        Err(err) => users::Entity::find_by_id(id)
            .one(db)
            .await
            .map_err(|e| e.to_business_error("user"))?
            .map(CurrentUser::from)
            .ok_or_else(|| err.to_business_error("user")),
    }
}

/// Wrap a resource router with token validation (when configured) and role enforcement
pub fn protect(router: OpenApiRouter, state: &AppState, resource: &str) -> OpenApiRouter {
    let router = router.layer(middleware::from_fn_with_state(state.clone(), authorize));

    if let Some(instance) = &state.keycloak_auth_instance {
        router.layer(
            KeycloakAuthLayer::<TokenRole>::builder()
                .instance(instance.clone())
                .passthrough_mode(PassthroughMode::Block)
                .persist_raw_claims(false)
                .expected_audiences(vec![String::from("account")])
                .required_roles(vec![])
                .build(),
        )
    } else {
        if !state.config.tests_running {
            tracing::warn!("Routes of {resource} are not protected by token authentication");
        }
        router
    }
}
