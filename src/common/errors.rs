use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde_json::json;
use std::fmt;

/// Errors surfaced by request handlers and the import pipeline
#[derive(Debug, Clone)]
pub enum BusinessError {
    /// Invalid user input (400 Bad Request)
    ValidationError { field: String, message: String },
    /// Missing or unusable credentials (401 Unauthorized)
    Unauthorized { message: String },
    /// Role too low for the requested action (403 Forbidden)
    Forbidden { action: String, resource: String },
    /// Resource not found (404 Not Found)
    NotFound { resource: String, id: String },
    /// Duplicate resource (409 Conflict)
    Duplicate { resource: String, field: String },
    /// Business rule violations (422 Unprocessable Entity)
    BusinessRuleViolation { rule: String, message: String },
    /// Database or other upstream failure (502 Bad Gateway)
    ExternalServiceError { service: String, message: String },
    /// Anything else (500 Internal Server Error)
    InternalError { message: String },
}

impl BusinessError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            BusinessError::ValidationError { field, message } => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Validation failed for field '{field}': {message}"),
            ),
            BusinessError::Unauthorized { message } => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                format!("Authentication required: {message}"),
            ),
            BusinessError::Forbidden { action, resource } => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                format!("Not authorized to {action} {resource}"),
            ),
            BusinessError::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                "RESOURCE_NOT_FOUND",
                format!("{resource} with id '{id}' not found"),
            ),
            BusinessError::Duplicate { resource, field } => (
                StatusCode::CONFLICT,
                "DUPLICATE_RESOURCE",
                format!("{resource} with this {field} already exists"),
            ),
            BusinessError::BusinessRuleViolation { rule, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "BUSINESS_RULE_VIOLATION",
                format!("Business rule '{rule}' violated: {message}"),
            ),
            BusinessError::ExternalServiceError { service, message } => (
                StatusCode::BAD_GATEWAY,
                "EXTERNAL_SERVICE_ERROR",
                format!("External service '{service}' error: {message}"),
            ),
            BusinessError::InternalError { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                format!("Internal error: {message}"),
            ),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.parts().0
    }
}

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts().2)
    }
}

impl std::error::Error for BusinessError {}

impl IntoResponse for BusinessError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.parts();

        if status.is_server_error() {
            tracing::error!("{error_code}: {message}");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
                "type": format!("{self:?}").split([' ', '{']).next().unwrap_or("Unknown")
            }
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for BusinessError {
    fn from(err: anyhow::Error) -> Self {
        BusinessError::InternalError {
            message: format!("{err:#}"),
        }
    }
}

/// Maps `DbErr` values onto business errors with resource context
pub struct ErrorMapper;

impl ErrorMapper {
    pub fn map_db_error(err: DbErr, context: &str) -> BusinessError {
        match err {
            DbErr::RecordNotFound(msg) => BusinessError::NotFound {
                resource: Self::resource_name(context),
                id: Self::extract_id_from_message(&msg),
            },
            DbErr::Custom(msg) => {
                if msg.starts_with("Validation failed:") {
                    let field = Self::extract_field_from_validation(&msg);
                    let message = msg.replace("Validation failed:", "").trim().to_string();
                    BusinessError::ValidationError { field, message }
                } else if msg.contains("already exists") || msg.contains("duplicate") {
                    BusinessError::Duplicate {
                        resource: Self::resource_name(context),
                        field: Self::extract_field(&msg),
                    }
                } else {
                    BusinessError::InternalError { message: msg }
                }
            }
            DbErr::Conn(conn_err) => BusinessError::ExternalServiceError {
                service: "database".to_string(),
                message: conn_err.to_string(),
            },
            DbErr::Exec(exec_err) => {
                let err_msg = exec_err.to_string();
                if err_msg.contains("UNIQUE constraint") || err_msg.contains("duplicate key") {
                    BusinessError::Duplicate {
                        resource: Self::resource_name(context),
                        field: Self::extract_field(&err_msg),
                    }
                } else if err_msg.contains("FOREIGN KEY constraint")
                    || err_msg.contains("foreign key constraint")
                {
                    BusinessError::BusinessRuleViolation {
                        rule: "referential_integrity".to_string(),
                        message: err_msg,
                    }
                } else {
                    BusinessError::InternalError { message: err_msg }
                }
            }
            _ => BusinessError::InternalError {
                message: err.to_string(),
            },
        }
    }

    fn resource_name(context: &str) -> String {
        context.replace('_', " ")
    }

    fn extract_id_from_message(msg: &str) -> String {
        for quote in ['\'', '"'] {
            let marker = format!(" id {quote}");
            if let Some(start_pos) = msg.find(&marker) {
                let after_id = &msg[start_pos + marker.len()..];
                if let Some(end_pos) = after_id.find(quote) {
                    return after_id[..end_pos].to_string();
                }
            }
        }

        msg.split_whitespace()
            .map(|word| word.trim_matches(|c| c == '\'' || c == '"'))
            .find(|word| uuid::Uuid::parse_str(word).is_ok())
            .map_or_else(|| "unknown".to_string(), ToString::to_string)
    }

    fn extract_field_from_validation(msg: &str) -> String {
        // "Validation failed: voltage must be positive" -> "voltage"
        msg.split(':')
            .nth(1)
            .and_then(|part| part.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string()
    }

    fn extract_field(msg: &str) -> String {
        ["metric_date", "email", "name"]
            .into_iter()
            .find(|field| msg.contains(field))
            .unwrap_or("field")
            .to_string()
    }
}

#[macro_export]
macro_rules! validation_error {
    ($field:expr, $message:expr) => {
        $crate::common::errors::BusinessError::ValidationError {
            field: $field.to_string(),
            message: $message.to_string(),
        }
    };
}

#[macro_export]
macro_rules! not_found {
    ($resource:expr, $id:expr) => {
        $crate::common::errors::BusinessError::NotFound {
            resource: $resource.to_string(),
            id: $id.to_string(),
        }
    };
}

#[macro_export]
macro_rules! forbidden {
    ($action:expr, $resource:expr) => {
        $crate::common::errors::BusinessError::Forbidden {
            action: $action.to_string(),
            resource: $resource.to_string(),
        }
    };
}

/// Extension trait to add business error conversion to `DbErr`
pub trait DbErrorExt {
    fn to_business_error(self, context: &str) -> BusinessError;
}

impl DbErrorExt for DbErr {
    fn to_business_error(self, context: &str) -> BusinessError {
        ErrorMapper::map_db_error(self, context)
    }
}

pub type BusinessResult<T> = Result<T, BusinessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_creation() {
        let err = validation_error!("experiment_name", "must not be empty");
        assert!(matches!(err, BusinessError::ValidationError { .. }));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_mapper_validation() {
        let db_err = DbErr::Custom("Validation failed: voltage must be positive".to_string());
        let business_err = ErrorMapper::map_db_error(db_err, "alert_thresholds");

        match business_err {
            BusinessError::ValidationError { field, message } => {
                assert_eq!(field, "voltage");
                assert!(message.contains("must be positive"));
            }
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_mapper_not_found() {
        let db_err = DbErr::RecordNotFound(
            "Experiment with id '6f1c1f0e-3c4a-4d8e-9d0b-2b1f8a3c7e11' not found".to_string(),
        );
        let business_err = ErrorMapper::map_db_error(db_err, "measurement_experiment");

        match business_err {
            BusinessError::NotFound { resource, id } => {
                assert_eq!(resource, "measurement experiment");
                assert_eq!(id, "6f1c1f0e-3c4a-4d8e-9d0b-2b1f8a3c7e11");
            }
            other => panic!("Expected not found error, got {other:?}"),
        }
    }

    #[test]
    fn test_not_found_without_id_falls_back_to_unknown() {
        let business_err =
            ErrorMapper::map_db_error(DbErr::RecordNotFound("Alert not found".into()), "alert");
        assert!(matches!(
            business_err,
            BusinessError::NotFound { ref id, .. } if id == "unknown"
        ));
    }

    #[test]
    fn test_status_codes_per_variant() {
        assert_eq!(
            BusinessError::Unauthorized {
                message: "missing token".into()
            }
            .status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            forbidden!("recompute", "overview metrics").status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            not_found!("experiment", "abc").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            BusinessError::ExternalServiceError {
                service: "database".into(),
                message: "down".into()
            }
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = not_found!("alert", "42").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "RESOURCE_NOT_FOUND");
        assert_eq!(body["error"]["type"], "NotFound");
        assert_eq!(body["error"]["message"], "alert with id '42' not found");
    }
}
