use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::logic::validate::{ValidationErrors, Validator};
use crate::store::error::StoreError;

pub type AppState<S> = Arc<S>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub environment: String,
    pub version: String,
    pub timestamp: String,
}

pub async fn health_check(environment: String) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "available".to_string(),
        environment,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            fields: None,
        }
    }

    pub fn with_fields(errors: ValidationErrors) -> Self {
        Self {
            error: "validation failed".to_string(),
            fields: Some(errors.into_inner()),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<T, ApiError>;

pub fn not_found(what: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(&format!("{} not found", what))),
    )
}

pub fn validation_failed(errors: ValidationErrors) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse::with_fields(errors)),
    )
}

/// Turn collected validation errors into a 422
pub fn validated(v: Validator) -> ApiResult<()> {
    v.finish().map_err(validation_failed)
}

/// Map a store failure onto its HTTP status, keeping the error kind visible to the caller
pub fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound => not_found("record"),
        StoreError::EditConflict => (StatusCode::CONFLICT, Json(ErrorResponse::new(&err.to_string()))),
        StoreError::DuplicateKey { .. } => {
            let field = err.duplicate_field().unwrap_or_default();
            validation_failed(ValidationErrors::single(&field, "a record with this value already exists"))
        }
        StoreError::Validation(errors) => validation_failed(errors),
        StoreError::Constraint { ref constraint } => {
            log::debug!("constraint {} rejected the request", constraint);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse::new("a referenced record does not exist or a value is out of range")),
            )
        }
        StoreError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, Json(ErrorResponse::new(&err.to_string()))),
        StoreError::Database(_) | StoreError::Unexpected(_) => {
            log::error!("store failure: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "the server encountered a problem and could not process your request",
                )),
            )
        }
    }
}

pub fn internal_error(err: anyhow::Error) -> ApiError {
    store_error(StoreError::Unexpected(err))
}

/// 201 with a `Location` header pointing at the new resource
pub fn created<T: Serialize>(location: String, body: T) -> Response {
    let mut response = (StatusCode::CREATED, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn deleted(what: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: format!("{} successfully deleted", what),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_store_errors_map_to_statuses() {
        assert_eq!(store_error(StoreError::NotFound).0, StatusCode::NOT_FOUND);
        assert_eq!(store_error(StoreError::EditConflict).0, StatusCode::CONFLICT);
        assert_eq!(
            store_error(StoreError::constraint("assignment_role_id_fkey")).0,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            store_error(StoreError::Timeout(Duration::from_secs(3))).0,
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            store_error(StoreError::Unexpected(anyhow::anyhow!("boom"))).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_duplicate_key_is_reported_on_the_field() {
        let (status, Json(body)) = store_error(StoreError::duplicate("client_name_key"));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let fields = body.fields.unwrap();
        assert_eq!(fields.get("name").map(String::as_str), Some("a record with this value already exists"));
    }

    #[test]
    fn test_error_body_omits_empty_fields() {
        let body = serde_json::to_value(ErrorResponse::new("nope")).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "nope" }));
    }
}
