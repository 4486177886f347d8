//! Shared error handling utilities.

use std::collections::BTreeMap;

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::store::StoreError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    #[schema(example = "validation failed: name is required")]
    pub error: String,
    #[schema(example = "VALIDATION_ERROR")]
    pub code: String,
    /// Field name to message, for validation and referential failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, String>>,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: BTreeMap<String, String>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn not_found(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::NOT_FOUND, Json(Self::new(error, code)))
    }

    pub fn service_unavailable(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::SERVICE_UNAVAILABLE, Json(Self::new(error, code)))
    }

    pub fn internal(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self::new(error, code)),
        )
    }

    pub fn db_error() -> (StatusCode, Json<Self>) {
        Self::internal("Database error", "DB_ERROR")
    }

    /// Maps the store taxonomy onto HTTP. Internal detail is logged, never
    /// returned.
    pub fn from_store(err: StoreError) -> (StatusCode, Json<Self>) {
        match err {
            StoreError::Validation(e) => {
                let message = e.to_string();
                (
                    StatusCode::BAD_REQUEST,
                    Json(Self::new(message, "VALIDATION_ERROR").with_details(e.fields)),
                )
            }
            StoreError::Referential(e) => {
                let message = e.to_string();
                let details = BTreeMap::from([(
                    e.foreign_key.clone(),
                    format!("references a {} that does not exist", e.target),
                )]);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(Self::new(message, "REFERENTIAL_ERROR").with_details(details)),
                )
            }
            StoreError::NotFound { entity, .. } => {
                let code = format!("{}_NOT_FOUND", to_upper_snake(&entity));
                Self::not_found(format!("{} not found", entity), code)
            }
            StoreError::Connection(e) => {
                warn!(error = %e, "Storage unavailable");
                Self::service_unavailable("Database unavailable", "DB_UNAVAILABLE")
            }
            other => {
                error!(error = %other, kind = other.kind(), "Store operation failed");
                Self::db_error()
            }
        }
    }
}

impl From<StoreError> for (StatusCode, Json<ApiError>) {
    fn from(err: StoreError) -> Self {
        ApiError::from_store(err)
    }
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

fn to_upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.push(c.to_ascii_uppercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ConnectionError, ReferentialError, ValidationError};
    use uuid::Uuid;

    #[test]
    fn test_validation_maps_to_bad_request_with_details() {
        let err = ValidationError::field("items", "must contain at least one item");
        let (status, Json(body)) = ApiError::from_store(err.into());

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "VALIDATION_ERROR");
        assert_eq!(
            body.details.unwrap()["items"],
            "must contain at least one item"
        );
    }

    #[test]
    fn test_referential_maps_to_unprocessable() {
        let err = ReferentialError {
            entity: "Employee".to_string(),
            foreign_key: "department_id".to_string(),
            target: "Department".to_string(),
            id: Some(Uuid::new_v4()),
        };
        let (status, Json(body)) = ApiError::from_store(err.into());

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.code, "REFERENTIAL_ERROR");
        assert!(body.details.unwrap().contains_key("department_id"));
    }

    #[test]
    fn test_not_found_code_names_entity() {
        let (status, Json(body)) =
            ApiError::from_store(StoreError::not_found("RequestItem", Uuid::new_v4()));

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "REQUEST_ITEM_NOT_FOUND");
        assert_eq!(body.error, "RequestItem not found");
    }

    #[test]
    fn test_connection_maps_to_unavailable() {
        let err = ConnectionError::PoolTimeout("timed out".to_string());
        let (status, Json(body)) = ApiError::from_store(err.into());

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.code, "DB_UNAVAILABLE");
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let (status, Json(body)) =
            ApiError::from_store(StoreError::Internal("secret detail".to_string()));

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Database error");
        assert!(body.details.is_none());
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("details").is_none());
    }
}
