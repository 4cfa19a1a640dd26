use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

/// Error body returned for every failed request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict")
    pub error: String,
    /// Taxonomy kind for caller-side localization
    pub kind: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// One same-day duplicate detected during order creation.
///
/// Field names are part of the public contract: the operator UI reads
/// `existingQty` / `newQty` straight out of the 409 payload to render the
/// merge-or-create decision dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DuplicateMatch {
    #[serde(rename = "orderId")]
    pub order_id: Uuid,
    #[serde(rename = "orderNumber")]
    pub order_number: String,
    #[serde(rename = "productId")]
    pub product_id: Uuid,
    #[serde(rename = "existingQty")]
    pub existing_qty: i32,
    #[serde(rename = "newQty")]
    pub new_qty: i32,
    pub unit: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Too early: {0}")]
    TooEarly(String),

    /// Same-day duplicate detected and the caller did not pick a resolution.
    /// This is an expected branch of order creation, not a failure: the 409
    /// response carries everything the caller needs to decide merge vs create.
    #[error("Duplicate order conflict ({} item(s))", .0.len())]
    DuplicateConflict(Vec<DuplicateMatch>),

    #[error("Concurrent modification of {0}")]
    ConcurrentModification(Uuid),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::DuplicateConflict(_) | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::InvalidTransition(_) | Self::TooEarly(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message suitable for HTTP responses. Internal errors return a generic
    /// message so storage details never leak to callers.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Taxonomy kind attached to responses so the caller can localize.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "transient",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::TooEarly(_) => "too_early",
            Self::DuplicateConflict(_) => "duplicate_conflict",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::InternalError(_) | Self::Other(_) => "internal",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let ServiceError::DatabaseError(ref err) = self {
            tracing::error!(error = %err, "request failed with storage error");
        }

        // Duplicate conflicts carry structure the UI consumes directly.
        if let ServiceError::DuplicateConflict(duplicates) = &self {
            let body = json!({
                "error": "Conflict",
                "kind": self.kind(),
                "message": self.response_message(),
                "duplicates": duplicates,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            });
            return (status, Json(body)).into_response();
        }

        let body = json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "kind": self.kind(),
            "message": self.response_message(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_conflict_maps_to_409() {
        let err = ServiceError::DuplicateConflict(vec![]);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.kind(), "duplicate_conflict");
    }

    #[test]
    fn guarded_transition_errors_map_to_422() {
        assert_eq!(
            ServiceError::InvalidTransition("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::TooEarly("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn duplicate_match_serializes_ui_field_names() {
        let m = DuplicateMatch {
            order_id: Uuid::nil(),
            order_number: "PED-1".into(),
            product_id: Uuid::nil(),
            existing_qty: 3,
            new_qty: 2,
            unit: "unidad".into(),
        };
        let value = serde_json::to_value(&m).unwrap();
        assert_eq!(value["existingQty"], 3);
        assert_eq!(value["newQty"], 2);
        assert_eq!(value["unit"], "unidad");
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = ServiceError::InternalError("connection string postgres://".into());
        assert_eq!(err.response_message(), "Internal server error");
    }
}
