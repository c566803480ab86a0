use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

/// Standard error payload returned by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Structured error details (e.g. the offending product ids)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

fn fmt_ids(ids: &[i64]) -> String {
    let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    ids.join(", ")
}

/// Business-rule and infrastructure failures of the transaction engine.
///
/// Batch-style variants carry the complete offending id set as structured
/// data, never as serialized text, so callers can render one row per product
/// without re-parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Transaction has no line items")]
    EmptyTransaction,

    #[error("Invalid quantity for products: {}", fmt_ids(.0))]
    InvalidQuantity(Vec<i64>),

    #[error("Products not found: {}", fmt_ids(.0))]
    ProductsNotFound(Vec<i64>),

    #[error("Provider {0} not found")]
    ProviderNotFound(i64),

    #[error("Not enough stock for products: {}", fmt_ids(.0))]
    InsufficientStock(Vec<i64>),

    #[error("Invalid date range: start date is after finish date")]
    InvalidDateRange,

    #[error("Invalid page {page}, the total of pages is {total_pages}")]
    InvalidPage { page: u64, total_pages: u64 },

    #[error("Items per page must be greater than zero: {0}")]
    InvalidPageSize(u64),

    #[error("No transactions found")]
    NoTransactionsFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyTransaction
            | Self::InvalidDateRange
            | Self::InvalidPage { .. }
            | Self::InvalidPageSize(_)
            | Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::InvalidQuantity(_) | Self::InsufficientStock(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::ProductsNotFound(_) | Self::ProviderNotFound(_) | Self::NoTransactionsFound => {
                StatusCode::NOT_FOUND
            }
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Infrastructure errors return generic messages to avoid leaking details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Structured payload for batch-style errors: the complete offending
    /// product id set, not just the first violation.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::InvalidQuantity(ids)
            | Self::ProductsNotFound(ids)
            | Self::InsufficientStock(ids) => Some(json!({ "product_ids": ids })),
            Self::ProviderNotFound(id) => Some(json!({ "provider_id": id })),
            Self::InvalidPage { page, total_pages } => {
                Some(json!({ "page": page, "total_pages": total_pages }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: self.details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::EmptyTransaction.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidQuantity(vec![1]).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::ProductsNotFound(vec![1]).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ProviderNotFound(9).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::InsufficientStock(vec![1, 2]).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::InvalidDateRange.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidPage {
                page: 4,
                total_pages: 3
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::NoTransactionsFound.status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn batch_errors_carry_all_offenders_as_structured_data() {
        let err = ServiceError::InsufficientStock(vec![3, 7, 12]);
        let details = err.details().expect("details expected");
        assert_eq!(details["product_ids"], json!([3, 7, 12]));

        let err = ServiceError::InvalidQuantity(vec![5]);
        assert_eq!(err.details().unwrap()["product_ids"], json!([5]));
    }

    #[test]
    fn database_error_message_is_generic() {
        let err = ServiceError::DatabaseError(sea_orm::error::DbErr::Custom(
            "connection refused on 10.0.0.3".to_string(),
        ));
        assert_eq!(err.response_message(), "Database error");
    }

    #[tokio::test]
    async fn error_response_serializes_details() {
        let response = ServiceError::ProductsNotFound(vec![42]).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.details.unwrap()["product_ids"], json!([42]));
    }
}
