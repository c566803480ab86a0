use crate::errors::{ErrorResponse, ServiceError};
use crate::services::transactions::{
    CreateTransactionRequest, TransactionFilters, TransactionRecord,
};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::entities::transaction::TransactionType;

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct ListTransactionsQuery {
    pub product_name: Option<String>,
    pub provider_name: Option<String>,
    pub description: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub start_date: Option<NaiveDate>,
    pub finish_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct PagedTransactionsQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    pub product_name: Option<String>,
    pub provider_name: Option<String>,
    pub description: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub start_date: Option<NaiveDate>,
    pub finish_date: Option<NaiveDate>,
}

fn default_page() -> u64 {
    1
}
fn default_per_page() -> u64 {
    20
}

impl From<ListTransactionsQuery> for TransactionFilters {
    fn from(query: ListTransactionsQuery) -> Self {
        TransactionFilters {
            product_name: query.product_name,
            provider_name: query.provider_name,
            description: query.description,
            transaction_type: query.transaction_type,
            start_date: query.start_date,
            finish_date: query.finish_date,
        }
    }
}

impl PagedTransactionsQuery {
    fn filters(&self) -> TransactionFilters {
        TransactionFilters {
            product_name: self.product_name.clone(),
            provider_name: self.provider_name.clone(),
            description: self.description.clone(),
            transaction_type: self.transaction_type,
            start_date: self.start_date,
            finish_date: self.finish_date,
        }
    }
}

/// Create the transactions router
pub fn transactions_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_transactions).post(create_transaction))
        .route("/paged", get(list_transactions_paged))
        .route("/:id", get(get_transaction))
}

fn acting_user_id(headers: &HeaderMap) -> Result<i64, ServiceError> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or_else(|| {
            ServiceError::ValidationError("X-User-Id header must be a valid user id".to_string())
        })
}

/// Translates batch stock errors into display rows (id, name, inventory) so
/// the caller can show one row per offending product without a second
/// request. Falls back to the plain error payload when the catalog read
/// fails or resolves nothing.
async fn stock_error_response(state: &AppState, err: ServiceError) -> Response {
    let ids = match &err {
        ServiceError::InvalidQuantity(ids) | ServiceError::InsufficientStock(ids) => ids.clone(),
        _ => return err.into_response(),
    };

    match state.product_catalog.stock_rows(&ids).await {
        Ok(rows) if !rows.is_empty() => {
            let status = err.status_code();
            let body = ErrorResponse {
                error: status.canonical_reason().unwrap_or("Error").to_string(),
                message: err.response_message(),
                details: Some(json!({ "products": rows })),
                timestamp: Utc::now().to_rfc3339(),
            };
            (status, Json(body)).into_response()
        }
        _ => err.into_response(),
    }
}

/// Create an incoming or outgoing transaction
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transaction created", body = TransactionRecord),
        (status = 400, description = "Empty transaction or invalid request", body = ErrorResponse),
        (status = 404, description = "Product or provider not found", body = ErrorResponse),
        (status = 422, description = "Invalid quantity or insufficient stock", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "transactions"
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, Response> {
    let acting_user = acting_user_id(&headers).map_err(IntoResponse::into_response)?;

    match state
        .transaction_service
        .create_transaction(acting_user, request)
        .await
    {
        Ok(record) => Ok((StatusCode::CREATED, Json(record))),
        Err(err) => Err(stock_error_response(&state, err).await),
    }
}

/// Fetch one transaction by id
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    params(("id" = i64, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction found", body = TransactionRecord),
        (status = 404, description = "Transaction not found", body = ErrorResponse)
    ),
    tag = "transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let record = state.transaction_service.get_transaction(id).await?;
    Ok(Json(record))
}

/// List every transaction matching the filters
#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    params(ListTransactionsQuery),
    responses(
        (status = 200, description = "Matching transactions", body = [TransactionRecord]),
        (status = 400, description = "Invalid date range", body = ErrorResponse),
        (status = 404, description = "No transactions found", body = ErrorResponse)
    ),
    tag = "transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let filters: TransactionFilters = query.into();
    let records = state.transaction_service.list_transactions(&filters).await?;
    Ok(Json(records))
}

/// List one page of matching transactions plus pagination metadata
#[utoipa::path(
    get,
    path = "/api/v1/transactions/paged",
    params(PagedTransactionsQuery),
    responses(
        (status = 200, description = "One page of matching transactions"),
        (status = 400, description = "Invalid page, page size, or date range", body = ErrorResponse),
        (status = 404, description = "No transactions found", body = ErrorResponse)
    ),
    tag = "transactions"
)]
pub async fn list_transactions_paged(
    State(state): State<AppState>,
    Query(query): Query<PagedTransactionsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let filters = query.filters();
    let page = state
        .transaction_service
        .list_transactions_paged(&filters, query.page, query.per_page)
        .await?;
    Ok(Json(page))
}
