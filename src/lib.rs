//! StockLedger API Library
//!
//! Inventory tracking backend: records stock-moving transactions (incoming
//! restock, outgoing sale/use) and keeps per-product inventory counters
//! consistent with the sum of all transactions affecting them.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod pagination;
pub mod services;

use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::db::DbPool;
use crate::services::products::ProductCatalogService;
use crate::services::transactions::TransactionService;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub transaction_service: TransactionService,
    pub product_catalog: ProductCatalogService,
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: config::AppConfig) -> Self {
        let transaction_service = TransactionService::new(db.clone());
        let product_catalog = ProductCatalogService::new(db.clone());

        Self {
            db,
            config,
            transaction_service,
            product_catalog,
        }
    }
}

/// Assembles the application router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/v1/transactions",
            handlers::transactions::transactions_router(),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
