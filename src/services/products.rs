use crate::{
    db::DbPool,
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

/// One row of stock detail used when rendering batch errors
/// (invalid quantity, insufficient stock) back to the caller.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockRow {
    pub id: i64,
    pub name: String,
    pub inventory: i32,
}

/// Read-only catalog access used by the transaction engine's boundary layer.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DbPool>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Resolves product ids into display rows (id, name, current inventory).
    /// Ids that do not resolve are simply absent from the result.
    #[instrument(skip(self))]
    pub async fn stock_rows(&self, product_ids: &[i64]) -> Result<Vec<StockRow>, ServiceError> {
        let db = &*self.db;

        let products = ProductEntity::find()
            .filter(product::Column::Id.is_in(product_ids.iter().copied()))
            .order_by_asc(product::Column::Id)
            .all(db)
            .await?;

        Ok(products
            .into_iter()
            .map(|p| StockRow {
                id: p.id,
                name: p.name,
                inventory: p.inventory,
            })
            .collect())
    }
}
