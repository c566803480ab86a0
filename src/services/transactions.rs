use crate::{
    db::DbPool,
    entities::{
        product::{self, Entity as ProductEntity},
        provider::{self, Entity as ProviderEntity},
        transaction::{self, Entity as TransactionEntity, TransactionType},
        transaction_line_item::{self, Entity as TransactionLineItemEntity},
    },
    errors::ServiceError,
    pagination::{make_pagination_metadata, Paginated},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::{Expr, Func, IntoColumnRef, LikeExpr, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ItemsAndPagesNumber, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select, Set,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

/// One requested (product, quantity) pair. Quantities are positive
/// magnitudes; for outgoing transactions they are consumption amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LineItemRequest {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreateTransactionRequest {
    pub r#type: TransactionType,
    /// Provider reference, incoming transactions only.
    pub provider_id: Option<i64>,
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: String,
    pub date: NaiveDate,
    pub line_items: Vec<LineItemRequest>,
}

/// Optional filters over transaction history, combined conjunctively.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TransactionFilters {
    /// Case-insensitive substring match against any line item's product name.
    pub product_name: Option<String>,
    /// Case-insensitive substring match against the provider's name.
    pub provider_name: Option<String>,
    /// Case-insensitive substring match against the description.
    pub description: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub start_date: Option<NaiveDate>,
    pub finish_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProviderRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LineItemRecord {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionRecord {
    pub id: i64,
    pub r#type: TransactionType,
    pub description: String,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderRef>,
    pub line_items: Vec<LineItemRecord>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Collapses a requested batch to at most one entry per product, quantities
/// for repeated products summed, ordered by product id ascending. Pure and
/// idempotent; the ascending order feeds the positional pairing with the
/// catalog lookup.
pub fn normalize_line_items(items: Vec<LineItemRequest>) -> Vec<LineItemRequest> {
    let mut merged: BTreeMap<i64, i32> = BTreeMap::new();
    for item in items {
        *merged.entry(item.product_id).or_insert(0) += item.quantity;
    }

    merged
        .into_iter()
        .map(|(product_id, quantity)| LineItemRequest {
            product_id,
            quantity,
        })
        .collect()
}

/// Positive-quantity policy: every merged quantity must be strictly greater
/// than zero. Collects every violator, not just the first. Returns the
/// distinct product id list on success.
pub fn check_quantities_positive(items: &[LineItemRequest]) -> Result<Vec<i64>, ServiceError> {
    let mut product_ids = Vec::with_capacity(items.len());
    let mut invalid = Vec::new();

    for item in items {
        product_ids.push(item.product_id);
        if item.quantity <= 0 {
            invalid.push(item.product_id);
        }
    }

    if !invalid.is_empty() {
        return Err(ServiceError::InvalidQuantity(invalid));
    }

    Ok(product_ids)
}

/// Negative-quantity policy, the mirror of [`check_quantities_positive`].
/// Present as the alternate sign convention; the outgoing flow represents
/// consumption as positive magnitudes and does not use it.
pub fn check_quantities_negative(items: &[LineItemRequest]) -> Result<Vec<i64>, ServiceError> {
    let mut product_ids = Vec::with_capacity(items.len());
    let mut invalid = Vec::new();

    for item in items {
        product_ids.push(item.product_id);
        if item.quantity >= 0 {
            invalid.push(item.product_id);
        }
    }

    if !invalid.is_empty() {
        return Err(ServiceError::InvalidQuantity(invalid));
    }

    Ok(product_ids)
}

/// Resolves the requested product ids against the catalog in one bulk read,
/// ordered by id ascending for positional pairing with the normalized batch.
/// Fails with the exact set of unresolved ids, preserving their order.
pub async fn find_products_by_ids<C: ConnectionTrait>(
    conn: &C,
    requested_ids: &[i64],
) -> Result<Vec<product::Model>, ServiceError> {
    let products = ProductEntity::find()
        .filter(product::Column::Id.is_in(requested_ids.iter().copied()))
        .order_by_asc(product::Column::Id)
        .all(conn)
        .await?;

    if products.len() != requested_ids.len() {
        let mut missing = requested_ids.to_vec();
        for found in &products {
            missing.retain(|id| *id != found.id);
        }
        return Err(ServiceError::ProductsNotFound(missing));
    }

    Ok(products)
}

/// Asserts every requested consumption fits within current inventory.
/// `products` and `items` are the positionally-paired outputs of
/// [`find_products_by_ids`] and [`normalize_line_items`]. Collects every
/// insufficient product, not just the first. No mutation occurs here.
pub fn check_stock_sufficiency(
    products: &[product::Model],
    items: &[LineItemRequest],
) -> Result<(), ServiceError> {
    let mut insufficient = Vec::new();

    for (product, item) in products.iter().zip(items) {
        if item.quantity > product.inventory {
            insufficient.push(product.id);
        }
    }

    if !insufficient.is_empty() {
        return Err(ServiceError::InsufficientStock(insufficient));
    }

    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// `lower(column) LIKE '%needle%'` with escaped LIKE wildcards.
fn lower_contains(column: impl IntoColumnRef, needle: &str) -> SimpleExpr {
    let escaped = needle
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");

    Expr::expr(Func::lower(Expr::col(column)))
        .like(LikeExpr::new(format!("%{}%", escaped)).escape('\\'))
}

/// Service owning the inventory transaction reconciliation engine: validated
/// atomic creation of stock movements and filtered history reads.
#[derive(Clone)]
pub struct TransactionService {
    db: Arc<DbPool>,
}

impl TransactionService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Creates an incoming or outgoing transaction.
    ///
    /// The header insert, the line item inserts, and every inventory update
    /// run inside one database transaction; if any step fails, none of the
    /// effects are observable.
    #[instrument(
        skip(self, request),
        fields(transaction_type = %request.r#type, line_items = request.line_items.len())
    )]
    pub async fn create_transaction(
        &self,
        acting_user: i64,
        request: CreateTransactionRequest,
    ) -> Result<TransactionRecord, ServiceError> {
        request.validate()?;

        if request.line_items.is_empty() {
            return Err(ServiceError::EmptyTransaction);
        }

        let db = &*self.db;
        let header = db
            .transaction::<_, transaction::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let provider_id = match request.r#type {
                        TransactionType::Incoming => {
                            if let Some(provider_id) = request.provider_id {
                                ProviderEntity::find_by_id(provider_id)
                                    .one(txn)
                                    .await?
                                    .ok_or(ServiceError::ProviderNotFound(provider_id))?;
                            }
                            request.provider_id
                        }
                        TransactionType::Outgoing => None,
                    };

                    let line_items = normalize_line_items(request.line_items);
                    let product_ids = check_quantities_positive(&line_items)?;
                    let products = find_products_by_ids(txn, &product_ids).await?;

                    if request.r#type == TransactionType::Outgoing {
                        check_stock_sufficiency(&products, &line_items)?;
                    }

                    let header = transaction::ActiveModel {
                        r#type: Set(request.r#type.as_str().to_string()),
                        provider_id: Set(provider_id),
                        description: Set(request.description),
                        date: Set(request.date),
                        created_by: Set(acting_user),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    TransactionLineItemEntity::insert_many(line_items.iter().map(|item| {
                        transaction_line_item::ActiveModel {
                            transaction_id: Set(header.id),
                            product_id: Set(item.product_id),
                            quantity: Set(item.quantity),
                            ..Default::default()
                        }
                    }))
                    .exec(txn)
                    .await?;

                    let sign: i32 = match request.r#type {
                        TransactionType::Incoming => 1,
                        TransactionType::Outgoing => -1,
                    };

                    // Re-validate non-negativity at write time: the sufficiency
                    // pre-check cannot see writers that committed in between.
                    let mut driven_negative = Vec::new();
                    for (product, item) in products.into_iter().zip(line_items.iter()) {
                        let next = product.inventory + sign * item.quantity;
                        if next < 0 {
                            driven_negative.push(product.id);
                            continue;
                        }

                        let mut active: product::ActiveModel = product.into();
                        active.inventory = Set(next);
                        active.update(txn).await?;
                    }

                    if !driven_negative.is_empty() {
                        return Err(ServiceError::InsufficientStock(driven_negative));
                    }

                    Ok(header)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        info!(transaction_id = header.id, "Transaction created");

        self.get_transaction(header.id).await
    }

    /// Retrieves one transaction with its line items and products.
    #[instrument(skip(self))]
    pub async fn get_transaction(&self, id: i64) -> Result<TransactionRecord, ServiceError> {
        let db = &*self.db;

        let header = TransactionEntity::find_by_id(id)
            .one(db)
            .await?
            .ok_or(ServiceError::NoTransactionsFound)?;

        let mut records = hydrate_records(db, vec![header]).await?;
        Ok(records.remove(0))
    }

    /// Retrieves every transaction matching the filters, ordered by id
    /// ascending.
    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        filters: &TransactionFilters,
    ) -> Result<Vec<TransactionRecord>, ServiceError> {
        let db = &*self.db;

        let headers = self
            .filtered_query(filters)
            .await?
            .order_by_asc(transaction::Column::Id)
            .all(db)
            .await?;

        if headers.is_empty() {
            return Err(ServiceError::NoTransactionsFound);
        }

        hydrate_records(db, headers).await
    }

    /// Retrieves one page of matching transactions plus pagination metadata.
    #[instrument(skip(self))]
    pub async fn list_transactions_paged(
        &self,
        filters: &TransactionFilters,
        page: u64,
        per_page: u64,
    ) -> Result<Paginated<TransactionRecord, TransactionFilters>, ServiceError> {
        if page < 1 {
            return Err(ServiceError::InvalidPage {
                page,
                total_pages: 0,
            });
        }
        if per_page < 1 {
            return Err(ServiceError::InvalidPageSize(per_page));
        }

        let db = &*self.db;

        let paginator = self
            .filtered_query(filters)
            .await?
            .order_by_asc(transaction::Column::Id)
            .paginate(db, per_page);

        let ItemsAndPagesNumber {
            number_of_items: total_items,
            number_of_pages: total_pages,
        } = paginator.num_items_and_pages().await?;

        if page > total_pages && total_pages > 0 {
            return Err(ServiceError::InvalidPage { page, total_pages });
        }

        let headers = paginator.fetch_page(page - 1).await?;
        if headers.is_empty() {
            return Err(ServiceError::NoTransactionsFound);
        }

        let records = hydrate_records(db, headers).await?;
        let pagination_metadata =
            make_pagination_metadata(page, total_pages, per_page, total_items, filters.clone());

        Ok(Paginated {
            pagination_metadata,
            records,
        })
    }

    /// Builds the filtered history query. The date range is validated before
    /// anything touches storage.
    async fn filtered_query(
        &self,
        filters: &TransactionFilters,
    ) -> Result<Select<TransactionEntity>, ServiceError> {
        let mut query = TransactionEntity::find();

        match (filters.start_date, filters.finish_date) {
            (Some(start), Some(finish)) => {
                if start > finish {
                    return Err(ServiceError::InvalidDateRange);
                }
                query = query
                    .filter(transaction::Column::Date.gte(start))
                    .filter(transaction::Column::Date.lte(finish));
            }
            (Some(start), None) => {
                query = query.filter(transaction::Column::Date.gte(start));
            }
            (None, Some(finish)) => {
                query = query.filter(transaction::Column::Date.lte(finish));
            }
            (None, None) => {}
        }

        if let Some(provider_name) = non_empty(&filters.provider_name) {
            query = query
                .join(JoinType::InnerJoin, transaction::Relation::Provider.def())
                .filter(lower_contains(
                    (provider::Entity, provider::Column::Name),
                    provider_name,
                ));
        }

        if let Some(description) = non_empty(&filters.description) {
            query = query.filter(lower_contains(
                (transaction::Entity, transaction::Column::Description),
                description,
            ));
        }

        if let Some(transaction_type) = filters.transaction_type {
            query = query.filter(transaction::Column::Type.eq(transaction_type.as_str()));
        }

        if let Some(product_name) = non_empty(&filters.product_name) {
            let transaction_ids: Vec<i64> = TransactionLineItemEntity::find()
                .join(
                    JoinType::InnerJoin,
                    transaction_line_item::Relation::Product.def(),
                )
                .filter(lower_contains(
                    (product::Entity, product::Column::Name),
                    product_name,
                ))
                .select_only()
                .column(transaction_line_item::Column::TransactionId)
                .into_tuple()
                .all(&*self.db)
                .await?;

            query = query.filter(transaction::Column::Id.is_in(transaction_ids));
        }

        Ok(query)
    }
}

/// Loads line items, products, and providers for the given headers in three
/// bulk reads and assembles the response records in input order.
async fn hydrate_records<C: ConnectionTrait>(
    conn: &C,
    headers: Vec<transaction::Model>,
) -> Result<Vec<TransactionRecord>, ServiceError> {
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let transaction_ids: Vec<i64> = headers.iter().map(|t| t.id).collect();
    let line_items = TransactionLineItemEntity::find()
        .filter(transaction_line_item::Column::TransactionId.is_in(transaction_ids))
        .order_by_asc(transaction_line_item::Column::ProductId)
        .all(conn)
        .await?;

    let mut product_ids: Vec<i64> = line_items.iter().map(|item| item.product_id).collect();
    product_ids.sort_unstable();
    product_ids.dedup();

    let products: HashMap<i64, product::Model> = ProductEntity::find()
        .filter(product::Column::Id.is_in(product_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut provider_ids: Vec<i64> = headers.iter().filter_map(|t| t.provider_id).collect();
    provider_ids.sort_unstable();
    provider_ids.dedup();

    let providers: HashMap<i64, provider::Model> = if provider_ids.is_empty() {
        HashMap::new()
    } else {
        ProviderEntity::find()
            .filter(provider::Column::Id.is_in(provider_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };

    let mut items_by_transaction: HashMap<i64, Vec<LineItemRecord>> = HashMap::new();
    for item in line_items {
        let product_name = products
            .get(&item.product_id)
            .map(|p| p.name.clone())
            .unwrap_or_default();

        items_by_transaction
            .entry(item.transaction_id)
            .or_default()
            .push(LineItemRecord {
                product_id: item.product_id,
                product_name,
                quantity: item.quantity,
            });
    }

    let mut records = Vec::with_capacity(headers.len());
    for header in headers {
        let r#type = TransactionType::from_str(&header.r#type).ok_or_else(|| {
            ServiceError::DatabaseError(sea_orm::DbErr::Custom(format!(
                "unknown transaction type stored for transaction {}: {}",
                header.id, header.r#type
            )))
        })?;

        let provider = header
            .provider_id
            .and_then(|pid| providers.get(&pid))
            .map(|p| ProviderRef {
                id: p.id,
                name: p.name.clone(),
            });

        records.push(TransactionRecord {
            id: header.id,
            r#type,
            description: header.description,
            date: header.date,
            provider,
            line_items: items_by_transaction.remove(&header.id).unwrap_or_default(),
            created_by: header.created_by,
            created_at: header.created_at,
            updated_at: header.updated_at,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn item(product_id: i64, quantity: i32) -> LineItemRequest {
        LineItemRequest {
            product_id,
            quantity,
        }
    }

    fn product_with_inventory(id: i64, inventory: i32) -> product::Model {
        product::Model {
            id,
            name: format!("product-{}", id),
            size: "M".to_string(),
            inventory,
            weight: 1.0,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn normalize_merges_duplicates_and_sorts_by_product_id() {
        let normalized = normalize_line_items(vec![item(3, 2), item(1, 3), item(3, 5), item(1, 2)]);
        assert_eq!(normalized, vec![item(1, 5), item(3, 7)]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_line_items(vec![item(2, 4), item(5, 1), item(2, 1)]);
        let twice = normalize_line_items(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_of_empty_batch_is_empty() {
        assert!(normalize_line_items(Vec::new()).is_empty());
    }

    #[test]
    fn positive_policy_returns_distinct_ids_in_order() {
        let ids = check_quantities_positive(&[item(1, 5), item(3, 7)]).unwrap();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn positive_policy_collects_all_violators() {
        let err = check_quantities_positive(&[item(1, 0), item(2, 3), item(3, -4)]).unwrap_err();
        assert_matches!(err, ServiceError::InvalidQuantity(ids) => {
            assert_eq!(ids, vec![1, 3]);
        });
    }

    #[test]
    fn negative_policy_mirrors_positive_policy() {
        let ids = check_quantities_negative(&[item(1, -5), item(2, -1)]).unwrap();
        assert_eq!(ids, vec![1, 2]);

        let err = check_quantities_negative(&[item(1, -5), item(2, 0), item(3, 2)]).unwrap_err();
        assert_matches!(err, ServiceError::InvalidQuantity(ids) => {
            assert_eq!(ids, vec![2, 3]);
        });
    }

    #[test]
    fn sufficiency_check_collects_every_short_product() {
        let products = vec![
            product_with_inventory(1, 10),
            product_with_inventory(2, 0),
            product_with_inventory(3, 5),
        ];
        let items = [item(1, 11), item(2, 1), item(3, 5)];

        let err = check_stock_sufficiency(&products, &items).unwrap_err();
        assert_matches!(err, ServiceError::InsufficientStock(ids) => {
            assert_eq!(ids, vec![1, 2]);
        });
    }

    #[test]
    fn sufficiency_check_allows_exact_consumption() {
        let products = vec![product_with_inventory(1, 5)];
        assert!(check_stock_sufficiency(&products, &[item(1, 5)]).is_ok());
    }
}
