mod common;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};
use std::sync::Arc;
use stockledger_api::{
    entities::{
        transaction::{Entity as TransactionEntity, TransactionType},
        transaction_line_item::Entity as TransactionLineItemEntity,
    },
    errors::ServiceError,
    services::transactions::{
        CreateTransactionRequest, LineItemRequest, TransactionFilters, TransactionService,
    },
};

use common::{inventory_of, seed_product, seed_provider, seed_user, setup_db};

fn line(product_id: i64, quantity: i32) -> LineItemRequest {
    LineItemRequest {
        product_id,
        quantity,
    }
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn incoming(line_items: Vec<LineItemRequest>, provider_id: Option<i64>) -> CreateTransactionRequest {
    CreateTransactionRequest {
        r#type: TransactionType::Incoming,
        provider_id,
        description: "restock".to_string(),
        date: date(2024, 3, 1),
        line_items,
    }
}

fn outgoing(line_items: Vec<LineItemRequest>) -> CreateTransactionRequest {
    CreateTransactionRequest {
        r#type: TransactionType::Outgoing,
        provider_id: None,
        description: "sale".to_string(),
        date: date(2024, 3, 2),
        line_items,
    }
}

fn service(db: &DatabaseConnection) -> TransactionService {
    TransactionService::new(Arc::new(db.clone()))
}

#[tokio::test]
async fn incoming_then_oversized_outgoing_scenario() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let p1 = seed_product(&db, "Blue Shirt", 10).await;
    let svc = service(&db);

    let record = svc
        .create_transaction(user.id, incoming(vec![line(p1.id, 5)], None))
        .await
        .expect("incoming create should succeed");

    assert_eq!(record.r#type, TransactionType::Incoming);
    assert_eq!(record.line_items.len(), 1);
    assert_eq!(record.line_items[0].quantity, 5);
    assert_eq!(record.line_items[0].product_name, "Blue Shirt");
    assert_eq!(record.created_by, user.id);
    assert_eq!(inventory_of(&db, p1.id).await, 15);

    let err = svc
        .create_transaction(user.id, outgoing(vec![line(p1.id, 20)]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(ids) => {
        assert_eq!(ids, vec![p1.id]);
    });
    assert_eq!(inventory_of(&db, p1.id).await, 15);
}

#[tokio::test]
async fn outgoing_decrements_inventory() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let p1 = seed_product(&db, "Yellow Shirt", 10).await;
    let p2 = seed_product(&db, "Green Shirt", 4).await;
    let svc = service(&db);

    svc.create_transaction(user.id, outgoing(vec![line(p1.id, 7), line(p2.id, 4)]))
        .await
        .expect("outgoing create should succeed");

    assert_eq!(inventory_of(&db, p1.id).await, 3);
    assert_eq!(inventory_of(&db, p2.id).await, 0);
}

#[tokio::test]
async fn duplicate_line_items_are_merged_before_persistence() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let p1 = seed_product(&db, "Blue Shirt", 10).await;
    let svc = service(&db);

    let record = svc
        .create_transaction(user.id, incoming(vec![line(p1.id, 3), line(p1.id, 2)], None))
        .await
        .expect("incoming create should succeed");

    assert_eq!(record.line_items.len(), 1);
    assert_eq!(record.line_items[0].quantity, 5);
    assert_eq!(inventory_of(&db, p1.id).await, 15);

    let stored_items = TransactionLineItemEntity::find()
        .all(&db)
        .await
        .expect("failed to fetch line items");
    assert_eq!(stored_items.len(), 1);
    assert_eq!(stored_items[0].quantity, 5);
}

#[tokio::test]
async fn empty_batch_is_rejected_before_any_lookup() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let svc = service(&db);

    let err = svc
        .create_transaction(user.id, incoming(Vec::new(), None))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::EmptyTransaction);
}

#[tokio::test]
async fn non_positive_quantities_collect_every_violator() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let p1 = seed_product(&db, "A", 10).await;
    let p2 = seed_product(&db, "B", 10).await;
    let p3 = seed_product(&db, "C", 10).await;
    let svc = service(&db);

    let err = svc
        .create_transaction(
            user.id,
            incoming(vec![line(p1.id, 0), line(p2.id, 5), line(p3.id, -2)], None),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidQuantity(ids) => {
        assert_eq!(ids, vec![p1.id, p3.id]);
    });

    assert_eq!(inventory_of(&db, p2.id).await, 10);
}

#[tokio::test]
async fn unknown_product_reports_exactly_the_missing_ids() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let p1 = seed_product(&db, "Blue Shirt", 10).await;
    let svc = service(&db);

    let err = svc
        .create_transaction(user.id, incoming(vec![line(p1.id, 2), line(999, 1)], None))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ProductsNotFound(ids) => {
        assert_eq!(ids, vec![999]);
    });

    assert_eq!(inventory_of(&db, p1.id).await, 10);
    let persisted = TransactionEntity::find()
        .count(&db)
        .await
        .expect("failed to count transactions");
    assert_eq!(persisted, 0);
}

#[tokio::test]
async fn insufficient_stock_reports_every_short_product_and_rolls_back() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let p1 = seed_product(&db, "A", 1).await;
    let p2 = seed_product(&db, "B", 50).await;
    let p3 = seed_product(&db, "C", 0).await;
    let svc = service(&db);

    let err = svc
        .create_transaction(
            user.id,
            outgoing(vec![line(p1.id, 2), line(p2.id, 10), line(p3.id, 1)]),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(ids) => {
        assert_eq!(ids, vec![p1.id, p3.id]);
    });

    assert_eq!(inventory_of(&db, p1.id).await, 1);
    assert_eq!(inventory_of(&db, p2.id).await, 50);
    assert_eq!(inventory_of(&db, p3.id).await, 0);

    let persisted = TransactionEntity::find()
        .count(&db)
        .await
        .expect("failed to count transactions");
    assert_eq!(persisted, 0);
}

#[tokio::test]
async fn incoming_with_unknown_provider_is_rejected() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let p1 = seed_product(&db, "Blue Shirt", 10).await;
    let svc = service(&db);

    let err = svc
        .create_transaction(user.id, incoming(vec![line(p1.id, 5)], Some(777)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ProviderNotFound(777));
    assert_eq!(inventory_of(&db, p1.id).await, 10);
}

#[tokio::test]
async fn incoming_records_its_provider() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let provider = seed_provider(&db, "Acme Textiles").await;
    let p1 = seed_product(&db, "Blue Shirt", 10).await;
    let svc = service(&db);

    let record = svc
        .create_transaction(user.id, incoming(vec![line(p1.id, 5)], Some(provider.id)))
        .await
        .expect("incoming create should succeed");

    let provider_ref = record.provider.expect("provider expected on record");
    assert_eq!(provider_ref.id, provider.id);
    assert_eq!(provider_ref.name, "Acme Textiles");
}

#[tokio::test]
async fn get_transaction_misses_map_to_not_found() {
    let db = setup_db().await;
    let svc = service(&db);

    let err = svc.get_transaction(123).await.unwrap_err();
    assert_matches!(err, ServiceError::NoTransactionsFound);
}

#[tokio::test]
async fn list_returns_all_matches_ordered_by_id() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let p1 = seed_product(&db, "Blue Shirt", 100).await;
    let svc = service(&db);

    for _ in 0..3 {
        svc.create_transaction(user.id, incoming(vec![line(p1.id, 1)], None))
            .await
            .expect("create should succeed");
    }

    let records = svc
        .list_transactions(&TransactionFilters::default())
        .await
        .expect("list should succeed");
    assert_eq!(records.len(), 3);
    let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn list_with_no_matches_is_an_error() {
    let db = setup_db().await;
    let svc = service(&db);

    let err = svc
        .list_transactions(&TransactionFilters::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NoTransactionsFound);
}

#[tokio::test]
async fn filters_combine_conjunctively() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let provider = seed_provider(&db, "Acme Textiles").await;
    let shirts = seed_product(&db, "Blue Shirt", 100).await;
    let pants = seed_product(&db, "Black Pants", 100).await;
    let svc = service(&db);

    svc.create_transaction(
        user.id,
        CreateTransactionRequest {
            r#type: TransactionType::Incoming,
            provider_id: Some(provider.id),
            description: "spring restock".to_string(),
            date: date(2024, 1, 1),
            line_items: vec![line(shirts.id, 10)],
        },
    )
    .await
    .unwrap();

    svc.create_transaction(
        user.id,
        CreateTransactionRequest {
            r#type: TransactionType::Outgoing,
            provider_id: None,
            description: "storefront sale".to_string(),
            date: date(2024, 1, 15),
            line_items: vec![line(pants.id, 2)],
        },
    )
    .await
    .unwrap();

    // By type
    let records = svc
        .list_transactions(&TransactionFilters {
            transaction_type: Some(TransactionType::Outgoing),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].description, "storefront sale");

    // By description, case-insensitive substring
    let records = svc
        .list_transactions(&TransactionFilters {
            description: Some("SPRING".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].description, "spring restock");

    // By provider name, case-insensitive substring
    let records = svc
        .list_transactions(&TransactionFilters {
            provider_name: Some("acme".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 1);

    // By product name
    let records = svc
        .list_transactions(&TransactionFilters {
            product_name: Some("pants".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].line_items[0].product_id, pants.id);

    // Conjunction with no match
    let err = svc
        .list_transactions(&TransactionFilters {
            product_name: Some("pants".to_string()),
            transaction_type: Some(TransactionType::Incoming),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NoTransactionsFound);
}

#[tokio::test]
async fn date_filters_bound_the_range_inclusively() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let p1 = seed_product(&db, "Blue Shirt", 100).await;
    let svc = service(&db);

    for day in [date(2024, 1, 1), date(2024, 1, 15), date(2024, 2, 1)] {
        svc.create_transaction(
            user.id,
            CreateTransactionRequest {
                r#type: TransactionType::Incoming,
                provider_id: None,
                description: "restock".to_string(),
                date: day,
                line_items: vec![line(p1.id, 1)],
            },
        )
        .await
        .unwrap();
    }

    let records = svc
        .list_transactions(&TransactionFilters {
            start_date: Some(date(2024, 1, 10)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 2);

    let records = svc
        .list_transactions(&TransactionFilters {
            finish_date: Some(date(2024, 1, 15)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 2);

    let records = svc
        .list_transactions(&TransactionFilters {
            start_date: Some(date(2024, 1, 10)),
            finish_date: Some(date(2024, 1, 31)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].date, date(2024, 1, 15));
}

#[tokio::test]
async fn inverted_date_range_fails_without_touching_storage() {
    let db = setup_db().await;
    let svc = service(&db);

    let err = svc
        .list_transactions(&TransactionFilters {
            start_date: Some(date(2024, 2, 1)),
            finish_date: Some(date(2024, 1, 1)),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidDateRange);
}

#[tokio::test]
async fn pagination_slices_and_validates_pages() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let p1 = seed_product(&db, "Blue Shirt", 1000).await;
    let svc = service(&db);

    for _ in 0..25 {
        svc.create_transaction(user.id, incoming(vec![line(p1.id, 1)], None))
            .await
            .unwrap();
    }

    let page = svc
        .list_transactions_paged(&TransactionFilters::default(), 3, 10)
        .await
        .expect("page 3 should exist");
    assert_eq!(page.records.len(), 5);
    assert_eq!(page.pagination_metadata.current_page, 3);
    assert_eq!(page.pagination_metadata.total_pages, 3);
    assert_eq!(page.pagination_metadata.per_page, 10);
    assert_eq!(page.pagination_metadata.total_items, 25);

    let all = svc
        .list_transactions(&TransactionFilters::default())
        .await
        .unwrap();
    let expected_tail: Vec<i64> = all[20..].iter().map(|r| r.id).collect();
    let page_ids: Vec<i64> = page.records.iter().map(|r| r.id).collect();
    assert_eq!(page_ids, expected_tail);

    let err = svc
        .list_transactions_paged(&TransactionFilters::default(), 4, 10)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidPage { page: 4, total_pages: 3 });

    let err = svc
        .list_transactions_paged(&TransactionFilters::default(), 0, 10)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidPage { page: 0, .. });

    let err = svc
        .list_transactions_paged(&TransactionFilters::default(), 1, 0)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidPageSize(0));
}

#[tokio::test]
async fn pagination_metadata_echoes_filters() {
    let db = setup_db().await;
    let user = seed_user(&db, "clerk").await;
    let p1 = seed_product(&db, "Blue Shirt", 100).await;
    let svc = service(&db);

    svc.create_transaction(user.id, incoming(vec![line(p1.id, 1)], None))
        .await
        .unwrap();

    let filters = TransactionFilters {
        description: Some("restock".to_string()),
        ..Default::default()
    };
    let page = svc
        .list_transactions_paged(&filters, 1, 10)
        .await
        .expect("page should exist");
    assert_eq!(
        page.pagination_metadata.filters.description.as_deref(),
        Some("restock")
    );
}
