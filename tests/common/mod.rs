#![allow(dead_code)]

use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use stockledger_api::{
    db::run_migrations,
    entities::{product, provider, user},
};

/// Fresh in-memory SQLite database with the full schema applied. A single
/// pooled connection keeps every query on the same in-memory database.
pub async fn setup_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_owned());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);

    let db = Database::connect(opt)
        .await
        .expect("failed to connect to in-memory sqlite");
    run_migrations(&db).await.expect("failed to run migrations");
    db
}

pub async fn seed_user(db: &DatabaseConnection, username: &str) -> user::Model {
    user::ActiveModel {
        username: Set(username.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to insert user")
}

pub async fn seed_provider(db: &DatabaseConnection, name: &str) -> provider::Model {
    provider::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to insert provider")
}

pub async fn seed_product(db: &DatabaseConnection, name: &str, inventory: i32) -> product::Model {
    product::ActiveModel {
        name: Set(name.to_string()),
        size: Set("M".to_string()),
        inventory: Set(inventory),
        weight: Set(1.5),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("failed to insert product")
}

pub async fn inventory_of(db: &DatabaseConnection, product_id: i64) -> i32 {
    product::Entity::find_by_id(product_id)
        .one(db)
        .await
        .expect("failed to fetch product")
        .expect("product should exist")
        .inventory
}
