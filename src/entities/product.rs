use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Product entity
///
/// `inventory` is the on-hand counter reconciled by the transaction engine;
/// it is only mutated as a side effect of a successful transaction create.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Product name
    #[validate(length(
        min = 1,
        max = 255,
        message = "Product name must be between 1 and 255 characters"
    ))]
    pub name: String,

    /// Size label (e.g. "S", "M", "L")
    #[validate(length(
        min = 1,
        max = 16,
        message = "Size must be between 1 and 16 characters"
    ))]
    pub size: String,

    /// On-hand quantity. Must never be driven negative.
    pub inventory: i32,

    /// Unit weight in kilograms
    pub weight: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transaction_line_item::Entity")]
    TransactionLineItems,
}

impl Related<super::transaction_line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionLineItems.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            active_model.created_at = Set(Utc::now());
        }
        active_model.updated_at = Set(Some(Utc::now()));

        if let ActiveValue::Set(name) = &active_model.name {
            if name.is_empty() || name.len() > 255 {
                return Err(DbErr::Custom(
                    "Validation error: Product name must be between 1 and 255 characters"
                        .to_string(),
                ));
            }
        }
        if let ActiveValue::Set(size) = &active_model.size {
            if size.is_empty() || size.len() > 16 {
                return Err(DbErr::Custom(
                    "Validation error: Size must be between 1 and 16 characters".to_string(),
                ));
            }
        }

        Ok(active_model)
    }
}
