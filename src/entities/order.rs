use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The `orders` table.
///
/// Money columns hold paisa so SQLite keeps them exact. `items` is the frozen
/// line-item snapshot and is never updated after insert.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Json,
    pub subtotal_paisa: i64,
    pub shipping_fee_paisa: i64,
    pub total_paisa: i64,
    pub status: String,
    pub is_reviewed: bool,
    pub payment_method: String,
    pub transaction_id: Option<String>,
    pub verified_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
    pub raw_gateway_response: Option<Json>,
    pub cart_cleared_at: Option<DateTimeUtc>,
    pub version: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
