use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{CartStore, CatalogStore, OrderStore};
use crate::entities::{book, cart, order};
use crate::errors::ServiceError;
use crate::models::money::{from_paisa, to_paisa};
use crate::models::{Book, Cart, CartItem, Order, OrderItem, PaymentInfo};

fn paisa(amount: Decimal) -> Result<i64, ServiceError> {
    to_paisa(amount)
        .ok_or_else(|| ServiceError::ValidationError(format!("Amount {} is out of range", amount)))
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> ServiceError {
    ServiceError::InternalError(format!("Corrupt {} row: {}", what, err))
}

fn order_from_model(model: order::Model) -> Result<Order, ServiceError> {
    let items: Vec<OrderItem> =
        serde_json::from_value(model.items).map_err(|e| corrupt("order", e))?;
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        items,
        subtotal: from_paisa(model.subtotal_paisa),
        shipping_fee: from_paisa(model.shipping_fee_paisa),
        total: from_paisa(model.total_paisa),
        status: model.status.parse().map_err(|e| corrupt("order", e))?,
        is_reviewed: model.is_reviewed,
        payment: PaymentInfo {
            method: model.payment_method.parse().map_err(|e| corrupt("order", e))?,
            transaction_id: model.transaction_id,
            verified_at: model.verified_at,
            completed_at: model.completed_at,
            raw_gateway_response: model.raw_gateway_response,
        },
        cart_cleared_at: model.cart_cleared_at,
        version: model.version,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

/// SeaORM-backed order store.
#[derive(Debug, Clone)]
pub struct SeaOrmOrderStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    async fn create(&self, o: Order) -> Result<Order, ServiceError> {
        let items = serde_json::to_value(&o.items)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let active = order::ActiveModel {
            id: Set(o.id),
            user_id: Set(o.user_id),
            items: Set(items),
            subtotal_paisa: Set(paisa(o.subtotal)?),
            shipping_fee_paisa: Set(paisa(o.shipping_fee)?),
            total_paisa: Set(paisa(o.total)?),
            status: Set(o.status.as_str().to_string()),
            is_reviewed: Set(o.is_reviewed),
            payment_method: Set(o.payment.method.as_str().to_string()),
            transaction_id: Set(o.payment.transaction_id.clone()),
            verified_at: Set(o.payment.verified_at),
            completed_at: Set(o.payment.completed_at),
            raw_gateway_response: Set(o.payment.raw_gateway_response.clone()),
            cart_cleared_at: Set(o.cart_cleared_at),
            version: Set(o.version),
            created_at: Set(o.created_at),
            updated_at: Set(o.updated_at),
        };
        let model = active.insert(&*self.db).await?;
        order_from_model(model)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        order::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .map(order_from_model)
            .transpose()
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Order>, ServiceError> {
        order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(order_from_model)
            .collect()
    }

    async fn find_all(&self) -> Result<Vec<Order>, ServiceError> {
        order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(order_from_model)
            .collect()
    }

    async fn save(&self, o: &Order, expected_version: i32) -> Result<Order, ServiceError> {
        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(o.status.as_str()))
            .col_expr(order::Column::IsReviewed, Expr::value(o.is_reviewed))
            .col_expr(
                order::Column::TransactionId,
                Expr::value(o.payment.transaction_id.clone()),
            )
            .col_expr(order::Column::VerifiedAt, Expr::value(o.payment.verified_at))
            .col_expr(
                order::Column::CompletedAt,
                Expr::value(o.payment.completed_at),
            )
            .col_expr(
                order::Column::RawGatewayResponse,
                Expr::value(o.payment.raw_gateway_response.clone()),
            )
            .col_expr(order::Column::CartClearedAt, Expr::value(o.cart_cleared_at))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .col_expr(order::Column::Version, Expr::value(expected_version + 1))
            .filter(order::Column::Id.eq(o.id))
            .filter(order::Column::Version.eq(expected_version))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return match self.find_by_id(o.id).await? {
                Some(_) => Err(ServiceError::ConcurrentModification(o.id)),
                None => Err(ServiceError::NotFound(format!("Order {} not found", o.id))),
            };
        }

        self.find_by_id(o.id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", o.id)))
    }

    async fn delete(&self, id: Uuid, expected_version: i32) -> Result<bool, ServiceError> {
        let result = order::Entity::delete_many()
            .filter(order::Column::Id.eq(id))
            .filter(order::Column::Version.eq(expected_version))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            return Ok(true);
        }
        match self.find_by_id(id).await? {
            Some(_) => Err(ServiceError::ConcurrentModification(id)),
            None => Ok(false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeaOrmCartStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmCartStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CartStore for SeaOrmCartStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<Cart>, ServiceError> {
        let Some(model) = cart::Entity::find_by_id(user_id).one(&*self.db).await? else {
            return Ok(None);
        };
        let items: Vec<CartItem> =
            serde_json::from_value(model.items).map_err(|e| corrupt("cart", e))?;
        Ok(Some(Cart {
            user_id: model.user_id,
            items,
            updated_at: model.updated_at,
        }))
    }

    async fn put(&self, c: Cart) -> Result<(), ServiceError> {
        let items = serde_json::to_value(&c.items)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let active = cart::ActiveModel {
            user_id: Set(c.user_id),
            items: Set(items),
            updated_at: Set(c.updated_at),
        };
        cart::Entity::insert(active)
            .on_conflict(
                OnConflict::column(cart::Column::UserId)
                    .update_columns([cart::Column::Items, cart::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        Ok(())
    }

    async fn clear(&self, user_id: Uuid) -> Result<bool, ServiceError> {
        let Some(existing) = self.get(user_id).await? else {
            return Ok(false);
        };
        if existing.is_empty() {
            return Ok(false);
        }

        let result = cart::Entity::update_many()
            .col_expr(cart::Column::Items, Expr::value(serde_json::json!([])))
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}

#[derive(Debug, Clone)]
pub struct SeaOrmCatalogStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmCatalogStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogStore for SeaOrmCatalogStore {
    async fn find_book(&self, id: Uuid) -> Result<Option<Book>, ServiceError> {
        Ok(book::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .map(|model| Book {
                id: model.id,
                title: model.title,
                price: from_paisa(model.price_paisa),
                stock: model.stock,
            }))
    }

    async fn upsert_book(&self, b: Book) -> Result<(), ServiceError> {
        let active = book::ActiveModel {
            id: Set(b.id),
            title: Set(b.title),
            price_paisa: Set(paisa(b.price)?),
            stock: Set(b.stock),
        };
        book::Entity::insert(active)
            .on_conflict(
                OnConflict::column(book::Column::Id)
                    .update_columns([
                        book::Column::Title,
                        book::Column::PricePaisa,
                        book::Column::Stock,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        Ok(())
    }
}
