//! Persistence boundaries for orders, carts and the catalog.
//!
//! Domain invariants live in the services; stores only persist what they are
//! handed. [`OrderStore::save`] is the single write path for an existing order
//! and is a compare-and-swap on `version`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{Book, Cart, Order};

pub mod database;
pub mod memory;

pub use database::{SeaOrmCartStore, SeaOrmCatalogStore, SeaOrmOrderStore};
pub use memory::{InMemoryCartStore, InMemoryCatalogStore, InMemoryOrderStore};

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a freshly materialized order.
    async fn create(&self, order: Order) -> Result<Order, ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError>;

    /// Orders placed by `user_id`, newest first.
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Order>, ServiceError>;

    /// Every order, newest first.
    async fn find_all(&self) -> Result<Vec<Order>, ServiceError>;

    /// Writes the mutable fields of `order` if the stored version still equals
    /// `expected_version`. Bumps `version` and `updated_at` and returns the
    /// stored row. Fails with `ConcurrentModification` when the version moved.
    async fn save(&self, order: &Order, expected_version: i32) -> Result<Order, ServiceError>;

    /// Removes the order if the stored version still equals
    /// `expected_version`. Returns `false` when the order does not exist and
    /// fails with `ConcurrentModification` when the version moved.
    async fn delete(&self, id: Uuid, expected_version: i32) -> Result<bool, ServiceError>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<Cart>, ServiceError>;

    async fn put(&self, cart: Cart) -> Result<(), ServiceError>;

    /// Empties the cart. Returns `true` only if there were items to remove.
    async fn clear(&self, user_id: Uuid) -> Result<bool, ServiceError>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_book(&self, id: Uuid) -> Result<Option<Book>, ServiceError>;

    async fn upsert_book(&self, book: Book) -> Result<(), ServiceError>;
}
