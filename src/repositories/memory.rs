use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{CartStore, CatalogStore, OrderStore};
use crate::errors::ServiceError;
use crate::models::{Book, Cart, Order};

/// DashMap-backed order store. The per-key shard lock makes `save` atomic.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_newest_first(mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: Order) -> Result<Order, ServiceError> {
        if self.orders.contains_key(&order.id) {
            return Err(ServiceError::InternalError(format!(
                "Order {} already exists",
                order.id
            )));
        }
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Order>, ServiceError> {
        let orders = self
            .orders
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        Ok(Self::sorted_newest_first(orders))
    }

    async fn find_all(&self) -> Result<Vec<Order>, ServiceError> {
        let orders = self.orders.iter().map(|entry| entry.value().clone()).collect();
        Ok(Self::sorted_newest_first(orders))
    }

    async fn save(&self, order: &Order, expected_version: i32) -> Result<Order, ServiceError> {
        let mut stored = self
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order.id)))?;

        if stored.version != expected_version {
            return Err(ServiceError::ConcurrentModification(order.id));
        }

        stored.status = order.status;
        stored.is_reviewed = order.is_reviewed;
        stored.payment.transaction_id = order.payment.transaction_id.clone();
        stored.payment.verified_at = order.payment.verified_at;
        stored.payment.completed_at = order.payment.completed_at;
        stored.payment.raw_gateway_response = order.payment.raw_gateway_response.clone();
        stored.cart_cleared_at = order.cart_cleared_at;
        stored.updated_at = Utc::now();
        stored.version = expected_version + 1;

        Ok(stored.value().clone())
    }

    async fn delete(&self, id: Uuid, expected_version: i32) -> Result<bool, ServiceError> {
        if self
            .orders
            .remove_if(&id, |_, stored| stored.version == expected_version)
            .is_some()
        {
            return Ok(true);
        }
        if self.orders.contains_key(&id) {
            return Err(ServiceError::ConcurrentModification(id));
        }
        Ok(false)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCartStore {
    carts: DashMap<Uuid, Cart>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<Cart>, ServiceError> {
        Ok(self.carts.get(&user_id).map(|entry| entry.value().clone()))
    }

    async fn put(&self, cart: Cart) -> Result<(), ServiceError> {
        self.carts.insert(cart.user_id, cart);
        Ok(())
    }

    async fn clear(&self, user_id: Uuid) -> Result<bool, ServiceError> {
        match self.carts.get_mut(&user_id) {
            Some(mut cart) if !cart.items.is_empty() => {
                cart.items.clear();
                cart.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    books: DashMap<Uuid, Book>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn find_book(&self, id: Uuid) -> Result<Option<Book>, ServiceError> {
        Ok(self.books.get(&id).map(|entry| entry.value().clone()))
    }

    async fn upsert_book(&self, book: Book) -> Result<(), ServiceError> {
        self.books.insert(book.id, book);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CartItem, OrderDraft, OrderStatus, PaymentMethod};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn order() -> Order {
        Order::from_draft(
            OrderDraft {
                user_id: Uuid::new_v4(),
                items: vec![],
                subtotal: dec!(0),
                shipping_fee: dec!(0),
                total: dec!(0),
                payment_method: PaymentMethod::Khalti,
            },
            OrderStatus::Pending,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn save_is_compare_and_swap_on_version() {
        let store = InMemoryOrderStore::new();
        let created = store.create(order()).await.unwrap();

        let mut first = created.clone();
        first.status = OrderStatus::Processing;
        let saved = store.save(&first, created.version).await.unwrap();
        assert_eq!(saved.version, created.version + 1);
        assert!(saved.updated_at >= created.updated_at);

        let mut stale = created.clone();
        stale.status = OrderStatus::Cancelled;
        assert_matches!(
            store.save(&stale, created.version).await,
            Err(ServiceError::ConcurrentModification(id)) if id == created.id
        );

        let current = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(current.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn save_never_touches_immutable_fields() {
        let store = InMemoryOrderStore::new();
        let created = store.create(order()).await.unwrap();

        let mut tampered = created.clone();
        tampered.total = dec!(999);
        tampered.user_id = Uuid::new_v4();
        let saved = store.save(&tampered, created.version).await.unwrap();

        assert_eq!(saved.total, created.total);
        assert_eq!(saved.user_id, created.user_id);
        assert_eq!(saved.created_at, created.created_at);
    }

    #[tokio::test]
    async fn clearing_reports_whether_anything_was_removed() {
        let store = InMemoryCartStore::new();
        let user_id = Uuid::new_v4();
        assert!(!store.clear(user_id).await.unwrap());

        store
            .put(Cart::new(
                user_id,
                vec![CartItem {
                    book_id: Uuid::new_v4(),
                    quantity: 1,
                }],
            ))
            .await
            .unwrap();

        assert!(store.clear(user_id).await.unwrap());
        assert!(!store.clear(user_id).await.unwrap());
        assert!(store.get(user_id).await.unwrap().unwrap().is_empty());
    }
}
