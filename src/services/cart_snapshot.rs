use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::auth::RequestContext;
use crate::errors::ServiceError;
use crate::models::money::{
    from_paisa, has_paisa_precision, MAX_ORDER_TOTAL_PAISA, MAX_SHIPPING_FEE_PAISA,
};
use crate::models::{OrderDraft, OrderItem, PaymentMethod};
use crate::repositories::{CartStore, CatalogStore};

/// Freezes a user's cart into an order draft at catalog prices of this instant.
#[derive(Clone)]
pub struct CartSnapshotter {
    carts: Arc<dyn CartStore>,
    catalog: Arc<dyn CatalogStore>,
}

impl CartSnapshotter {
    pub fn new(carts: Arc<dyn CartStore>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { carts, catalog }
    }

    /// Reads the caller's cart without touching it.
    #[instrument(skip(self), fields(user_id = %ctx.user_id))]
    pub async fn materialize(
        &self,
        ctx: &RequestContext,
        payment_method: PaymentMethod,
        shipping_fee: Decimal,
    ) -> Result<OrderDraft, ServiceError> {
        if ctx.is_admin() {
            return Err(ServiceError::ForbiddenRole(
                "Admins cannot place orders".to_string(),
            ));
        }
        if shipping_fee < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "shipping must not be negative".to_string(),
            ));
        }
        if !has_paisa_precision(shipping_fee) {
            return Err(ServiceError::ValidationError(
                "shipping must have at most 2 decimal places".to_string(),
            ));
        }
        if shipping_fee > from_paisa(MAX_SHIPPING_FEE_PAISA) {
            return Err(ServiceError::ValidationError(format!(
                "shipping must not exceed {}",
                from_paisa(MAX_SHIPPING_FEE_PAISA)
            )));
        }

        let cart = self
            .carts
            .get(ctx.user_id)
            .await?
            .filter(|cart| !cart.is_empty())
            .ok_or(ServiceError::EmptyCart)?;

        let mut items = Vec::with_capacity(cart.items.len());
        for line in &cart.items {
            if line.quantity == 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Cart line for book {} has zero quantity",
                    line.book_id
                )));
            }
            let book = self
                .catalog
                .find_book(line.book_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Book {} not found", line.book_id)))?;

            items.push(OrderItem {
                book_id: book.id,
                title: book.title,
                unit_price: book.price,
                quantity: line.quantity,
            });
        }

        let subtotal = items
            .iter()
            .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.line_total()?))
            .ok_or_else(order_too_large)?;
        let total = subtotal
            .checked_add(shipping_fee)
            .filter(|total| *total <= from_paisa(MAX_ORDER_TOTAL_PAISA))
            .ok_or_else(order_too_large)?;
        debug!(%subtotal, lines = items.len(), "cart materialized");

        Ok(OrderDraft {
            user_id: ctx.user_id,
            items,
            subtotal,
            shipping_fee,
            total,
            payment_method,
        })
    }
}

fn order_too_large() -> ServiceError {
    ServiceError::ValidationError(format!(
        "Order total must not exceed {}",
        from_paisa(MAX_ORDER_TOTAL_PAISA)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Book, Cart, CartItem};
    use crate::repositories::{InMemoryCartStore, InMemoryCatalogStore};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    struct Fixture {
        carts: Arc<InMemoryCartStore>,
        catalog: Arc<InMemoryCatalogStore>,
        snapshotter: CartSnapshotter,
    }

    fn fixture() -> Fixture {
        let carts = Arc::new(InMemoryCartStore::new());
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let snapshotter = CartSnapshotter::new(carts.clone(), catalog.clone());
        Fixture {
            carts,
            catalog,
            snapshotter,
        }
    }

    #[tokio::test]
    async fn totals_are_computed_from_current_prices() {
        let f = fixture();
        let user = RequestContext::customer(Uuid::new_v4());
        let x = Book::new("Palpasa Cafe", dec!(100), 10);
        let y = Book::new("Seto Dharti", dec!(35.50), 10);
        f.catalog.upsert_book(x.clone()).await.unwrap();
        f.catalog.upsert_book(y.clone()).await.unwrap();
        f.carts
            .put(Cart::new(
                user.user_id,
                vec![
                    CartItem {
                        book_id: x.id,
                        quantity: 2,
                    },
                    CartItem {
                        book_id: y.id,
                        quantity: 1,
                    },
                ],
            ))
            .await
            .unwrap();

        let draft = f
            .snapshotter
            .materialize(&user, PaymentMethod::Cod, dec!(50))
            .await
            .unwrap();

        assert_eq!(draft.subtotal, dec!(235.50));
        assert_eq!(draft.total, dec!(285.50));
        assert_eq!(draft.items[0].title, "Palpasa Cafe");
        assert_eq!(draft.items[0].unit_price, dec!(100));

        // the cart is left alone
        assert_eq!(f.carts.get(user.user_id).await.unwrap().unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn empty_or_missing_cart_is_rejected() {
        let f = fixture();
        let user = RequestContext::customer(Uuid::new_v4());
        assert_matches!(
            f.snapshotter
                .materialize(&user, PaymentMethod::Khalti, Decimal::ZERO)
                .await,
            Err(ServiceError::EmptyCart)
        );

        f.carts.put(Cart::new(user.user_id, vec![])).await.unwrap();
        assert_matches!(
            f.snapshotter
                .materialize(&user, PaymentMethod::Khalti, Decimal::ZERO)
                .await,
            Err(ServiceError::EmptyCart)
        );
    }

    #[tokio::test]
    async fn admins_cannot_check_out() {
        let f = fixture();
        let admin = RequestContext::admin(Uuid::new_v4());
        assert_matches!(
            f.snapshotter
                .materialize(&admin, PaymentMethod::Cod, Decimal::ZERO)
                .await,
            Err(ServiceError::ForbiddenRole(_))
        );
    }

    #[tokio::test]
    async fn vanished_book_is_not_found() {
        let f = fixture();
        let user = RequestContext::customer(Uuid::new_v4());
        f.carts
            .put(Cart::new(
                user.user_id,
                vec![CartItem {
                    book_id: Uuid::new_v4(),
                    quantity: 1,
                }],
            ))
            .await
            .unwrap();

        assert_matches!(
            f.snapshotter
                .materialize(&user, PaymentMethod::Cod, Decimal::ZERO)
                .await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn shipping_fee_is_bounded() {
        let f = fixture();
        let user = RequestContext::customer(Uuid::new_v4());
        let book = Book::new("Shirishko Phool", dec!(300), 5);
        f.catalog.upsert_book(book.clone()).await.unwrap();
        f.carts
            .put(Cart::new(
                user.user_id,
                vec![CartItem {
                    book_id: book.id,
                    quantity: 1,
                }],
            ))
            .await
            .unwrap();

        for shipping in [
            dec!(1000000000000000000000000000),
            dec!(100000.01),
            dec!(50.005),
            dec!(-1),
        ] {
            assert_matches!(
                f.snapshotter
                    .materialize(&user, PaymentMethod::Khalti, shipping)
                    .await,
                Err(ServiceError::ValidationError(_)),
                "shipping {} should be rejected",
                shipping
            );
        }

        let draft = f
            .snapshotter
            .materialize(&user, PaymentMethod::Khalti, dec!(100000))
            .await
            .unwrap();
        assert_eq!(draft.total, dec!(100300));
    }

    #[tokio::test]
    async fn overflowing_line_totals_are_rejected() {
        let f = fixture();
        let user = RequestContext::customer(Uuid::new_v4());
        let book = Book::new("Priceless", Decimal::MAX, 1);
        f.catalog.upsert_book(book.clone()).await.unwrap();
        f.carts
            .put(Cart::new(
                user.user_id,
                vec![CartItem {
                    book_id: book.id,
                    quantity: 2,
                }],
            ))
            .await
            .unwrap();

        assert_matches!(
            f.snapshotter
                .materialize(&user, PaymentMethod::Cod, Decimal::ZERO)
                .await,
            Err(ServiceError::ValidationError(_))
        );
    }
}
