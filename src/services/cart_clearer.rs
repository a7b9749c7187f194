use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::CartStore;

/// Empties the cart an order was placed from.
#[derive(Clone)]
pub struct CartClearer {
    carts: Arc<dyn CartStore>,
    events: EventSender,
}

impl CartClearer {
    pub fn new(carts: Arc<dyn CartStore>, events: EventSender) -> Self {
        Self { carts, events }
    }

    /// Idempotent: an already empty or missing cart is a no-op.
    pub async fn clear_if_owned(&self, user_id: Uuid) -> Result<bool, ServiceError> {
        self.carts.clear(user_id).await
    }

    /// Runs the side effect for a confirmed order. The order row already
    /// records `cart_cleared_at`, so a failure here is logged, not retried.
    pub(crate) async fn clear_for_order(&self, user_id: Uuid, order_id: Uuid) {
        match self.clear_if_owned(user_id).await {
            Ok(true) => {
                info!(%user_id, %order_id, "cart cleared after order confirmation");
                self.events.publish(Event::CartCleared { user_id, order_id });
            }
            Ok(false) => {}
            Err(e) => error!(%user_id, %order_id, error = %e, "failed to clear cart"),
        }
    }
}
