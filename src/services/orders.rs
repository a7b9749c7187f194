use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{Order, OrderStatus, PaymentMethod};
use crate::repositories::OrderStore;
use crate::services::cart_clearer::CartClearer;
use crate::services::cart_snapshot::CartSnapshotter;
use crate::services::order_state_machine::{Actor, Command, OrderStateMachine, Transition};
use crate::services::payments::{GatewayError, PaymentAdapters, PaymentProof};

/// Attempts made before a contended order update gives up.
const MAX_SAVE_ATTEMPTS: usize = 3;

/// Result of [`guarded_update`].
#[derive(Debug)]
pub(crate) enum GuardedUpdate {
    /// The decision function chose not to write.
    Unchanged(Order),
    Saved {
        order: Order,
        transition: Transition,
        previous_status: OrderStatus,
    },
}

/// Reads the persisted order, lets `decide` derive the next state from it and
/// writes that state with a compare-and-swap on `version`.
///
/// On a lost race the order is re-read and `decide` runs again, so a
/// transition is always validated against what is actually stored.
pub(crate) async fn guarded_update<F>(
    store: &dyn OrderStore,
    order_id: Uuid,
    mut decide: F,
) -> Result<GuardedUpdate, ServiceError>
where
    F: FnMut(&Order) -> Result<Option<(Order, Transition)>, ServiceError>,
{
    for attempt in 1..=MAX_SAVE_ATTEMPTS {
        let current = store
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let Some((next, transition)) = decide(&current)? else {
            return Ok(GuardedUpdate::Unchanged(current));
        };

        match store.save(&next, current.version).await {
            Ok(order) => {
                return Ok(GuardedUpdate::Saved {
                    order,
                    transition,
                    previous_status: current.status,
                })
            }
            Err(ServiceError::ConcurrentModification(_)) => {
                debug!(%order_id, attempt, "order changed underneath us, re-validating");
            }
            Err(e) => return Err(e),
        }
    }

    Err(ServiceError::ConcurrentModification(order_id))
}

/// Checkout input after request validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewOrder {
    pub payment_method: PaymentMethod,
    pub shipping_fee: Decimal,
}

impl Default for NewOrder {
    fn default() -> Self {
        Self {
            payment_method: PaymentMethod::default(),
            shipping_fee: Decimal::ZERO,
        }
    }
}

/// Order lifecycle operations for customers and admins.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    snapshotter: CartSnapshotter,
    adapters: PaymentAdapters,
    clearer: CartClearer,
    events: EventSender,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        snapshotter: CartSnapshotter,
        adapters: PaymentAdapters,
        clearer: CartClearer,
        events: EventSender,
    ) -> Self {
        Self {
            orders,
            snapshotter,
            adapters,
            clearer,
            events,
        }
    }

    /// Turns the caller's cart into an order. The cart is left as is; it is
    /// cleared once the order is confirmed.
    #[instrument(skip(self), fields(user_id = %ctx.user_id))]
    pub async fn create(&self, ctx: &RequestContext, input: NewOrder) -> Result<Order, ServiceError> {
        let draft = self
            .snapshotter
            .materialize(ctx, input.payment_method, input.shipping_fee)
            .await?;

        let method = draft.payment_method;
        let order = Order::from_draft(draft, OrderStateMachine::initial_status(method), Utc::now());

        if !method.is_online() {
            let outcome = self
                .adapters
                .for_method(method)
                .verify(&order, &PaymentProof::Cod)
                .await?;
            if !outcome.verified {
                return Err(GatewayError::Rejected {
                    status: 200,
                    body: outcome.raw.unwrap_or_default(),
                }
                .into());
            }
        }

        let order = self.orders.create(order).await?;

        counter!("bookstore.orders.created", 1);
        info!(order_id = %order.id, total = %order.total, %method, "order created");
        self.events.publish(Event::OrderCreated {
            order_id: order.id,
            user_id: order.user_id,
            payment_method: method,
        });

        Ok(order)
    }

    /// Only the owner can read an order here; anyone else gets `NotFound`.
    pub async fn get(&self, ctx: &RequestContext, order_id: Uuid) -> Result<Order, ServiceError> {
        self.orders
            .find_by_id(order_id)
            .await?
            .filter(|order| order.is_owned_by(ctx.user_id))
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    pub async fn list_mine(&self, ctx: &RequestContext) -> Result<Vec<Order>, ServiceError> {
        self.orders.find_by_user(ctx.user_id).await
    }

    pub async fn list_all(&self, ctx: &RequestContext) -> Result<Vec<Order>, ServiceError> {
        if !ctx.is_admin() {
            return Err(ServiceError::ForbiddenRole(
                "Only admins can list all orders".to_string(),
            ));
        }
        self.orders.find_all().await
    }

    #[instrument(skip(self), fields(user_id = %ctx.user_id))]
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<Order, ServiceError> {
        let actor = Actor::from(ctx);
        let update = guarded_update(self.orders.as_ref(), order_id, |current| {
            let transition =
                OrderStateMachine::transition(current, Command::SetStatus(status), actor)?;
            let mut next = current.clone();
            transition.apply_to(&mut next, Utc::now());
            Ok(Some((next, transition)))
        })
        .await?;

        self.after_save(update).await
    }

    #[instrument(skip(self), fields(user_id = %ctx.user_id))]
    pub async fn set_review(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        reviewed: bool,
    ) -> Result<Order, ServiceError> {
        if !ctx.is_admin() {
            return Err(ServiceError::ForbiddenRole(
                "Only admins can review orders".to_string(),
            ));
        }

        let update = guarded_update(self.orders.as_ref(), order_id, |current| {
            let transition =
                OrderStateMachine::transition(current, Command::SetReview(reviewed), Actor::Admin)?;
            let mut next = current.clone();
            transition.apply_to(&mut next, Utc::now());
            Ok(Some((next, transition)))
        })
        .await?;

        if let GuardedUpdate::Saved { order, .. } = &update {
            self.events.publish(Event::OrderReviewChanged {
                order_id,
                is_reviewed: order.is_reviewed,
            });
        }
        self.after_save(update).await
    }

    /// Admins may delete any order. Owners only while the order is not in
    /// flight. The rule is checked against the version that gets deleted.
    #[instrument(skip(self), fields(user_id = %ctx.user_id))]
    pub async fn delete(&self, ctx: &RequestContext, order_id: Uuid) -> Result<(), ServiceError> {
        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let order = self
                .orders
                .find_by_id(order_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

            if !ctx.is_admin() {
                if !order.is_owned_by(ctx.user_id) {
                    return Err(ServiceError::ForbiddenRole(
                        "Not authorized to delete this order".to_string(),
                    ));
                }
                if !order.deletable_by_owner() {
                    return Err(ServiceError::InvalidOperation(format!(
                        "Orders in status {} cannot be deleted",
                        order.status
                    )));
                }
            }

            match self.orders.delete(order_id, order.version).await {
                Ok(true) => {
                    info!(%order_id, "order deleted");
                    self.events.publish(Event::OrderDeleted(order_id));
                    return Ok(());
                }
                Ok(false) => {
                    return Err(ServiceError::NotFound(format!("Order {} not found", order_id)))
                }
                Err(ServiceError::ConcurrentModification(_)) => {
                    debug!(%order_id, attempt, "order changed before delete, re-validating");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ServiceError::ConcurrentModification(order_id))
    }

    async fn after_save(&self, update: GuardedUpdate) -> Result<Order, ServiceError> {
        let (order, transition, previous_status) = match update {
            GuardedUpdate::Unchanged(order) => return Ok(order),
            GuardedUpdate::Saved {
                order,
                transition,
                previous_status,
            } => (order, transition, previous_status),
        };

        if previous_status != order.status {
            info!(order_id = %order.id, from = %previous_status, to = %order.status, "order status changed");
            self.events.publish(Event::OrderStatusChanged {
                order_id: order.id,
                old_status: previous_status,
                new_status: order.status,
            });
        }
        if transition.clears_cart {
            self.clearer.clear_for_order(order.user_id, order.id).await;
        }
        Ok(order)
    }
}
