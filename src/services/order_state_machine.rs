//! The authoritative status-transition function for orders.
//!
//! Every change to `status`, `is_reviewed` or `payment.completed_at` is
//! computed here from the order as currently persisted. Callers apply the
//! returned [`Transition`] in a single guarded write, so a stale read can never
//! smuggle in a transition that is illegal against the stored state.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::{RequestContext, Role};
use crate::errors::ServiceError;
use crate::models::{Order, OrderStatus, PaymentMethod};

/// Who is asking for the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// Internal callers such as payment verification.
    System,
    Admin,
    Customer(Uuid),
}

impl From<&RequestContext> for Actor {
    fn from(ctx: &RequestContext) -> Self {
        match ctx.role {
            Role::Admin => Actor::Admin,
            Role::Customer => Actor::Customer(ctx.user_id),
        }
    }
}

/// The change being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetStatus(OrderStatus),
    SetReview(bool),
    PaymentVerified,
    PaymentFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletedAt {
    Keep,
    Stamp,
    Clear,
}

/// Fully re-derived result of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: OrderStatus,
    pub is_reviewed: bool,
    pub completed_at: CompletedAt,
    /// The cart-clearing side effect must fire after this write.
    pub clears_cart: bool,
}

impl Transition {
    /// Writes the transition onto `order`. Payment fields other than
    /// `completed_at` belong to the payment service.
    pub fn apply_to(&self, order: &mut Order, now: DateTime<Utc>) {
        order.status = self.status;
        order.is_reviewed = self.is_reviewed;
        match self.completed_at {
            CompletedAt::Keep => {}
            CompletedAt::Stamp => order.payment.completed_at = Some(now),
            CompletedAt::Clear => order.payment.completed_at = None,
        }
        if self.clears_cart {
            order.cart_cleared_at = Some(now);
        }
    }
}

pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Status an order is born with.
    pub fn initial_status(method: PaymentMethod) -> OrderStatus {
        match method {
            PaymentMethod::Cod => OrderStatus::Processing,
            PaymentMethod::Khalti | PaymentMethod::Esewa => OrderStatus::Pending,
        }
    }

    pub fn transition(
        order: &Order,
        command: Command,
        actor: Actor,
    ) -> Result<Transition, ServiceError> {
        match command {
            Command::SetStatus(target) => Self::set_status(order, target, actor),
            Command::SetReview(reviewed) => Self::set_review(order, reviewed, actor),
            Command::PaymentVerified => Self::payment_verified(order, actor),
            Command::PaymentFailed => Self::payment_failed(order, actor),
        }
    }

    fn set_status(
        order: &Order,
        target: OrderStatus,
        actor: Actor,
    ) -> Result<Transition, ServiceError> {
        let current = order.status;

        if let Actor::Customer(user_id) = actor {
            if !order.is_owned_by(user_id) {
                return Err(ServiceError::ForbiddenTransition(
                    "Not authorized to update this order".to_string(),
                ));
            }
            if !matches!(target, OrderStatus::Completed | OrderStatus::Cancelled) {
                return Err(ServiceError::ForbiddenTransition(format!(
                    "Customers cannot set status to {}",
                    target
                )));
            }
        }

        if current.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order is {} and can no longer change status",
                current
            )));
        }

        if target.requires_review() && !order.is_reviewed {
            return Err(ServiceError::ReviewRequired(format!(
                "Order must be reviewed before advancing to {}",
                target
            )));
        }

        use OrderStatus::*;
        let allowed_from: &[OrderStatus] = match (target, actor) {
            (Shipping, Actor::Admin) => &[Pending, Processing, Paid],
            (Shipped, Actor::Admin) => &[Shipping],
            (Completed, Actor::Admin | Actor::Customer(_)) => &[Shipping, Shipped],
            (Paid, Actor::Admin) => &[Pending, Processing],
            (Cancelled, Actor::Admin) => &[Pending, Processing, Shipping, Shipped, Paid],
            (Cancelled, Actor::Customer(_)) => &[Pending, Processing, Paid],
            _ => {
                return Err(ServiceError::ForbiddenTransition(format!(
                    "{:?} may not set status to {}",
                    actor, target
                )))
            }
        };

        if !allowed_from.contains(&current) || current == target {
            return Err(match actor {
                Actor::Customer(_) => ServiceError::ForbiddenTransition(format!(
                    "Order in status {} cannot be set to {} by its owner",
                    current, target
                )),
                _ => ServiceError::InvalidOperation(format!(
                    "Cannot move order from {} to {}",
                    current, target
                )),
            });
        }

        let completed_at = match target {
            Completed => CompletedAt::Stamp,
            Cancelled => CompletedAt::Clear,
            _ => CompletedAt::Keep,
        };

        Ok(Transition {
            status: target,
            is_reviewed: order.is_reviewed,
            completed_at,
            clears_cart: Self::cod_clears_cart(order, target),
        })
    }

    fn set_review(order: &Order, reviewed: bool, actor: Actor) -> Result<Transition, ServiceError> {
        if actor != Actor::Admin {
            return Err(ServiceError::ForbiddenRole(
                "Only admins can review orders".to_string(),
            ));
        }
        if order.status.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order is {} and can no longer be reviewed",
                order.status
            )));
        }

        let status = match (reviewed, order.status) {
            (true, OrderStatus::Pending | OrderStatus::Processing) => OrderStatus::Shipping,
            (false, OrderStatus::Shipping) => Self::initial_status(order.payment.method),
            (_, current) => current,
        };

        Ok(Transition {
            status,
            is_reviewed: reviewed,
            completed_at: CompletedAt::Keep,
            clears_cart: reviewed && Self::cod_clears_cart(order, status),
        })
    }

    fn payment_verified(order: &Order, actor: Actor) -> Result<Transition, ServiceError> {
        Self::require_system(actor)?;
        if order.status.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order is {} and cannot accept a payment",
                order.status
            )));
        }

        let status = match order.status {
            OrderStatus::Shipped => OrderStatus::Shipped,
            _ if order.is_reviewed => OrderStatus::Shipping,
            _ => OrderStatus::Processing,
        };

        Ok(Transition {
            status,
            is_reviewed: order.is_reviewed,
            completed_at: CompletedAt::Keep,
            clears_cart: order.cart_cleared_at.is_none(),
        })
    }

    fn payment_failed(order: &Order, actor: Actor) -> Result<Transition, ServiceError> {
        Self::require_system(actor)?;
        if !matches!(
            order.status,
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Shipping | OrderStatus::Paid
        ) {
            return Err(ServiceError::InvalidOperation(format!(
                "Order in status {} cannot be marked failed",
                order.status
            )));
        }

        Ok(Transition {
            status: OrderStatus::Failed,
            is_reviewed: order.is_reviewed,
            completed_at: CompletedAt::Keep,
            clears_cart: false,
        })
    }

    fn require_system(actor: Actor) -> Result<(), ServiceError> {
        match actor {
            Actor::System => Ok(()),
            _ => Err(ServiceError::ForbiddenTransition(
                "Payment outcomes are recorded by the system only".to_string(),
            )),
        }
    }

    /// COD carts are emptied once shipment is confirmed, at most once per order.
    fn cod_clears_cart(order: &Order, target: OrderStatus) -> bool {
        order.payment.method == PaymentMethod::Cod
            && target.requires_review()
            && order.cart_cleared_at.is_none()
    }
}
