use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{OrderStatus, PaymentMethod};

/// Domain events emitted by the order and payment services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        payment_method: PaymentMethod,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderReviewChanged {
        order_id: Uuid,
        is_reviewed: bool,
    },
    PaymentVerified {
        order_id: Uuid,
        method: PaymentMethod,
        transaction_id: Option<String>,
    },
    PaymentFailed {
        order_id: Uuid,
        method: PaymentMethod,
        reason: String,
    },
    CartCleared {
        user_id: Uuid,
        order_id: Uuid,
    },
    OrderDeleted(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Fire-and-forget publication; a full or closed channel is only logged.
    pub fn publish(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Dropping domain event: {}", e);
        }
    }
}

/// Consumes events until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                user_id,
                payment_method,
            } => info!(%order_id, %user_id, %payment_method, "order created"),
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "order status changed"),
            Event::OrderReviewChanged {
                order_id,
                is_reviewed,
            } => info!(%order_id, is_reviewed, "order review flag changed"),
            Event::PaymentVerified {
                order_id,
                method,
                transaction_id,
            } => info!(%order_id, %method, transaction_id = ?transaction_id, "payment verified"),
            Event::PaymentFailed {
                order_id,
                method,
                reason,
            } => warn!(%order_id, %method, %reason, "payment failed"),
            Event::CartCleared { user_id, order_id } => {
                info!(%user_id, %order_id, "cart cleared")
            }
            Event::OrderDeleted(order_id) => info!(%order_id, "order deleted"),
        }
    }

    info!("Event processing loop stopped");
}
