pub mod orders;
pub mod payments;

use std::sync::Arc;

use crate::events::EventSender;
use crate::repositories::{CartStore, CatalogStore, OrderStore};
use crate::services::{
    CartClearer, CartSnapshotter, OrderService, PaymentAdapters, PaymentService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    /// Wires the order and payment services over the given stores.
    pub fn new(
        orders: Arc<dyn OrderStore>,
        carts: Arc<dyn CartStore>,
        catalog: Arc<dyn CatalogStore>,
        adapters: PaymentAdapters,
        event_sender: EventSender,
    ) -> Self {
        let clearer = CartClearer::new(carts.clone(), event_sender.clone());
        let snapshotter = CartSnapshotter::new(carts, catalog);

        let order_service = Arc::new(OrderService::new(
            orders.clone(),
            snapshotter,
            adapters.clone(),
            clearer.clone(),
            event_sender.clone(),
        ));
        let payment_service = Arc::new(PaymentService::new(
            orders,
            adapters,
            clearer,
            event_sender,
        ));

        Self {
            orders: order_service,
            payments: payment_service,
        }
    }
}
