//! Payment verification.
//!
//! Each payment method is a [`PaymentAdapter`]. The adapters only talk to the
//! gateway; [`PaymentService`] turns their outcome into a single guarded order
//! write, compensating to `failed` on every gateway failure except a timeout.

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::RequestContext;
use crate::config::{AppConfigError, PaymentsConfig};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{Order, PaymentMethod};
use crate::repositories::OrderStore;
use crate::services::cart_clearer::CartClearer;
use crate::services::order_state_machine::{Actor, Command, OrderStateMachine};
use crate::services::orders::{guarded_update, GuardedUpdate};

pub mod cod;
pub mod esewa;
pub mod khalti;

pub use cod::CodAdapter;
pub use esewa::EsewaAdapter;
pub use khalti::KhaltiAdapter;

/// Failure to obtain a usable answer from a payment gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Payment gateway timed out")]
    Timeout,

    #[error("Payment gateway unreachable: {0}")]
    Unreachable(String),

    #[error("Payment gateway rejected the payment (HTTP {status})")]
    Rejected { status: u16, body: Value },

    #[error("Payment gateway returned an unusable response: {0}")]
    Malformed(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Timeout => "gateway_timeout",
            GatewayError::Unreachable(_) => "gateway_unreachable",
            GatewayError::Rejected { .. } => "gateway_rejected",
            GatewayError::Malformed(_) => "gateway_malformed",
        }
    }

    /// Only a timeout leaves the outcome unknown; the order must stay retryable.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, GatewayError::Timeout)
    }

    /// Payload preserved on the order when this error fails it.
    pub fn diagnostic(&self) -> Value {
        match self {
            GatewayError::Rejected { status, body } => json!({
                "status": status,
                "response": body,
            }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() || err.is_body() {
            GatewayError::Malformed(err.to_string())
        } else {
            GatewayError::Unreachable(err.to_string())
        }
    }
}

/// Method-specific evidence that the customer paid.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentProof {
    Khalti {
        token: String,
    },
    Esewa {
        ref_id: String,
        amount: Option<Decimal>,
    },
    Cod,
}

impl PaymentProof {
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentProof::Khalti { .. } => PaymentMethod::Khalti,
            PaymentProof::Esewa { .. } => PaymentMethod::Esewa,
            PaymentProof::Cod => PaymentMethod::Cod,
        }
    }
}

/// What the gateway said about a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub verified: bool,
    pub transaction_id: Option<String>,
    pub raw: Option<Value>,
}

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    fn method(&self) -> PaymentMethod;

    async fn verify(
        &self,
        order: &Order,
        proof: &PaymentProof,
    ) -> Result<Verification, GatewayError>;
}

/// One adapter per payment method.
#[derive(Clone)]
pub struct PaymentAdapters {
    khalti: Arc<dyn PaymentAdapter>,
    esewa: Arc<dyn PaymentAdapter>,
    cod: Arc<dyn PaymentAdapter>,
}

impl PaymentAdapters {
    pub fn new(
        khalti: Arc<dyn PaymentAdapter>,
        esewa: Arc<dyn PaymentAdapter>,
        cod: Arc<dyn PaymentAdapter>,
    ) -> Self {
        Self { khalti, esewa, cod }
    }

    /// Builds the gateway adapters, failing fast on missing credentials.
    pub fn from_config(config: &PaymentsConfig) -> Result<Self, AppConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.gateway_timeout())
            .build()
            .map_err(|e| AppConfigError::Invalid(format!("HTTP client: {}", e)))?;

        let khalti = KhaltiAdapter::new(
            client.clone(),
            &config.khalti_base_url,
            config.require_khalti_secret()?,
        );
        let esewa = EsewaAdapter::new(
            client,
            &config.esewa_base_url,
            config.require_esewa_merchant_code()?,
        );

        Ok(Self::new(
            Arc::new(khalti),
            Arc::new(esewa),
            Arc::new(CodAdapter),
        ))
    }

    pub fn for_method(&self, method: PaymentMethod) -> Arc<dyn PaymentAdapter> {
        match method {
            PaymentMethod::Khalti => self.khalti.clone(),
            PaymentMethod::Esewa => self.esewa.clone(),
            PaymentMethod::Cod => self.cod.clone(),
        }
    }
}

/// Reconciles gateway verdicts with the order state machine.
#[derive(Clone)]
pub struct PaymentService {
    orders: Arc<dyn OrderStore>,
    adapters: PaymentAdapters,
    clearer: CartClearer,
    events: EventSender,
}

impl PaymentService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        adapters: PaymentAdapters,
        clearer: CartClearer,
        events: EventSender,
    ) -> Self {
        Self {
            orders,
            adapters,
            clearer,
            events,
        }
    }

    /// Verifies `proof` against the gateway and records the outcome.
    ///
    /// Safe to repeat: once an order carries `verified_at` the gateway is not
    /// called again and the stored order is returned as is. No lock is held
    /// while the gateway call is in flight.
    #[instrument(skip(self, proof), fields(user_id = %ctx.user_id, method = %proof.method()))]
    pub async fn verify(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        proof: PaymentProof,
    ) -> Result<Order, ServiceError> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !ctx.is_admin() && !order.is_owned_by(ctx.user_id) {
            return Err(ServiceError::ForbiddenRole(
                "Not authorized to verify payment for this order".to_string(),
            ));
        }
        if order.payment.method != proof.method() {
            return Err(ServiceError::ValidationError(format!(
                "Order is paid with {}, not {}",
                order.payment.method,
                proof.method()
            )));
        }
        if !order.payment.method.is_online() {
            return Err(ServiceError::ValidationError(
                "Cash on delivery orders are not verified through a gateway".to_string(),
            ));
        }
        if let PaymentProof::Esewa {
            amount: Some(claimed),
            ..
        } = &proof
        {
            if *claimed != order.total {
                return Err(ServiceError::ValidationError(format!(
                    "Paid amount {} does not match order total {}",
                    claimed, order.total
                )));
            }
        }
        if order.payment.verified_at.is_some() {
            info!(%order_id, "payment already verified");
            return Ok(order);
        }
        if order.status.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order is {} and cannot accept a payment",
                order.status
            )));
        }

        let adapter = self.adapters.for_method(order.payment.method);
        match adapter.verify(&order, &proof).await {
            Ok(outcome) if outcome.verified => self.record_success(order_id, outcome).await,
            Ok(outcome) => {
                let err = GatewayError::Rejected {
                    status: 200,
                    body: outcome.raw.unwrap_or(Value::Null),
                };
                self.record_failure(order_id, &err).await?;
                Err(err.into())
            }
            Err(err) if err.is_ambiguous() => {
                warn!(%order_id, error = %err, "gateway outcome unknown, order left for retry");
                Err(err.into())
            }
            Err(err) => {
                self.record_failure(order_id, &err).await?;
                Err(err.into())
            }
        }
    }

    async fn record_success(
        &self,
        order_id: Uuid,
        outcome: Verification,
    ) -> Result<Order, ServiceError> {
        let update = guarded_update(self.orders.as_ref(), order_id, |current| {
            // a concurrent delivery already won
            if current.payment.verified_at.is_some() {
                return Ok(None);
            }
            let transition = OrderStateMachine::transition(
                current,
                Command::PaymentVerified,
                Actor::System,
            )?;
            let now = Utc::now();
            let mut next = current.clone();
            transition.apply_to(&mut next, now);
            next.payment.transaction_id = outcome.transaction_id.clone();
            next.payment.verified_at = Some(now);
            next.payment.raw_gateway_response = outcome.raw.clone();
            Ok(Some((next, transition)))
        })
        .await?;

        match update {
            GuardedUpdate::Unchanged(order) => Ok(order),
            GuardedUpdate::Saved {
                order,
                transition,
                previous_status,
            } => {
                counter!("bookstore.payments.verified", 1);
                info!(%order_id, status = %order.status, "payment verified");
                self.events.publish(Event::PaymentVerified {
                    order_id,
                    method: order.payment.method,
                    transaction_id: order.payment.transaction_id.clone(),
                });
                if previous_status != order.status {
                    self.events.publish(Event::OrderStatusChanged {
                        order_id,
                        old_status: previous_status,
                        new_status: order.status,
                    });
                }
                if transition.clears_cart {
                    self.clearer.clear_for_order(order.user_id, order_id).await;
                }
                Ok(order)
            }
        }
    }

    /// Local compensating action for an explicit negative, applied once.
    async fn record_failure(&self, order_id: Uuid, err: &GatewayError) -> Result<(), ServiceError> {
        let update = guarded_update(self.orders.as_ref(), order_id, |current| {
            if current.payment.verified_at.is_some() || current.status.is_terminal() {
                return Ok(None);
            }
            let transition =
                OrderStateMachine::transition(current, Command::PaymentFailed, Actor::System)?;
            let mut next = current.clone();
            transition.apply_to(&mut next, Utc::now());
            next.payment.raw_gateway_response = Some(err.diagnostic());
            Ok(Some((next, transition)))
        })
        .await?;

        if let GuardedUpdate::Saved {
            order,
            previous_status,
            ..
        } = update
        {
            counter!("bookstore.payments.failed", 1);
            warn!(%order_id, error = %err, "payment verification failed, order marked failed");
            self.events.publish(Event::PaymentFailed {
                order_id,
                method: order.payment.method,
                reason: err.to_string(),
            });
            self.events.publish(Event::OrderStatusChanged {
                order_id,
                old_status: previous_status,
                new_status: order.status,
            });
        }
        Ok(())
    }
}
