use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle states of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipping,
    Shipped,
    Paid,
    Completed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipping,
        OrderStatus::Shipped,
        OrderStatus::Paid,
        OrderStatus::Completed,
        OrderStatus::Failed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Paid => "paid",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// No state-machine transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }

    /// Statuses that sit behind the review gate.
    pub fn requires_review(&self) -> bool {
        matches!(
            self,
            OrderStatus::Shipping | OrderStatus::Shipped | OrderStatus::Completed
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid status value: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Khalti,
    Esewa,
    Cod,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Khalti
    }
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Khalti => "khalti",
            PaymentMethod::Esewa => "esewa",
            PaymentMethod::Cod => "cod",
        }
    }

    /// Online methods settle through a remote gateway before fulfilment.
    pub fn is_online(&self) -> bool {
        !matches!(self, PaymentMethod::Cod)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "khalti" => Ok(PaymentMethod::Khalti),
            "esewa" => Ok(PaymentMethod::Esewa),
            "cod" => Ok(PaymentMethod::Cod),
            other => Err(format!("Invalid payment method: {}", other)),
        }
    }
}

/// Frozen copy of a cart line taken when the order is placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub book_id: Uuid,
    pub title: String,
    #[schema(value_type = String, example = "100.00")]
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl OrderItem {
    /// `None` on overflow.
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Whatever the gateway answered, kept for support diagnosis.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub raw_gateway_response: Option<Value>,
}

impl PaymentInfo {
    pub fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            transaction_id: None,
            verified_at: None,
            completed_at: None,
            raw_gateway_response: None,
        }
    }
}

/// Immutable line-item and total snapshot produced from a cart.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub user_id: Uuid,
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<OrderItem>,
    #[schema(value_type = String, example = "200.00")]
    pub subtotal: Decimal,
    #[schema(value_type = String, example = "50.00")]
    pub shipping_fee: Decimal,
    #[schema(value_type = String, example = "250.00")]
    pub total: Decimal,
    pub status: OrderStatus,
    pub is_reviewed: bool,
    pub payment: PaymentInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_cleared_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every save.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Materializes a draft into a fresh order in `status`.
    pub fn from_draft(draft: OrderDraft, status: OrderStatus, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: draft.user_id,
            items: draft.items,
            subtotal: draft.subtotal,
            shipping_fee: draft.shipping_fee,
            total: draft.total,
            status,
            is_reviewed: false,
            payment: PaymentInfo::new(draft.payment_method),
            cart_cleared_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    /// Statuses in which the owner may delete their own order.
    pub fn deletable_by_owner(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Pending
                | OrderStatus::Shipping
                | OrderStatus::Cancelled
                | OrderStatus::Failed
                | OrderStatus::Completed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_parses_only_known_values() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("Shipping".parse::<OrderStatus>().is_err());
        assert!("refunded".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn terminal_and_review_gated_sets() {
        let terminal: Vec<_> = OrderStatus::ALL
            .into_iter()
            .filter(OrderStatus::is_terminal)
            .collect();
        assert_eq!(
            terminal,
            vec![
                OrderStatus::Completed,
                OrderStatus::Failed,
                OrderStatus::Cancelled
            ]
        );
        assert!(OrderStatus::Shipped.requires_review());
        assert!(!OrderStatus::Paid.requires_review());
    }

    #[test]
    fn order_serializes_camel_case_with_string_money() {
        let draft = OrderDraft {
            user_id: Uuid::new_v4(),
            items: vec![OrderItem {
                book_id: Uuid::new_v4(),
                title: "Muna Madan".into(),
                unit_price: dec!(100),
                quantity: 2,
            }],
            subtotal: dec!(200),
            shipping_fee: dec!(50),
            total: dec!(250),
            payment_method: PaymentMethod::Cod,
        };
        let order = Order::from_draft(draft, OrderStatus::Processing, Utc::now());
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["status"], "processing");
        assert_eq!(json["isReviewed"], false);
        assert_eq!(json["payment"]["method"], "cod");
        assert_eq!(json["total"], "250");
        assert_eq!(json["items"][0]["unitPrice"], "100");
        assert!(json["payment"].get("verifiedAt").is_none());
    }
}
