use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog entry as seen by checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub price: Decimal,
    pub stock: i32,
}

impl Book {
    pub fn new(title: impl Into<String>, price: Decimal, stock: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            price,
            stock,
        }
    }
}
