use async_trait::async_trait;

use super::{GatewayError, PaymentAdapter, PaymentProof, Verification};
use crate::models::{Order, PaymentMethod};

/// Cash on delivery: there is nothing to ask, so it always verifies.
pub struct CodAdapter;

#[async_trait]
impl PaymentAdapter for CodAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Cod
    }

    async fn verify(
        &self,
        _order: &Order,
        _proof: &PaymentProof,
    ) -> Result<Verification, GatewayError> {
        Ok(Verification {
            verified: true,
            transaction_id: None,
            raw: None,
        })
    }
}
