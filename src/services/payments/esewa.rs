use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument};

use super::{GatewayError, PaymentAdapter, PaymentProof, Verification};
use crate::models::{Order, PaymentMethod};

const TRANSREC_PATH: &str = "/epay/transrec";
const SUCCESS_MARKER: &str = "Success";

/// Transaction lookup against eSewa's `transrec` endpoint.
pub struct EsewaAdapter {
    client: reqwest::Client,
    transrec_url: String,
    merchant_code: String,
}

impl EsewaAdapter {
    pub fn new(client: reqwest::Client, base_url: &str, merchant_code: &str) -> Self {
        Self {
            client,
            transrec_url: format!("{}{}", base_url.trim_end_matches('/'), TRANSREC_PATH),
            merchant_code: merchant_code.to_string(),
        }
    }
}

#[async_trait]
impl PaymentAdapter for EsewaAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Esewa
    }

    #[instrument(skip(self, order, proof), fields(order_id = %order.id))]
    async fn verify(
        &self,
        order: &Order,
        proof: &PaymentProof,
    ) -> Result<Verification, GatewayError> {
        let PaymentProof::Esewa { ref_id, .. } = proof else {
            return Err(GatewayError::Malformed(
                "eSewa verification needs a reference id".to_string(),
            ));
        };

        // the transaction must settle the full order total
        let form = [
            ("amt", order.total.normalize().to_string()),
            ("rid", ref_id.clone()),
            ("pid", order.id.to_string()),
            ("scd", self.merchant_code.clone()),
        ];

        let response = self
            .client
            .post(&self.transrec_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(%status, "esewa responded");

        if status.is_server_error() {
            return Err(GatewayError::Unreachable(format!("eSewa returned {}", status)));
        }
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body: json!({ "response": text }),
            });
        }

        let verified = text.contains(SUCCESS_MARKER);
        Ok(Verification {
            verified,
            transaction_id: verified.then(|| ref_id.clone()),
            raw: Some(json!({ "response": text })),
        })
    }
}
