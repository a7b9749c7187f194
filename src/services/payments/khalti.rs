use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{GatewayError, PaymentAdapter, PaymentProof, Verification};
use crate::models::money::to_paisa;
use crate::models::{Order, PaymentMethod};

const VERIFY_PATH: &str = "/api/v2/payment/verify/";

#[derive(Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
    amount: i64,
}

/// Server-side token verification against Khalti.
pub struct KhaltiAdapter {
    client: reqwest::Client,
    verify_url: String,
    secret_key: String,
}

impl KhaltiAdapter {
    pub fn new(client: reqwest::Client, base_url: &str, secret_key: &str) -> Self {
        Self {
            client,
            verify_url: format!("{}{}", base_url.trim_end_matches('/'), VERIFY_PATH),
            secret_key: secret_key.to_string(),
        }
    }
}

#[async_trait]
impl PaymentAdapter for KhaltiAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Khalti
    }

    #[instrument(skip(self, order, proof), fields(order_id = %order.id))]
    async fn verify(
        &self,
        order: &Order,
        proof: &PaymentProof,
    ) -> Result<Verification, GatewayError> {
        let PaymentProof::Khalti { token } = proof else {
            return Err(GatewayError::Malformed(
                "Khalti verification needs a token".to_string(),
            ));
        };
        let amount = to_paisa(order.total).ok_or_else(|| {
            GatewayError::Malformed(format!("Order total {} cannot be sent in paisa", order.total))
        })?;

        let response = self
            .client
            .post(&self.verify_url)
            .header("Authorization", format!("Key {}", self.secret_key))
            .json(&VerifyRequest { token, amount })
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(%status, "khalti responded");

        if status.is_server_error() {
            return Err(GatewayError::Unreachable(format!("Khalti returned {}", status)));
        }
        if !status.is_success() {
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| GatewayError::Malformed(format!("Khalti body is not JSON: {}", e)))?;

        let transaction_id = body
            .get("idx")
            .or_else(|| body.get("token"))
            .and_then(Value::as_str)
            .unwrap_or(token)
            .to_string();

        Ok(Verification {
            verified: true,
            transaction_id: Some(transaction_id),
            raw: Some(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderDraft, OrderItem, OrderStatus};
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn order() -> Order {
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
            payment_method: PaymentMethod::Khalti,
        };
        Order::from_draft(draft, OrderStatus::Pending, Utc::now())
    }

    fn adapter(server: &MockServer) -> KhaltiAdapter {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        KhaltiAdapter::new(client, &server.uri(), "test_secret")
    }

    fn proof() -> PaymentProof {
        PaymentProof::Khalti {
            token: "tok_abc".into(),
        }
    }

    #[tokio::test]
    async fn verified_token_yields_idx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(VERIFY_PATH))
            .and(header("Authorization", "Key test_secret"))
            .and(body_json(json!({"token": "tok_abc", "amount": 25000})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"idx": "8xm2", "amount": 25000})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let outcome = adapter(&server).verify(&order(), &proof()).await.unwrap();
        assert!(outcome.verified);
        assert_eq!(outcome.transaction_id.as_deref(), Some("8xm2"));
        assert_eq!(outcome.raw.unwrap()["amount"], 25000);
    }

    #[tokio::test]
    async fn client_error_is_a_rejection_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"detail": "Invalid token."})),
            )
            .mount(&server)
            .await;

        let err = adapter(&server).verify(&order(), &proof()).await.unwrap_err();
        assert_matches!(err, GatewayError::Rejected { status: 400, ref body } if body["detail"] == "Invalid token.");
    }

    #[tokio::test]
    async fn server_error_is_reported_as_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = adapter(&server).verify(&order(), &proof()).await.unwrap_err();
        assert_matches!(err, GatewayError::Unreachable(_));
        assert!(!err.is_ambiguous());
    }

    #[tokio::test]
    async fn slow_gateway_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"idx": "late"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = adapter(&server).verify(&order(), &proof()).await.unwrap_err();
        assert_matches!(err, GatewayError::Timeout);
    }

    #[tokio::test]
    async fn success_without_json_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let err = adapter(&server).verify(&order(), &proof()).await.unwrap_err();
        assert_matches!(err, GatewayError::Malformed(_));
    }
}
