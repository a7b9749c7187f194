use axum::{extract::State, response::Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::Order;
use crate::services::PaymentProof;
use crate::{auth::AuthUser, ApiResponse, ApiResult, AppState};

/// Khalti token verification request
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KhaltiVerifyRequest {
    pub order_id: Uuid,
    /// Token returned to the client by the Khalti checkout widget
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
}

/// eSewa reference verification request
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EsewaVerifyRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "refId is required"))]
    pub ref_id: String,
    /// Amount reported by the client; the order total is used when absent
    #[schema(value_type = Option<String>, example = "250")]
    pub amt: Option<Decimal>,
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/khalti/verify",
    request_body = KhaltiVerifyRequest,
    responses(
        (status = 200, description = "Payment verified", body = crate::ApiResponse<Order>),
        (status = 400, description = "Gateway rejected the payment or could not be reached; the order is now failed", body = crate::errors::ErrorResponse),
        (status = 504, description = "Gateway timed out; retry later", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn verify_khalti(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Json(payload): Json<KhaltiVerifyRequest>,
) -> ApiResult<Order> {
    payload.validate()?;
    let proof = PaymentProof::Khalti {
        token: payload.token,
    };

    let order = state
        .services
        .payments
        .verify(&ctx, payload.order_id, proof)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/esewa/verify",
    request_body = EsewaVerifyRequest,
    responses(
        (status = 200, description = "Payment verified", body = crate::ApiResponse<Order>),
        (status = 400, description = "Gateway rejected the payment or could not be reached; the order is now failed", body = crate::errors::ErrorResponse),
        (status = 504, description = "Gateway timed out; retry later", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn verify_esewa(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Json(payload): Json<EsewaVerifyRequest>,
) -> ApiResult<Order> {
    payload.validate()?;
    let proof = PaymentProof::Esewa {
        ref_id: payload.ref_id,
        amount: payload.amt,
    };

    let order = state
        .services
        .payments
        .verify(&ctx, payload.order_id, proof)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
