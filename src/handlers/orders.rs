use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Order, OrderStatus, PaymentMethod};
use crate::services::NewOrder;
use crate::{auth::AuthUser, errors::ServiceError, ApiResponse, ApiResult, AppState};

fn parse_payment_method(raw: Option<&str>) -> Result<PaymentMethod, ServiceError> {
    match raw {
        None => Ok(PaymentMethod::default()),
        Some(value) => value.parse().map_err(|_| {
            ServiceError::ValidationError(format!("Invalid payment method: {}", value))
        }),
    }
}

/// Checkout request
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// `khalti` (default), `esewa` or `cod`
    #[schema(example = "cod")]
    pub payment_method: Option<String>,
    /// Shipping fee added to the subtotal
    #[schema(value_type = Option<String>, example = "50")]
    pub shipping: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    #[validate(length(min = 1))]
    #[schema(example = "cancelled")]
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOrderRequest {
    pub is_reviewed: bool,
}

/// Place an order from the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = crate::ApiResponse<Order>,
            headers(
                ("X-Request-Id" = String, description = "Unique request identifier"),
            )
        ),
        (status = 400, description = "Empty cart or invalid input", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admins cannot place orders", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), ServiceError> {
    payload.validate()?;
    let input = NewOrder {
        payment_method: parse_payment_method(payload.payment_method.as_deref())?,
        shipping_fee: payload.shipping.unwrap_or(Decimal::ZERO),
    };

    let order = state.services.orders.create(&ctx, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// The caller's own orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses(
        (status = 200, description = "Orders placed by the caller", body = crate::ApiResponse<Vec<Order>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Vec<Order>> {
    let orders = state.services.orders.list_mine(&ctx).await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/:id",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order details", body = crate::ApiResponse<Order>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Order> {
    let order = state.services.orders.get(&ctx, id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Every order in the store (admin only)
#[utoipa::path(
    get,
    path = "/api/v1/orders/admin/all",
    responses(
        (status = 200, description = "All orders", body = crate::ApiResponse<Vec<Order>>),
        (status = 403, description = "Caller is not an admin", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> ApiResult<Vec<Order>> {
    let orders = state.services.orders.list_all(&ctx).await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/:id/status",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = crate::ApiResponse<Order>),
        (status = 400, description = "Invalid status or review required", body = crate::errors::ErrorResponse),
        (status = 403, description = "Transition not allowed for this role", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> ApiResult<Order> {
    payload.validate()?;
    let status: OrderStatus = payload.status.parse().map_err(|_| {
        ServiceError::ValidationError(format!("Invalid status value: {}", payload.status))
    })?;

    let order = state.services.orders.update_status(&ctx, id, status).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Set or clear the admin review flag
#[utoipa::path(
    patch,
    path = "/api/v1/orders/:id/review",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    request_body = ReviewOrderRequest,
    responses(
        (status = 200, description = "Review flag updated", body = crate::ApiResponse<Order>),
        (status = 403, description = "Caller is not an admin", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn review_order(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewOrderRequest>,
) -> ApiResult<Order> {
    let order = state
        .services
        .orders
        .set_review(&ctx, id, payload.is_reviewed)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/orders/:id",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 400, description = "Order cannot be deleted in its status", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.orders.delete(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
