use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bookstore API",
        version = "1.0.0",
        description = r#"
# Bookstore Order & Payment API

Checkout, order lifecycle and payment verification for the bookstore.

## Order workflow

- Orders are frozen copies of the caller's cart. Prices never change after checkout.
- Online orders (`khalti`, `esewa`) start `pending`; cash on delivery starts `processing`.
- An admin must review an order before it can reach `shipping`, `shipped` or `completed`.
- `completed`, `cancelled` and `failed` are terminal.

## Payment verification

A rejected payment or an unreachable gateway marks the order `failed` and answers `400`
(`gateway_rejected` or `gateway_unreachable`) with the gateway payload in `details`. A
timed-out gateway answers `504` and leaves the order untouched so the verification can be
retried.

## Authentication

Include a JWT in the Authorization header:

```
Authorization: Bearer <your-jwt-token>
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Checkout and order lifecycle"),
        (name = "Payments", description = "Gateway payment verification")
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_all_orders,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::review_order,
        crate::handlers::orders::delete_order,

        crate::handlers::payments::verify_khalti,
        crate::handlers::payments::verify_esewa,
    ),
    components(
        schemas(
            crate::models::Order,
            crate::models::OrderItem,
            crate::models::OrderStatus,
            crate::models::PaymentInfo,
            crate::models::PaymentMethod,
            crate::auth::Role,

            crate::handlers::orders::CreateOrderRequest,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::handlers::orders::ReviewOrderRequest,
            crate::handlers::payments::KhaltiVerifyRequest,
            crate::handlers::payments::EsewaVerifyRequest,

            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
