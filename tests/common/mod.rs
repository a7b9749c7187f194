use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::MockServer;

use bookstore_api::{
    auth::{AuthConfig, AuthService, Role},
    config::{AppConfig, PaymentsConfig},
    events::{self, EventSender},
    handlers::AppServices,
    models::{Book, Cart, CartItem, Order},
    repositories::{
        CartStore, CatalogStore, InMemoryCartStore, InMemoryCatalogStore, InMemoryOrderStore,
        OrderStore,
    },
    services::PaymentAdapters,
    AppState,
};

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Helper harness wiring the full router over in-memory stores and a mock
/// payment gateway.
pub struct TestApp {
    router: Router,
    pub gateway: MockServer,
    pub orders: Arc<InMemoryOrderStore>,
    pub carts: Arc<InMemoryCartStore>,
    pub catalog: Arc<InMemoryCatalogStore>,
    auth_service: Arc<AuthService>,
    _event_task: tokio::task::JoinHandle<()>,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        let gateway = MockServer::start().await;

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            "test".to_string(),
        );
        cfg.payments = PaymentsConfig {
            khalti_base_url: gateway.uri(),
            khalti_secret_key: Some("test_khalti_secret".to_string()),
            esewa_base_url: gateway.uri(),
            esewa_merchant_code: Some("EPAYTEST".to_string()),
            gateway_timeout_secs: 1,
        };

        let adapters =
            PaymentAdapters::from_config(&cfg.payments).expect("gateway config for tests");

        let orders = Arc::new(InMemoryOrderStore::new());
        let carts = Arc::new(InMemoryCartStore::new());
        let catalog = Arc::new(InMemoryCatalogStore::new());

        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(AuthConfig::new(
            cfg.jwt_secret.clone(),
            cfg.jwt_issuer.clone(),
            Duration::from_secs(cfg.jwt_expiration_secs),
        )));

        let services = AppServices::new(
            orders.clone(),
            carts.clone(),
            catalog.clone(),
            adapters,
            event_sender,
        );

        let state = AppState {
            config: cfg,
            services,
            auth: auth_service.clone(),
        };

        Self {
            router: bookstore_api::app_router(state),
            gateway,
            orders,
            carts,
            catalog,
            auth_service,
            _event_task: event_task,
        }
    }

    pub fn token_for(&self, user_id: Uuid, role: Role) -> String {
        self.auth_service
            .issue_token(user_id, role)
            .expect("issue test token")
    }

    /// A fresh customer id and a bearer token for it.
    pub fn customer(&self) -> (Uuid, String) {
        let id = Uuid::new_v4();
        (id, self.token_for(id, Role::Customer))
    }

    pub fn admin_token(&self) -> String {
        self.token_for(Uuid::new_v4(), Role::Admin)
    }

    /// Puts one line per `(title, price, quantity)` into the user's cart,
    /// creating the books in the catalog.
    pub async fn seed_cart(&self, user_id: Uuid, lines: &[(&str, Decimal, u32)]) -> Vec<Book> {
        let mut books = Vec::new();
        let mut items = Vec::new();
        for (title, price, quantity) in lines {
            let book = Book::new(*title, *price, 100);
            self.catalog
                .upsert_book(book.clone())
                .await
                .expect("seed book");
            items.push(CartItem {
                book_id: book.id,
                quantity: *quantity,
            });
            books.push(book);
        }
        self.carts
            .put(Cart::new(user_id, items))
            .await
            .expect("seed cart");
        books
    }

    pub async fn cart_len(&self, user_id: Uuid) -> usize {
        self.carts
            .get(user_id)
            .await
            .expect("read cart")
            .map(|cart| cart.items.len())
            .unwrap_or(0)
    }

    pub async fn stored_order(&self, id: Uuid) -> Order {
        self.orders
            .find_by_id(id)
            .await
            .expect("read order")
            .expect("order exists")
    }

    /// Sends a request and returns the status and decoded JSON body
    /// (`Value::Null` for empty bodies).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router response");

        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Places an order through the API and returns its id.
    pub async fn place_order(&self, token: &str, body: Value) -> Uuid {
        let (status, json) = self
            .request(Method::POST, "/api/v1/orders", Some(body), Some(token))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create order failed: {json}");
        json["data"]["id"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("order id in response")
    }
}
