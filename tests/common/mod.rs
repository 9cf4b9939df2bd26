#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use storefront_api::{
    auth::{AuthConfig, AuthService, ADMIN_ROLE},
    config::AppConfig,
    db,
    entities::commerce::{OrderModel, OrderStatus},
    errors::ServiceError,
    events::{self, EventSender, PaymentNotification},
    handlers::AppServices,
    services::{
        catalog::{CreateProductInput, CreateVariantInput, ProductDetail, SizeStockInput},
        payments::{
            gateway::{GatewayName, PaymentAttempt, PaymentGateway, PaymentGatewayRegistry},
            mercadopago::{CheckoutProvider, PaymentIntent, PREFERENCE_FAILED},
        },
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Hosted checkout double: records every intent and answers webhook lookups
/// from a table the test fills in.
#[derive(Default)]
pub struct FakeCheckout {
    pub intents: Mutex<Vec<PaymentIntent>>,
    payments: Mutex<HashMap<String, PaymentNotification>>,
    failing: Mutex<bool>,
}

impl FakeCheckout {
    pub fn fail_preferences(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Register what a webhook for `resource` will report.
    pub fn report(&self, resource: &str, status: &str, order_id: Uuid) {
        self.payments.lock().unwrap().insert(
            resource.to_string(),
            PaymentNotification {
                status: status.to_string(),
                external_reference: order_id.to_string(),
            },
        );
    }

    pub fn intent_count(&self) -> usize {
        self.intents.lock().unwrap().len()
    }
}

#[async_trait]
impl CheckoutProvider for FakeCheckout {
    async fn create_payment_intent(&self, intent: &PaymentIntent) -> Result<String, ServiceError> {
        if *self.failing.lock().unwrap() {
            return Err(ServiceError::InternalError(PREFERENCE_FAILED.to_string()));
        }
        self.intents.lock().unwrap().push(intent.clone());
        Ok(format!("https://checkout.test/pay/{}", intent.order_id))
    }

    async fn fetch_payment(&self, resource_id: &str) -> Result<PaymentNotification, ServiceError> {
        self.payments
            .lock()
            .unwrap()
            .get(resource_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("payment {} not found", resource_id)))
    }
}

/// Gateway double with a switchable answer.
pub struct FakeGateway {
    name: GatewayName,
    approve: Mutex<bool>,
    pub attempts: Mutex<Vec<PaymentAttempt>>,
}

impl FakeGateway {
    pub fn new(name: GatewayName) -> Self {
        Self {
            name,
            approve: Mutex::new(true),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn answer(&self, approve: bool) {
        *self.approve.lock().unwrap() = approve;
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn name(&self) -> GatewayName {
        self.name
    }

    async fn attempt(&self, attempt: &PaymentAttempt) -> Result<bool, ServiceError> {
        self.attempts.lock().unwrap().push(attempt.clone());
        Ok(*self.approve.lock().unwrap())
    }
}

/// Router, services and fakes over a fresh in-memory database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub checkout: Arc<FakeCheckout>,
    pub epayco: Arc<FakeGateway>,
    pub payu: Arc<FakeGateway>,
    admin_token: String,
    auth_service: Arc<AuthService>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        customize(&mut cfg);

        let pool = db::connect_in_memory()
            .await
            .expect("in-memory database with migrations");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));

        let checkout = Arc::new(FakeCheckout::default());
        let epayco = Arc::new(FakeGateway::new(GatewayName::Epayco));
        let payu = Arc::new(FakeGateway::new(GatewayName::PayU));
        let mut registry = PaymentGatewayRegistry::new();
        registry.register(epayco.clone()).register(payu.clone());

        let services = AppServices::new(
            db_arc.clone(),
            &cfg,
            event_sender.clone(),
            Arc::new(registry),
            checkout.clone(),
        );
        let event_task = tokio::spawn(events::process_events(
            event_rx,
            services.lifecycle.clone(),
        ));

        let auth_service = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let admin_token = auth_service
            .issue_token("test-admin", vec![ADMIN_ROLE.to_string()], vec![])
            .expect("admin token");

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };
        let router = storefront_api::app_router(state.clone(), auth_service.clone());

        Self {
            router,
            state,
            checkout,
            epayco,
            payu,
            admin_token,
            auth_service,
            _event_task: event_task,
        }
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Token for an operator holding only `permissions`.
    pub fn token_with(&self, permissions: &[&str]) -> String {
        self.auth_service
            .issue_token(
                "test-operator",
                vec!["operator".to_string()],
                permissions.iter().map(|p| p.to_string()).collect(),
            )
            .expect("operator token")
    }

    /// Send a request and return the status with the parsed JSON body
    /// (`Value::Null` for an empty body).
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
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body is JSON")
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body), None).await
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(method, uri, body, Some(self.admin_token())).await
    }

    /// Active product with one variant carrying the given sizes.
    pub async fn seed_product(
        &self,
        name: &str,
        price: Decimal,
        sizes: &[(&str, i32)],
    ) -> ProductDetail {
        let catalog = self.state.services.catalog.clone();
        let product = catalog
            .create_product(CreateProductInput {
                name: name.to_string(),
                description: Some(format!("{} seeded for tests", name)),
                price,
                category_id: None,
                subcategory_id: None,
            })
            .await
            .expect("seed product");
        catalog
            .add_variant(
                product.id,
                CreateVariantInput {
                    color: "Black".to_string(),
                    color_code: "#000000".to_string(),
                    images: vec![],
                    sizes: sizes
                        .iter()
                        .map(|(size, stock)| SizeStockInput {
                            size: size.to_string(),
                            stock: *stock,
                        })
                        .collect(),
                },
            )
            .await
            .expect("seed variant");
        catalog.get_product(product.id).await.expect("seeded product")
    }

    pub async fn stock(&self, variant_id: Uuid, size: &str) -> i32 {
        self.state
            .services
            .catalog
            .stock_of(variant_id, size)
            .await
            .expect("stock lookup")
            .expect("size exists")
    }

    pub async fn order(&self, id: Uuid) -> OrderModel {
        self.state.services.orders.get_order(id).await.expect("order exists")
    }

    /// Deliver a MercadoPago-style webhook for `resource`.
    pub async fn webhook(&self, resource: &str) -> (StatusCode, Value) {
        self.post(
            "/api/v1/payments/webhooks",
            json!({ "resource": resource, "topic": "payment" }),
        )
        .await
    }

    /// Poll until the event processor has moved the order to `status`.
    pub async fn wait_for_status(&self, id: Uuid, status: OrderStatus) -> OrderModel {
        for _ in 0..100 {
            let order = self.order(id).await;
            if order.status == status {
                return order;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("order {} never reached {:?}", id, status);
    }

    /// Let the event processor drain whatever is queued.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn order_body(email: &str, product: &ProductDetail, size: &str, quantity: i32) -> Value {
    json!({
        "email": email,
        "items": [{
            "product_id": product.product.id,
            "variant_id": product.variants[0].id,
            "size": size,
            "quantity": quantity,
        }],
        "shipping_address": shipping_address(),
    })
}

pub fn shipping_address() -> Value {
    json!({
        "state": "Antioquia",
        "city": "Medellin",
        "address": "Calle 10 # 43-12",
        "phone": "3001234567",
    })
}

/// Decimal field rendered either as a JSON string or a number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {}", other),
    }
}

pub fn id_of(value: &Value) -> Uuid {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("uuid string")
}
