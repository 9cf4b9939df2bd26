mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{id_of, order_body, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::{
    entities::commerce::OrderStatus,
    events::PaymentNotification,
    services::{
        lifecycle::TransitionOutcome,
        payments::gateway::PaymentAttempt,
    },
};

async fn place_order(app: &TestApp, email: &str, coupon: Option<&str>) -> (uuid::Uuid, uuid::Uuid) {
    let product = app.seed_product(&format!("Trench {}", email), dec!(500), &[("M", 3)]).await;
    let mut body = order_body(email, &product, "M", 1);
    if let Some(code) = coupon {
        body["coupon_code"] = json!(code);
    }
    let (status, response) = app.post("/api/v1/orders", body).await;
    assert_eq!(status, StatusCode::CREATED, "{response}");
    (id_of(&response["data"]["id"]), product.variants[0].id)
}

async fn create_coupon(app: &TestApp, code: &str) {
    let (status, body) = app
        .admin(
            Method::POST,
            "/api/v1/coupons",
            Some(json!({
                "label": format!("Coupon {}", code),
                "code": code,
                "by_min_amount": "400",
                "discount_percentage": "10",
                "start_date": Utc::now().to_rfc3339(),
                "expiration_date": (Utc::now() + Duration::days(10)).to_rfc3339(),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
}

#[tokio::test]
async fn approved_webhook_pays_the_order_and_takes_stock() {
    let app = TestApp::new().await;
    let (order_id, variant_id) = place_order(&app, "paid@x.com", None).await;
    app.checkout.report("pay-1", "approved", order_id);

    let (status, body) = app.webhook("pay-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));

    let order = app.wait_for_status(order_id, OrderStatus::Paid).await;
    assert!(order.payment_url.is_none());
    assert_eq!(app.stock(variant_id, "M").await, 2);
}

#[tokio::test]
async fn duplicate_approvals_decrement_stock_once() {
    let app = TestApp::new().await;
    let (order_id, variant_id) = place_order(&app, "twice@x.com", None).await;
    app.checkout.report("pay-dup", "approved", order_id);

    app.webhook("pay-dup").await;
    app.webhook("pay-dup").await;
    app.wait_for_status(order_id, OrderStatus::Paid).await;
    app.settle().await;

    assert_eq!(app.stock(variant_id, "M").await, 2);

    // A direct replay is a no-op as well
    let outcome = app
        .state
        .services
        .lifecycle
        .handle_payment_completed(&PaymentNotification {
            status: "approved".into(),
            external_reference: order_id.to_string(),
        })
        .await
        .unwrap();
    assert_eq!(outcome, TransitionOutcome::Unchanged);
    assert_eq!(app.stock(variant_id, "M").await, 2);
}

#[tokio::test]
async fn rejected_payment_releases_the_coupon() {
    let app = TestApp::new().await;
    create_coupon(&app, "BACK25").await;
    let (order_id, variant_id) = place_order(&app, "rejected@x.com", Some("BACK25")).await;

    // The coupon is held while the order is pending
    let product = app.seed_product("Quote Coat", dec!(450), &[("M", 1)]).await;
    let quote = json!({
        "email": "rejected@x.com",
        "items": [{
            "product_id": product.product.id,
            "variant_id": product.variants[0].id,
            "size": "M",
            "quantity": 1,
        }],
        "coupon_code": "BACK25",
    });
    let (status, body) = app.post("/api/v1/orders/quote", quote.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Coupon is not available");

    app.checkout.report("pay-rej", "rejected", order_id);
    app.webhook("pay-rej").await;
    app.wait_for_status(order_id, OrderStatus::Rejected).await;

    assert_eq!(app.stock(variant_id, "M").await, 3);
    let (status, body) = app.post("/api/v1/orders/quote", quote).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["coupon_code"], "BACK25");
}

#[tokio::test]
async fn in_process_then_approved() {
    let app = TestApp::new().await;
    let (order_id, variant_id) = place_order(&app, "slow@x.com", None).await;

    app.checkout.report("pay-slow", "in_process", order_id);
    app.webhook("pay-slow").await;
    app.wait_for_status(order_id, OrderStatus::Processing).await;
    assert_eq!(app.stock(variant_id, "M").await, 3);

    app.checkout.report("pay-slow", "approved", order_id);
    app.webhook("pay-slow").await;
    app.wait_for_status(order_id, OrderStatus::Paid).await;
    assert_eq!(app.stock(variant_id, "M").await, 2);
}

#[tokio::test]
async fn settled_orders_ignore_later_callbacks() {
    let app = TestApp::new().await;
    let (order_id, variant_id) = place_order(&app, "settled@x.com", None).await;
    app.checkout.report("pay-late", "rejected", order_id);
    app.webhook("pay-late").await;
    app.wait_for_status(order_id, OrderStatus::Rejected).await;

    app.checkout.report("pay-late", "approved", order_id);
    app.webhook("pay-late").await;
    app.settle().await;

    assert_eq!(app.order(order_id).await.status, OrderStatus::Rejected);
    assert_eq!(app.stock(variant_id, "M").await, 3);
}

#[tokio::test]
async fn oversold_approval_leaves_order_and_stock_untouched() {
    let app = TestApp::new().await;
    let product = app.seed_product("Last Parka", dec!(300), &[("L", 1)]).await;
    let variant_id = product.variants[0].id;

    // Both orders pass the advisory stock check at creation time
    let (_, first) = app
        .post("/api/v1/orders", order_body("first@x.com", &product, "L", 1))
        .await;
    let (_, second) = app
        .post("/api/v1/orders", order_body("second@x.com", &product, "L", 1))
        .await;
    let first = id_of(&first["data"]["id"]);
    let second = id_of(&second["data"]["id"]);

    let lifecycle = app.state.services.lifecycle.clone();
    let approve = |id: uuid::Uuid| PaymentNotification {
        status: "approved".into(),
        external_reference: id.to_string(),
    };
    assert_eq!(
        lifecycle.handle_payment_completed(&approve(first)).await.unwrap(),
        TransitionOutcome::Applied(OrderStatus::Paid)
    );
    assert_eq!(
        lifecycle.handle_payment_completed(&approve(second)).await.unwrap(),
        TransitionOutcome::Oversold
    );

    assert_eq!(app.stock(variant_id, "L").await, 0);
    assert_eq!(app.order(second).await.status, OrderStatus::Pending);
}

#[tokio::test]
async fn unknown_callbacks_are_dropped() {
    let app = TestApp::new().await;
    let lifecycle = app.state.services.lifecycle.clone();

    for notification in [
        PaymentNotification {
            status: "charged_back".into(),
            external_reference: uuid::Uuid::new_v4().to_string(),
        },
        PaymentNotification {
            status: "approved".into(),
            external_reference: "not-a-uuid".into(),
        },
        PaymentNotification {
            status: "approved".into(),
            external_reference: uuid::Uuid::new_v4().to_string(),
        },
    ] {
        assert_eq!(
            lifecycle.handle_payment_completed(&notification).await.unwrap(),
            TransitionOutcome::Dropped
        );
    }
}

#[tokio::test]
async fn webhook_always_acknowledges() {
    let app = TestApp::new().await;

    // Unknown resource: the lookup fails but the provider still gets an ack
    let (status, body) = app.webhook("missing").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    // Non-payment topics and unreadable bodies too
    let (status, _) = app
        .post(
            "/api/v1/payments/webhooks",
            json!({ "resource": "1", "topic": "merchant_order" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.post("/api/v1/payments/webhooks", json!([1, 2, 3])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn webhook_query_parameters_are_understood() {
    let app = TestApp::new().await;
    let (order_id, _) = place_order(&app, "query@x.com", None).await;
    app.checkout.report("777", "approved", order_id);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/payments/webhooks?topic=payment&id=777",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    app.wait_for_status(order_id, OrderStatus::Paid).await;
}

#[tokio::test]
async fn signed_webhooks_need_a_valid_signature() {
    let app = TestApp::with_config(|cfg| {
        cfg.payments.webhook_secret = Some("whsec_test".into());
    })
    .await;
    let (order_id, _) = place_order(&app, "signed@x.com", None).await;
    app.checkout.report("pay-signed", "approved", order_id);

    // Unsigned delivery is acknowledged but not applied
    app.webhook("pay-signed").await;
    app.settle().await;
    assert_eq!(app.order(order_id).await.status, OrderStatus::Pending);
}

#[tokio::test]
async fn gateway_verification_settles_the_order() {
    let app = TestApp::new().await;
    let (status, _) = app
        .admin(
            Method::PUT,
            "/api/v1/store-settings",
            Some(json!({
                "gateway_name": "ePayco",
                "epayco": {
                    "public_key": "pub",
                    "private_key": "priv",
                    "client_cus_id": "cus-1",
                },
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (order_id, variant_id) = place_order(&app, "epayco@x.com", None).await;
    let total = app.order(order_id).await.total;

    let (status, body) = app
        .post(
            "/api/v1/payments/verify",
            json!({ "order_id": order_id, "reference": "ref-123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["approved"], true);
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(body["data"]["gateway"], "ePayco");
    assert_eq!(app.stock(variant_id, "M").await, 2);

    let attempts = app.epayco.attempts.lock().unwrap().clone();
    assert_matches!(
        attempts.as_slice(),
        [PaymentAttempt::Epayco { reference, expected_price }]
            if reference == "ref-123" && *expected_price == total
    );
}

#[tokio::test]
async fn declined_payu_verification_rejects() {
    let app = TestApp::new().await;
    app.admin(
        Method::PUT,
        "/api/v1/store-settings",
        Some(json!({
            "gateway_name": "PayU",
            "payu": {
                "merchant_id": "508029",
                "api_key": "4Vj8eK4rloUd272L48hsrarnUA",
                "api_login": "pRRXKOl8ikMmt9u",
                "account_id": "512321",
            },
        })),
    )
    .await;
    app.payu.answer(false);

    let (order_id, variant_id) = place_order(&app, "payu@x.com", None).await;
    let (status, body) = app
        .post(
            "/api/v1/payments/verify",
            json!({ "order_id": order_id, "reference": "payu-1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["approved"], false);
    assert_eq!(body["data"]["status"], "rejected");
    assert_eq!(app.stock(variant_id, "M").await, 3);
    assert_eq!(app.epayco.attempts.lock().unwrap().len(), 0);

    let attempts = app.payu.attempts.lock().unwrap().clone();
    assert_matches!(
        attempts.as_slice(),
        [PaymentAttempt::PayU { order_reference, credentials }]
            if order_reference == "payu-1" && credentials.merchant_id == "508029"
    );
}

#[tokio::test]
async fn verification_for_unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let (status, _) = app
        .post(
            "/api/v1/payments/verify",
            json!({ "order_id": uuid::Uuid::new_v4(), "reference": "x" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn redirect_pages_echo_their_query() {
    let app = TestApp::new().await;
    let (status, body) = app
        .get("/api/v1/payments/success?collection_status=approved&external_reference=abc")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["collection_status"], "approved");
    assert_eq!(body["data"]["external_reference"], "abc");
}
