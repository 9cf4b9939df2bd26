use std::time::Duration;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::{
    config::PaymentsConfig,
    entities::commerce::{order::OfferInfo, order::OrderItem, store_setting::PayUSettings},
    errors::ServiceError,
    services::payments::{
        epayco::EpaycoGateway,
        gateway::{PaymentAttempt, PaymentGateway},
        mercadopago::{CheckoutProvider, MercadoPagoClient, PaymentIntent, PREFERENCE_FAILED},
        payu::PayUGateway,
    },
};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(2);

fn epayco_attempt(reference: &str) -> PaymentAttempt {
    PaymentAttempt::Epayco {
        reference: reference.to_string(),
        expected_price: dec!(360),
    }
}

async fn epayco_answering(state: serde_json::Value, amount: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/validation/v1/reference/ref-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "x_amount": amount,
                "x_cod_transaction_state": state,
            }
        })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn epayco_accepted_state_approves() {
    let server = epayco_answering(json!(1), json!("360")).await;
    let gateway = EpaycoGateway::new(server.uri(), TIMEOUT).unwrap();
    assert!(gateway.attempt(&epayco_attempt("ref-1")).await.unwrap());
}

#[tokio::test]
async fn epayco_rejected_and_failed_states_decline() {
    for state in [json!(2), json!("3")] {
        let server = epayco_answering(state, json!(360)).await;
        let gateway = EpaycoGateway::new(server.uri(), TIMEOUT).unwrap();
        assert!(!gateway.attempt(&epayco_attempt("ref-1")).await.unwrap());
    }
}

#[tokio::test]
async fn epayco_amount_mismatch_fails_the_payment() {
    let server = epayco_answering(json!(1), json!("359.99")).await;
    let gateway = EpaycoGateway::new(server.uri(), TIMEOUT).unwrap();
    assert_matches!(
        gateway.attempt(&epayco_attempt("ref-1")).await,
        Err(ServiceError::PaymentFailed(msg)) if msg == "price mismatch"
    );
}

#[tokio::test]
async fn epayco_without_amount_follows_the_state() {
    let server = epayco_answering(json!(1), json!(null)).await;
    let gateway = EpaycoGateway::new(server.uri(), TIMEOUT).unwrap();
    assert!(gateway.attempt(&epayco_attempt("ref-1")).await.unwrap());
}

#[tokio::test]
async fn epayco_pending_state_is_an_upstream_error() {
    let server = epayco_answering(json!(7), json!(360)).await;
    let gateway = EpaycoGateway::new(server.uri(), TIMEOUT).unwrap();
    assert_matches!(
        gateway.attempt(&epayco_attempt("ref-1")).await,
        Err(ServiceError::ExternalServiceError(msg)) if msg == "unknown payment state"
    );
}

#[tokio::test]
async fn epayco_server_error_is_an_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let gateway = EpaycoGateway::new(server.uri(), TIMEOUT).unwrap();
    assert_matches!(
        gateway.attempt(&epayco_attempt("ref-1")).await,
        Err(ServiceError::ExternalServiceError(_))
    );
}

#[tokio::test]
async fn slow_gateways_time_out_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_json(json!({ "data": { "x_cod_transaction_state": 1 } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = EpaycoGateway::new(server.uri(), Duration::from_millis(200)).unwrap();
    assert_matches!(
        gateway.attempt(&epayco_attempt("ref-1")).await,
        Err(ServiceError::ExternalServiceError(msg)) if msg == "payment provider timed out"
    );
}

#[tokio::test]
async fn epayco_refuses_other_attempts() {
    let gateway = EpaycoGateway::new("http://127.0.0.1:9", TIMEOUT).unwrap();
    let attempt = PaymentAttempt::PayU {
        order_reference: "1".into(),
        credentials: credentials(),
    };
    assert_matches!(
        gateway.attempt(&attempt).await,
        Err(ServiceError::InvalidInput(_))
    );
}

fn credentials() -> PayUSettings {
    PayUSettings {
        merchant_id: "508029".into(),
        api_key: "4Vj8eK4rloUd272L48hsrarnUA".into(),
        api_login: "pRRXKOl8ikMmt9u".into(),
        account_id: "512321".into(),
    }
}

fn payu_report(state: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<reportingResponse>
  <code>SUCCESS</code>
  <error/>
  <result>
    <payload>
      <transactions>
        <transaction>
          <transactionResponse><state>{}</state></transactionResponse>
        </transaction>
      </transactions>
    </payload>
  </result>
</reportingResponse>"#,
        state
    )
}

async fn payu_answering(body: String) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports"))
        .and(body_partial_json(json!({
            "test": true,
            "language": "es",
            "command": "ORDER_DETAIL",
            "merchant": { "apiKey": "4Vj8eK4rloUd272L48hsrarnUA", "apiLogin": "pRRXKOl8ikMmt9u" },
            "details": { "orderId": "844201" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/xml"))
        .mount(&server)
        .await;
    server
}

fn payu_attempt() -> PaymentAttempt {
    PaymentAttempt::PayU {
        order_reference: "844201".into(),
        credentials: credentials(),
    }
}

#[tokio::test]
async fn payu_approved_report() {
    let server = payu_answering(payu_report("APPROVED")).await;
    let gateway = PayUGateway::new(format!("{}/reports", server.uri()), TIMEOUT).unwrap();
    assert!(gateway.attempt(&payu_attempt()).await.unwrap());
}

#[tokio::test]
async fn payu_declined_report() {
    let server = payu_answering(payu_report("DECLINED")).await;
    let gateway = PayUGateway::new(format!("{}/reports", server.uri()), TIMEOUT).unwrap();
    assert!(!gateway.attempt(&payu_attempt()).await.unwrap());
}

#[tokio::test]
async fn payu_report_error_is_an_upstream_error() {
    let server = payu_answering(
        "<reportingResponse><code>ERROR</code><error>Invalid order</error></reportingResponse>"
            .to_string(),
    )
    .await;
    let gateway = PayUGateway::new(format!("{}/reports", server.uri()), TIMEOUT).unwrap();
    assert_matches!(
        gateway.attempt(&payu_attempt()).await,
        Err(ServiceError::ExternalServiceError(msg)) if msg == "Invalid order"
    );
}

#[tokio::test]
async fn payu_live_mode_is_not_a_test_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "test": false })))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(payu_report("APPROVED"), "application/xml"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = PayUGateway::new(server.uri(), TIMEOUT).unwrap().live();
    assert!(gateway.attempt(&payu_attempt()).await.unwrap());
}

fn payments_config(server: &MockServer) -> PaymentsConfig {
    PaymentsConfig {
        mercadopago_api_url: server.uri(),
        mercadopago_access_token: "TEST-token".into(),
        notification_url: "https://shop.test/api/v1/payments/webhooks".into(),
        success_url: "https://shop.test/success".into(),
        failure_url: "https://shop.test/failure".into(),
        ..PaymentsConfig::default()
    }
}

fn intent() -> PaymentIntent {
    let price = dec!(500);
    PaymentIntent {
        order_id: Uuid::parse_str("5b0c6f5e-1a34-4e34-9d7a-3f2d8e1f2a10").unwrap(),
        email: "new@x.com".into(),
        items: vec![OrderItem {
            product_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            product_name: "Linen Shirt".into(),
            color: "Black".into(),
            size: "M".into(),
            quantity: 1,
            price,
            offer_info: OfferInfo::none(price),
        }],
        total: dec!(360),
    }
}

#[tokio::test]
async fn mercadopago_preference_returns_the_checkout_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .and(header("authorization", "Bearer TEST-token"))
        .and(body_partial_json(json!({
            "external_reference": "5b0c6f5e-1a34-4e34-9d7a-3f2d8e1f2a10",
            "notification_url": "https://shop.test/api/v1/payments/webhooks",
            "back_urls": { "success": "https://shop.test/success", "failure": "https://shop.test/failure" },
            "payer": { "email": "new@x.com" },
            "expires": true,
            "items": [{ "quantity": 1, "unit_price": 360.0 }],
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "pref-1",
            "init_point": "https://www.mercadopago.test/checkout?pref_id=pref-1",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = MercadoPagoClient::new(&payments_config(&server)).unwrap();
    let url = client.create_payment_intent(&intent()).await.unwrap();
    assert_eq!(url, "https://www.mercadopago.test/checkout?pref_id=pref-1");
}

#[tokio::test]
async fn mercadopago_without_init_point_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "pref-2" })))
        .mount(&server)
        .await;

    let client = MercadoPagoClient::new(&payments_config(&server)).unwrap();
    assert_matches!(
        client.create_payment_intent(&intent()).await,
        Err(ServiceError::InternalError(msg)) if msg == PREFERENCE_FAILED
    );
}

#[tokio::test]
async fn mercadopago_payment_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payments/123456"))
        .and(header("authorization", "Bearer TEST-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 123456,
            "status": "approved",
            "external_reference": "5b0c6f5e-1a34-4e34-9d7a-3f2d8e1f2a10",
        })))
        .mount(&server)
        .await;

    let client = MercadoPagoClient::new(&payments_config(&server)).unwrap();
    let payment = client.fetch_payment("123456").await.unwrap();
    assert_eq!(payment.status, "approved");
    assert_eq!(
        payment.external_reference,
        "5b0c6f5e-1a34-4e34-9d7a-3f2d8e1f2a10"
    );
}

#[tokio::test]
async fn mercadopago_unknown_payment_is_an_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = MercadoPagoClient::new(&payments_config(&server)).unwrap();
    assert_matches!(
        client.fetch_payment("nope").await,
        Err(ServiceError::ExternalServiceError(_))
    );
}
