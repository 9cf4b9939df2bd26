use crate::handlers::common::{success_response, JsonBody};
use crate::{
    errors::ServiceError,
    services::payments::{VerifyPaymentInput, WebhookNotification, WebhookSignature},
    AppState,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};
use validator::Validate;

/// Payment callbacks and redirects. All public: the webhook is authenticated
/// by signature (when a secret is configured), verification by the gateway.
pub fn payments_routes() -> Router<AppState> {
    Router::new()
        .route("/webhooks", post(payment_webhook))
        .route("/success", get(payment_success))
        .route("/failure", get(payment_failure))
        .route("/verify", post(verify_payment))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// The notification from the JSON body, or from `topic`/`id` query
/// parameters when the body carries nothing usable.
fn notification_from(body: &[u8], query: &HashMap<String, String>) -> Option<WebhookNotification> {
    if let Ok(notification) = serde_json::from_slice::<WebhookNotification>(body) {
        return Some(notification);
    }
    let topic = query.get("topic").or_else(|| query.get("type"))?;
    let resource = query.get("id").or_else(|| query.get("data.id"))?;
    Some(WebhookNotification {
        resource: resource.clone(),
        topic: topic.clone(),
    })
}

/// Always acknowledges, whatever happened, so the provider never retries.
async fn payment_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match notification_from(&body, &query) {
        Some(notification) => {
            let signature = WebhookSignature {
                signature: header_value(&headers, "x-signature"),
                request_id: header_value(&headers, "x-request-id"),
                data_id: query.get("data.id").cloned(),
            };
            let outcome = state
                .services
                .payments
                .handle_webhook(notification, signature)
                .await;
            debug!(?outcome, "Webhook handled");
        }
        None => warn!("Unreadable payment webhook acknowledged"),
    }

    Json(json!({ "ok": true })).into_response()
}

async fn payment_success(Query(query): Query<HashMap<String, String>>) -> Response {
    success_response(query)
}

async fn payment_failure(Query(query): Query<HashMap<String, String>>) -> Response {
    success_response(query)
}

async fn verify_payment(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<VerifyPaymentInput>,
) -> Result<Response, ServiceError> {
    payload.validate()?;
    let result = state
        .services
        .payments
        .verify_gateway_payment(payload.order_id, payload.reference.trim())
        .await?;
    Ok(success_response(result))
}
