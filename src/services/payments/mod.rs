//! Payment providers and the service that connects them to orders.

pub mod epayco;
pub mod gateway;
pub mod mercadopago;
pub mod payu;

use crate::{
    entities::commerce::{Order, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        lifecycle::{OrderLifecycleService, PaymentStatus, TransitionOutcome},
        store_settings::{PaymentSettings, StoreSettingsService},
    },
};
use gateway::{GatewayName, PaymentAttempt, PaymentGatewayRegistry};
use hmac::{Hmac, Mac};
use mercadopago::CheckoutProvider;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

type HmacSha256 = Hmac<Sha256>;

/// MercadoPago IPN body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookNotification {
    pub resource: String,
    pub topic: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Ignored,
    Dispatched,
    Failed,
}

/// Header values MercadoPago signs its notifications with
#[derive(Debug, Clone, Default)]
pub struct WebhookSignature {
    pub signature: Option<String>,
    pub request_id: Option<String>,
    /// `data.id` query value; the notification resource is signed when absent
    pub data_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub order_id: Uuid,
    pub gateway: GatewayName,
    pub approved: bool,
    pub status: OrderStatus,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    checkout: Arc<dyn CheckoutProvider>,
    gateways: Arc<PaymentGatewayRegistry>,
    settings: Arc<StoreSettingsService>,
    lifecycle: Arc<OrderLifecycleService>,
    event_sender: Arc<EventSender>,
    webhook_secret: Option<String>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        checkout: Arc<dyn CheckoutProvider>,
        gateways: Arc<PaymentGatewayRegistry>,
        settings: Arc<StoreSettingsService>,
        lifecycle: Arc<OrderLifecycleService>,
        event_sender: Arc<EventSender>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            db,
            checkout,
            gateways,
            settings,
            lifecycle,
            event_sender,
            webhook_secret: webhook_secret.filter(|s| !s.is_empty()),
        }
    }

    /// Turn a provider notification into a `PaymentCompleted` event.
    ///
    /// Never fails: the provider only ever sees an acknowledgment, so errors are
    /// logged and reported through the outcome.
    #[instrument(skip(self, notification, signature), fields(topic = %notification.topic, resource = %notification.resource))]
    pub async fn handle_webhook(
        &self,
        notification: WebhookNotification,
        signature: WebhookSignature,
    ) -> WebhookOutcome {
        if notification.topic != "payment" {
            debug!("Ignoring non-payment notification");
            return WebhookOutcome::Ignored;
        }

        let data_id = signature.data_id.as_deref().unwrap_or(&notification.resource);
        if let Err(e) = self.verify_signature(data_id, &signature) {
            warn!(error = %e, "Webhook signature rejected");
            return WebhookOutcome::Failed;
        }

        match self.checkout.fetch_payment(&notification.resource).await {
            Ok(payment) => {
                info!(status = %payment.status, reference = %payment.external_reference, "Payment notification received");
                match self.event_sender.send(Event::PaymentCompleted(payment)).await {
                    Ok(()) => WebhookOutcome::Dispatched,
                    Err(e) => {
                        error!(error = %e, "Could not publish payment notification");
                        WebhookOutcome::Failed
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Could not fetch payment details");
                WebhookOutcome::Failed
            }
        }
    }

    /// Check `x-signature` (`ts=...,v1=...`) over the manifest
    /// `id:{id};request-id:{request_id};ts:{ts};`. Skipped without a secret.
    pub fn verify_signature(
        &self,
        data_id: &str,
        signature: &WebhookSignature,
    ) -> Result<(), ServiceError> {
        let Some(secret) = self.webhook_secret.as_deref() else {
            return Ok(());
        };
        verify_manifest_signature(secret, data_id, signature)
    }

    /// Ask the store's configured gateway about a payment and settle the order.
    #[instrument(skip(self))]
    pub async fn verify_gateway_payment(
        &self,
        order_id: Uuid,
        reference: &str,
    ) -> Result<VerificationResult, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let gateway = self.settings.active_gateway().await?;

        if order.status.is_terminal() {
            return Ok(VerificationResult {
                order_id,
                gateway,
                approved: order.status == OrderStatus::Paid,
                status: order.status,
            });
        }

        let attempt = match self.settings.payment_settings(gateway).await? {
            PaymentSettings::Epayco(_) => PaymentAttempt::Epayco {
                reference: reference.to_string(),
                expected_price: order.total,
            },
            PaymentSettings::PayU(credentials) => PaymentAttempt::PayU {
                order_reference: reference.to_string(),
                credentials,
            },
        };

        let approved = self.gateways.attempt(&attempt).await?;
        let status = if approved {
            PaymentStatus::Approved
        } else {
            PaymentStatus::Rejected
        };
        let outcome = self.lifecycle.apply(order_id, status).await?;

        let status = match outcome {
            TransitionOutcome::Applied(status) => status,
            TransitionOutcome::Oversold => {
                return Err(ServiceError::InsufficientStock(format!(
                    "Order {} cannot be covered by current stock",
                    order_id
                )))
            }
            TransitionOutcome::Unchanged | TransitionOutcome::Dropped => {
                Order::find_by_id(order_id)
                    .one(&*self.db)
                    .await?
                    .map(|o| o.status)
                    .unwrap_or(order.status)
            }
        };

        info!(%order_id, %gateway, approved, ?status, "Gateway payment verified");
        Ok(VerificationResult {
            order_id,
            gateway,
            approved,
            status,
        })
    }
}

fn signature_parts(header: &str) -> (Option<&str>, Option<&str>) {
    let mut ts = None;
    let mut v1 = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim()),
            Some(("v1", value)) => v1 = Some(value.trim()),
            _ => {}
        }
    }
    (ts, v1)
}

pub fn signature_manifest(data_id: &str, request_id: &str, ts: &str) -> String {
    format!("id:{};request-id:{};ts:{};", data_id, request_id, ts)
}

pub fn verify_manifest_signature(
    secret: &str,
    data_id: &str,
    signature: &WebhookSignature,
) -> Result<(), ServiceError> {
    let invalid = || ServiceError::Unauthorized("invalid webhook signature".to_string());

    let header = signature.signature.as_deref().ok_or_else(invalid)?;
    let (ts, v1) = signature_parts(header);
    let (ts, v1) = (ts.ok_or_else(invalid)?, v1.ok_or_else(invalid)?);
    let request_id = signature.request_id.as_deref().unwrap_or_default();
    let expected = hex::decode(v1).map_err(|_| invalid())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("webhook secret: {}", e)))?;
    mac.update(signature_manifest(data_id, request_id, ts).as_bytes());
    mac.verify_slice(&expected).map_err(|_| invalid())
}

/// `POST /payments/verify` body
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct VerifyPaymentInput {
    pub order_id: Uuid,
    #[validate(length(min = 1, max = 128))]
    pub reference: String,
}
