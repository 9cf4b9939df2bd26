use crate::{
    config::PaymentsConfig, entities::commerce::order::OrderItem, errors::ServiceError,
    events::PaymentNotification,
};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use uuid::Uuid;

pub const PREFERENCE_FAILED: &str = "Failed to create Mercado Pago preference";

/// What a hosted checkout needs to charge an order
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    pub order_id: Uuid,
    pub email: String,
    pub items: Vec<OrderItem>,
    /// Frozen total after every discount
    pub total: Decimal,
}

/// Hosted checkout with webhook callbacks.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    /// Create the checkout and return the URL the customer pays at.
    async fn create_payment_intent(&self, intent: &PaymentIntent) -> Result<String, ServiceError>;

    /// Resolve a webhook resource id to the payment it reports.
    async fn fetch_payment(&self, resource_id: &str) -> Result<PaymentNotification, ServiceError>;
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct PreferenceItem {
    pub id: String,
    pub title: String,
    pub quantity: i32,
    /// MercadoPago wants a JSON number here
    pub unit_price: f64,
}

#[derive(Debug, Serialize)]
struct BackUrls<'a> {
    success: &'a str,
    failure: &'a str,
}

#[derive(Debug, Serialize)]
struct PreferenceRequest<'a> {
    items: Vec<PreferenceItem>,
    external_reference: String,
    notification_url: &'a str,
    back_urls: BackUrls<'a>,
    payer: Payer<'a>,
    expires: bool,
}

#[derive(Debug, Serialize)]
struct Payer<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    #[serde(default)]
    init_point: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    status: String,
    #[serde(default)]
    external_reference: Option<String>,
}

/// Preference lines for an intent. When discounts moved the total away from
/// the line sum, a single line priced at the total is sent instead.
pub(crate) fn preference_items(intent: &PaymentIntent) -> Vec<PreferenceItem> {
    let line_sum: Decimal = intent.items.iter().map(OrderItem::line_total).sum();
    if line_sum == intent.total {
        return intent
            .items
            .iter()
            .map(|item| PreferenceItem {
                id: item.variant_id.to_string(),
                title: format!("{} {} {}", item.product_name, item.color, item.size),
                quantity: item.quantity,
                unit_price: item.price.to_f64().unwrap_or_default(),
            })
            .collect();
    }
    vec![PreferenceItem {
        id: intent.order_id.to_string(),
        title: format!("Order {}", intent.order_id),
        quantity: 1,
        unit_price: intent.total.to_f64().unwrap_or_default(),
    }]
}

pub struct MercadoPagoClient {
    client: Client,
    api_url: String,
    access_token: String,
    notification_url: String,
    success_url: String,
    failure_url: String,
}

impl MercadoPagoClient {
    pub fn new(config: &PaymentsConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.gateway_timeout())
            .build()
            .map_err(|e| ServiceError::InternalError(format!("MercadoPago client: {}", e)))?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &PaymentsConfig, client: Client) -> Self {
        Self {
            client,
            api_url: config.mercadopago_api_url.trim_end_matches('/').to_string(),
            access_token: config.mercadopago_access_token.clone(),
            notification_url: config.notification_url.clone(),
            success_url: config.success_url.clone(),
            failure_url: config.failure_url.clone(),
        }
    }
}

#[async_trait]
impl CheckoutProvider for MercadoPagoClient {
    #[instrument(skip(self, intent), fields(order_id = %intent.order_id))]
    async fn create_payment_intent(&self, intent: &PaymentIntent) -> Result<String, ServiceError> {
        let body = PreferenceRequest {
            items: preference_items(intent),
            external_reference: intent.order_id.to_string(),
            notification_url: &self.notification_url,
            back_urls: BackUrls {
                success: &self.success_url,
                failure: &self.failure_url,
            },
            payer: Payer {
                email: &intent.email,
            },
            expires: true,
        };

        let response = self
            .client
            .post(format!("{}/checkout/preferences", self.api_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            error!(status = %response.status(), "MercadoPago rejected the preference");
            return Err(ServiceError::InternalError(PREFERENCE_FAILED.to_string()));
        }

        let preference: PreferenceResponse = response.json().await?;
        let url = preference
            .init_point
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ServiceError::InternalError(PREFERENCE_FAILED.to_string()))?;

        info!("MercadoPago preference created");
        Ok(url)
    }

    #[instrument(skip(self))]
    async fn fetch_payment(&self, resource_id: &str) -> Result<PaymentNotification, ServiceError> {
        let response = self
            .client
            .get(format!("{}/v1/payments/{}", self.api_url, resource_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "MercadoPago payment lookup answered {}",
                response.status()
            )));
        }

        let payment: PaymentResponse = response.json().await?;
        Ok(PaymentNotification {
            status: payment.status,
            external_reference: payment.external_reference.unwrap_or_default(),
        })
    }
}
