use super::gateway::{GatewayName, PaymentAttempt, PaymentGateway};
use crate::errors::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Verifies ePayco transactions through the reference validation endpoint.
pub struct EpaycoGateway {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    data: ValidationData,
}

#[derive(Debug, Deserialize)]
struct ValidationData {
    #[serde(default)]
    x_amount: Option<serde_json::Value>,
    #[serde(default)]
    x_cod_transaction_state: Option<serde_json::Value>,
}

impl EpaycoGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("ePayco client: {}", e)))?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn validate(&self, reference: &str, expected: Decimal) -> Result<bool, ServiceError> {
        let url = format!("{}/validation/v1/reference/{}", self.base_url, reference);
        debug!(%url, "Validating ePayco reference");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "ePayco answered {}",
                response.status()
            )));
        }
        let body: ValidationResponse = response.json().await?;

        match body.data.x_amount.as_ref().and_then(decimal_of) {
            Some(amount) if amount != expected => {
                warn!(%reference, %amount, %expected, "ePayco amount differs from order total");
                return Err(ServiceError::PaymentFailed("price mismatch".to_string()));
            }
            Some(_) => {}
            None => {
                warn!(%reference, %expected, "ePayco response carries no amount; total not verified");
            }
        }

        match body.data.x_cod_transaction_state.as_ref().and_then(integer_of) {
            Some(1) => Ok(true),
            Some(2) | Some(3) => Ok(false),
            _ => Err(ServiceError::ExternalServiceError(
                "unknown payment state".to_string(),
            )),
        }
    }
}

/// ePayco sends numbers either bare or quoted.
fn decimal_of(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integer_of(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl PaymentGateway for EpaycoGateway {
    fn name(&self) -> GatewayName {
        GatewayName::Epayco
    }

    async fn attempt(&self, attempt: &PaymentAttempt) -> Result<bool, ServiceError> {
        match attempt {
            PaymentAttempt::Epayco {
                reference,
                expected_price,
            } => self.validate(reference, *expected_price).await,
            other => Err(ServiceError::InvalidInput(format!(
                "ePayco cannot process a {} attempt",
                other.gateway()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_parse_bare_or_quoted() {
        assert_eq!(decimal_of(&json!(360)), Some(Decimal::from(360)));
        assert_eq!(decimal_of(&json!("360.50")), "360.50".parse().ok());
        assert_eq!(integer_of(&json!("2")), Some(2));
        assert_eq!(integer_of(&json!(null)), None);
    }
}
