use crate::{entities::commerce::store_setting::PayUSettings, errors::ServiceError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{info, instrument};

/// Gateways a store can verify payments with
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum GatewayName {
    #[serde(rename = "ePayco")]
    #[strum(serialize = "ePayco")]
    Epayco,
    #[serde(rename = "PayU")]
    #[strum(serialize = "PayU")]
    PayU,
}

/// One verification request, shaped per provider.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentAttempt {
    /// ePayco checks a transaction reference against the price we expect
    Epayco {
        reference: String,
        expected_price: Decimal,
    },
    /// PayU reports are queried with the merchant credentials
    PayU {
        order_reference: String,
        credentials: PayUSettings,
    },
}

impl PaymentAttempt {
    pub fn gateway(&self) -> GatewayName {
        match self {
            PaymentAttempt::Epayco { .. } => GatewayName::Epayco,
            PaymentAttempt::PayU { .. } => GatewayName::PayU,
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            PaymentAttempt::Epayco { reference, .. } => reference,
            PaymentAttempt::PayU {
                order_reference, ..
            } => order_reference,
        }
    }
}

/// Uniform approve/decline contract over a payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> GatewayName;

    /// `Ok(true)` approved, `Ok(false)` declined. Anything the provider says
    /// that is neither is an error.
    async fn attempt(&self, attempt: &PaymentAttempt) -> Result<bool, ServiceError>;
}

/// Gateways by name, assembled once at startup and shared by reference.
#[derive(Clone, Default)]
pub struct PaymentGatewayRegistry {
    gateways: HashMap<GatewayName, Arc<dyn PaymentGateway>>,
}

impl fmt::Debug for PaymentGatewayRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentGatewayRegistry")
            .field("gateways", &self.gateways.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PaymentGatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `gateway` under its own name, replacing any previous entry.
    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) -> &mut Self {
        self.gateways.insert(gateway.name(), gateway);
        self
    }

    pub fn get(&self, name: GatewayName) -> Result<Arc<dyn PaymentGateway>, ServiceError> {
        self.gateways
            .get(&name)
            .cloned()
            .ok_or_else(|| ServiceError::InvalidInput(format!("Unknown payment gateway {}", name)))
    }

    pub fn names(&self) -> Vec<GatewayName> {
        self.gateways.keys().copied().collect()
    }

    /// Route the attempt to the gateway its variant names.
    #[instrument(skip(self, attempt), fields(gateway = %attempt.gateway(), reference = %attempt.reference()))]
    pub async fn attempt(&self, attempt: &PaymentAttempt) -> Result<bool, ServiceError> {
        let gateway = self.get(attempt.gateway())?;
        let approved = gateway.attempt(attempt).await?;
        info!(approved, "Gateway answered");
        Ok(approved)
    }
}
