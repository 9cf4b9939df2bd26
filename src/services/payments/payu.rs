use super::gateway::{GatewayName, PaymentAttempt, PaymentGateway};
use crate::{entities::commerce::store_setting::PayUSettings, errors::ServiceError};
use async_trait::async_trait;
use quick_xml::{events::Event as XmlEvent, Reader};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const TRANSACTION_STATE_PATH: &[&str] = &[
    "reportingResponse",
    "result",
    "payload",
    "transactions",
    "transaction",
    "transactionResponse",
    "state",
];
const ERROR_PATH: &[&str] = &["reportingResponse", "error"];

/// Queries PayU order reports and reads the transaction state.
pub struct PayUGateway {
    client: Client,
    url: String,
    test_mode: bool,
}

#[derive(Debug, Serialize)]
struct ReportQuery<'a> {
    test: bool,
    language: &'static str,
    command: &'static str,
    merchant: Merchant<'a>,
    details: Details<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Merchant<'a> {
    api_key: &'a str,
    api_login: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Details<'a> {
    order_id: &'a str,
}

/// What matters in a PayU report
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PayUReport {
    pub error: Option<String>,
    pub transaction_states: Vec<String>,
}

impl PayUReport {
    pub fn approved(&self) -> bool {
        self.transaction_states.iter().any(|s| s == "APPROVED")
    }
}

/// Walk the XML keeping the element path and collect the two leaves we need.
pub fn parse_report(xml: &str) -> Result<PayUReport, ServiceError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut report = PayUReport::default();

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(element)) => {
                path.push(String::from_utf8_lossy(element.name().as_ref()).into_owned());
            }
            Ok(XmlEvent::End(_)) => {
                path.pop();
            }
            Ok(XmlEvent::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|e| ServiceError::ExternalServiceError(format!("PayU XML: {}", e)))?
                    .into_owned();
                if path == ERROR_PATH {
                    if !value.is_empty() {
                        report.error = Some(value);
                    }
                } else if path == TRANSACTION_STATE_PATH {
                    report.transaction_states.push(value);
                }
            }
            Ok(XmlEvent::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ServiceError::ExternalServiceError(format!(
                    "PayU XML at {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    Ok(report)
}

impl PayUGateway {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("PayU client: {}", e)))?;
        Ok(Self::with_client(url, client))
    }

    pub fn with_client(url: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            url: url.into(),
            test_mode: true,
        }
    }

    /// Production accounts query with `test: false`.
    pub fn live(mut self) -> Self {
        self.test_mode = false;
        self
    }

    async fn query(
        &self,
        order_reference: &str,
        credentials: &PayUSettings,
    ) -> Result<bool, ServiceError> {
        let body = ReportQuery {
            test: self.test_mode,
            language: "es",
            command: "ORDER_DETAIL",
            merchant: Merchant {
                api_key: &credentials.api_key,
                api_login: &credentials.api_login,
            },
            details: Details {
                order_id: order_reference,
            },
        };

        let response = self.client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "PayU answered {}",
                response.status()
            )));
        }

        let xml = response.text().await?;
        let report = parse_report(&xml)?;
        if let Some(error) = report.error {
            warn!(%order_reference, %error, "PayU report error");
            return Err(ServiceError::ExternalServiceError(error));
        }

        debug!(%order_reference, states = ?report.transaction_states, "PayU report");
        Ok(report.approved())
    }
}

#[async_trait]
impl PaymentGateway for PayUGateway {
    fn name(&self) -> GatewayName {
        GatewayName::PayU
    }

    async fn attempt(&self, attempt: &PaymentAttempt) -> Result<bool, ServiceError> {
        match attempt {
            PaymentAttempt::PayU {
                order_reference,
                credentials,
            } => self.query(order_reference, credentials).await,
            other => Err(ServiceError::InvalidInput(format!(
                "PayU cannot process a {} attempt",
                other.gateway()
            ))),
        }
    }
}
