use crate::{
    entities::commerce::{
        store_setting::{self, EpaycoSettings, PayUSettings},
        StoreSetting, StoreSettingModel,
    },
    errors::ServiceError,
    services::payments::gateway::GatewayName,
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Credentials of the gateway a payment is verified with
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentSettings {
    Epayco(EpaycoSettings),
    PayU(PayUSettings),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSettingsView {
    pub gateway_name: Option<GatewayName>,
    pub epayco: Option<EpaycoSettings>,
    pub payu: Option<PayUSettings>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn decode<T: DeserializeOwned>(value: &Option<serde_json::Value>) -> Result<Option<T>, ServiceError> {
    value
        .clone()
        .map(serde_json::from_value)
        .transpose()
        .map_err(ServiceError::from)
}

impl TryFrom<&StoreSettingModel> for StoreSettingsView {
    type Error = ServiceError;

    fn try_from(model: &StoreSettingModel) -> Result<Self, Self::Error> {
        let gateway_name = model
            .gateway_name
            .as_deref()
            .map(GatewayName::from_str)
            .transpose()
            .map_err(|_| ServiceError::InternalError("stored gateway name is invalid".to_string()))?;
        Ok(Self {
            gateway_name,
            epayco: decode(&model.epayco_settings)?,
            payu: decode(&model.payu_settings)?,
            updated_at: Some(model.updated_at),
        })
    }
}

/// The single store configuration row.
#[derive(Clone)]
pub struct StoreSettingsService {
    db: Arc<DatabaseConnection>,
}

impl StoreSettingsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn current(&self) -> Result<Option<StoreSettingModel>, ServiceError> {
        Ok(StoreSetting::find().one(&*self.db).await?)
    }

    /// Settings as stored, or an empty view before anything was saved.
    pub async fn get_settings(&self) -> Result<StoreSettingsView, ServiceError> {
        match self.current().await? {
            Some(model) => StoreSettingsView::try_from(&model),
            None => Ok(StoreSettingsView::default()),
        }
    }

    /// Merge the input into the stored settings. Selecting a gateway requires
    /// its credentials to be present after the merge.
    #[instrument(skip(self, input))]
    pub async fn update_settings(
        &self,
        input: UpdateStoreSettingsInput,
    ) -> Result<StoreSettingsView, ServiceError> {
        input.validate()?;
        let existing = self.current().await?;
        let mut view = match &existing {
            Some(model) => StoreSettingsView::try_from(model)?,
            None => StoreSettingsView::default(),
        };

        if input.epayco.is_some() {
            view.epayco = input.epayco;
        }
        if input.payu.is_some() {
            view.payu = input.payu;
        }
        if input.gateway_name.is_some() {
            view.gateway_name = input.gateway_name;
        }

        match view.gateway_name {
            Some(GatewayName::Epayco) if view.epayco.is_none() => {
                return Err(ServiceError::BadRequest(
                    "ePayco settings are required to select ePayco".to_string(),
                ))
            }
            Some(GatewayName::PayU) if view.payu.is_none() => {
                return Err(ServiceError::BadRequest(
                    "PayU settings are required to select PayU".to_string(),
                ))
            }
            _ => {}
        }

        let now = Utc::now();
        let epayco = view.epayco.as_ref().map(serde_json::to_value).transpose()?;
        let payu = view.payu.as_ref().map(serde_json::to_value).transpose()?;
        let gateway_name = view.gateway_name.map(|g| g.to_string());

        let saved = match existing {
            Some(model) => {
                let mut active: store_setting::ActiveModel = model.into();
                active.gateway_name = Set(gateway_name);
                active.epayco_settings = Set(epayco);
                active.payu_settings = Set(payu);
                active.updated_at = Set(now);
                active.update(&*self.db).await?
            }
            None => {
                store_setting::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    gateway_name: Set(gateway_name),
                    epayco_settings: Set(epayco),
                    payu_settings: Set(payu),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?
            }
        };

        info!(gateway = ?view.gateway_name, "Store settings saved");
        StoreSettingsView::try_from(&saved)
    }

    /// The gateway payments are currently verified with.
    pub async fn active_gateway(&self) -> Result<GatewayName, ServiceError> {
        self.get_settings()
            .await?
            .gateway_name
            .ok_or_else(|| ServiceError::BadRequest("No payment gateway configured".to_string()))
    }

    pub async fn payment_settings(
        &self,
        gateway: GatewayName,
    ) -> Result<PaymentSettings, ServiceError> {
        let view = self.get_settings().await?;
        let missing = || ServiceError::BadRequest(format!("{} settings are not configured", gateway));
        match gateway {
            GatewayName::Epayco => view.epayco.map(PaymentSettings::Epayco).ok_or_else(missing),
            GatewayName::PayU => view.payu.map(PaymentSettings::PayU).ok_or_else(missing),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateStoreSettingsInput {
    pub gateway_name: Option<GatewayName>,
    #[validate]
    pub epayco: Option<EpaycoSettings>,
    #[validate]
    pub payu: Option<PayUSettings>,
}
