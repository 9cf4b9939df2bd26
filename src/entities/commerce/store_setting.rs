use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Single-row store configuration: which gateway verifies payments and its credentials.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "store_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(nullable)]
    pub gateway_name: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub epayco_settings: Option<Json>,
    #[sea_orm(column_type = "Json", nullable)]
    pub payu_settings: Option<Json>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EpaycoSettings {
    #[validate(length(min = 1))]
    pub public_key: String,
    #[validate(length(min = 1))]
    pub private_key: String,
    #[validate(length(min = 1))]
    pub client_cus_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PayUSettings {
    #[validate(length(min = 1))]
    pub merchant_id: String,
    #[validate(length(min = 1))]
    pub api_key: String,
    #[validate(length(min = 1))]
    pub api_login: String,
    #[validate(length(min = 1))]
    pub account_id: String,
}
