use super::status::ActivityStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Automatic discount targeting a product or a category inside a date window.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "offers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub label: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(nullable)]
    pub image: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub discount_amount: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub discount_percentage: Option<Decimal>,
    #[sea_orm(nullable)]
    pub by_product: Option<Uuid>,
    #[sea_orm(nullable)]
    pub by_category: Option<Uuid>,
    pub status: ActivityStatus,
    pub start_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Active flag set and `now` inside `[start_date, expiration_date]`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active() && self.start_date <= now && now <= self.expiration_date
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
