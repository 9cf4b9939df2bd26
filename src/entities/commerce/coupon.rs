use super::status::ActivityStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Redeemable code discount. Exactly one of `by_min_amount`/`by_product` and
/// exactly one of `discount_amount`/`discount_percentage` is set.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub label: String,
    pub code: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub by_min_amount: Option<Decimal>,
    #[sea_orm(nullable)]
    pub by_product: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub discount_amount: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub discount_percentage: Option<Decimal>,
    pub status: ActivityStatus,
    pub start_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_redemption::Entity")]
    Redemptions,
}

impl Related<super::coupon_redemption::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Redemptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
