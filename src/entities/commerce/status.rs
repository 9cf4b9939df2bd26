use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Availability flag shared by categories, offers and coupons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    Inactive,
}

impl ActivityStatus {
    pub fn is_active(self) -> bool {
        self == ActivityStatus::Active
    }
}
