use crate::errors::ServiceError;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pre-order basket. Prices are resolved live; nothing here is frozen.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shopping_carts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub email: String,
    #[sea_orm(column_type = "Json")]
    pub items: Json, // Vec<CartLine> serialized
    #[sea_orm(nullable)]
    pub coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn lines(&self) -> Result<Vec<CartLine>, ServiceError> {
        serde_json::from_value(self.items.clone())
            .map_err(|e| ServiceError::SerializationError(format!("cart items: {}", e)))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub size: String,
    pub quantity: i32,
}

impl CartLine {
    /// Two lines are the same product slot when product, variant and size match.
    pub fn same_slot(&self, other: &CartLine) -> bool {
        self.product_id == other.product_id
            && self.variant_id == other.variant_id
            && self.size == other.size
    }
}
