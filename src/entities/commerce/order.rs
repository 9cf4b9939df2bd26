use crate::errors::ServiceError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placed order. Line items, shipping address and discount metadata are frozen
/// JSON snapshots taken at creation time.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub email: String,
    pub status: OrderStatus,
    #[sea_orm(column_type = "Json")]
    pub items: Json, // Vec<OrderItem> serialized
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub coupon_discount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total: Decimal,
    #[sea_orm(column_type = "Json")]
    pub shipping_address: Json, // ShippingAddress serialized
    #[sea_orm(nullable)]
    pub coupon_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub coupon_code: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub first_purchase_discount: Option<Json>,
    #[sea_orm(column_type = "Text", nullable)]
    pub payment_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn line_items(&self) -> Result<Vec<OrderItem>, ServiceError> {
        serde_json::from_value(self.items.clone())
            .map_err(|e| ServiceError::SerializationError(format!("order items: {}", e)))
    }

    pub fn shipping(&self) -> Result<ShippingAddress, ServiceError> {
        serde_json::from_value(self.shipping_address.clone())
            .map_err(|e| ServiceError::SerializationError(format!("shipping address: {}", e)))
    }

    pub fn first_purchase(&self) -> Option<FirstPurchaseDiscount> {
        self.first_purchase_discount
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "abandoned")]
    Abandoned,
}

impl OrderStatus {
    /// PAID and REJECTED accept no further payment callbacks.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Rejected)
    }

    /// States a payment callback may still move the order out of.
    pub fn open_states() -> [OrderStatus; 3] {
        [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Abandoned,
        ]
    }
}

/// Frozen copy of one ordered line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub color: String,
    pub size: String,
    pub quantity: i32,
    /// Unit price actually charged (offer price when an offer applied)
    pub price: Decimal,
    pub offer_info: OfferInfo,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Offer attribution recorded per line for audit and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferInfo {
    pub has_offer: bool,
    pub original_price: Decimal,
    pub offer_price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub offer_id: Option<Uuid>,
}

impl OfferInfo {
    pub fn none(original_price: Decimal) -> Self {
        Self {
            has_offer: false,
            original_price,
            offer_price: None,
            discount: None,
            offer_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub state: String,
    pub city: String,
    pub address: String,
    pub additional_details: Option<String>,
    pub phone: String,
}

/// Automatic discount on a customer's first non-rejected order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirstPurchaseDiscount {
    pub applied: bool,
    pub discount: Decimal,
}
