use super::discount::{apply_offer_price, start_of_day, DateWindow, DiscountMode};
use crate::{
    entities::commerce::{offer, ActivityStatus, Offer, OfferModel, ProductModel},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Condition, Expr},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

pub const OFFER_LABEL_EXISTS: &str = "Offer label already exists";
pub const OFFER_TARGET_REQUIRED: &str = "An offer targets exactly one of byProduct or byCategory";
pub const OFFER_TARGET_IMMUTABLE: &str =
    "Cannot change the target of an existing offer. Create a new one instead";
pub const OFFER_MODE_IMMUTABLE: &str =
    "Cannot change the discount mode of an existing offer. Create a new one instead";

/// Resolved offer price for one product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OfferPrice {
    pub offer_id: Uuid,
    pub price: Decimal,
}

#[derive(Clone)]
pub struct OfferService {
    db: Arc<DatabaseConnection>,
}

impl OfferService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_offer(&self, input: CreateOfferInput) -> Result<OfferModel, ServiceError> {
        input.validate()?;
        let now = Utc::now();

        if input.by_product.is_some() == input.by_category.is_some() {
            return Err(ServiceError::BadRequest(OFFER_TARGET_REQUIRED.to_string()));
        }
        DiscountMode::from_fields(input.discount_amount, input.discount_percentage)?;

        let label = input.label.trim().to_string();
        self.ensure_unique_label(&label, None).await?;

        let window = DateWindow::normalize(input.start_date, input.expiration_date, now)?;

        let offer = offer::ActiveModel {
            id: Set(Uuid::new_v4()),
            label: Set(label),
            description: Set(input.description),
            image: Set(input.image),
            discount_amount: Set(input.discount_amount),
            discount_percentage: Set(input.discount_percentage),
            by_product: Set(input.by_product),
            by_category: Set(input.by_category),
            status: Set(window.initial_status(now)),
            start_date: Set(window.start),
            expiration_date: Set(window.expiration),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(offer_id = %offer.id, status = ?offer.status, "Created offer");
        Ok(offer)
    }

    pub async fn get_offer(&self, id: Uuid) -> Result<OfferModel, ServiceError> {
        Offer::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Offer not found".to_string()))
    }

    pub async fn list_offers(
        &self,
        status: Option<ActivityStatus>,
    ) -> Result<Vec<OfferModel>, ServiceError> {
        let mut query = Offer::find().order_by_desc(offer::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(offer::Column::Status.eq(status));
        }
        Ok(query.all(&*self.db).await?)
    }

    /// Update label, copy, discount value or dates. The target and the
    /// discount mode are fixed at creation.
    #[instrument(skip(self))]
    pub async fn update_offer(
        &self,
        id: Uuid,
        input: UpdateOfferInput,
    ) -> Result<OfferModel, ServiceError> {
        input.validate()?;
        let existing = self.get_offer(id).await?;
        let now = Utc::now();

        if input.by_product.is_some() || input.by_category.is_some() {
            return Err(ServiceError::BadRequest(OFFER_TARGET_IMMUTABLE.to_string()));
        }

        let current_mode =
            DiscountMode::from_fields(existing.discount_amount, existing.discount_percentage)?;
        match (input.discount_amount, input.discount_percentage) {
            (Some(_), Some(_)) => {
                return Err(ServiceError::BadRequest(OFFER_MODE_IMMUTABLE.to_string()))
            }
            (Some(amount), None) if !current_mode.is_percentage() => {
                DiscountMode::from_fields(Some(amount), None)?;
            }
            (None, Some(percentage)) if current_mode.is_percentage() => {
                DiscountMode::from_fields(None, Some(percentage))?;
            }
            (None, None) => {}
            _ => return Err(ServiceError::BadRequest(OFFER_MODE_IMMUTABLE.to_string())),
        }

        let mut active: offer::ActiveModel = existing.clone().into();

        let label = input
            .label
            .as_deref()
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| existing.label.clone());
        let window = if input.start_date.is_some() || input.expiration_date.is_some() {
            Some(DateWindow::revise(
                DateWindow {
                    start: existing.start_date,
                    expiration: existing.expiration_date,
                },
                input.start_date,
                input.expiration_date,
                now,
            )?)
        } else {
            None
        };
        let expiration = window.map_or(existing.expiration_date, |w| w.expiration);
        if existing.status.is_active() || expiration >= now {
            self.ensure_unique_label(&label, Some(id)).await?;
        }
        active.label = Set(label);
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(image) = input.image {
            active.image = Set(Some(image));
        }
        if input.discount_amount.is_some() {
            active.discount_amount = Set(input.discount_amount);
        }
        if input.discount_percentage.is_some() {
            active.discount_percentage = Set(input.discount_percentage);
        }

        if let Some(window) = window {
            active.start_date = Set(window.start);
            active.expiration_date = Set(window.expiration);
            active.status = Set(window.initial_status(now));
        }
        active.updated_at = Set(now);

        let offer = active.update(&*self.db).await?;
        info!(offer_id = %offer.id, "Updated offer");
        Ok(offer)
    }

    #[instrument(skip(self))]
    pub async fn delete_offer(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = Offer::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Offer not found".to_string()));
        }
        info!(offer_id = %id, "Deleted offer");
        Ok(())
    }

    /// Lowest price any live offer gives this product, if one applies.
    ///
    /// Offers aimed at the product itself and at its category are both
    /// considered.
    pub async fn price_for_product(
        &self,
        product: &ProductModel,
    ) -> Result<Option<OfferPrice>, ServiceError> {
        self.price_for_product_at(product, Utc::now()).await
    }

    pub async fn price_for_product_at(
        &self,
        product: &ProductModel,
        now: DateTime<Utc>,
    ) -> Result<Option<OfferPrice>, ServiceError> {
        let mut target = Condition::any().add(offer::Column::ByProduct.eq(product.id));
        if let Some(category_id) = product.category_id {
            target = target.add(offer::Column::ByCategory.eq(category_id));
        }

        let offers = Offer::find()
            .filter(offer::Column::Status.eq(ActivityStatus::Active))
            .filter(offer::Column::StartDate.lte(now))
            .filter(offer::Column::ExpirationDate.gte(now))
            .filter(target)
            .all(&*self.db)
            .await?;

        let best = offers
            .iter()
            .filter(|o| o.is_live_at(now))
            .map(|o| OfferPrice {
                offer_id: o.id,
                price: apply_offer_price(product.price, o.discount_percentage, o.discount_amount),
            })
            .min_by_key(|p| p.price);

        if let Some(best) = best {
            debug!(product_id = %product.id, offer_id = %best.offer_id, price = %best.price, "Offer applies");
        }
        Ok(best)
    }

    /// Turn on inactive offers whose start day is today and that have not
    /// expired. An offer whose label an active offer already uses stays off.
    pub async fn activate_due(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let due = Offer::find()
            .filter(offer::Column::Status.eq(ActivityStatus::Inactive))
            .filter(offer::Column::StartDate.gte(start_of_day(now)))
            .filter(offer::Column::StartDate.lte(now))
            .filter(offer::Column::ExpirationDate.gte(now))
            .order_by_asc(offer::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut activated = 0;
        for candidate in due {
            let clash = Offer::find()
                .filter(offer::Column::Status.eq(ActivityStatus::Active))
                .filter(offer::Column::Label.eq(candidate.label.as_str()))
                .filter(offer::Column::Id.ne(candidate.id))
                .one(&*self.db)
                .await?;
            if let Some(active) = clash {
                warn!(
                    offer_id = %candidate.id,
                    conflicting_id = %active.id,
                    label = %candidate.label,
                    "Offer left inactive: label already in use"
                );
                continue;
            }

            let result = Offer::update_many()
                .col_expr(offer::Column::Status, Expr::value(ActivityStatus::Active))
                .col_expr(offer::Column::UpdatedAt, Expr::value(now))
                .filter(offer::Column::Id.eq(candidate.id))
                .filter(offer::Column::Status.eq(ActivityStatus::Inactive))
                .exec(&*self.db)
                .await?;
            activated += result.rows_affected;
        }
        Ok(activated)
    }

    /// Turn off active offers past their expiration.
    pub async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = Offer::update_many()
            .col_expr(offer::Column::Status, Expr::value(ActivityStatus::Inactive))
            .col_expr(offer::Column::UpdatedAt, Expr::value(now))
            .filter(offer::Column::Status.eq(ActivityStatus::Active))
            .filter(offer::Column::ExpirationDate.lt(now))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn ensure_unique_label(
        &self,
        label: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        // Active offers and those whose window is still open or ahead
        let live = Condition::any()
            .add(offer::Column::Status.eq(ActivityStatus::Active))
            .add(offer::Column::ExpirationDate.gte(Utc::now()));
        let mut query = Offer::find()
            .filter(offer::Column::Label.eq(label))
            .filter(live);
        if let Some(id) = exclude_id {
            query = query.filter(offer::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(OFFER_LABEL_EXISTS.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateOfferInput {
    #[validate(length(min = 1, max = 120))]
    pub label: String,
    pub description: Option<String>,
    #[validate(url)]
    pub image: Option<String>,
    pub discount_amount: Option<Decimal>,
    pub discount_percentage: Option<Decimal>,
    pub by_product: Option<Uuid>,
    pub by_category: Option<Uuid>,
    pub start_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateOfferInput {
    #[validate(length(min = 1, max = 120))]
    pub label: Option<String>,
    pub description: Option<String>,
    #[validate(url)]
    pub image: Option<String>,
    pub discount_amount: Option<Decimal>,
    pub discount_percentage: Option<Decimal>,
    pub by_product: Option<Uuid>,
    pub by_category: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
}
