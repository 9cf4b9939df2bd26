use super::{
    codes::{normalize_code, resolve_code},
    discount::{start_of_day, DateWindow, DiscountMode},
};
use crate::{
    entities::commerce::{
        coupon, coupon_redemption, order::OrderItem, ActivityStatus, Coupon, CouponModel,
        CouponRedemption,
    },
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Condition, Expr},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

pub const COUPON_NOT_FOUND: &str = "Coupon not found";
pub const COUPON_NOT_AVAILABLE: &str = "Coupon is not available";
pub const COUPON_EXPIRED: &str = "Coupon has expired";
pub const COUPON_LABEL_EXISTS: &str = "Coupon label already exists";
pub const COUPON_CODE_EXISTS: &str = "Coupon code already exists";
pub const COUPON_RULE_REQUIRED: &str = "A coupon requires a byMinAmount or byProduct rule";
pub const COUPON_ONE_RULE_PERMITTED: &str = "Only one rule is permitted";
pub const COUPON_RULE_CHANGE_NOT_ALLOWED: &str =
    "Cannot change the rule of an existing coupon. Create a new one instead";
pub const COUPON_MODE_CHANGE_NOT_ALLOWED: &str =
    "Cannot change the discount mode of an existing coupon. Create a new one instead";

/// Which applicability rule a coupon carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponRule {
    MinAmount(Decimal),
    Product(Uuid),
}

impl CouponRule {
    pub fn from_fields(
        by_min_amount: Option<Decimal>,
        by_product: Option<Uuid>,
    ) -> Result<Self, ServiceError> {
        match (by_min_amount, by_product) {
            (Some(min), None) => {
                if min < Decimal::ZERO {
                    return Err(ServiceError::BadRequest(
                        "byMinAmount cannot be negative".to_string(),
                    ));
                }
                Ok(CouponRule::MinAmount(min))
            }
            (None, Some(product_id)) => Ok(CouponRule::Product(product_id)),
            (None, None) => Err(ServiceError::BadRequest(COUPON_RULE_REQUIRED.to_string())),
            (Some(_), Some(_)) => Err(ServiceError::BadRequest(
                COUPON_ONE_RULE_PERMITTED.to_string(),
            )),
        }
    }

    pub fn of(coupon: &CouponModel) -> Result<Self, ServiceError> {
        Self::from_fields(coupon.by_min_amount, coupon.by_product)
    }
}

/// Discount mode stored on a coupon row
pub fn mode_of(coupon: &CouponModel) -> Result<DiscountMode, ServiceError> {
    DiscountMode::from_fields(coupon.discount_amount, coupon.discount_percentage)
}

/// Coupon usage lists are keyed by the lowercased email.
pub fn usage_key(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a coupon.
    ///
    /// # Arguments
    /// * `input` - label, optional code, one rule, one discount mode and dates
    ///
    /// # Returns
    /// The stored coupon; active when its start day is today
    #[instrument(skip(self))]
    pub async fn create_coupon(
        &self,
        input: CreateCouponInput,
    ) -> Result<CouponModel, ServiceError> {
        let now = Utc::now();
        self.validate_create(&input)?;

        let label = input.label.trim().to_string();
        self.ensure_unique_label(&label, None).await?;

        let window = DateWindow::normalize(input.start_date, input.expiration_date, now)?;

        let code = resolve_code(input.code.as_deref())?;
        self.ensure_unique_code(&code, None).await?;

        let coupon = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            label: Set(label),
            code: Set(code),
            by_min_amount: Set(input.by_min_amount),
            by_product: Set(input.by_product),
            discount_amount: Set(input.discount_amount),
            discount_percentage: Set(input.discount_percentage),
            status: Set(window.initial_status(now)),
            start_date: Set(window.start),
            expiration_date: Set(window.expiration),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(coupon_id = %coupon.id, code = %coupon.code, status = ?coupon.status, "Created coupon");
        Ok(coupon)
    }

    pub async fn get_coupon(&self, id: Uuid) -> Result<CouponModel, ServiceError> {
        Coupon::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(COUPON_NOT_FOUND.to_string()))
    }

    /// Case-insensitive code lookup. Active coupons win over retired ones
    /// sharing the code.
    pub async fn find_by_code(&self, code: &str) -> Result<CouponModel, ServiceError> {
        let code = code.trim().to_uppercase();
        let mut matches = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .order_by_desc(coupon::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        if let Some(pos) = matches.iter().position(|c| c.status.is_active()) {
            return Ok(matches.swap_remove(pos));
        }
        matches
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::NotFound(COUPON_NOT_FOUND.to_string()))
    }

    pub async fn list_coupons(
        &self,
        status: Option<ActivityStatus>,
    ) -> Result<Vec<CouponModel>, ServiceError> {
        let mut query = Coupon::find().order_by_desc(coupon::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(coupon::Column::Status.eq(status));
        }
        Ok(query.all(&*self.db).await?)
    }

    /// Updates a coupon. The populated rule field and the discount mode cannot
    /// be switched; their values can be adjusted.
    #[instrument(skip(self))]
    pub async fn update_coupon(
        &self,
        id: Uuid,
        input: UpdateCouponInput,
    ) -> Result<CouponModel, ServiceError> {
        input.validate()?;
        let existing = self.get_coupon(id).await?;
        let now = Utc::now();

        self.validate_update(&existing, &input)?;

        let mut active: coupon::ActiveModel = existing.clone().into();

        let label = input
            .label
            .as_deref()
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| existing.label.clone());
        let code = match input.code.as_deref() {
            Some(code) => normalize_code(code)?,
            None => existing.code.clone(),
        };
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
        // Only a coupon that stays live competes for its label and code
        let expiration = window.map_or(existing.expiration_date, |w| w.expiration);
        if existing.status.is_active() || expiration >= now {
            self.ensure_unique_label(&label, Some(id)).await?;
            self.ensure_unique_code(&code, Some(id)).await?;
        }

        active.label = Set(label);
        active.code = Set(code);
        if input.by_min_amount.is_some() {
            active.by_min_amount = Set(input.by_min_amount);
        }
        if input.by_product.is_some() {
            active.by_product = Set(input.by_product);
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

        let coupon = active.update(&*self.db).await?;
        info!(coupon_id = %coupon.id, "Updated coupon");
        Ok(coupon)
    }

    /// Field, rule and mode checks for a new coupon
    pub fn validate_create(&self, input: &CreateCouponInput) -> Result<(), ServiceError> {
        input.validate()?;
        CouponRule::from_fields(input.by_min_amount, input.by_product)?;
        DiscountMode::from_fields(input.discount_amount, input.discount_percentage)?;
        Ok(())
    }

    /// Rule and mode checks for an update
    pub fn validate_update(
        &self,
        existing: &CouponModel,
        input: &UpdateCouponInput,
    ) -> Result<(), ServiceError> {
        let switches_rule = match CouponRule::of(existing)? {
            CouponRule::MinAmount(_) => input.by_product.is_some(),
            CouponRule::Product(_) => input.by_min_amount.is_some(),
        };
        if switches_rule {
            return Err(ServiceError::BadRequest(
                COUPON_RULE_CHANGE_NOT_ALLOWED.to_string(),
            ));
        }
        if let Some(min) = input.by_min_amount {
            CouponRule::from_fields(Some(min), None)?;
        }

        let switches_mode = match mode_of(existing)? {
            DiscountMode::Amount(_) => input.discount_percentage.is_some(),
            DiscountMode::Percentage(_) => input.discount_amount.is_some(),
        };
        if switches_mode {
            return Err(ServiceError::BadRequest(
                COUPON_MODE_CHANGE_NOT_ALLOWED.to_string(),
            ));
        }
        if input.discount_amount.is_some() || input.discount_percentage.is_some() {
            DiscountMode::from_fields(input.discount_amount, input.discount_percentage)?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_coupon(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        CouponRedemption::delete_many()
            .filter(coupon_redemption::Column::CouponId.eq(id))
            .exec(&txn)
            .await?;
        let result = Coupon::delete_by_id(id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(COUPON_NOT_FOUND.to_string()));
        }
        txn.commit().await?;
        info!(coupon_id = %id, "Deleted coupon");
        Ok(())
    }

    /// Everything that must hold before a coupon discounts an order.
    pub async fn check_redeemable(
        &self,
        code: &str,
        email: &str,
        subtotal: Decimal,
        items: &[OrderItem],
    ) -> Result<CouponModel, ServiceError> {
        let coupon = self.find_by_code(code).await?;
        let now = Utc::now();

        if !coupon.status.is_active() {
            return Err(ServiceError::BadRequest(COUPON_NOT_AVAILABLE.to_string()));
        }
        if now < coupon.start_date {
            return Err(ServiceError::BadRequest(format!(
                "Coupon {} has not started yet",
                coupon.code
            )));
        }
        if now > coupon.expiration_date {
            return Err(ServiceError::BadRequest(COUPON_EXPIRED.to_string()));
        }
        if Self::has_used(&*self.db, coupon.id, email).await? {
            return Err(ServiceError::BadRequest(COUPON_NOT_AVAILABLE.to_string()));
        }

        match CouponRule::of(&coupon)? {
            CouponRule::MinAmount(min) if subtotal < min => {
                return Err(ServiceError::BadRequest(format!(
                    "Coupon {} requires a minimum purchase of {}",
                    coupon.code, min
                )));
            }
            CouponRule::Product(product_id)
                if !items.iter().any(|item| item.product_id == product_id) =>
            {
                return Err(ServiceError::BadRequest(format!(
                    "Coupon {} does not apply to any product in this order",
                    coupon.code
                )));
            }
            _ => {}
        }

        debug!(coupon_id = %coupon.id, %email, "Coupon redeemable");
        Ok(coupon)
    }

    /// Apply the coupon's discount to an order total.
    pub fn apply_to_total(coupon: &CouponModel, total: Decimal) -> Result<Decimal, ServiceError> {
        Ok(mode_of(coupon)?.apply(total))
    }

    pub async fn has_used<C: ConnectionTrait>(
        conn: &C,
        coupon_id: Uuid,
        email: &str,
    ) -> Result<bool, ServiceError> {
        Ok(CouponRedemption::find()
            .filter(coupon_redemption::Column::CouponId.eq(coupon_id))
            .filter(coupon_redemption::Column::Email.eq(usage_key(email)))
            .one(conn)
            .await?
            .is_some())
    }

    /// Put `email` on the coupon's usage list. A second redemption is rejected.
    pub async fn record_usage<C: ConnectionTrait>(
        conn: &C,
        coupon_id: Uuid,
        email: &str,
        order_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if Self::has_used(conn, coupon_id, email).await? {
            return Err(ServiceError::BadRequest(COUPON_NOT_AVAILABLE.to_string()));
        }
        coupon_redemption::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon_id),
            email: Set(usage_key(email)),
            order_id: Set(order_id),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;
        Ok(())
    }

    /// Remove `email` from the usage list. Returns whether an entry existed.
    pub async fn reverse_usage<C: ConnectionTrait>(
        conn: &C,
        coupon_id: Uuid,
        email: &str,
    ) -> Result<bool, ServiceError> {
        let result = CouponRedemption::delete_many()
            .filter(coupon_redemption::Column::CouponId.eq(coupon_id))
            .filter(coupon_redemption::Column::Email.eq(usage_key(email)))
            .exec(conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Make the usage final on payment. Present entries are left alone.
    pub async fn commit_usage<C: ConnectionTrait>(
        conn: &C,
        coupon_id: Uuid,
        email: &str,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        if Self::has_used(conn, coupon_id, email).await? {
            return Ok(());
        }
        Self::record_usage(conn, coupon_id, email, Some(order_id)).await
    }

    /// Turn on inactive coupons whose start day is today. A coupon whose code
    /// or label is already taken by an active coupon stays off.
    pub async fn activate_due(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let due = Coupon::find()
            .filter(coupon::Column::Status.eq(ActivityStatus::Inactive))
            .filter(coupon::Column::StartDate.gte(start_of_day(now)))
            .filter(coupon::Column::StartDate.lte(now))
            .filter(coupon::Column::ExpirationDate.gte(now))
            .order_by_asc(coupon::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut activated = 0;
        for candidate in due {
            let clash = Coupon::find()
                .filter(coupon::Column::Status.eq(ActivityStatus::Active))
                .filter(coupon::Column::Id.ne(candidate.id))
                .filter(
                    Condition::any()
                        .add(coupon::Column::Code.eq(candidate.code.as_str()))
                        .add(coupon::Column::Label.eq(candidate.label.as_str())),
                )
                .one(&*self.db)
                .await?;
            if let Some(active) = clash {
                warn!(
                    coupon_id = %candidate.id,
                    conflicting_id = %active.id,
                    code = %candidate.code,
                    "Coupon left inactive: code or label already in use"
                );
                continue;
            }

            let result = Coupon::update_many()
                .col_expr(coupon::Column::Status, Expr::value(ActivityStatus::Active))
                .col_expr(coupon::Column::UpdatedAt, Expr::value(now))
                .filter(coupon::Column::Id.eq(candidate.id))
                .filter(coupon::Column::Status.eq(ActivityStatus::Inactive))
                .exec(&*self.db)
                .await?;
            activated += result.rows_affected;
        }
        Ok(activated)
    }

    pub async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = Coupon::update_many()
            .col_expr(coupon::Column::Status, Expr::value(ActivityStatus::Inactive))
            .col_expr(coupon::Column::UpdatedAt, Expr::value(now))
            .filter(coupon::Column::Status.eq(ActivityStatus::Active))
            .filter(coupon::Column::ExpirationDate.lt(now))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Coupons that still count for uniqueness: active ones and those whose
    /// window has not closed yet.
    fn live_filter(now: DateTime<Utc>) -> Condition {
        Condition::any()
            .add(coupon::Column::Status.eq(ActivityStatus::Active))
            .add(coupon::Column::ExpirationDate.gte(now))
    }

    async fn ensure_unique_label(
        &self,
        label: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = Coupon::find()
            .filter(coupon::Column::Label.eq(label))
            .filter(Self::live_filter(Utc::now()));
        if let Some(id) = exclude_id {
            query = query.filter(coupon::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(COUPON_LABEL_EXISTS.to_string()));
        }
        Ok(())
    }

    async fn ensure_unique_code(
        &self,
        code: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .filter(Self::live_filter(Utc::now()));
        if let Some(id) = exclude_id {
            query = query.filter(coupon::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(COUPON_CODE_EXISTS.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateCouponInput {
    #[validate(length(min = 1, max = 120))]
    pub label: String,
    /// Generated when absent; padded when shorter than six characters
    #[validate(length(max = 6))]
    pub code: Option<String>,
    pub by_min_amount: Option<Decimal>,
    pub by_product: Option<Uuid>,
    pub discount_amount: Option<Decimal>,
    pub discount_percentage: Option<Decimal>,
    pub start_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateCouponInput {
    #[validate(length(min = 1, max = 120))]
    pub label: Option<String>,
    pub code: Option<String>,
    pub by_min_amount: Option<Decimal>,
    pub by_product: Option<Uuid>,
    pub discount_amount: Option<Decimal>,
    pub discount_percentage: Option<Decimal>,
    pub start_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
}
