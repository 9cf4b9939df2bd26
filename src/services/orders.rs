use crate::{
    entities::commerce::{
        order::{self, FirstPurchaseDiscount, OfferInfo, OrderItem, ShippingAddress},
        Order, OrderModel, OrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        catalog::CatalogService,
        payments::mercadopago::{CheckoutProvider, PaymentIntent},
        promotions::{coupons::usage_key, discount::percent_of, CouponService, OfferService},
    },
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 100;

/// Prices, discounts and totals of an order before anything is stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderQuote {
    pub items: Vec<OrderItem>,
    pub subtotal: Decimal,
    pub coupon_discount: Decimal,
    pub coupon_id: Option<Uuid>,
    pub coupon_code: Option<String>,
    pub first_purchase_discount: Option<FirstPurchaseDiscount>,
    pub total: Decimal,
}

/// Assembles and stores orders.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<CatalogService>,
    offers: Arc<OfferService>,
    coupons: Arc<CouponService>,
    checkout: Arc<dyn CheckoutProvider>,
    event_sender: Arc<EventSender>,
    first_purchase_percent: u32,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<CatalogService>,
        offers: Arc<OfferService>,
        coupons: Arc<CouponService>,
        checkout: Arc<dyn CheckoutProvider>,
        event_sender: Arc<EventSender>,
        first_purchase_percent: u32,
    ) -> Self {
        Self {
            db,
            catalog,
            offers,
            coupons,
            checkout,
            event_sender,
            first_purchase_percent,
        }
    }

    /// Resolve each requested line against live stock and offers.
    pub async fn price_lines(&self, lines: &[OrderLineInput]) -> Result<Vec<OrderItem>, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "An order needs at least one item".to_string(),
            ));
        }

        let lines = merge_lines(lines);
        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let (product, variant) = self
                .catalog
                .ensure_available(line.product_id, line.variant_id, &line.size, line.quantity)
                .await?;

            let offer_info = match self.offers.price_for_product(&product).await? {
                Some(offer) => OfferInfo {
                    has_offer: true,
                    original_price: product.price,
                    offer_price: Some(offer.price),
                    discount: Some(product.price - offer.price),
                    offer_id: Some(offer.offer_id),
                },
                None => OfferInfo::none(product.price),
            };

            items.push(OrderItem {
                product_id: product.id,
                variant_id: variant.id,
                product_name: product.name.clone(),
                color: variant.color.clone(),
                size: line.size.clone(),
                quantity: line.quantity,
                price: offer_info.offer_price.unwrap_or(product.price),
                offer_info,
            });
        }

        Ok(items)
    }

    /// Price a prospective order without storing anything.
    ///
    /// Checks stock for every line, resolves offer prices, applies the coupon
    /// to the subtotal and the first-purchase discount to what remains.
    pub async fn quote(
        &self,
        email: &str,
        lines: &[OrderLineInput],
        coupon_code: Option<&str>,
    ) -> Result<OrderQuote, ServiceError> {
        let items = self.price_lines(lines).await?;
        let subtotal: Decimal = items.iter().map(OrderItem::line_total).sum();

        let mut after_coupon = subtotal;
        let mut coupon = None;
        if let Some(code) = coupon_code.map(str::trim).filter(|c| !c.is_empty()) {
            let redeemable = self
                .coupons
                .check_redeemable(code, email, subtotal, &items)
                .await?;
            after_coupon = CouponService::apply_to_total(&redeemable, subtotal)?;
            coupon = Some(redeemable);
        }

        let first_purchase_discount = if self.first_purchase_percent > 0
            && self.is_first_purchase(email).await?
        {
            Some(FirstPurchaseDiscount {
                applied: true,
                discount: percent_of(after_coupon, self.first_purchase_percent),
            })
        } else {
            None
        };

        let total = (after_coupon
            - first_purchase_discount
                .as_ref()
                .map(|d| d.discount)
                .unwrap_or_default())
        .max(Decimal::ZERO)
        .round_dp(2);

        Ok(OrderQuote {
            items,
            subtotal,
            coupon_discount: (subtotal - after_coupon).round_dp(2),
            coupon_id: coupon.as_ref().map(|c| c.id),
            coupon_code: coupon.map(|c| c.code),
            first_purchase_discount,
            total,
        })
    }

    /// Creates an order and its checkout.
    ///
    /// The checkout is requested under the pre-allocated order id first; the
    /// order row and the tentative coupon usage are then written together, so a
    /// provider failure leaves nothing behind.
    #[instrument(skip(self, input), fields(email = %input.email, lines = input.items.len()))]
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<OrderModel, ServiceError> {
        input.validate()?;
        let email = usage_key(&input.email);
        let quote = self
            .quote(&email, &input.items, input.coupon_code.as_deref())
            .await?;

        let order_id = Uuid::new_v4();
        let payment_url = self
            .checkout
            .create_payment_intent(&PaymentIntent {
                order_id,
                email: email.clone(),
                items: quote.items.clone(),
                total: quote.total,
            })
            .await?;

        let now = Utc::now();
        let shipping = ShippingAddress::from(input.shipping_address);
        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            id: Set(order_id),
            email: Set(email.clone()),
            status: Set(OrderStatus::Pending),
            items: Set(serde_json::to_value(&quote.items)?),
            subtotal: Set(quote.subtotal),
            coupon_discount: Set(quote.coupon_discount),
            total: Set(quote.total),
            shipping_address: Set(serde_json::to_value(&shipping)?),
            coupon_id: Set(quote.coupon_id),
            coupon_code: Set(quote.coupon_code.clone()),
            first_purchase_discount: Set(quote
                .first_purchase_discount
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?),
            payment_url: Set(Some(payment_url)),
            notes: Set(input.notes),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        if let Some(coupon_id) = quote.coupon_id {
            CouponService::record_usage(&txn, coupon_id, &email, Some(order_id)).await?;
        }
        txn.commit().await?;

        info!(order_id = %order.id, total = %order.total, "Order created");
        self.event_sender.send_or_log(Event::OrderCreated(order.id)).await;
        if let Some(coupon_id) = quote.coupon_id {
            self.event_sender
                .send_or_log(Event::CouponRedeemed { coupon_id, email })
                .await;
        }
        Ok(order)
    }

    async fn is_first_purchase(&self, email: &str) -> Result<bool, ServiceError> {
        let previous = Order::find()
            .filter(order::Column::Email.eq(usage_key(email)))
            .filter(order::Column::Status.ne(OrderStatus::Rejected))
            .count(&*self.db)
            .await?;
        Ok(previous == 0)
    }

    pub async fn get_order(&self, id: Uuid) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))
    }

    /// Paginated order listing, newest first.
    ///
    /// # Returns
    /// The page of orders and the total number matching the filter
    pub async fn list_orders(
        &self,
        query: OrderListQuery,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let page = query.page.unwrap_or(1).max(1);

        let mut select = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = query.status {
            select = select.filter(order::Column::Status.eq(status));
        }

        let paginator = select.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;
        Ok((orders, total))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::Email.eq(usage_key(email)))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Shipping address and notes only; status belongs to the payment lifecycle.
    #[instrument(skip(self, input))]
    pub async fn update_order(
        &self,
        id: Uuid,
        input: UpdateOrderInput,
    ) -> Result<OrderModel, ServiceError> {
        input.validate()?;
        let existing = self.get_order(id).await?;
        let mut active: order::ActiveModel = existing.into();

        if let Some(address) = input.shipping_address {
            active.shipping_address = Set(serde_json::to_value(ShippingAddress::from(address))?);
        }
        if let Some(notes) = input.notes {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Utc::now());

        let order = active.update(&*self.db).await?;
        info!(order_id = %order.id, "Order updated");
        Ok(order)
    }

    /// Delete an unpaid order, releasing any coupon it was holding.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.get_order(id).await?;
        if existing.status == OrderStatus::Paid {
            return Err(ServiceError::InvalidOperation(
                "Paid orders cannot be deleted".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let mut released = false;
        if let (Some(coupon_id), true) = (existing.coupon_id, existing.status != OrderStatus::Rejected) {
            released = CouponService::reverse_usage(&txn, coupon_id, &existing.email).await?;
        }
        Order::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        info!(order_id = %id, released, "Order deleted");
        if let (true, Some(coupon_id)) = (released, existing.coupon_id) {
            self.event_sender
                .send_or_log(Event::CouponReleased {
                    coupon_id,
                    email: existing.email,
                })
                .await;
        }
        Ok(())
    }

    /// Move PENDING orders created before `now - older_than` to ABANDONED.
    #[instrument(skip(self))]
    pub async fn abandon_stale_orders(&self, older_than: Duration) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - older_than;
        let stale: Vec<Uuid> = Order::find()
            .select_only()
            .column(order::Column::Id)
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::CreatedAt.lt(cutoff))
            .into_tuple()
            .all(&*self.db)
            .await?;
        if stale.is_empty() {
            return Ok(0);
        }

        let result = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Abandoned))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.is_in(stale.clone()))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&*self.db)
            .await?;

        if result.rows_affected != stale.len() as u64 {
            warn!(
                selected = stale.len(),
                updated = result.rows_affected,
                "Some stale orders changed status during the sweep"
            );
        }
        for id in stale {
            self.event_sender.send_or_log(Event::OrderAbandoned(id)).await;
        }
        Ok(result.rows_affected)
    }
}

/// Fold repeated (product, variant, size) lines into one, keeping first-seen order,
/// so stock is checked against the quantity the order will actually take.
fn merge_lines(lines: &[OrderLineInput]) -> Vec<OrderLineInput> {
    let mut merged: Vec<OrderLineInput> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| {
            m.product_id == line.product_id && m.variant_id == line.variant_id && m.size == line.size
        }) {
            Some(existing) => existing.quantity += line.quantity,
            None => merged.push(line.clone()),
        }
    }
    merged
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct OrderLineInput {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    #[validate(length(min = 1, max = 20))]
    pub size: String,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ShippingAddressInput {
    #[validate(length(min = 1))]
    pub state: String,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 1))]
    pub address: String,
    pub additional_details: Option<String>,
    #[validate(length(min = 7, max = 20))]
    pub phone: String,
}

impl From<ShippingAddressInput> for ShippingAddress {
    fn from(input: ShippingAddressInput) -> Self {
        Self {
            state: input.state,
            city: input.city,
            address: input.address,
            additional_details: input.additional_details,
            phone: input.phone,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateOrderInput {
    #[validate(email)]
    pub email: String,
    #[validate]
    pub items: Vec<OrderLineInput>,
    #[validate]
    pub shipping_address: ShippingAddressInput,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateOrderInput {
    #[validate]
    pub shipping_address: Option<ShippingAddressInput>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}
