use crate::{
    entities::commerce::{
        order::OrderItem,
        shopping_cart::{self, CartLine},
        OrderModel, ShoppingCart, ShoppingCartModel,
    },
    errors::ServiceError,
    services::{
        orders::{CreateOrderInput, OrderLineInput, OrderService, ShippingAddressInput},
        promotions::{coupons::usage_key, CouponService},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

pub const CART_NOT_FOUND: &str = "Cart not found";
pub const CART_HAS_COUPON: &str = "Cart already has a coupon";
pub const CART_DUPLICATE_ITEM: &str = "The same product, variant and size can only appear once";

/// A cart priced against the live catalog
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub email: String,
    pub items: Vec<OrderItem>,
    pub coupon_code: Option<String>,
    /// Sum of quantities
    pub total_items: i32,
    /// Number of distinct lines
    pub total_products: usize,
    pub subtotal: Decimal,
    pub total: Decimal,
}

/// Pre-order baskets. Carts never reserve or decrement stock.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    orders: Arc<OrderService>,
    coupons: Arc<CouponService>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: Arc<OrderService>,
        coupons: Arc<CouponService>,
    ) -> Self {
        Self { db, orders, coupons }
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_cart(&self, input: CreateCartInput) -> Result<CartView, ServiceError> {
        input.validate()?;
        let lines: Vec<CartLine> = input.items.into_iter().map(CartLine::from).collect();
        ensure_distinct(&lines)?;
        // Prices the lines and checks stock without storing anything
        self.orders.price_lines(&order_lines(&lines)).await?;

        let now = Utc::now();
        let cart = shopping_cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(usage_key(&input.email)),
            items: Set(serde_json::to_value(&lines)?),
            coupon_code: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(cart_id = %cart.id, lines = lines.len(), "Cart created");
        self.view(cart).await
    }

    pub async fn get_cart(&self, id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.find(id).await?;
        self.view(cart).await
    }

    /// Add a line, or raise the quantity of a line already in the cart.
    #[instrument(skip(self, item))]
    pub async fn add_item(&self, id: Uuid, item: CartItemInput) -> Result<CartView, ServiceError> {
        item.validate()?;
        let cart = self.find(id).await?;
        let mut lines = cart.lines()?;
        let new_line = CartLine::from(item);

        match lines.iter_mut().find(|line| line.same_slot(&new_line)) {
            Some(existing) => existing.quantity += new_line.quantity,
            None => lines.push(new_line),
        }
        self.orders.price_lines(&order_lines(&lines)).await?;

        let cart = self.save_lines(cart, &lines).await?;
        self.view(cart).await
    }

    /// Remove one line. An emptied cart is deleted and `None` is returned.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        id: Uuid,
        product_id: Uuid,
        variant_id: Uuid,
        size: &str,
    ) -> Result<Option<CartView>, ServiceError> {
        let cart = self.find(id).await?;
        let mut lines = cart.lines()?;
        let before = lines.len();
        lines.retain(|line| {
            !(line.product_id == product_id && line.variant_id == variant_id && line.size == size)
        });
        if lines.len() == before {
            return Err(ServiceError::NotFound("Item not found in cart".to_string()));
        }

        if lines.is_empty() {
            ShoppingCart::delete_by_id(id).exec(&*self.db).await?;
            info!(cart_id = %id, "Cart emptied and deleted");
            return Ok(None);
        }

        let cart = self.save_lines(cart, &lines).await?;
        self.view(cart).await.map(Some)
    }

    /// Attach a coupon. A cart holds at most one coupon for its lifetime.
    #[instrument(skip(self))]
    pub async fn apply_coupon(&self, id: Uuid, code: &str) -> Result<CartView, ServiceError> {
        let cart = self.find(id).await?;
        if cart.coupon_code.is_some() {
            return Err(ServiceError::BadRequest(CART_HAS_COUPON.to_string()));
        }

        let items = self.orders.price_lines(&order_lines(&cart.lines()?)).await?;
        let subtotal: Decimal = items.iter().map(OrderItem::line_total).sum();
        let coupon = self
            .coupons
            .check_redeemable(code, &cart.email, subtotal, &items)
            .await?;

        let mut active: shopping_cart::ActiveModel = cart.into();
        active.coupon_code = Set(Some(coupon.code.clone()));
        active.updated_at = Set(Utc::now());
        let cart = active.update(&*self.db).await?;

        info!(cart_id = %id, coupon_id = %coupon.id, "Coupon applied to cart");
        self.view(cart).await
    }

    /// Turn the cart into an order and delete it.
    #[instrument(skip(self, input))]
    pub async fn checkout(
        &self,
        id: Uuid,
        input: CheckoutCartInput,
    ) -> Result<OrderModel, ServiceError> {
        input.validate()?;
        let cart = self.find(id).await?;
        let order = self
            .orders
            .create_order(CreateOrderInput {
                email: cart.email.clone(),
                items: order_lines(&cart.lines()?),
                shipping_address: input.shipping_address,
                coupon_code: cart.coupon_code.clone(),
                notes: input.notes,
            })
            .await?;

        ShoppingCart::delete_by_id(id).exec(&*self.db).await?;
        info!(cart_id = %id, order_id = %order.id, "Cart checked out");
        Ok(order)
    }

    async fn find(&self, id: Uuid) -> Result<ShoppingCartModel, ServiceError> {
        ShoppingCart::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(CART_NOT_FOUND.to_string()))
    }

    async fn save_lines(
        &self,
        cart: ShoppingCartModel,
        lines: &[CartLine],
    ) -> Result<ShoppingCartModel, ServiceError> {
        let mut active: shopping_cart::ActiveModel = cart.into();
        active.items = Set(serde_json::to_value(lines)?);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    async fn view(&self, cart: ShoppingCartModel) -> Result<CartView, ServiceError> {
        let lines = cart.lines()?;
        let items = self.orders.price_lines(&order_lines(&lines)).await?;
        let subtotal: Decimal = items.iter().map(OrderItem::line_total).sum();

        // The coupon is re-checked against the current lines on every view
        let mut cart = cart;
        let mut total = subtotal;
        if let Some(code) = cart.coupon_code.clone() {
            match self
                .coupons
                .check_redeemable(&code, &cart.email, subtotal, &items)
                .await
            {
                Ok(coupon) => total = CouponService::apply_to_total(&coupon, subtotal)?,
                Err(ServiceError::BadRequest(reason)) | Err(ServiceError::NotFound(reason)) => {
                    info!(cart_id = %cart.id, %code, %reason, "Coupon dropped from cart");
                    let mut active: shopping_cart::ActiveModel = cart.into();
                    active.coupon_code = Set(None);
                    active.updated_at = Set(Utc::now());
                    cart = active.update(&*self.db).await?;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(CartView {
            id: cart.id,
            email: cart.email,
            total_items: items.iter().map(|i| i.quantity).sum(),
            total_products: items.len(),
            items,
            coupon_code: cart.coupon_code,
            subtotal,
            total,
        })
    }
}

fn ensure_distinct(lines: &[CartLine]) -> Result<(), ServiceError> {
    for (i, line) in lines.iter().enumerate() {
        if lines[..i].iter().any(|other| other.same_slot(line)) {
            return Err(ServiceError::BadRequest(CART_DUPLICATE_ITEM.to_string()));
        }
    }
    Ok(())
}

fn order_lines(lines: &[CartLine]) -> Vec<OrderLineInput> {
    lines
        .iter()
        .map(|line| OrderLineInput {
            product_id: line.product_id,
            variant_id: line.variant_id,
            size: line.size.clone(),
            quantity: line.quantity,
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CartItemInput {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    #[validate(length(min = 1, max = 20))]
    pub size: String,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

impl From<CartItemInput> for CartLine {
    fn from(item: CartItemInput) -> Self {
        Self {
            product_id: item.product_id,
            variant_id: item.variant_id,
            size: item.size,
            quantity: item.quantity,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateCartInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, message = "a cart needs at least one item"))]
    #[validate]
    pub items: Vec<CartItemInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CheckoutCartInput {
    #[validate]
    pub shipping_address: ShippingAddressInput,
    pub notes: Option<String>,
}

/// Query of `DELETE /carts/:id/items`
#[derive(Debug, Clone, Deserialize)]
pub struct RemoveCartItemQuery {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub size: String,
}
