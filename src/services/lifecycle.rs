use crate::{
    entities::commerce::{order, Order, OrderModel, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender, PaymentNotification},
    services::{catalog::CatalogService, promotions::CouponService},
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, TransactionTrait,
};
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Payment statuses a provider reports that move an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Approved,
    InProcess,
    Rejected,
}

/// What a payment callback did to its order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(OrderStatus),
    /// Order already terminal, or a concurrent callback got there first
    Unchanged,
    /// Unknown status, unparseable reference or missing order
    Dropped,
    /// Approval refused because a line could not be covered by stock
    Oversold,
}

/// Drives orders through PENDING -> {PAID, PROCESSING, REJECTED} on payment callbacks.
#[derive(Clone)]
pub struct OrderLifecycleService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderLifecycleService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Apply one provider notification. Problems with the notification itself are
    /// logged and reported as `Dropped`; only storage failures are errors.
    #[instrument(skip(self), fields(status = %notification.status, reference = %notification.external_reference))]
    pub async fn handle_payment_completed(
        &self,
        notification: &PaymentNotification,
    ) -> Result<TransitionOutcome, ServiceError> {
        counter!("storefront_payment_callbacks_total", 1, "status" => notification.status.clone());

        let Ok(status) = notification.status.parse::<PaymentStatus>() else {
            warn!("Ignoring payment callback with unknown status");
            return Ok(TransitionOutcome::Dropped);
        };
        let Ok(order_id) = Uuid::parse_str(notification.external_reference.trim()) else {
            warn!("Ignoring payment callback with unparseable reference");
            return Ok(TransitionOutcome::Dropped);
        };

        self.apply(order_id, status).await
    }

    pub async fn apply(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> Result<TransitionOutcome, ServiceError> {
        let Some(order) = Order::find_by_id(order_id).one(&*self.db).await? else {
            warn!(%order_id, "Payment callback for unknown order");
            return Ok(TransitionOutcome::Dropped);
        };
        if order.status.is_terminal() {
            info!(%order_id, current = ?order.status, "Order already settled; callback ignored");
            return Ok(TransitionOutcome::Unchanged);
        }

        match status {
            PaymentStatus::Approved => self.approve(&order).await,
            PaymentStatus::InProcess => self.mark_processing(&order).await,
            PaymentStatus::Rejected => self.reject(&order).await,
        }
    }

    /// Transition, stock decrement and coupon commit in one transaction. The
    /// conditional status update makes duplicate approvals a no-op.
    async fn approve(&self, order: &OrderModel) -> Result<TransitionOutcome, ServiceError> {
        let items = order.line_items()?;
        let txn = self.db.begin().await?;

        if !Self::transition(&txn, order.id, OrderStatus::Paid, true).await? {
            txn.rollback().await?;
            return Ok(TransitionOutcome::Unchanged);
        }

        for item in &items {
            if let Err(e) =
                CatalogService::decrement_stock(&txn, item.variant_id, &item.size, item.quantity)
                    .await
            {
                txn.rollback().await?;
                if let ServiceError::InsufficientStock(_) = e {
                    error!(
                        order_id = %order.id,
                        variant_id = %item.variant_id,
                        size = %item.size,
                        requested = item.quantity,
                        "Approved payment cannot be covered by stock"
                    );
                    counter!("storefront_stock_oversold_total", 1);
                    self.event_sender
                        .send_or_log(Event::StockOversold {
                            order_id: order.id,
                            variant_id: item.variant_id,
                            size: item.size.clone(),
                            requested: item.quantity,
                        })
                        .await;
                    return Ok(TransitionOutcome::Oversold);
                }
                return Err(e);
            }
        }

        if let Some(coupon_id) = order.coupon_id {
            CouponService::commit_usage(&txn, coupon_id, &order.email, order.id).await?;
        }

        txn.commit().await?;
        info!(order_id = %order.id, lines = items.len(), "Order paid");
        self.event_sender.send_or_log(Event::OrderPaid(order.id)).await;
        Ok(TransitionOutcome::Applied(OrderStatus::Paid))
    }

    async fn mark_processing(&self, order: &OrderModel) -> Result<TransitionOutcome, ServiceError> {
        if order.status == OrderStatus::Processing {
            return Ok(TransitionOutcome::Unchanged);
        }
        if !Self::transition(&*self.db, order.id, OrderStatus::Processing, false).await? {
            return Ok(TransitionOutcome::Unchanged);
        }
        info!(order_id = %order.id, "Order payment in process");
        self.event_sender
            .send_or_log(Event::OrderProcessing(order.id))
            .await;
        Ok(TransitionOutcome::Applied(OrderStatus::Processing))
    }

    /// Reject the order and hand the coupon back to the customer.
    async fn reject(&self, order: &OrderModel) -> Result<TransitionOutcome, ServiceError> {
        let txn: DatabaseTransaction = self.db.begin().await?;
        if !Self::transition(&txn, order.id, OrderStatus::Rejected, false).await? {
            txn.rollback().await?;
            return Ok(TransitionOutcome::Unchanged);
        }
        let released = match order.coupon_id {
            Some(coupon_id) => CouponService::reverse_usage(&txn, coupon_id, &order.email).await?,
            None => false,
        };
        txn.commit().await?;

        info!(order_id = %order.id, released, "Order rejected");
        if let (true, Some(coupon_id)) = (released, order.coupon_id) {
            self.event_sender
                .send_or_log(Event::CouponReleased {
                    coupon_id,
                    email: order.email.clone(),
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::OrderRejected(order.id))
            .await;
        Ok(TransitionOutcome::Applied(OrderStatus::Rejected))
    }

    /// `UPDATE orders SET status = $to WHERE id = $id AND status IN (open states)`.
    /// Returns whether this caller won the transition.
    async fn transition<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
        to: OrderStatus,
        clear_payment_url: bool,
    ) -> Result<bool, ServiceError> {
        let mut update = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(to))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()));
        if clear_payment_url {
            update = update.col_expr(order::Column::PaymentUrl, Expr::value(Option::<String>::None));
        }
        let result = update
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.is_in(OrderStatus::open_states()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected == 1)
    }
}
