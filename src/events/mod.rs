use crate::services::lifecycle::OrderLifecycleService;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Payment status report as delivered by a payment provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotification {
    /// Provider status literal: "approved", "in_process", "rejected", ...
    pub status: String,
    /// Our order id as echoed back by the provider
    pub external_reference: String,
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes without waiting for capacity, logging instead of failing when
    /// the channel is full or closed. Safe to call from the consumer task.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!(error = %e, "event dropped");
        }
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Payment provider callbacks
    PaymentCompleted(PaymentNotification),

    // Order events
    OrderCreated(Uuid),
    OrderPaid(Uuid),
    OrderProcessing(Uuid),
    OrderRejected(Uuid),
    OrderAbandoned(Uuid),

    // Coupon usage events
    CouponRedeemed { coupon_id: Uuid, email: String },
    CouponReleased { coupon_id: Uuid, email: String },

    // Stock events
    StockOversold {
        order_id: Uuid,
        variant_id: Uuid,
        size: String,
        requested: i32,
    },
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::PaymentCompleted(_) => "payment_completed",
            Event::OrderCreated(_) => "order_created",
            Event::OrderPaid(_) => "order_paid",
            Event::OrderProcessing(_) => "order_processing",
            Event::OrderRejected(_) => "order_rejected",
            Event::OrderAbandoned(_) => "order_abandoned",
            Event::CouponRedeemed { .. } => "coupon_redeemed",
            Event::CouponReleased { .. } => "coupon_released",
            Event::StockOversold { .. } => "stock_oversold",
        }
    }
}

/// Consumes the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, lifecycle: Arc<OrderLifecycleService>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("storefront_events_total", 1, "event" => event.name());

        match event {
            Event::PaymentCompleted(notification) => {
                // Callbacks are fire-and-forget; failures are logged and dropped.
                if let Err(e) = lifecycle.handle_payment_completed(&notification).await {
                    error!(
                        external_reference = %notification.external_reference,
                        status = %notification.status,
                        error = %e,
                        "Failed to apply payment notification"
                    );
                }
            }
            Event::StockOversold {
                order_id,
                variant_id,
                size,
                requested,
            } => {
                error!(
                    %order_id,
                    %variant_id,
                    %size,
                    requested,
                    "Stock oversold while committing payment"
                );
            }
            Event::CouponRedeemed { coupon_id, email } => {
                info!(%coupon_id, %email, "Coupon redeemed");
            }
            Event::CouponReleased { coupon_id, email } => {
                info!(%coupon_id, %email, "Coupon usage released");
            }
            other => {
                info!(event = other.name(), "Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}
