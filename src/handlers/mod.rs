pub mod carts;
pub mod categories;
pub mod common;
pub mod coupons;
pub mod offers;
pub mod orders;
pub mod payments;
pub mod products;
pub mod store_settings;

use crate::{
    config::AppConfig,
    events::EventSender,
    services::{
        carts::CartService,
        catalog::CatalogService,
        categories::CategoryService,
        lifecycle::OrderLifecycleService,
        orders::OrderService,
        payments::{gateway::PaymentGatewayRegistry, mercadopago::CheckoutProvider, PaymentService},
        promotions::{CouponService, OfferService},
        scheduler::SchedulerService,
        store_settings::StoreSettingsService,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub categories: Arc<CategoryService>,
    pub offers: Arc<OfferService>,
    pub coupons: Arc<CouponService>,
    pub orders: Arc<OrderService>,
    pub lifecycle: Arc<OrderLifecycleService>,
    pub payments: Arc<PaymentService>,
    pub store_settings: Arc<StoreSettingsService>,
    pub carts: Arc<CartService>,
    pub scheduler: Arc<SchedulerService>,
}

impl AppServices {
    /// Wire every service over one connection pool.
    ///
    /// The gateway registry and checkout provider come from the caller so the
    /// composition root (or a test) decides which providers exist.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        event_sender: Arc<EventSender>,
        gateways: Arc<PaymentGatewayRegistry>,
        checkout: Arc<dyn CheckoutProvider>,
    ) -> Self {
        let catalog = Arc::new(CatalogService::new(db.clone()));
        let categories = Arc::new(CategoryService::new(db.clone()));
        let offers = Arc::new(OfferService::new(db.clone()));
        let coupons = Arc::new(CouponService::new(db.clone()));
        let store_settings = Arc::new(StoreSettingsService::new(db.clone()));
        let lifecycle = Arc::new(OrderLifecycleService::new(db.clone(), event_sender.clone()));

        let orders = Arc::new(OrderService::new(
            db.clone(),
            catalog.clone(),
            offers.clone(),
            coupons.clone(),
            checkout.clone(),
            event_sender.clone(),
            config.first_purchase_discount_percent,
        ));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            checkout,
            gateways,
            store_settings.clone(),
            lifecycle.clone(),
            event_sender,
            config.payments.webhook_secret.clone(),
        ));
        let carts = Arc::new(CartService::new(db, orders.clone(), coupons.clone()));
        let scheduler = Arc::new(SchedulerService::new(
            offers.clone(),
            coupons.clone(),
            orders.clone(),
            chrono::Duration::days(config.abandoned_order_after_days),
        ));

        Self {
            catalog,
            categories,
            offers,
            coupons,
            orders,
            lifecycle,
            payments,
            store_settings,
            carts,
            scheduler,
        }
    }
}
