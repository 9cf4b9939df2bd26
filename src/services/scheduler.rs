use crate::{
    errors::ServiceError,
    services::{orders::OrderService, promotions::{CouponService, OfferService}},
};
use chrono::Utc;
use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Lets at most one run of a sweep be in flight.
#[derive(Debug, Clone, Default)]
pub struct SweepGuard {
    running: Arc<AtomicBool>,
}

/// Held while a sweep runs; releases the guard on drop.
#[derive(Debug)]
pub struct SweepPermit {
    running: Arc<AtomicBool>,
}

impl SweepGuard {
    pub fn try_start(&self) -> Option<SweepPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepPermit {
                running: self.running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for SweepPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionSweepReport {
    pub offers_activated: u64,
    pub offers_deactivated: u64,
    pub coupons_activated: u64,
    pub coupons_deactivated: u64,
}

/// Periodic reconciliation of promotion windows and stale orders.
#[derive(Clone)]
pub struct SchedulerService {
    offers: Arc<OfferService>,
    coupons: Arc<CouponService>,
    orders: Arc<OrderService>,
    abandon_after: chrono::Duration,
    promotion_guard: SweepGuard,
    abandoned_guard: SweepGuard,
}

impl SchedulerService {
    pub fn new(
        offers: Arc<OfferService>,
        coupons: Arc<CouponService>,
        orders: Arc<OrderService>,
        abandon_after: chrono::Duration,
    ) -> Self {
        Self {
            offers,
            coupons,
            orders,
            abandon_after,
            promotion_guard: SweepGuard::default(),
            abandoned_guard: SweepGuard::default(),
        }
    }

    /// Activate promotions whose window opened and deactivate expired ones.
    pub async fn sweep_promotions(&self) -> Result<PromotionSweepReport, ServiceError> {
        let now = Utc::now();
        let report = PromotionSweepReport {
            offers_deactivated: self.offers.deactivate_expired(now).await?,
            offers_activated: self.offers.activate_due(now).await?,
            coupons_deactivated: self.coupons.deactivate_expired(now).await?,
            coupons_activated: self.coupons.activate_due(now).await?,
        };
        if report != PromotionSweepReport::default() {
            info!(?report, "Promotion sweep changed statuses");
        }
        Ok(report)
    }

    pub async fn sweep_abandoned_orders(&self) -> Result<u64, ServiceError> {
        let abandoned = self.orders.abandon_stale_orders(self.abandon_after).await?;
        if abandoned > 0 {
            info!(abandoned, "Stale pending orders abandoned");
        }
        Ok(abandoned)
    }

    /// Spawn both sweeps on their own intervals.
    pub fn spawn(self: Arc<Self>, promotion_every: Duration, abandoned_every: Duration) {
        let this = self.clone();
        tokio::spawn(run_every(
            "promotions",
            promotion_every,
            self.promotion_guard.clone(),
            move || {
                let this = this.clone();
                async move { this.sweep_promotions().await.map(|_| ()) }
            },
        ));

        let this = self.clone();
        tokio::spawn(run_every(
            "abandoned_orders",
            abandoned_every,
            self.abandoned_guard.clone(),
            move || {
                let this = this.clone();
                async move { this.sweep_abandoned_orders().await.map(|_| ()) }
            },
        ));
    }
}

/// Tick forever, running `job` in its own task unless the previous run is
/// still in flight.
pub async fn run_every<F, Fut>(name: &'static str, every: Duration, guard: SweepGuard, job: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    info!(sweep = name, every_secs = every.as_secs(), "Starting sweep");
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let Some(permit) = guard.try_start() else {
            warn!(sweep = name, "Previous run still in flight; tick skipped");
            continue;
        };

        let run = job();
        tokio::spawn(async move {
            let _permit = permit;
            match run.await {
                Ok(()) => debug!(sweep = name, "Sweep finished"),
                Err(e) => error!(sweep = name, error = %e, "Sweep failed"),
            }
        });
    }
}
