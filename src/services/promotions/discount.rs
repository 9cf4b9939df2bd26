use crate::{entities::commerce::ActivityStatus, errors::ServiceError};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DISCOUNT_IS_REQUIRED: &str = "discountAmount or discountPercentage is required";
pub const ONE_DISCOUNT_PERMITTED: &str = "Only one discount mode is permitted";
pub const EXPIRATION_IN_PAST: &str = "The expirationDate cannot be less than the current date.";
pub const START_IN_PAST: &str = "startDate cannot be earlier than the current date";
pub const START_AFTER_EXPIRATION: &str = "startDate cannot be later than the expirationDate";

/// How a promotion reduces a price. Offers and coupons carry exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DiscountMode {
    Amount(Decimal),
    Percentage(Decimal),
}

impl DiscountMode {
    /// Build the mode from the two nullable columns, requiring exactly one.
    pub fn from_fields(
        amount: Option<Decimal>,
        percentage: Option<Decimal>,
    ) -> Result<Self, ServiceError> {
        match (amount, percentage) {
            (Some(amount), None) => {
                if amount <= Decimal::ZERO {
                    return Err(ServiceError::BadRequest(
                        "discountAmount must be greater than zero".to_string(),
                    ));
                }
                Ok(DiscountMode::Amount(amount))
            }
            (None, Some(percentage)) => {
                if percentage < Decimal::ONE || percentage > Decimal::ONE_HUNDRED {
                    return Err(ServiceError::BadRequest(
                        "discountPercentage must be between 1 and 100".to_string(),
                    ));
                }
                Ok(DiscountMode::Percentage(percentage))
            }
            (None, None) => Err(ServiceError::BadRequest(DISCOUNT_IS_REQUIRED.to_string())),
            (Some(_), Some(_)) => Err(ServiceError::BadRequest(
                ONE_DISCOUNT_PERMITTED.to_string(),
            )),
        }
    }

    pub fn is_percentage(&self) -> bool {
        matches!(self, DiscountMode::Percentage(_))
    }

    /// Reduce `value` by this discount, never below zero, rounded to cents.
    pub fn apply(&self, value: Decimal) -> Decimal {
        let discounted = match *self {
            DiscountMode::Percentage(p) => value * (Decimal::ONE_HUNDRED - p) / Decimal::ONE_HUNDRED,
            DiscountMode::Amount(a) => value - a,
        };
        discounted.max(Decimal::ZERO).round_dp(2)
    }

    /// The amount `apply` takes off `value`.
    pub fn discount_on(&self, value: Decimal) -> Decimal {
        (value - self.apply(value)).round_dp(2)
    }
}

/// Offer pricing: percentage first, then the fixed amount, floored at zero.
pub fn apply_offer_price(
    price: Decimal,
    percentage: Option<Decimal>,
    amount: Option<Decimal>,
) -> Decimal {
    let mut result = price;
    if let Some(p) = percentage {
        result = DiscountMode::Percentage(p).apply(result);
    }
    if let Some(a) = amount {
        result = DiscountMode::Amount(a).apply(result);
    }
    result.round_dp(2)
}

/// Percentage of `value`, rounded to cents. Used for the first-purchase discount.
pub fn percent_of(value: Decimal, percent: u32) -> Decimal {
    (value * Decimal::from(percent) / Decimal::ONE_HUNDRED).round_dp(2)
}

pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// 23:59:59.999 UTC of the same day
pub fn end_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(at) + Duration::days(1) - Duration::milliseconds(1)
}

/// A validated promotion date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
}

impl DateWindow {
    /// Normalize and validate a window against `now`.
    ///
    /// The start is moved to midnight and the expiration to the last millisecond
    /// of its day. Neither may fall before today, and the start may not come
    /// after the expiration.
    pub fn normalize(
        start: DateTime<Utc>,
        expiration: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, ServiceError> {
        let today = start_of_day(now);
        let start = start_of_day(start);
        let expiration = end_of_day(expiration);

        if expiration < today {
            return Err(ServiceError::BadRequest(EXPIRATION_IN_PAST.to_string()));
        }
        if start < today {
            return Err(ServiceError::BadRequest(START_IN_PAST.to_string()));
        }
        if start > expiration {
            return Err(ServiceError::BadRequest(START_AFTER_EXPIRATION.to_string()));
        }
        Ok(Self { start, expiration })
    }

    /// Apply an update to a stored window.
    ///
    /// A new start is held to the same rules as on creation. Without one the
    /// stored start is kept, even when it lies in the past, so a running
    /// promotion can be extended; the expiration must still reach today and
    /// not precede the start.
    pub fn revise(
        current: DateWindow,
        start: Option<DateTime<Utc>>,
        expiration: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, ServiceError> {
        let expiration = expiration.unwrap_or(current.expiration);
        if let Some(start) = start {
            return Self::normalize(start, expiration, now);
        }

        let expiration = end_of_day(expiration);
        if expiration < start_of_day(now) {
            return Err(ServiceError::BadRequest(EXPIRATION_IN_PAST.to_string()));
        }
        if current.start > expiration {
            return Err(ServiceError::BadRequest(START_AFTER_EXPIRATION.to_string()));
        }
        Ok(Self {
            start: current.start,
            expiration,
        })
    }

    /// Windows already open go live immediately; later ones wait for the sweep.
    pub fn initial_status(&self, now: DateTime<Utc>) -> ActivityStatus {
        if self.contains(now) {
            ActivityStatus::Active
        } else {
            ActivityStatus::Inactive
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.expiration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn twenty_percent_offer_on_one_hundred() {
        assert_eq!(apply_offer_price(dec!(100), Some(dec!(20)), None), dec!(80));
    }

    #[test]
    fn ten_percent_coupon_on_five_hundred() {
        let mode = DiscountMode::from_fields(None, Some(dec!(10))).unwrap();
        assert_eq!(mode.apply(dec!(500)), dec!(450));
        assert_eq!(mode.discount_on(dec!(500)), dec!(50));
    }

    #[test]
    fn fixed_amount_floors_at_zero() {
        let mode = DiscountMode::from_fields(Some(dec!(70)), None).unwrap();
        assert_eq!(mode.apply(dec!(50)), Decimal::ZERO);
        assert_eq!(mode.apply(dec!(100)), dec!(30));
    }

    #[test]
    fn percentage_applies_before_amount() {
        // (100 * 0.5) - 10, not (100 - 10) * 0.5
        assert_eq!(
            apply_offer_price(dec!(100), Some(dec!(50)), Some(dec!(10))),
            dec!(40)
        );
    }

    #[test]
    fn exactly_one_discount_mode() {
        assert!(matches!(
            DiscountMode::from_fields(None, None),
            Err(ServiceError::BadRequest(msg)) if msg == DISCOUNT_IS_REQUIRED
        ));
        assert!(DiscountMode::from_fields(Some(dec!(5)), Some(dec!(5))).is_err());
        assert!(DiscountMode::from_fields(None, Some(dec!(0))).is_err());
        assert!(DiscountMode::from_fields(None, Some(dec!(101))).is_err());
        assert!(DiscountMode::from_fields(Some(dec!(-1)), None).is_err());
    }

    #[test]
    fn first_purchase_percent() {
        assert_eq!(percent_of(dec!(450), 20), dec!(90));
    }

    #[test]
    fn day_bounds() {
        let at = noon(2025, 3, 14);
        assert_eq!(start_of_day(at), Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap());
        let end = end_of_day(at);
        assert_eq!(end.date_naive(), at.date_naive());
        assert_eq!(end + Duration::milliseconds(1), Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn window_starting_today_is_active() {
        let now = noon(2025, 3, 14);
        let window = DateWindow::normalize(
            Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap(),
            noon(2025, 3, 20),
            now,
        )
        .unwrap();
        assert_eq!(window.initial_status(now), ActivityStatus::Active);
        assert!(window.contains(now));
        assert_eq!(window.expiration, end_of_day(noon(2025, 3, 20)));
    }

    #[test]
    fn future_window_starts_inactive() {
        let now = noon(2025, 3, 14);
        let window = DateWindow::normalize(noon(2025, 3, 16), noon(2025, 3, 20), now).unwrap();
        assert_eq!(window.initial_status(now), ActivityStatus::Inactive);
        assert!(!window.contains(now));
    }

    #[test]
    fn rejects_windows_in_the_past_or_inverted() {
        let now = noon(2025, 3, 14);
        assert!(matches!(
            DateWindow::normalize(noon(2025, 3, 13), noon(2025, 3, 20), now),
            Err(ServiceError::BadRequest(msg)) if msg == START_IN_PAST
        ));
        assert!(matches!(
            DateWindow::normalize(noon(2025, 3, 14), noon(2025, 3, 10), now),
            Err(ServiceError::BadRequest(msg)) if msg == EXPIRATION_IN_PAST
        ));
        assert!(matches!(
            DateWindow::normalize(noon(2025, 3, 18), noon(2025, 3, 16), now),
            Err(ServiceError::BadRequest(msg)) if msg == START_AFTER_EXPIRATION
        ));
    }

    #[test]
    fn running_window_can_be_extended() {
        let now = noon(2025, 3, 14);
        let running = DateWindow {
            start: start_of_day(noon(2025, 3, 10)),
            expiration: end_of_day(noon(2025, 3, 15)),
        };

        let extended = DateWindow::revise(running, None, Some(noon(2025, 3, 30)), now).unwrap();
        assert_eq!(extended.start, running.start);
        assert_eq!(extended.expiration, end_of_day(noon(2025, 3, 30)));
        assert_eq!(extended.initial_status(now), ActivityStatus::Active);

        assert!(matches!(
            DateWindow::revise(running, None, Some(noon(2025, 3, 12)), now),
            Err(ServiceError::BadRequest(msg)) if msg == EXPIRATION_IN_PAST
        ));
        // a new start is still held to today or later
        assert!(matches!(
            DateWindow::revise(running, Some(noon(2025, 3, 11)), None, now),
            Err(ServiceError::BadRequest(msg)) if msg == START_IN_PAST
        ));
    }

    #[test]
    fn expiring_today_is_still_valid() {
        let now = noon(2025, 3, 14);
        assert!(DateWindow::normalize(now, now, now).is_ok());
    }
}
