//! Offers, coupons and the pricing rules they share.

pub mod codes;
pub mod coupons;
pub mod discount;
pub mod offers;

pub use coupons::{CouponService, CreateCouponInput, UpdateCouponInput};
pub use discount::DiscountMode;
pub use offers::{CreateOfferInput, OfferPrice, OfferService, UpdateOfferInput};
