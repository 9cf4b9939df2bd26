/// Storefront entities
pub mod category;
pub mod category_subcategory;
pub mod coupon;
pub mod coupon_redemption;
pub mod offer;
pub mod order;
pub mod product;
pub mod product_variant;
pub mod shopping_cart;
pub mod status;
pub mod store_setting;
pub mod subcategory;
pub mod variant_size;

// Re-export entities
pub use category::{Entity as Category, Model as CategoryModel};
pub use category_subcategory::{Entity as CategorySubcategory, Model as CategorySubcategoryModel};
pub use coupon::{Entity as Coupon, Model as CouponModel};
pub use coupon_redemption::{Entity as CouponRedemption, Model as CouponRedemptionModel};
pub use offer::{Entity as Offer, Model as OfferModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use product::{Entity as Product, Model as ProductModel, ProductStatus};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
pub use shopping_cart::{Entity as ShoppingCart, Model as ShoppingCartModel};
pub use status::ActivityStatus;
pub use store_setting::{Entity as StoreSetting, Model as StoreSettingModel};
pub use subcategory::{Entity as Subcategory, Model as SubcategoryModel};
pub use variant_size::{Entity as VariantSize, Model as VariantSizeModel};
