// Catalog
pub mod catalog;
pub mod categories;

// Promotions
pub mod promotions;

// Orders and payments
pub mod carts;
pub mod lifecycle;
pub mod orders;
pub mod payments;

// Store configuration and background work
pub mod scheduler;
pub mod store_settings;
