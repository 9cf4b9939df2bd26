/*!
 * # Permissions Module
 *
 * Permission strings are `resource:action`. The `admin` role bypasses every check.
 */

/// Role granted every permission
pub const ADMIN_ROLE: &str = "admin";

/// Common permission string constants for compile-time safety
pub mod consts {
    // Orders
    pub const ORDERS_READ: &str = "orders:read";
    pub const ORDERS_UPDATE: &str = "orders:update";
    pub const ORDERS_DELETE: &str = "orders:delete";

    // Catalog
    pub const PRODUCTS_MANAGE: &str = "products:manage";
    pub const CATEGORIES_MANAGE: &str = "categories:manage";

    // Promotions
    pub const OFFERS_MANAGE: &str = "offers:manage";
    pub const COUPONS_MANAGE: &str = "coupons:manage";

    // Store
    pub const SETTINGS_MANAGE: &str = "settings:manage";

    /// Every permission known to the API
    pub const ALL: [&str; 8] = [
        ORDERS_READ,
        ORDERS_UPDATE,
        ORDERS_DELETE,
        PRODUCTS_MANAGE,
        CATEGORIES_MANAGE,
        OFFERS_MANAGE,
        COUPONS_MANAGE,
        SETTINGS_MANAGE,
    ];
}

/// Splits `resource:action`; `None` for malformed strings.
pub fn parse_permission(permission: &str) -> Option<(&str, &str)> {
    let (resource, action) = permission.split_once(':')?;
    if resource.is_empty() || action.is_empty() {
        return None;
    }
    Some((resource, action))
}
