use crate::handlers::common::{created_response, message_response, success_response, JsonBody};
use crate::{
    errors::ServiceError,
    services::carts::{CartItemInput, CheckoutCartInput, CreateCartInput, RemoveCartItemQuery},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

/// Storefront carts; public like checkout itself
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_cart))
        .route("/:id", get(get_cart))
        .route("/:id/items", post(add_item).delete(remove_item))
        .route("/:id/coupon", post(apply_coupon))
        .route("/:id/checkout", post(checkout))
}

async fn create_cart(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateCartInput>,
) -> Result<Response, ServiceError> {
    let cart = state.services.carts.create_cart(payload).await?;
    Ok(created_response(cart))
}

async fn get_cart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let cart = state.services.carts.get_cart(id).await?;
    Ok(success_response(cart))
}

async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<CartItemInput>,
) -> Result<Response, ServiceError> {
    let cart = state.services.carts.add_item(id, payload).await?;
    Ok(success_response(cart))
}

async fn remove_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(item): Query<RemoveCartItemQuery>,
) -> Result<Response, ServiceError> {
    match state
        .services
        .carts
        .remove_item(id, item.product_id, item.variant_id, &item.size)
        .await?
    {
        Some(cart) => Ok(success_response(cart)),
        None => Ok(message_response("Cart is empty and was removed")),
    }
}

#[derive(Debug, Deserialize)]
struct ApplyCouponRequest {
    code: String,
}

async fn apply_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<ApplyCouponRequest>,
) -> Result<Response, ServiceError> {
    let cart = state.services.carts.apply_coupon(id, &payload.code).await?;
    Ok(success_response(cart))
}

async fn checkout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<CheckoutCartInput>,
) -> Result<Response, ServiceError> {
    let order = state.services.carts.checkout(id, payload).await?;
    Ok(created_response(order))
}
