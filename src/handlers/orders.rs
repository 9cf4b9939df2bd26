use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;
use crate::handlers::common::{
    created_response, message_response, success_response, JsonBody, PaginatedResponse,
};
use crate::{
    errors::ServiceError,
    services::orders::{CreateOrderInput, OrderLineInput, OrderListQuery, UpdateOrderInput},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{delete, get, patch, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

const MAX_PAGE_SIZE: u64 = 100;

/// Checkout and lookup by email are public; everything else needs an operator.
pub fn orders_routes() -> Router<AppState> {
    let read = Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .with_permission(perm::ORDERS_READ);
    let update = Router::new()
        .route("/:id", patch(update_order))
        .with_permission(perm::ORDERS_UPDATE);
    let remove = Router::new()
        .route("/:id", delete(delete_order))
        .with_permission(perm::ORDERS_DELETE);

    Router::new()
        .route("/", post(create_order))
        .route("/quote", post(quote_order))
        .route("/by-email", get(orders_by_email))
        .merge(read)
        .merge(update)
        .merge(remove)
}

async fn create_order(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateOrderInput>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.create_order(payload).await?;
    Ok(created_response(order))
}

#[derive(Debug, Deserialize, Validate)]
struct QuoteRequest {
    #[validate(email)]
    email: String,
    #[validate]
    items: Vec<OrderLineInput>,
    coupon_code: Option<String>,
}

async fn quote_order(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<QuoteRequest>,
) -> Result<Response, ServiceError> {
    payload.validate()?;
    let quote = state
        .services
        .orders
        .quote(
            &payload.email.trim().to_lowercase(),
            &payload.items,
            payload.coupon_code.as_deref(),
        )
        .await?;
    Ok(success_response(quote))
}

#[derive(Debug, Deserialize)]
struct EmailQuery {
    email: String,
}

async fn orders_by_email(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> Result<Response, ServiceError> {
    if query.email.trim().is_empty() {
        return Err(ServiceError::BadRequest("email is required".to_string()));
    }
    let orders = state.services.orders.find_by_email(&query.email).await?;
    Ok(success_response(orders))
}

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Response, ServiceError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, MAX_PAGE_SIZE);
    let (orders, total) = state.services.orders.list_orders(query).await?;
    Ok(success_response(PaginatedResponse::new(
        orders, page, per_page, total,
    )))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    Ok(success_response(order))
}

async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<UpdateOrderInput>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.update_order(id, payload).await?;
    Ok(success_response(order))
}

async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.orders.delete_order(id).await?;
    Ok(message_response("Order deleted"))
}
