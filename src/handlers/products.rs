use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;
use crate::handlers::common::{
    created_response, message_response, success_response, JsonBody, PaginatedResponse,
};
use crate::{
    errors::ServiceError,
    services::catalog::{
        CreateProductInput, CreateVariantInput, ProductListQuery, UpdateProductInput,
        UpdateVariantInput,
    },
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, patch, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

const MAX_PAGE_SIZE: u64 = 100;

/// Creates the router for product endpoints
pub fn products_routes() -> Router<AppState> {
    let protected = Router::new()
        .route("/", post(create_product))
        .route("/:id", patch(update_product).delete(delete_product))
        .route("/:id/variants", post(add_variant))
        .route("/variants/:variant_id", patch(update_variant).delete(remove_variant))
        .route("/variants/:variant_id/stock", put(set_stock))
        .with_permission(perm::PRODUCTS_MANAGE);

    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
        .merge(protected)
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Response, ServiceError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, MAX_PAGE_SIZE);
    let (products, total) = state.services.catalog.list_products(query).await?;
    Ok(success_response(PaginatedResponse::new(
        products, page, per_page, total,
    )))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(success_response(product))
}

async fn create_product(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateProductInput>,
) -> Result<Response, ServiceError> {
    let product = state.services.catalog.create_product(payload).await?;
    Ok(created_response(product))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<UpdateProductInput>,
) -> Result<Response, ServiceError> {
    let product = state.services.catalog.update_product(id, payload).await?;
    Ok(success_response(product))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.catalog.delete_product(id).await?;
    Ok(message_response("Product deleted"))
}

async fn add_variant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<CreateVariantInput>,
) -> Result<Response, ServiceError> {
    let variant = state.services.catalog.add_variant(id, payload).await?;
    Ok(created_response(variant))
}

async fn update_variant(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
    JsonBody(payload): JsonBody<UpdateVariantInput>,
) -> Result<Response, ServiceError> {
    let variant = state
        .services
        .catalog
        .update_variant(variant_id, payload)
        .await?;
    Ok(success_response(variant))
}

async fn remove_variant(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.catalog.remove_variant(variant_id).await?;
    Ok(message_response("Variant removed"))
}

#[derive(Debug, Deserialize)]
struct SetStockRequest {
    size: String,
    stock: i32,
}

async fn set_stock(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
    JsonBody(payload): JsonBody<SetStockRequest>,
) -> Result<Response, ServiceError> {
    let size = state
        .services
        .catalog
        .set_stock(variant_id, payload.size.trim(), payload.stock)
        .await?;
    Ok(success_response(size))
}
