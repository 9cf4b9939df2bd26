use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;
use crate::handlers::{
    common::{created_response, message_response, success_response, JsonBody},
    offers::StatusFilter,
};
use crate::{
    errors::ServiceError,
    services::promotions::{CreateCouponInput, UpdateCouponInput},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::get,
    Router,
};
use uuid::Uuid;

pub fn coupons_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_coupons).post(create_coupon))
        .route("/code/:code", get(get_coupon_by_code))
        .route(
            "/:id",
            get(get_coupon).patch(update_coupon).delete(delete_coupon),
        )
        .with_permission(perm::COUPONS_MANAGE)
}

async fn list_coupons(
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> Result<Response, ServiceError> {
    let coupons = state.services.coupons.list_coupons(filter.status).await?;
    Ok(success_response(coupons))
}

async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let coupon = state.services.coupons.get_coupon(id).await?;
    Ok(success_response(coupon))
}

async fn get_coupon_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, ServiceError> {
    let coupon = state.services.coupons.find_by_code(&code).await?;
    Ok(success_response(coupon))
}

async fn create_coupon(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateCouponInput>,
) -> Result<Response, ServiceError> {
    let coupon = state.services.coupons.create_coupon(payload).await?;
    Ok(created_response(coupon))
}

async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<UpdateCouponInput>,
) -> Result<Response, ServiceError> {
    let coupon = state.services.coupons.update_coupon(id, payload).await?;
    Ok(success_response(coupon))
}

async fn delete_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.coupons.delete_coupon(id).await?;
    Ok(message_response("Coupon deleted"))
}
