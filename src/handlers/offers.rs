use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;
use crate::handlers::common::{created_response, message_response, success_response, JsonBody};
use crate::{
    entities::commerce::ActivityStatus,
    errors::ServiceError,
    services::promotions::{CreateOfferInput, UpdateOfferInput},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub status: Option<ActivityStatus>,
}

/// Offers are listed publicly so the storefront can show them
pub fn offers_routes() -> Router<AppState> {
    let protected = Router::new()
        .route("/", post(create_offer))
        .route("/:id", patch(update_offer).delete(delete_offer))
        .with_permission(perm::OFFERS_MANAGE);

    Router::new()
        .route("/", get(list_offers))
        .route("/:id", get(get_offer))
        .merge(protected)
}

async fn list_offers(
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> Result<Response, ServiceError> {
    let offers = state.services.offers.list_offers(filter.status).await?;
    Ok(success_response(offers))
}

async fn get_offer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let offer = state.services.offers.get_offer(id).await?;
    Ok(success_response(offer))
}

async fn create_offer(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateOfferInput>,
) -> Result<Response, ServiceError> {
    let offer = state.services.offers.create_offer(payload).await?;
    Ok(created_response(offer))
}

async fn update_offer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<UpdateOfferInput>,
) -> Result<Response, ServiceError> {
    let offer = state.services.offers.update_offer(id, payload).await?;
    Ok(success_response(offer))
}

async fn delete_offer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.offers.delete_offer(id).await?;
    Ok(message_response("Offer deleted"))
}
