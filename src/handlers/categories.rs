use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;
use crate::handlers::common::{created_response, message_response, success_response, JsonBody};
use crate::{
    errors::ServiceError,
    services::categories::{CreateCategoryInput, CreateSubcategoryInput, UpdateCategoryInput},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{delete, get, patch, post, put},
    Router,
};
use uuid::Uuid;

pub fn categories_routes() -> Router<AppState> {
    let protected = Router::new()
        .route("/", post(create_category))
        .route("/:id", patch(update_category).delete(delete_category))
        .route(
            "/:id/subcategories/:subcategory_id",
            put(attach_subcategory),
        )
        .with_permission(perm::CATEGORIES_MANAGE);

    Router::new()
        .route("/", get(list_categories))
        .route("/:id", get(get_category))
        .merge(protected)
}

pub fn subcategories_routes() -> Router<AppState> {
    let protected = Router::new()
        .route("/", post(create_subcategory))
        .route("/:id", delete(delete_subcategory))
        .with_permission(perm::CATEGORIES_MANAGE);

    Router::new()
        .route("/", get(list_subcategories))
        .merge(protected)
}

async fn list_categories(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let categories = state.services.categories.list_categories().await?;
    Ok(success_response(categories))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let category = state.services.categories.get_category(id).await?;
    Ok(success_response(category))
}

async fn create_category(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateCategoryInput>,
) -> Result<Response, ServiceError> {
    let category = state.services.categories.create_category(payload).await?;
    Ok(created_response(category))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<UpdateCategoryInput>,
) -> Result<Response, ServiceError> {
    let category = state
        .services
        .categories
        .update_category(id, payload)
        .await?;
    Ok(success_response(category))
}

async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.categories.delete_category(id).await?;
    Ok(message_response("Category deleted"))
}

async fn attach_subcategory(
    State(state): State<AppState>,
    Path((id, subcategory_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ServiceError> {
    state
        .services
        .categories
        .attach_subcategory(id, subcategory_id)
        .await?;
    let category = state.services.categories.get_category(id).await?;
    Ok(success_response(category))
}

async fn list_subcategories(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let subcategories = state.services.categories.list_subcategories().await?;
    Ok(success_response(subcategories))
}

async fn create_subcategory(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateSubcategoryInput>,
) -> Result<Response, ServiceError> {
    let subcategory = state
        .services
        .categories
        .create_subcategory(payload)
        .await?;
    Ok(created_response(subcategory))
}

async fn delete_subcategory(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.categories.delete_subcategory(id).await?;
    Ok(message_response("Subcategory deleted"))
}
