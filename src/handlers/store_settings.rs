use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;
use crate::handlers::common::{success_response, JsonBody};
use crate::{
    errors::ServiceError, services::store_settings::UpdateStoreSettingsInput, AppState,
};
use axum::{extract::State, response::Response, routing::get, Router};

pub fn store_settings_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_settings).put(update_settings))
        .with_permission(perm::SETTINGS_MANAGE)
}

async fn get_settings(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let settings = state.services.store_settings.get_settings().await?;
    Ok(success_response(settings))
}

async fn update_settings(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<UpdateStoreSettingsInput>,
) -> Result<Response, ServiceError> {
    let settings = state.services.store_settings.update_settings(payload).await?;
    Ok(success_response(settings))
}
