use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::routes::{chat, health};
use crate::state::AppState;

pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(info(
    title = "aries-server",
    description = "AriesBerriesCompany chat gate",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(chat::ChatApi::openapi());
    root
}

/// Serve the OpenAPI document as JSON.
pub fn router() -> Router<Arc<AppState>> {
    let doc = get_docs();
    Router::new().route(OPENAPI_PATH, get(move || async move { Json(doc) }))
}
