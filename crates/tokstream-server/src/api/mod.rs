//! HTTP and WebSocket routes

mod convert;
mod stream;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

pub use convert::convert;
pub use stream::stream;

/// Marker text message that ends WebSocket input.
pub const END_MARKER: &str = "[END]";

/// `?voice=` query parameter shared by the conversion routes.
#[derive(Debug, Deserialize)]
pub struct VoiceQuery {
    #[serde(default = "default_voice")]
    pub voice: String,
}

fn default_voice() -> String {
    "default".to_string()
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/token2audio", post(convert))
        .route("/v1/token2audio/stream", get(stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
