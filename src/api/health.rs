/// Health check endpoint
use crate::{context::AppContext, db};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/health", get(health))
}

/// `{ok: true}` while the database answers
async fn health(State(ctx): State<AppContext>) -> (StatusCode, Json<Value>) {
    match db::test_connection(&ctx.db).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "ok": true }))),
        Err(e) => {
            tracing::error!("health check failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "ok": false })))
        }
    }
}
