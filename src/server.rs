/// HTTP gateway and session listener setup
use crate::{
    context::AppContext,
    error::{AuthError, AuthResult},
    wire::{SessionServer, SessionService},
};
use axum::{
    http::{header, HeaderName, Method, StatusCode},
    response::Json,
    Router,
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the gateway router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(crate::api::middleware::DEVICE_ID_HEADER),
        ]);

    Router::new()
        .merge(crate::api::routes(ctx.clone()))
        .with_state(ctx)
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "ok": false,
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP gateway
pub async fn serve_http(ctx: AppContext) -> AuthResult<()> {
    let addr = ctx.config.http_addr();
    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AuthError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    info!("HTTP gateway listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| AuthError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

/// Start the session protocol listener
pub async fn serve_session(ctx: AppContext) -> AuthResult<()> {
    let service = SessionService::new(ctx.login.clone(), &ctx.config.session);
    let server = SessionServer::bind(&ctx.config.session_addr(), service).await?;

    server.run().await
}

/// Run both listeners until one fails
pub async fn serve(ctx: AppContext) -> AuthResult<()> {
    tokio::try_join!(serve_http(ctx.clone()), serve_session(ctx))?;
    Ok(())
}
