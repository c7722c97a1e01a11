/// Stateless HTTP gateway: login, refresh, logout and session introspection
use crate::{
    api::middleware::extract_device_id,
    auth::AuthContext,
    context::AppContext,
    error::{AuthError, AuthResult},
    rate_limit::rate_limit_middleware,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Build gateway routes. Credential endpoints sit behind the rate limiter.
pub fn routes(ctx: AppContext) -> Router<AppContext> {
    let credentials = Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(ctx, rate_limit_middleware));

    Router::new()
        .merge(credentials)
        .route("/session", get(session))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 32))]
    pub provider: String,
    #[serde(default)]
    #[validate(length(max = 4096))]
    pub id_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub ok: bool,
    /// Provider subject
    pub uid: String,
    pub account_id: String,
    pub display_name: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub session_host: String,
    pub session_port: u16,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1, max = 512))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub ok: bool,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub ok: bool,
    pub account_id: String,
    pub provider: String,
    pub provider_sub: String,
    pub display_name: Option<String>,
    pub expires_at: String,
}

/// Unwrap and validate a JSON body, turning every failure into `InvalidInput`
fn validated<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> AuthResult<T> {
    let Json(req) =
        payload.map_err(|e| AuthError::InvalidInput(format!("Invalid request body: {}", e.body_text())))?;
    req.validate()
        .map_err(|e| AuthError::InvalidInput(format!("Invalid request: {}", e)))?;
    Ok(req)
}

/// POST /login
async fn login(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AuthResult<Json<LoginResponse>> {
    let req = validated(payload)?;
    let device_id = extract_device_id(&headers);

    let outcome = ctx
        .login
        .login(&req.provider, req.id_token.as_deref(), device_id.as_deref())
        .await?;

    Ok(Json(LoginResponse {
        ok: true,
        uid: outcome.account.provider_sub.clone(),
        account_id: outcome.account.id.to_string(),
        display_name: outcome.account.display_name_or_default().to_string(),
        access_token: outcome.access.token,
        refresh_token: outcome.refresh_token,
        expires_in: outcome.access.expires_in,
        session_host: ctx.config.service.public_session_host.clone(),
        session_port: ctx.config.service.session_port,
    }))
}

/// POST /refresh
async fn refresh(
    State(ctx): State<AppContext>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> AuthResult<Json<RefreshResponse>> {
    let req = validated(payload)?;

    let outcome = ctx.login.refresh(&req.refresh_token).await?;

    Ok(Json(RefreshResponse {
        ok: true,
        access_token: outcome.access.token,
        refresh_token: outcome.refresh_token,
        expires_in: outcome.access.expires_in,
    }))
}

/// POST /logout
async fn logout(
    State(ctx): State<AppContext>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> AuthResult<Json<OkResponse>> {
    let req = validated(payload)?;

    ctx.login.logout(&req.refresh_token).await?;

    Ok(Json(OkResponse { ok: true }))
}

/// GET /session
async fn session(auth: AuthContext) -> AuthResult<Json<SessionResponse>> {
    let expires_at = auth
        .claims
        .expires_at()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();

    Ok(Json(SessionResponse {
        ok: true,
        account_id: auth.account_id.to_string(),
        provider: auth.claims.provider,
        provider_sub: auth.claims.psub,
        display_name: auth.claims.name,
        expires_at,
    }))
}
