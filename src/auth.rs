/// Authentication extractors
use crate::{
    api::middleware::extract_bearer_token, context::AppContext, db::account::AccountId,
    error::AuthError, token::AccessClaims,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Caller holding a valid access token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: AccountId,
    pub claims: AccessClaims,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AuthError::Unauthorized("Missing authorization header".to_string()))?;

        let claims = state.login.validate_access(&token)?;
        let account_id = claims.account_id()?;

        Ok(AuthContext { account_id, claims })
    }
}
