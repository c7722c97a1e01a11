/// Access token issuing and validation
use crate::{
    config::AuthConfig,
    db::account::{Account, AccountId},
    error::{AuthError, AuthResult},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by every access token.
///
/// `sub` is the internal account id. `provider`/`psub` are informational for
/// consumers that also want the external identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub provider: String,
    pub psub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
}

impl AccessClaims {
    /// Account id from `sub`
    pub fn account_id(&self) -> AuthResult<AccountId> {
        self.sub
            .parse()
            .map(AccountId)
            .map_err(|_| AuthError::Unauthorized("access token subject is not an account id".to_string()))
    }

    /// Expiry as a timestamp
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

/// A freshly signed access token
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

/// Mints and checks access tokens with a symmetric key
#[derive(Clone)]
pub struct AccessTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl AccessTokenIssuer {
    /// Create an issuer from the authentication config
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl: Duration::seconds(config.access_ttl_secs),
        }
    }

    /// Token lifetime in seconds
    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Issue a token for `account` valid from now
    pub fn issue(&self, account: &Account) -> AuthResult<AccessToken> {
        self.issue_at(account, Utc::now())
    }

    /// Issue a token for `account` valid from `now`
    pub fn issue_at(&self, account: &Account, now: DateTime<Utc>) -> AuthResult<AccessToken> {
        let expires_at = now.checked_add_signed(self.ttl).ok_or_else(|| {
            AuthError::Internal("access token lifetime out of range".to_string())
        })?;
        let claims = AccessClaims {
            sub: account.id.0.to_string(),
            provider: account.provider.clone(),
            psub: account.provider_sub.clone(),
            name: account.display_name.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Jwt(format!("Failed to generate token: {}", e)))?;

        Ok(AccessToken {
            token,
            expires_at,
            expires_in: self.ttl.num_seconds(),
        })
    }

    /// Validate a token against the current time
    pub fn validate(&self, token: &str) -> AuthResult<AccessClaims> {
        self.validate_at(token, Utc::now())
    }

    /// Validate a token as of `now`.
    ///
    /// Signature, issuer, audience, `nbf <= now < exp`, no leeway. Every
    /// failure collapses into the same `Unauthorized`; the cause is only logged.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<AccessClaims> {
        let invalid = || AuthError::Unauthorized("invalid access token".to_string());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);
        validation.leeway = 0;
        // Lifetime is checked below against the caller's clock
        validation.validate_exp = false;
        validation.validate_nbf = false;

        let claims = decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::warn!("access token rejected: {}", e);
                invalid()
            })?
            .claims;

        let now = now.timestamp();
        if now >= claims.exp {
            tracing::warn!("access token rejected: expired at {}", claims.exp);
            return Err(invalid());
        }
        if now < claims.nbf {
            tracing::warn!("access token rejected: not valid before {}", claims.nbf);
            return Err(invalid());
        }

        Ok(claims)
    }
}
