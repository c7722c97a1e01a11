/// Login service
///
/// The transport-independent core: verify an external identity, resolve it
/// to an account, mint an access token and a refresh token. Both the session
/// protocol and the HTTP gateway call into this.
use crate::{
    account::AccountDirectory,
    db::account::{Account, AccountId},
    error::{AuthError, AuthResult},
    identity::IdentityVerifier,
    redact,
    token::{AccessClaims, AccessToken, AccessTokenIssuer, RefreshLedger},
    wire::RequestHandler,
};
use async_trait::async_trait;
use tracing::{info, warn};

/// Longest device id kept with a refresh token
const MAX_DEVICE_ID_LEN: usize = 128;

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub account: Account,
    pub access: AccessToken,
    pub refresh_token: String,
}

/// Result of a successful refresh
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub account_id: AccountId,
    pub access: AccessToken,
    pub refresh_token: String,
}

/// Login service
#[derive(Clone)]
pub struct LoginService {
    verifier: IdentityVerifier,
    accounts: AccountDirectory,
    access_tokens: AccessTokenIssuer,
    refresh_tokens: RefreshLedger,
}

impl LoginService {
    pub fn new(
        verifier: IdentityVerifier,
        accounts: AccountDirectory,
        access_tokens: AccessTokenIssuer,
        refresh_tokens: RefreshLedger,
    ) -> Self {
        Self {
            verifier,
            accounts,
            access_tokens,
            refresh_tokens,
        }
    }

    pub fn accounts(&self) -> &AccountDirectory {
        &self.accounts
    }

    pub fn refresh_tokens(&self) -> &RefreshLedger {
        &self.refresh_tokens
    }

    /// Exchange an external identity token for a session.
    ///
    /// Nothing is written unless verification succeeds.
    pub async fn login(
        &self,
        provider: &str,
        id_token: Option<&str>,
        device_id: Option<&str>,
    ) -> AuthResult<LoginOutcome> {
        let provider = provider.trim();
        if provider.is_empty() {
            return Err(AuthError::InvalidInput("provider is required".to_string()));
        }

        let identity = match self.verifier.verify(provider, id_token).await {
            Ok(identity) => identity,
            Err(failure) => {
                warn!(
                    "login for provider {} failed (token {}): {}",
                    provider,
                    redact::mask(id_token.unwrap_or_default()),
                    failure
                );
                return Err(failure.into());
            }
        };

        let account = self
            .accounts
            .resolve(
                provider,
                &identity.subject,
                identity.display_name.as_deref(),
                identity.email.as_deref(),
            )
            .await?;

        let device_id = normalize_device_id(device_id);
        let access = self.access_tokens.issue(&account)?;
        let refresh = self.refresh_tokens.mint(account.id, device_id.as_deref()).await?;

        info!("login ok: account {} via {}", account.id, provider);

        Ok(LoginOutcome {
            account,
            access,
            refresh_token: refresh.secret,
        })
    }

    /// Rotate a refresh token and issue a new access token
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshOutcome> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(AuthError::InvalidInput("refresh token is required".to_string()));
        }

        let redemption = self.refresh_tokens.redeem(refresh_token).await?;
        let account = self.accounts.fetch(redemption.account_id).await?;
        let access = self.access_tokens.issue(&account)?;

        info!("refresh ok: account {}", account.id);

        Ok(RefreshOutcome {
            account_id: account.id,
            access,
            refresh_token: redemption.replacement.secret,
        })
    }

    /// Revoke a refresh token. Unknown tokens are not an error.
    pub async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(AuthError::InvalidInput("refresh token is required".to_string()));
        }

        self.refresh_tokens.revoke(refresh_token).await?;
        info!("logout: revoked token {}", redact::mask(refresh_token));
        Ok(())
    }

    /// Validate an access token for a downstream caller
    pub fn validate_access(&self, token: &str) -> AuthResult<AccessClaims> {
        self.access_tokens.validate(token)
    }
}

fn normalize_device_id(device_id: Option<&str>) -> Option<String> {
    device_id
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| d.chars().take(MAX_DEVICE_ID_LEN).collect())
}

#[async_trait]
impl RequestHandler for LoginService {
    async fn login(
        &self,
        provider: &str,
        id_token: Option<&str>,
        device_id: Option<&str>,
    ) -> AuthResult<LoginOutcome> {
        LoginService::login(self, provider, id_token, device_id).await
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshOutcome> {
        LoginService::refresh(self, refresh_token).await
    }

    async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        LoginService::logout(self, refresh_token).await
    }
}
