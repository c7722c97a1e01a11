/// Application context and dependency injection
use crate::{
    account::AccountDirectory,
    config::ServerConfig,
    db,
    error::AuthResult,
    identity::{BridgeClient, IdentityVerifier},
    login::LoginService,
    rate_limit::RateLimiter,
    token::{AccessTokenIssuer, RefreshLedger},
};
use chrono::Duration;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub login: Arc<LoginService>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AuthResult<Self> {
        config.validate()?;

        let pool = db::create_pool(
            &config.storage.database_url,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..Default::default()
            },
        )
        .await?;

        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        Self::with_pool(config, pool)
    }

    /// Build the context around an existing, migrated pool
    pub fn with_pool(config: ServerConfig, pool: SqlitePool) -> AuthResult<Self> {
        config.validate()?;

        let verifier = match BridgeClient::from_config(&config.identity)? {
            Some(bridge) => {
                tracing::info!("Identity bridge: {}", bridge.endpoint());
                IdentityVerifier::new(Arc::new(bridge))
            }
            None => {
                tracing::warn!("No identity bridge configured - only guest logins will succeed");
                IdentityVerifier::guest_only()
            }
        };

        let refresh_ttl = Duration::days(config.authentication.refresh_ttl_days);
        let login = LoginService::new(
            verifier,
            AccountDirectory::new(pool.clone()),
            AccessTokenIssuer::new(&config.authentication),
            RefreshLedger::new(pool.clone(), refresh_ttl)
                .with_lineage_revocation(config.authentication.revoke_lineage_on_reuse),
        );

        let rate_limiter = RateLimiter::new(&config.rate_limit);

        Ok(Self {
            config: Arc::new(config),
            db: pool,
            login: Arc::new(login),
            rate_limiter: Arc::new(rate_limiter),
        })
    }
}
