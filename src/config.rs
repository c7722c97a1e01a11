/// Configuration management for Tollgate
use crate::error::{AuthError, AuthResult};
use crate::wire::{DEFAULT_CACHE_CAPACITY, DEFAULT_MAX_FRAME_LEN};
use serde::{Deserialize, Serialize};
use std::env;
use tracing_subscriber::EnvFilter;

/// Longest accepted access token lifetime (one day)
pub const MAX_ACCESS_TTL_SECS: i64 = 86_400;
/// Longest accepted refresh token lifetime (ten years)
pub const MAX_REFRESH_TTL_DAYS: i64 = 3_650;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub identity: IdentityConfig,
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    /// HTTP gateway port
    pub http_port: u16,
    /// Session protocol (framed TCP) port
    pub session_port: u16,
    /// Host advertised to gateway clients for the session connection
    pub public_session_host: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: u32,
}

/// Token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_days: i64,
    /// Revoke the whole refresh lineage when a used token is presented again
    pub revoke_lineage_on_reuse: bool,
}

/// External identity verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Identity bridge endpoint. Without one only guest logins succeed.
    pub verify_endpoint: Option<String>,
    pub bridge_secret: Option<String>,
    pub timeout_ms: u64,
    pub retry: u32,
}

/// Session protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub cache_capacity: usize,
    pub max_frame_len: u32,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directives used when `RUST_LOG` is not set
    pub level: String,
    pub json: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            verify_endpoint: None,
            bridge_secret: None,
            timeout_ms: 3000,
            retry: 1,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AuthResult<Self> {
        dotenv::dotenv().ok();

        let host = env::var("TOLLGATE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let http_port = env::var("TOLLGATE_HTTP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| AuthError::Config("Invalid HTTP port number".to_string()))?;
        let session_port = env::var("TOLLGATE_SESSION_PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| AuthError::Config("Invalid session port number".to_string()))?;
        let public_session_host =
            env::var("TOLLGATE_PUBLIC_SESSION_HOST").unwrap_or_else(|_| "localhost".to_string());

        let database_url = env::var("TOLLGATE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/tollgate.sqlite".to_string());
        let max_connections = env_or("TOLLGATE_DB_MAX_CONNECTIONS", 10);

        let jwt_secret = env::var("TOLLGATE_JWT_SECRET")
            .map_err(|_| AuthError::Config("JWT secret required".to_string()))?;
        let issuer = env::var("TOLLGATE_JWT_ISSUER").unwrap_or_else(|_| "tollgate".to_string());
        let audience =
            env::var("TOLLGATE_JWT_AUDIENCE").unwrap_or_else(|_| "tollgate-clients".to_string());

        let identity = IdentityConfig {
            verify_endpoint: env_opt("TOLLGATE_VERIFY_ENDPOINT"),
            bridge_secret: env_opt("TOLLGATE_BRIDGE_SECRET"),
            timeout_ms: env_or("TOLLGATE_VERIFY_TIMEOUT_MS", 3000),
            retry: env_or("TOLLGATE_VERIFY_RETRY", 1),
        };

        let level = env_or(
            "TOLLGATE_LOG_LEVEL",
            "tollgate=info,tower_http=info".to_string(),
        );
        let json = env::var("TOLLGATE_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                host,
                http_port,
                session_port,
                public_session_host,
            },
            storage: StorageConfig {
                database_url,
                max_connections,
            },
            authentication: AuthConfig {
                jwt_secret,
                issuer,
                audience,
                access_ttl_secs: env_or("TOLLGATE_ACCESS_TTL_SECS", 900),
                refresh_ttl_days: env_or("TOLLGATE_REFRESH_TTL_DAYS", 30),
                revoke_lineage_on_reuse: env_or("TOLLGATE_REVOKE_LINEAGE_ON_REUSE", false),
            },
            identity,
            session: SessionConfig {
                cache_capacity: env_or("TOLLGATE_SESSION_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY),
                max_frame_len: env_or("TOLLGATE_MAX_FRAME_LEN", DEFAULT_MAX_FRAME_LEN),
            },
            rate_limit: RateLimitConfig {
                enabled: env_or("TOLLGATE_RATE_LIMIT_ENABLED", true),
                requests_per_second: env_or("TOLLGATE_RATE_LIMIT_RPS", 50),
                burst_size: env_or("TOLLGATE_RATE_LIMIT_BURST", 100),
            },
            logging: LoggingConfig { level, json },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AuthResult<()> {
        if self.authentication.jwt_secret.len() < 32 {
            return Err(AuthError::Config(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.issuer.is_empty() || self.authentication.audience.is_empty() {
            return Err(AuthError::Config(
                "JWT issuer and audience cannot be empty".to_string(),
            ));
        }

        if self.authentication.access_ttl_secs <= 0 || self.authentication.refresh_ttl_days <= 0 {
            return Err(AuthError::Config("Token lifetimes must be positive".to_string()));
        }

        if self.authentication.access_ttl_secs > MAX_ACCESS_TTL_SECS {
            return Err(AuthError::Config(format!(
                "Access token lifetime cannot exceed {} seconds",
                MAX_ACCESS_TTL_SECS
            )));
        }

        if self.authentication.refresh_ttl_days > MAX_REFRESH_TTL_DAYS {
            return Err(AuthError::Config(format!(
                "Refresh token lifetime cannot exceed {} days",
                MAX_REFRESH_TTL_DAYS
            )));
        }

        if self.session.cache_capacity == 0 || self.session.max_frame_len == 0 {
            return Err(AuthError::Config(
                "Session cache capacity and frame limit must be non-zero".to_string(),
            ));
        }

        if let Err(e) = EnvFilter::try_new(&self.logging.level) {
            return Err(AuthError::Config(format!(
                "Invalid log level '{}': {}",
                self.logging.level, e
            )));
        }

        if self.storage.max_connections == 0 {
            return Err(AuthError::Config(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        Ok(())
    }

    /// Log filter: `RUST_LOG` when set, the configured level otherwise
    pub fn log_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.logging.level))
    }

    /// HTTP gateway bind address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.service.host, self.service.http_port)
    }

    /// Session protocol bind address
    pub fn session_addr(&self) -> String {
        format!("{}:{}", self.service.host, self.service.session_port)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            host: "127.0.0.1".to_string(),
            http_port: 0,
            session_port: 0,
            public_session_host: "localhost".to_string(),
        },
        storage: StorageConfig {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        authentication: AuthConfig {
            jwt_secret: "test-secret-key-for-testing-only-0123456789".to_string(),
            issuer: "tollgate-test".to_string(),
            audience: "tollgate-test-clients".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_days: 30,
            revoke_lineage_on_reuse: false,
        },
        identity: IdentityConfig::default(),
        session: SessionConfig::default(),
        rate_limit: RateLimitConfig {
            enabled: false,
            requests_per_second: 50,
            burst_size: 100,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            json: false,
        },
    }
}
