//! Shared fixtures for integration tests
#![allow(dead_code)]

use axum::{routing::post, Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;
use tollgate::{
    config::{
        AuthConfig, IdentityConfig, LoggingConfig, RateLimitConfig, ServerConfig, ServiceConfig,
        SessionConfig, StorageConfig,
    },
    context::AppContext,
    db,
};

pub fn config(database_url: String, verify_endpoint: Option<String>) -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            host: "127.0.0.1".to_string(),
            http_port: 0,
            session_port: 5000,
            public_session_host: "game.example.com".to_string(),
        },
        storage: StorageConfig {
            database_url,
            max_connections: 5,
        },
        authentication: AuthConfig {
            jwt_secret: "integration-secret-key-0123456789abcdef".to_string(),
            issuer: "tollgate-it".to_string(),
            audience: "tollgate-it-clients".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_days: 30,
            revoke_lineage_on_reuse: false,
        },
        identity: IdentityConfig {
            verify_endpoint,
            ..IdentityConfig::default()
        },
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

/// An application context on a throwaway on-disk database
pub struct TestApp {
    pub ctx: AppContext,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with(|_| {}).await
    }

    /// Build with a stub identity bridge and a config tweak
    pub async fn with(tweak: impl FnOnce(&mut ServerConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("tollgate.sqlite").display());
        let bridge = spawn_bridge().await;

        let mut config = config(url, Some(bridge));
        tweak(&mut config);

        let pool = db::create_pool(
            &config.storage.database_url,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        db::run_migrations(&pool).await.unwrap();

        let ctx = AppContext::with_pool(config, pool).unwrap();
        Self { ctx, _dir: dir }
    }
}

/// Identity bridge stub: `alice-token` and `bob-token` are valid
pub async fn spawn_bridge() -> String {
    async fn verify(Json(body): Json<Value>) -> Json<Value> {
        let reply = match body["id_token"].as_str() {
            Some("alice-token") => json!({"ok": true, "sub": "alice", "name": "Alice", "email": "alice@example.com"}),
            Some("bob-token") => json!({"ok": true, "sub": "bob"}),
            _ => json!({"ok": false, "reason": "invalid id token"}),
        };
        Json(reply)
    }

    let app = Router::new().route("/verify", post(verify));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/verify", addr)
}
