/// HTTP identity bridge client
///
/// POSTs `{provider, id_token}` to the configured endpoint and expects
/// `{ok: true, sub, email?, name?}` or `{ok: false, reason}` back.
use crate::{
    config::IdentityConfig,
    error::{AuthError, AuthResult},
    identity::{ExternalVerifier, VerifiedIdentity, VerifyFailure},
    redact,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const BRIDGE_SECRET_HEADER: &str = "X-Bridge-Secret";

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    provider: &'a str,
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    ok: bool,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Outcome of one attempt
enum Attempt {
    Done(Result<VerifiedIdentity, VerifyFailure>),
    /// Timeout or connection failure, worth another try
    Retry(String),
}

/// Identity bridge client
#[derive(Clone)]
pub struct BridgeClient {
    http_client: reqwest::Client,
    endpoint: String,
    secret: Option<String>,
    retry: u32,
}

impl BridgeClient {
    /// Create a client for `endpoint` using the identity config's timeout,
    /// retry budget and shared secret
    pub fn new(endpoint: impl Into<String>, config: &IdentityConfig) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("tollgate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AuthError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            secret: config.bridge_secret.clone().filter(|s| !s.is_empty()),
            retry: config.retry,
        })
    }

    /// Client from config, if an endpoint is configured
    pub fn from_config(config: &IdentityConfig) -> AuthResult<Option<Self>> {
        config
            .verify_endpoint
            .as_deref()
            .map(|endpoint| Self::new(endpoint, config))
            .transpose()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn attempt(&self, provider: &str, id_token: &str) -> Attempt {
        let mut request = self
            .http_client
            .post(&self.endpoint)
            .json(&BridgeRequest { provider, id_token });
        if let Some(secret) = &self.secret {
            request = request.header(BRIDGE_SECRET_HEADER, secret);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Attempt::Retry("timeout".to_string()),
            Err(e) if e.is_connect() => return Attempt::Retry(format!("connect error: {}", e)),
            Err(e) => return Attempt::Done(Err(VerifyFailure::Unavailable(e.to_string()))),
        };

        let status = response.status();
        if !status.is_success() {
            return Attempt::Done(Err(VerifyFailure::Rejected(format!(
                "http {}",
                status.as_u16()
            ))));
        }

        let body = match response.json::<BridgeResponse>().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return Attempt::Retry("timeout".to_string()),
            Err(_) => {
                return Attempt::Done(Err(VerifyFailure::Rejected(
                    "malformed response".to_string(),
                )))
            }
        };

        Attempt::Done(Self::interpret(body))
    }

    fn interpret(body: BridgeResponse) -> Result<VerifiedIdentity, VerifyFailure> {
        if !body.ok {
            return Err(VerifyFailure::Rejected(
                body.reason.unwrap_or_else(|| "rejected".to_string()),
            ));
        }

        match body.sub.filter(|s| !s.trim().is_empty()) {
            Some(subject) => Ok(VerifiedIdentity {
                subject,
                display_name: body.name,
                email: body.email,
            }),
            None => Err(VerifyFailure::Rejected("malformed response".to_string())),
        }
    }
}

#[async_trait]
impl ExternalVerifier for BridgeClient {
    async fn verify(
        &self,
        provider: &str,
        id_token: &str,
    ) -> Result<VerifiedIdentity, VerifyFailure> {
        let mut last_error = String::new();

        for attempt in 0..=self.retry {
            match self.attempt(provider, id_token).await {
                Attempt::Done(result) => {
                    if let Err(failure) = &result {
                        debug!(
                            "bridge rejected {} token {}: {}",
                            provider,
                            redact::mask(id_token),
                            failure
                        );
                    }
                    return result;
                }
                Attempt::Retry(reason) => {
                    warn!(
                        "bridge attempt {}/{} for {} failed: {}",
                        attempt + 1,
                        self.retry + 1,
                        provider,
                        reason
                    );
                    last_error = reason;
                }
            }
        }

        Err(VerifyFailure::Unavailable(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[derive(Clone)]
    struct Stub {
        hits: Arc<AtomicUsize>,
    }

    async fn verify_handler(
        State(stub): State<Stub>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (axum::http::StatusCode, String) {
        stub.hits.fetch_add(1, Ordering::SeqCst);
        let token = body["id_token"].as_str().unwrap_or_default();
        let secret_ok = headers
            .get(BRIDGE_SECRET_HEADER)
            .map(|v| v == "shh")
            .unwrap_or(true);

        let reply = match token {
            _ if !secret_ok => return (axum::http::StatusCode::FORBIDDEN, String::new()),
            "good" => json!({"ok": true, "sub": "ext-1", "name": "Alice", "email": "a@example.com"}),
            "no-sub" => json!({"ok": true}),
            "garbage" => return (axum::http::StatusCode::OK, "not json".to_string()),
            "boom" => return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            "slow" => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                json!({"ok": true, "sub": "late"})
            }
            _ => json!({"ok": false, "reason": "invalid id token"}),
        };
        (axum::http::StatusCode::OK, reply.to_string())
    }

    async fn spawn_stub() -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/verify", post(verify_handler))
            .with_state(Stub { hits: hits.clone() });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/verify", addr), hits)
    }

    fn config(timeout_ms: u64, retry: u32, secret: Option<&str>) -> IdentityConfig {
        IdentityConfig {
            verify_endpoint: None,
            bridge_secret: secret.map(str::to_string),
            timeout_ms,
            retry,
        }
    }

    #[tokio::test]
    async fn test_verified_identity() {
        let (endpoint, hits) = spawn_stub().await;
        let client = BridgeClient::new(endpoint, &config(3000, 1, Some("shh"))).unwrap();

        let identity = client.verify("demo", "good").await.unwrap();

        assert_eq!(identity.subject, "ext-1");
        assert_eq!(identity.display_name.as_deref(), Some("Alice"));
        assert_eq!(identity.email.as_deref(), Some("a@example.com"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejections_are_not_retried() {
        let (endpoint, hits) = spawn_stub().await;
        let client = BridgeClient::new(endpoint, &config(3000, 3, None)).unwrap();

        assert_eq!(
            client.verify("demo", "nope").await,
            Err(VerifyFailure::Rejected("invalid id token".to_string()))
        );
        assert_eq!(
            client.verify("demo", "boom").await,
            Err(VerifyFailure::Rejected("http 500".to_string()))
        );
        assert_eq!(
            client.verify("demo", "garbage").await,
            Err(VerifyFailure::Rejected("malformed response".to_string()))
        );
        assert_eq!(
            client.verify("demo", "no-sub").await,
            Err(VerifyFailure::Rejected("malformed response".to_string()))
        );
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_http_rejection() {
        let (endpoint, _) = spawn_stub().await;
        let client = BridgeClient::new(endpoint, &config(3000, 0, Some("wrong"))).unwrap();

        assert_eq!(
            client.verify("demo", "good").await,
            Err(VerifyFailure::Rejected("http 403".to_string()))
        );
    }

    #[tokio::test]
    async fn test_timeout_uses_retry_budget() {
        let (endpoint, hits) = spawn_stub().await;
        let client = BridgeClient::new(endpoint, &config(100, 1, None)).unwrap();

        assert_eq!(
            client.verify("demo", "slow").await,
            Err(VerifyFailure::Unavailable("timeout".to_string()))
        );
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            BridgeClient::new(format!("http://{}/verify", addr), &config(500, 1, None)).unwrap();

        assert!(matches!(
            client.verify("demo", "good").await,
            Err(VerifyFailure::Unavailable(_))
        ));
    }

    #[test]
    fn test_from_config_without_endpoint() {
        assert!(BridgeClient::from_config(&config(3000, 1, None))
            .unwrap()
            .is_none());
    }
}
