/// Identity verification
///
/// Turns a (provider, external token) pair into a verified external identity.
/// The guest provider is answered locally; every other provider goes through
/// an [`ExternalVerifier`], normally the HTTP [`BridgeClient`].

pub mod bridge;

pub use bridge::BridgeClient;

use crate::error::AuthError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Provider name that needs no external token
pub const GUEST_PROVIDER: &str = "guest";

/// Display name given to every guest
pub const GUEST_DISPLAY_NAME: &str = "Guest";

/// An identity confirmed by its provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// Why verification failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    /// No external token supplied for a provider that needs one
    #[error("missing token")]
    MissingToken,

    /// The provider (or the bridge) said no
    #[error("rejected: {0}")]
    Rejected(String),

    /// The bridge could not be reached in time
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<VerifyFailure> for AuthError {
    fn from(failure: VerifyFailure) -> Self {
        match failure {
            VerifyFailure::MissingToken => AuthError::InvalidInput("missing token".to_string()),
            VerifyFailure::Rejected(reason) => AuthError::Unauthorized(reason),
            VerifyFailure::Unavailable(reason) => AuthError::Upstream(reason),
        }
    }
}

/// Boundary to whatever actually checks third-party tokens
#[async_trait]
pub trait ExternalVerifier: Send + Sync {
    async fn verify(&self, provider: &str, id_token: &str)
        -> Result<VerifiedIdentity, VerifyFailure>;
}

/// Identity verifier
#[derive(Clone)]
pub struct IdentityVerifier {
    external: Option<Arc<dyn ExternalVerifier>>,
}

impl IdentityVerifier {
    /// Verifier backed by an external checker
    pub fn new(external: Arc<dyn ExternalVerifier>) -> Self {
        Self {
            external: Some(external),
        }
    }

    /// Verifier that only knows about guests
    pub fn guest_only() -> Self {
        Self { external: None }
    }

    /// Verify `token` for `provider`.
    ///
    /// Guests always succeed with a fresh random subject, so every guest login
    /// is a new account.
    pub async fn verify(
        &self,
        provider: &str,
        token: Option<&str>,
    ) -> Result<VerifiedIdentity, VerifyFailure> {
        if provider == GUEST_PROVIDER {
            return Ok(VerifiedIdentity {
                subject: format!("guest:{}", Uuid::new_v4().simple()),
                display_name: Some(GUEST_DISPLAY_NAME.to_string()),
                email: None,
            });
        }

        let token = token.map(str::trim).unwrap_or_default();
        if token.is_empty() {
            return Err(VerifyFailure::MissingToken);
        }

        match &self.external {
            Some(external) => external.verify(provider, token).await,
            None => Err(VerifyFailure::Unavailable(
                "no verification endpoint configured".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedVerifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExternalVerifier for FixedVerifier {
        async fn verify(
            &self,
            provider: &str,
            id_token: &str,
        ) -> Result<VerifiedIdentity, VerifyFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if id_token == "good" {
                Ok(VerifiedIdentity {
                    subject: format!("{}-user", provider),
                    display_name: Some("Alice".to_string()),
                    email: None,
                })
            } else {
                Err(VerifyFailure::Rejected("bad token".to_string()))
            }
        }
    }

    fn verifier() -> (IdentityVerifier, Arc<FixedVerifier>) {
        let external = Arc::new(FixedVerifier {
            calls: AtomicUsize::new(0),
        });
        (IdentityVerifier::new(external.clone()), external)
    }

    #[tokio::test]
    async fn test_guest_needs_no_token() {
        let (verifier, external) = verifier();

        let a = verifier.verify("guest", None).await.unwrap();
        let b = verifier.verify("guest", Some("ignored")).await.unwrap();

        assert!(a.subject.starts_with("guest:"));
        assert_eq!(a.subject.len(), "guest:".len() + 32);
        assert_ne!(a.subject, b.subject);
        assert_eq!(a.display_name.as_deref(), Some("Guest"));
        assert_eq!(external.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_token_short_circuits() {
        let (verifier, external) = verifier();

        assert_eq!(
            verifier.verify("demo", None).await,
            Err(VerifyFailure::MissingToken)
        );
        assert_eq!(
            verifier.verify("demo", Some("   ")).await,
            Err(VerifyFailure::MissingToken)
        );
        assert_eq!(external.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delegates_to_external() {
        let (verifier, external) = verifier();

        let identity = verifier.verify("demo", Some("good")).await.unwrap();
        assert_eq!(identity.subject, "demo-user");

        assert!(matches!(
            verifier.verify("demo", Some("bad")).await,
            Err(VerifyFailure::Rejected(_))
        ));
        assert_eq!(external.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_guest_only_verifier() {
        let verifier = IdentityVerifier::guest_only();

        assert!(verifier.verify("guest", None).await.is_ok());
        assert!(matches!(
            verifier.verify("demo", Some("token")).await,
            Err(VerifyFailure::Unavailable(_))
        ));
    }

    #[test]
    fn test_failure_mapping() {
        assert!(matches!(
            AuthError::from(VerifyFailure::MissingToken),
            AuthError::InvalidInput(_)
        ));
        assert!(matches!(
            AuthError::from(VerifyFailure::Rejected("x".into())),
            AuthError::Unauthorized(_)
        ));
        assert!(matches!(
            AuthError::from(VerifyFailure::Unavailable("timeout".into())),
            AuthError::Upstream(_)
        ));
    }
}
