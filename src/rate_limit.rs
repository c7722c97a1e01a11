/// Rate limiting for the gateway's credential endpoints
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{AuthError, AuthResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

const DEFAULT_RPS: NonZeroU32 = match NonZeroU32::new(50) {
    Some(n) => n,
    None => unreachable!(),
};

const DEFAULT_BURST: NonZeroU32 = match NonZeroU32::new(100) {
    Some(n) => n,
    None => unreachable!(),
};

/// Process-wide limiter shared by every credential request
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Option<Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self { limiter: None };
        }

        let quota = Quota::per_second(NonZeroU32::new(config.requests_per_second).unwrap_or(DEFAULT_RPS))
            .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(DEFAULT_BURST));

        Self {
            limiter: Some(Arc::new(GovernorLimiter::direct(quota))),
        }
    }

    /// Take one cell from the bucket
    pub fn check(&self) -> AuthResult<()> {
        match &self.limiter {
            Some(limiter) => limiter.check().map_err(|_| AuthError::RateLimited),
            None => Ok(()),
        }
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if let Err(e) = ctx.rate_limiter.check() {
        tracing::warn!("rate limit hit on {}", request.uri().path());
        return Err(e);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_limit() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests_per_second: 1,
            burst_size: 5,
        });

        for _ in 0..5 {
            assert!(limiter.check().is_ok());
        }
        assert!(matches!(limiter.check(), Err(AuthError::RateLimited)));
    }

    #[test]
    fn test_disabled_limiter_always_allows() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: false,
            requests_per_second: 1,
            burst_size: 1,
        });

        for _ in 0..100 {
            assert!(limiter.check().is_ok());
        }
    }
}
