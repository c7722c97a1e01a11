/// Account and refresh token database models
use crate::account::DEFAULT_DISPLAY_NAME;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Internal account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// Account record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub provider: String,
    pub provider_sub: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    /// Reserved for ban/suspend states; read but not enforced here
    pub status: u8,
}

/// Refresh token record. Only the hash of the secret is ever stored.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub account_id: AccountId,
    pub token_hash: Vec<u8>,
    pub device_id: Option<String>,
    /// Shared by every record rotated from the same login
    pub family_id: String,
    /// Record this one replaced
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Display name for client responses, never empty
    pub fn display_name_or_default(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME)
    }
}

impl RefreshTokenRecord {
    /// Whether this record can be exchanged at `now`
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.revoked_at.is_none() && now < self.expires_at
    }
}
