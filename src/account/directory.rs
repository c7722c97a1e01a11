/// Account directory backed by the `account` table
use crate::{
    account::{MAX_DISPLAY_NAME_LEN, MAX_EMAIL_LEN, MAX_PROVIDER_LEN, MAX_SUBJECT_LEN},
    db::account::{Account, AccountId},
    error::{AuthError, AuthResult},
};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

const ACCOUNT_COLUMNS: &str =
    "id, provider, provider_sub, display_name, email, created_at, last_login, status";

/// Account directory service
#[derive(Clone)]
pub struct AccountDirectory {
    db: SqlitePool,
}

impl AccountDirectory {
    /// Create a new account directory
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Resolve a verified identity to its account, creating it on first sight.
    ///
    /// A single upsert statement: concurrent first logins for the same
    /// (provider, subject) end up with one row and the same id. Empty or
    /// whitespace-only name/email never overwrite stored values. `last_login`
    /// is bumped on every call.
    pub async fn resolve(
        &self,
        provider: &str,
        subject: &str,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> AuthResult<Account> {
        let provider = provider.trim();
        let subject = subject.trim();
        Self::validate_key(provider, subject)?;

        let display_name = non_empty(display_name, MAX_DISPLAY_NAME_LEN);
        let email = non_empty(email, MAX_EMAIL_LEN);
        let now = Utc::now();

        let account = sqlx::query_as::<_, Account>(&format!(
            "INSERT INTO account (provider, provider_sub, display_name, email, created_at, last_login, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, 0)
             ON CONFLICT(provider, provider_sub) DO UPDATE SET
                 display_name = COALESCE(excluded.display_name, account.display_name),
                 email = COALESCE(excluded.email, account.email),
                 last_login = excluded.last_login
             RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(provider)
        .bind(subject)
        .bind(&display_name)
        .bind(&email)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        debug!(
            "resolved {}:{} to account {}",
            provider, subject, account.id
        );

        Ok(account)
    }

    /// Get account by internal id
    pub async fn fetch(&self, id: AccountId) -> AuthResult<Account> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM account WHERE id = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AuthError::NotFound(format!("Account {} not found", id)))
    }

    /// Look up an account by its natural key without touching it
    pub async fn find_by_provider(
        &self,
        provider: &str,
        subject: &str,
    ) -> AuthResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM account WHERE provider = ?1 AND provider_sub = ?2",
            ACCOUNT_COLUMNS
        ))
        .bind(provider.trim())
        .bind(subject.trim())
        .fetch_optional(&self.db)
        .await?;

        Ok(account)
    }

    /// Number of accounts
    pub async fn count(&self) -> AuthResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account")
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    fn validate_key(provider: &str, subject: &str) -> AuthResult<()> {
        if provider.is_empty() || provider.len() > MAX_PROVIDER_LEN {
            return Err(AuthError::InvalidInput(format!(
                "Provider must be 1-{} characters",
                MAX_PROVIDER_LEN
            )));
        }

        if subject.is_empty() || subject.len() > MAX_SUBJECT_LEN {
            return Err(AuthError::InvalidInput(format!(
                "Provider subject must be 1-{} characters",
                MAX_SUBJECT_LEN
            )));
        }

        Ok(())
    }
}

/// Trim, drop empty values and cap the length in characters
fn non_empty(value: Option<&str>, max_chars: usize) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.chars().take(max_chars).collect())
}
