/// Refresh token ledger
///
/// Secrets are 256 random bits handed to the client once; the database only
/// ever sees their SHA-256. A secret is redeemable iff its newest record is
/// unused, unrevoked and unexpired, and redemption flips `used_at` in a single
/// conditional UPDATE, so two concurrent redemptions of one secret cannot both
/// succeed. Records are never deleted.
use crate::{
    db::account::{AccountId, RefreshTokenRecord},
    error::{AuthError, AuthResult, RejectReason},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::{Sqlite, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

const SECRET_BYTES: usize = 32;

const RECORD_COLUMNS: &str = "id, account_id, token_hash, device_id, family_id, parent_id, created_at, expires_at, used_at, revoked_at";

/// SHA-256 of the secret's UTF-8 bytes
pub fn hash_secret(secret: &str) -> Vec<u8> {
    Sha256::digest(secret.as_bytes()).to_vec()
}

/// Short hash prefix for log lines
fn fingerprint(hash: &[u8]) -> String {
    hex::encode(&hash[..hash.len().min(4)])
}

/// A newly minted secret and its stored record
#[derive(Debug, Clone)]
pub struct MintedToken {
    /// Plaintext secret. Not recoverable once dropped.
    pub secret: String,
    pub record: RefreshTokenRecord,
}

/// Result of a successful redemption
#[derive(Debug, Clone)]
pub struct Redemption {
    pub account_id: AccountId,
    /// The record that was just consumed
    pub redeemed: RefreshTokenRecord,
    /// Its replacement
    pub replacement: MintedToken,
}

/// Refresh token ledger
#[derive(Clone)]
pub struct RefreshLedger {
    db: SqlitePool,
    ttl: Duration,
    revoke_lineage_on_reuse: bool,
}

impl RefreshLedger {
    /// Create a ledger whose tokens live for `ttl`
    pub fn new(db: SqlitePool, ttl: Duration) -> Self {
        Self {
            db,
            ttl,
            revoke_lineage_on_reuse: false,
        }
    }

    /// Revoke the whole lineage when an already-used secret is presented
    pub fn with_lineage_revocation(mut self, enabled: bool) -> Self {
        self.revoke_lineage_on_reuse = enabled;
        self
    }

    fn generate_secret() -> String {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Mint a secret for a new login. Starts a new lineage.
    pub async fn mint(
        &self,
        account_id: AccountId,
        device_id: Option<&str>,
    ) -> AuthResult<MintedToken> {
        let family_id = Uuid::new_v4().to_string();
        let minted = self
            .insert(&self.db, account_id, device_id, &family_id, None, Utc::now())
            .await?;

        info!(
            "minted refresh token {} for account {}",
            fingerprint(&minted.record.token_hash),
            account_id
        );

        Ok(minted)
    }

    async fn insert<'c, E>(
        &self,
        executor: E,
        account_id: AccountId,
        device_id: Option<&str>,
        family_id: &str,
        parent_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> AuthResult<MintedToken>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        let secret = Self::generate_secret();
        let token_hash = hash_secret(&secret);
        let expires_at = now.checked_add_signed(self.ttl).ok_or_else(|| {
            AuthError::Internal("refresh token lifetime out of range".to_string())
        })?;

        let record = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            "INSERT INTO refresh_token (account_id, token_hash, device_id, family_id, parent_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             RETURNING {}",
            RECORD_COLUMNS
        ))
        .bind(account_id)
        .bind(&token_hash)
        .bind(device_id)
        .bind(family_id)
        .bind(parent_id)
        .bind(now)
        .bind(expires_at)
        .fetch_one(executor)
        .await?;

        Ok(MintedToken { secret, record })
    }

    /// Newest record whose hash matches `secret`
    pub async fn lookup(&self, secret: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            "SELECT {} FROM refresh_token WHERE token_hash = ?1 ORDER BY id DESC LIMIT 1",
            RECORD_COLUMNS
        ))
        .bind(hash_secret(secret))
        .fetch_optional(&self.db)
        .await?;

        Ok(record)
    }

    fn classify(record: &RefreshTokenRecord, now: DateTime<Utc>) -> Option<RejectReason> {
        if record.revoked_at.is_some() {
            Some(RejectReason::Revoked)
        } else if record.used_at.is_some() {
            Some(RejectReason::AlreadyUsed)
        } else if now >= record.expires_at {
            Some(RejectReason::Expired)
        } else {
            None
        }
    }

    /// Exchange a secret for its replacement.
    ///
    /// On success the presented record is stamped used and a new record in
    /// the same lineage is inserted, in one transaction. On failure the
    /// specific reason is returned as `AuthError::Refresh`.
    pub async fn redeem(&self, secret: &str) -> AuthResult<Redemption> {
        let now = Utc::now();
        let Some(record) = self.lookup(secret).await? else {
            return Err(self.reject(None, RejectReason::NotFound).await);
        };

        if let Some(reason) = Self::classify(&record, now) {
            return Err(self.reject(Some(&record), reason).await);
        }

        let mut tx = self.db.begin().await?;

        let stamped = sqlx::query(
            "UPDATE refresh_token SET used_at = ?1
             WHERE id = ?2 AND used_at IS NULL AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(record.id)
        .execute(&mut *tx)
        .await?;

        if stamped.rows_affected() != 1 {
            // Lost a race with another redemption or a revoke
            tx.rollback().await?;
            let reason = match self.lookup(secret).await? {
                Some(current) => Self::classify(&current, now).unwrap_or(RejectReason::AlreadyUsed),
                None => RejectReason::NotFound,
            };
            return Err(self.reject(Some(&record), reason).await);
        }

        let replacement = self
            .insert(
                &mut *tx,
                record.account_id,
                record.device_id.as_deref(),
                &record.family_id,
                Some(record.id),
                now,
            )
            .await?;

        tx.commit().await?;

        info!(
            "rotated refresh token {} -> {} for account {}",
            fingerprint(&record.token_hash),
            fingerprint(&replacement.record.token_hash),
            record.account_id
        );

        let mut redeemed = record;
        redeemed.used_at = Some(now);

        Ok(Redemption {
            account_id: redeemed.account_id,
            redeemed,
            replacement,
        })
    }

    /// Log the rejection, apply reuse handling, and build the error
    async fn reject(&self, record: Option<&RefreshTokenRecord>, reason: RejectReason) -> AuthError {
        match record {
            Some(record) => warn!(
                "refresh token {} for account {} rejected: {}",
                fingerprint(&record.token_hash),
                record.account_id,
                reason
            ),
            None => warn!("refresh token rejected: {}", reason),
        }

        if reason == RejectReason::AlreadyUsed && self.revoke_lineage_on_reuse {
            if let Some(record) = record {
                match self.revoke_family(&record.family_id).await {
                    Ok(count) => warn!(
                        "refresh token reuse detected, revoked {} token(s) in lineage {}",
                        count, record.family_id
                    ),
                    Err(e) => warn!("failed to revoke lineage {}: {}", record.family_id, e),
                }
            }
        }

        AuthError::Refresh(reason)
    }

    /// Revoke a secret. Unknown or already revoked secrets are not an error.
    pub async fn revoke(&self, secret: &str) -> AuthResult<()> {
        let token_hash = hash_secret(secret);
        let result = sqlx::query(
            "UPDATE refresh_token SET revoked_at = ?1 WHERE token_hash = ?2 AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(&token_hash)
        .execute(&self.db)
        .await?;

        debug!(
            "revoke {} touched {} record(s)",
            fingerprint(&token_hash),
            result.rows_affected()
        );

        Ok(())
    }

    /// Revoke every live record in a lineage
    pub async fn revoke_family(&self, family_id: &str) -> AuthResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_token SET revoked_at = ?1 WHERE family_id = ?2 AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(family_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    /// Revoke every live record belonging to an account
    pub async fn revoke_all_for_account(&self, account_id: AccountId) -> AuthResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_token SET revoked_at = ?1 WHERE account_id = ?2 AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(account_id)
        .execute(&self.db)
        .await?;

        info!(
            "revoked {} refresh token(s) for account {}",
            result.rows_affected(),
            account_id
        );

        Ok(result.rows_affected())
    }

    /// Number of stored records for an account, any state
    pub async fn count_for_account(&self, account_id: AccountId) -> AuthResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM refresh_token WHERE account_id = ?1")
            .bind(account_id)
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountDirectory;
    use crate::db::memory_pool;

    async fn setup(ttl: Duration) -> (RefreshLedger, AccountId) {
        let pool = memory_pool().await;
        let account = AccountDirectory::new(pool.clone())
            .resolve("demo", "sub-1", Some("Alice"), None)
            .await
            .unwrap();
        (RefreshLedger::new(pool, ttl), account.id)
    }

    #[tokio::test]
    async fn test_mint_with_unrepresentable_ttl_fails_cleanly() {
        let (ledger, account_id) = setup(Duration::days(200_000_000)).await;

        assert!(matches!(
            ledger.mint(account_id, None).await,
            Err(AuthError::Internal(_))
        ));
        assert_eq!(ledger.count_for_account(account_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mint_stores_only_hash() {
        let (ledger, account_id) = setup(Duration::days(30)).await;

        let minted = ledger.mint(account_id, Some("device-1")).await.unwrap();

        assert_eq!(minted.record.token_hash, hash_secret(&minted.secret));
        assert_eq!(minted.record.token_hash.len(), 32);
        assert_ne!(minted.record.token_hash, minted.secret.as_bytes());
        assert_eq!(minted.record.device_id.as_deref(), Some("device-1"));
        assert!(minted.record.is_redeemable(Utc::now()));
        // 32 bytes, base64url without padding
        assert_eq!(minted.secret.len(), 43);

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM refresh_token WHERE token_hash = ?1")
            .bind(minted.secret.as_bytes())
            .fetch_one(&ledger.db)
            .await
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn test_secrets_are_unique() {
        let (ledger, account_id) = setup(Duration::days(30)).await;

        let a = ledger.mint(account_id, None).await.unwrap();
        let b = ledger.mint(account_id, None).await.unwrap();

        assert_ne!(a.secret, b.secret);
        assert_ne!(a.record.family_id, b.record.family_id);
    }

    #[tokio::test]
    async fn test_redeem_rotates_once() {
        let (ledger, account_id) = setup(Duration::days(30)).await;
        let minted = ledger.mint(account_id, Some("device-1")).await.unwrap();

        let redemption = ledger.redeem(&minted.secret).await.unwrap();
        assert_eq!(redemption.account_id, account_id);
        assert_ne!(redemption.replacement.secret, minted.secret);
        assert_eq!(redemption.replacement.record.family_id, minted.record.family_id);
        assert_eq!(redemption.replacement.record.parent_id, Some(minted.record.id));
        assert_eq!(redemption.replacement.record.device_id.as_deref(), Some("device-1"));

        let second = ledger.redeem(&minted.secret).await;
        assert!(matches!(second, Err(AuthError::Refresh(RejectReason::AlreadyUsed))));

        // The replacement is good exactly once too
        assert!(ledger.redeem(&redemption.replacement.secret).await.is_ok());
        assert!(ledger.redeem(&redemption.replacement.secret).await.is_err());

        assert_eq!(ledger.count_for_account(account_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_redeem_unknown_secret() {
        let (ledger, _) = setup(Duration::days(30)).await;

        assert!(matches!(
            ledger.redeem("never-issued").await,
            Err(AuthError::Refresh(RejectReason::NotFound))
        ));
    }

    #[tokio::test]
    async fn test_redeem_expired_never_used() {
        let (ledger, account_id) = setup(Duration::zero()).await;
        let minted = ledger.mint(account_id, None).await.unwrap();

        assert!(matches!(
            ledger.redeem(&minted.secret).await,
            Err(AuthError::Refresh(RejectReason::Expired))
        ));

        let record = ledger.lookup(&minted.secret).await.unwrap().unwrap();
        assert!(record.used_at.is_none());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (ledger, account_id) = setup(Duration::days(30)).await;
        let minted = ledger.mint(account_id, None).await.unwrap();

        ledger.revoke(&minted.secret).await.unwrap();
        let first_revoked_at = ledger.lookup(&minted.secret).await.unwrap().unwrap().revoked_at;
        ledger.revoke(&minted.secret).await.unwrap();
        ledger.revoke("unknown-secret").await.unwrap();

        let record = ledger.lookup(&minted.secret).await.unwrap().unwrap();
        assert_eq!(record.revoked_at, first_revoked_at);
        assert!(matches!(
            ledger.redeem(&minted.secret).await,
            Err(AuthError::Refresh(RejectReason::Revoked))
        ));
    }

    #[tokio::test]
    async fn test_revoke_after_use_reports_revoked() {
        let (ledger, account_id) = setup(Duration::days(30)).await;
        let minted = ledger.mint(account_id, None).await.unwrap();

        ledger.redeem(&minted.secret).await.unwrap();
        ledger.revoke(&minted.secret).await.unwrap();

        assert!(matches!(
            ledger.redeem(&minted.secret).await,
            Err(AuthError::Refresh(RejectReason::Revoked))
        ));
    }

    #[tokio::test]
    async fn test_reuse_keeps_lineage_by_default() {
        let (ledger, account_id) = setup(Duration::days(30)).await;
        let minted = ledger.mint(account_id, None).await.unwrap();
        let redemption = ledger.redeem(&minted.secret).await.unwrap();

        assert!(ledger.redeem(&minted.secret).await.is_err());
        assert!(ledger.redeem(&redemption.replacement.secret).await.is_ok());
    }

    #[tokio::test]
    async fn test_reuse_revokes_lineage_when_enabled() {
        let (ledger, account_id) = setup(Duration::days(30)).await;
        let ledger = ledger.with_lineage_revocation(true);
        let minted = ledger.mint(account_id, None).await.unwrap();
        let other_login = ledger.mint(account_id, None).await.unwrap();
        let redemption = ledger.redeem(&minted.secret).await.unwrap();

        assert!(matches!(
            ledger.redeem(&minted.secret).await,
            Err(AuthError::Refresh(RejectReason::AlreadyUsed))
        ));
        assert!(matches!(
            ledger.redeem(&redemption.replacement.secret).await,
            Err(AuthError::Refresh(RejectReason::Revoked))
        ));
        // Other lineages are untouched
        assert!(ledger.redeem(&other_login.secret).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_all_for_account() {
        let (ledger, account_id) = setup(Duration::days(30)).await;
        let a = ledger.mint(account_id, None).await.unwrap();
        let b = ledger.mint(account_id, Some("tablet")).await.unwrap();

        assert_eq!(ledger.revoke_all_for_account(account_id).await.unwrap(), 2);
        assert!(ledger.redeem(&a.secret).await.is_err());
        assert!(ledger.redeem(&b.secret).await.is_err());
    }
}
