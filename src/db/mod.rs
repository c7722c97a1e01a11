/// Database layer for Tollgate
///
/// Manages the shared SQLite connection pool and the embedded migrations
/// for the account and refresh token tables.

pub mod account;

use crate::error::{AuthError, AuthResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool from a connection string
pub async fn create_pool(url: &str, options: DatabaseOptions) -> AuthResult<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str(url)
        .map_err(|e| AuthError::Config(format!("Invalid database URL {}: {}", url, e)))?;

    // Ensure parent directory exists for file-backed databases
    let filename = connect_options.get_filename().to_path_buf();
    if filename.as_os_str() != ":memory:" {
        if let Some(parent) = filename.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            connect_options
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    SqliteJournalMode::Wal
                } else {
                    SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Run migrations for a database
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> AuthResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> AuthResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    // A single connection so every query sees the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let pool = memory_pool().await;

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('account', 'refresh_token') ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(tables, vec!["account".to_string(), "refresh_token".to_string()]);
    }

    #[tokio::test]
    async fn test_create_pool_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("nested/auth.sqlite").display());

        let pool = create_pool(&url, DatabaseOptions::default()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        test_connection(&pool).await.unwrap();
    }
}
