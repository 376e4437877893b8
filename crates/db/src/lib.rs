//! SQLite connection pool and migration ledger for Shelf.
//!
//! A single [`Database`] is created at startup, handed to the modules that
//! need it, and closed on shutdown. Tests build an isolated in-memory instance
//! with [`Database::in_memory`].

use std::{str::FromStr, time::Duration};

use serde::Deserialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use thiserror::Error;

const IN_MEMORY_URL: &str = "sqlite::memory:";

/// Connection settings for the relational store.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "DatabaseSettings::default_url")]
    pub url: String,
    #[serde(default = "DatabaseSettings::default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "DatabaseSettings::default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

impl DatabaseSettings {
    fn default_url() -> String {
        "sqlite://shelf.db".to_string()
    }

    fn default_max_connections() -> u32 {
        5
    }

    fn default_acquire_timeout_ms() -> u64 {
        5000
    }

    /// Settings for a private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            url: IN_MEMORY_URL.to_string(),
            ..Self::default()
        }
    }

    fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:")
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            max_connections: Self::default_max_connections(),
            acquire_timeout_ms: Self::default_acquire_timeout_ms(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("invalid database url '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to connect to database at '{url}'")]
    Connect {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("migration {module}/{id} failed")]
    Migration {
        module: String,
        id: String,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Shared handle to the relational store.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open a pool against `settings.url`, creating the database file when missing.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(&settings.url)
            .map_err(|source| DbError::InvalidUrl {
                url: settings.url.clone(),
                source,
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_millis(settings.acquire_timeout_ms));

        // Every in-memory connection is its own database, so pin exactly one
        // connection and never let it expire.
        pool_options = if settings.is_in_memory() {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(settings.max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|source| DbError::Connect {
                url: settings.url.clone(),
                source,
            })?;

        tracing::info!(target: "shelf-db", url = %settings.url, "database pool ready");

        Ok(Self { pool })
    }

    /// Private in-memory database, one per call.
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::connect(&DatabaseSettings::in_memory()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply one migration unless the ledger already records it.
    ///
    /// Returns `true` when the migration ran. The script and its ledger entry
    /// commit in the same transaction.
    pub async fn apply_migration(
        &self,
        module: &str,
        id: &str,
        up: &str,
    ) -> Result<bool, DbError> {
        self.ensure_ledger().await?;

        let wrap = |source| DbError::Migration {
            module: module.to_string(),
            id: id.to_string(),
            source,
        };

        let mut tx = self.pool.begin().await.map_err(wrap)?;

        let applied = sqlx::query("SELECT 1 FROM schema_migrations WHERE module = ? AND id = ?")
            .bind(module)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(wrap)?;

        if applied.is_some() {
            tracing::debug!(target: "shelf-db", module, id, "migration already applied");
            return Ok(false);
        }

        sqlx::raw_sql(up).execute(&mut *tx).await.map_err(wrap)?;

        sqlx::query("INSERT INTO schema_migrations (module, id) VALUES (?, ?)")
            .bind(module)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(wrap)?;

        tx.commit().await.map_err(wrap)?;

        tracing::info!(target: "shelf-db", module, id, "migration applied");
        Ok(true)
    }

    /// Drain and close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!(target: "shelf-db", "database pool closed");
    }

    async fn ensure_ledger(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                module TEXT NOT NULL,
                id TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (module, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    const CREATE_WIDGETS: &str = "CREATE TABLE widgets (name TEXT NOT NULL UNIQUE);";

    #[test]
    fn default_url_points_at_local_file() {
        let settings = DatabaseSettings::default();
        assert_eq!(settings.url, "sqlite://shelf.db");
        assert!(!settings.is_in_memory());
    }

    #[tokio::test]
    async fn in_memory_databases_are_isolated() {
        let first = Database::in_memory().await.unwrap();
        let second = Database::in_memory().await.unwrap();

        first
            .apply_migration("widgets", "001_init", CREATE_WIDGETS)
            .await
            .unwrap();

        let exists = sqlx::query("SELECT name FROM sqlite_master WHERE name = 'widgets'")
            .fetch_optional(second.pool())
            .await
            .unwrap();
        assert!(exists.is_none());
    }

    #[tokio::test]
    async fn migrations_apply_once() {
        let db = Database::in_memory().await.unwrap();

        assert!(db
            .apply_migration("widgets", "001_init", CREATE_WIDGETS)
            .await
            .unwrap());
        assert!(!db
            .apply_migration("widgets", "001_init", CREATE_WIDGETS)
            .await
            .unwrap());

        let row = sqlx::query("SELECT COUNT(*) AS count FROM schema_migrations")
            .fetch_one(db.pool())
            .await
            .unwrap();
        let count: i64 = row.get("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn failed_migration_is_not_recorded() {
        let db = Database::in_memory().await.unwrap();

        let err = db
            .apply_migration("widgets", "002_broken", "CREATE TABLE (;")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Migration { ref id, .. } if id == "002_broken"));

        let row = sqlx::query("SELECT COUNT(*) AS count FROM schema_migrations")
            .fetch_one(db.pool())
            .await
            .unwrap();
        let count: i64 = row.get("count");
        assert_eq!(count, 0);
    }
}
