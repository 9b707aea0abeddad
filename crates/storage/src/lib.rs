use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::{fs, path::PathBuf, str::FromStr};

/// Durable client-local key/value storage backed by sqlite.
#[derive(Clone)]
pub struct LocalStore {
    pool: Pool<Sqlite>,
}

impl LocalStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let location = DatabaseLocation::of(database_url);
        location.prepare(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true);

        // Every connection to `:memory:` is a separate database.
        let pool_options = if location == DatabaseLocation::Memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;

        let store = Self { pool };
        store.ensure_kv_table().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_kv_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_kv (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure local_kv table exists")?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM local_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read local key '{key}'"))?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_kv (key, value, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write local key '{key}'"))?;
        Ok(())
    }

    /// Writes all pairs in one transaction; either every key lands or none does.
    pub async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in entries {
            sqlx::query(
                r#"
                INSERT INTO local_kv (key, value, updated_at)
                VALUES (?, ?, CURRENT_TIMESTAMP)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to write local key '{key}'"))?;
        }
        tx.commit().await.context("failed to commit local writes")?;
        Ok(())
    }

    /// Returns the number of rows removed.
    pub async fn remove_many(&self, keys: &[&str]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for key in keys {
            removed += sqlx::query("DELETE FROM local_kv WHERE key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to delete local key '{key}'"))?
                .rows_affected();
        }
        tx.commit().await.context("failed to commit local deletes")?;
        Ok(removed)
    }
}

/// Where a sqlite url points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// Private to a single connection.
    Memory,
    File(PathBuf),
    /// Not a sqlite file url; left for sqlx to interpret.
    Other,
}

impl DatabaseLocation {
    pub fn of(database_url: &str) -> Self {
        let Some(rest) = database_url.strip_prefix("sqlite:") else {
            return Self::Other;
        };
        let rest = rest.strip_prefix("//").unwrap_or(rest);
        let path = rest.split_once('?').map_or(rest, |(path, _)| path);
        match path {
            "" => Self::Other,
            ":memory:" => Self::Memory,
            path => Self::File(PathBuf::from(path)),
        }
    }

    /// Creates the directory a file database will live in.
    fn prepare(&self, database_url: &str) -> Result<()> {
        let Self::File(path) = self else {
            return Ok(());
        };
        match path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            Some(dir) => fs::create_dir_all(dir).with_context(|| {
                format!(
                    "failed to create '{}' for database url '{database_url}'",
                    dir.display()
                )
            }),
            None => Ok(()),
        }
    }
}

/// Turns a configured database value into a sqlite url.
///
/// Blank input yields `fallback`; bare paths get a `sqlite://` scheme with
/// forward slashes; anything already carrying a scheme is kept.
pub fn normalize_database_url(raw: &str, fallback: &str) -> String {
    match raw.trim() {
        "" => fallback.to_string(),
        url if url.starts_with("sqlite:") || url.contains("://") => url.to_string(),
        path => format!("sqlite://{}", path.replace('\\', "/")),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
