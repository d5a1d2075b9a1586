//! SQLite pool creation and schema setup.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS position_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        identity_key TEXT,
        site_id TEXT NOT NULL,
        fields TEXT NOT NULL,
        collected_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_position_records_collected_at
        ON position_records (collected_at)",
    "CREATE TABLE IF NOT EXISTS image_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        site_id TEXT NOT NULL,
        file_name TEXT NOT NULL,
        content_type TEXT NOT NULL,
        tags TEXT NOT NULL,
        data BLOB NOT NULL,
        collected_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_image_records_site
        ON image_records (site_id, collected_at)",
];

/// Open a pool for `database_url` and make sure the schema exists.
///
/// In-memory databases live only as long as their connection, so they get
/// a single connection that is never recycled.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?
    };

    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn schema_is_created_in_memory() {
        let pool = create_pool("sqlite::memory:").await.unwrap();

        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE '%_records' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let names: Vec<String> = rows.iter().map(|r| r.get("name")).collect();
        assert_eq!(names, vec!["image_records", "position_records"]);
    }

    #[tokio::test]
    async fn create_pool_is_idempotent_on_schema() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }
    }
}
