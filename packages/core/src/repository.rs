//! SQLite-backed record store.
//!
//! Position records land in `position_records` with their mapped fields as
//! a JSON column; image records land in `image_records` with the artifact
//! bytes as a BLOB. Each `save` is one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::sources::{CanonicalRecord, ImageArtifact, RecordBody, RecordKind, StoreError};
use crate::store::RecordStore;

/// A persisted position row.
#[derive(Debug, Clone)]
pub struct StoredPosition {
    pub id: i64,
    pub identity_key: Option<String>,
    pub site_id: String,
    pub fields: serde_json::Value,
    pub collected_at: String,
}

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_positions(&self, records: &[CanonicalRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let fields = match &record.body {
                RecordBody::Fields(fields) => serde_json::to_string(fields)?,
                RecordBody::Image(_) => {
                    tracing::warn!("Skipping image body in a position batch ({})", record.site_id);
                    continue;
                }
            };

            sqlx::query(
                "INSERT INTO position_records (identity_key, site_id, fields, collected_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&record.identity_key)
            .bind(&record.site_id)
            .bind(&fields)
            .bind(record.collected_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_images(&self, records: &[CanonicalRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let artifact: &ImageArtifact = match &record.body {
                RecordBody::Image(artifact) => artifact,
                RecordBody::Fields(_) => {
                    tracing::warn!("Skipping field body in an image batch ({})", record.site_id);
                    continue;
                }
            };

            sqlx::query(
                "INSERT INTO image_records
                 (site_id, file_name, content_type, tags, data, collected_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.site_id)
            .bind(artifact.file_name())
            .bind(&artifact.content_type)
            .bind(serde_json::to_string(&artifact.tags)?)
            .bind(&artifact.data)
            .bind(record.collected_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Position rows collected at or after `since`, oldest first.
    pub async fn positions_since(&self, since: DateTime<Utc>) -> Result<Vec<StoredPosition>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, identity_key, site_id, fields, collected_at
             FROM position_records
             WHERE collected_at >= ?
             ORDER BY id ASC",
        )
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<StoredPosition, StoreError> {
                let fields: String = row.try_get("fields")?;
                Ok(StoredPosition {
                    id: row.try_get("id")?,
                    identity_key: row.try_get("identity_key")?,
                    site_id: row.try_get("site_id")?,
                    fields: serde_json::from_str(&fields)?,
                    collected_at: row.try_get("collected_at")?,
                })
            })
            .collect()
    }

    /// Most recent image bytes stored for `site_id`.
    pub async fn latest_image(&self, site_id: &str) -> Result<Option<ImageArtifact>, StoreError> {
        let row = sqlx::query(
            "SELECT site_id, content_type, tags, data
             FROM image_records
             WHERE site_id = ?
             ORDER BY id DESC
             LIMIT 1",
        )
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tags: String = row.try_get("tags")?;
        Ok(Some(ImageArtifact {
            site_id: row.try_get("site_id")?,
            content_type: row.try_get("content_type")?,
            tags: serde_json::from_str(&tags)?,
            data: row.try_get("data")?,
        }))
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn save(&self, kind: RecordKind, records: Vec<CanonicalRecord>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        match kind {
            RecordKind::Position => self.insert_positions(&records).await,
            RecordKind::Image => self.insert_images(&records).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::{json, Map};
    use std::collections::HashMap;

    use crate::db::create_pool;

    async fn make_store() -> SqliteRecordStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        SqliteRecordStore::new(pool)
    }

    fn position(key: &str, seconds_ago: i64) -> CanonicalRecord {
        let mut fields = Map::new();
        fields.insert("fcode".into(), json!(key));
        fields.insert("site_id".into(), json!("SYD"));
        CanonicalRecord {
            identity_key: Some(key.to_string()),
            site_id: "SYD".into(),
            collected_at: Utc::now() - Duration::seconds(seconds_ago),
            body: RecordBody::Fields(fields),
        }
    }

    fn image(site: &str, data: &[u8]) -> CanonicalRecord {
        let mut tags = HashMap::new();
        tags.insert("weather".to_string(), "radar".to_string());
        CanonicalRecord {
            identity_key: None,
            site_id: site.into(),
            collected_at: Utc::now(),
            body: RecordBody::Image(ImageArtifact {
                site_id: site.into(),
                content_type: "image/png".into(),
                tags,
                data: data.to_vec(),
            }),
        }
    }

    #[tokio::test]
    async fn positions_are_saved_and_fetched_in_order() {
        let store = make_store().await;
        store
            .save(
                RecordKind::Position,
                vec![position("QF1", 30), position("VA2", 20)],
            )
            .await
            .unwrap();

        let rows = store
            .positions_since(Utc::now() - Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].identity_key.as_deref(), Some("QF1"));
        assert_eq!(rows[1].fields["fcode"], json!("VA2"));
        assert_eq!(rows[1].site_id, "SYD");
    }

    #[tokio::test]
    async fn empty_batch_is_ok() {
        let store = make_store().await;
        assert!(store.save(RecordKind::Position, vec![]).await.is_ok());
    }

    #[tokio::test]
    async fn latest_image_returns_newest_bytes() {
        let store = make_store().await;
        store
            .save(RecordKind::Image, vec![image("SYD", b"old")])
            .await
            .unwrap();
        store
            .save(RecordKind::Image, vec![image("SYD", b"new")])
            .await
            .unwrap();

        let latest = store.latest_image("SYD").await.unwrap().unwrap();
        assert_eq!(latest.data, b"new");
        assert_eq!(latest.tags.get("weather").map(String::as_str), Some("radar"));
        assert!(store.latest_image("MEL").await.unwrap().is_none());
    }
}
