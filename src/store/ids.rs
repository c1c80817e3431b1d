use crate::core::error::Result;
use crate::harvest::IdSource;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::debug;

/// Card ids from the `cards` table, optionally restricted to cards without
/// a recent row in `ebay_prices`.
pub struct SqliteIdSource {
    pool: SqlitePool,
    freshness: Option<Duration>,
}

impl SqliteIdSource {
    /// `freshness` of `None` walks every id.
    pub fn new(pool: SqlitePool, freshness: Option<Duration>) -> Self {
        Self { pool, freshness }
    }
}

#[async_trait]
impl IdSource for SqliteIdSource {
    async fn next_batch(&self, after: Option<&str>, limit: usize) -> Result<Vec<String>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let ids: Vec<String> = match self.freshness {
            Some(window) => {
                let fresh_since = (Utc::now() - window).timestamp_millis();
                sqlx::query_scalar(
                    r#"
                    SELECT c.id FROM cards c
                    WHERE (?1 IS NULL OR c.id > ?1)
                      AND NOT EXISTS (
                          SELECT 1 FROM ebay_prices e
                          WHERE e.card_id = c.id AND e.updated_at >= ?2
                      )
                    ORDER BY c.id ASC
                    LIMIT ?3
                    "#,
                )
                .bind(after)
                .bind(fresh_since)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    r#"
                    SELECT id FROM cards
                    WHERE (?1 IS NULL OR id > ?1)
                    ORDER BY id ASC
                    LIMIT ?2
                    "#,
                )
                .bind(after)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        debug!(?after, count = ids.len(), "Fetched id batch");
        Ok(ids)
    }
}
