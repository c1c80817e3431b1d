//! Copies the current feed prices into the append-only history tables.

use crate::core::error::{Error, Result};
use crate::core::money::normalize;
use crate::core::price::{PriceQuote, PriceSnapshot};
use crate::store::tables::{HistorySchema, SOURCE_TABLES, SourceTable};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCount {
    pub table: &'static str,
    pub history_table: &'static str,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotReport {
    pub captured_at: DateTime<Utc>,
    pub tables: Vec<TableCount>,
}

impl SnapshotReport {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

pub struct SnapshotWriter {
    pool: SqlitePool,
    sources: Vec<SourceTable>,
}

impl SnapshotWriter {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_sources(pool, SOURCE_TABLES.to_vec())
    }

    pub fn with_sources(pool: SqlitePool, sources: Vec<SourceTable>) -> Self {
        Self { pool, sources }
    }

    /// Snapshots every source table in a single transaction.
    ///
    /// Values are re-parsed with the money normalizer so history and live
    /// reads agree on numeric semantics. Each (entity, market, metric) gets
    /// at most one row per run: the first quote in table scan order wins and
    /// later duplicates are skipped. Any failure rolls the whole run back;
    /// nothing is persisted unless every table succeeded.
    pub async fn run(&self) -> Result<SnapshotReport> {
        let mut tx = self.pool.begin().await?;

        let captured_at = self.capture_time(&mut *tx).await?;
        info!(%captured_at, tables = self.sources.len(), "Snapshot starting");

        let mut tables = Vec::with_capacity(self.sources.len());
        let mut seen = HashSet::new();
        for source in &self.sources {
            let rows = snapshot_table(&mut *tx, source, captured_at, &mut seen)
                .await
                .map_err(|e| Error::transaction(source.table, e))?;
            debug!(table = source.table, rows, "Table snapshotted");
            tables.push(TableCount {
                table: source.table,
                history_table: source.history.table(),
                rows,
            });
        }

        tx.commit()
            .await
            .map_err(|e| Error::transaction("<commit>", e))?;

        let report = SnapshotReport {
            captured_at,
            tables,
        };
        info!(total = report.total_rows(), "Snapshot committed");
        Ok(report)
    }

    /// Now, unless a previous run recorded the same or a later time; then one
    /// millisecond after it, so captured-at strictly increases across runs.
    async fn capture_time(&self, conn: &mut SqliteConnection) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let mut latest: Option<i64> = None;
        let mut history_tables: Vec<&'static str> =
            self.sources.iter().map(|s| s.history.table()).collect();
        history_tables.dedup();
        for table in history_tables {
            let max: Option<i64> =
                sqlx::query_scalar(&format!("SELECT MAX(captured_at) FROM \"{table}\""))
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(|e| Error::transaction(table, e))?;
            latest = latest.max(max);
        }
        match latest.and_then(DateTime::<Utc>::from_timestamp_millis) {
            Some(previous) if previous >= now => {
                let next = previous + chrono::Duration::milliseconds(1);
                warn!(%previous, %now, "Clock is behind the last snapshot, advancing past it");
                Ok(next)
            }
            _ => Ok(now),
        }
    }
}

async fn snapshot_table(
    conn: &mut SqliteConnection,
    source: &SourceTable,
    captured_at: DateTime<Utc>,
    seen: &mut HashSet<(&'static str, String, String, String)>,
) -> Result<usize, sqlx::Error> {
    let quotes = source.read_quotes(conn, None).await?;
    if quotes.is_empty() {
        debug!(table = source.table, "No rows to snapshot");
    }
    let mut inserted = 0;
    for quote in &quotes {
        let key = (
            source.history.table(),
            quote.entity_id.clone(),
            quote.market.clone(),
            quote.metric.clone(),
        );
        if !seen.insert(key) {
            debug!(
                table = source.table,
                id = %quote.entity_id,
                market = %quote.market,
                metric = %quote.metric,
                "Skipping duplicate quote"
            );
            continue;
        }
        insert_snapshot(conn, source.history, &to_snapshot(quote, captured_at)).await?;
        inserted += 1;
    }
    Ok(inserted)
}

fn to_snapshot(quote: &PriceQuote, captured_at: DateTime<Utc>) -> PriceSnapshot {
    PriceSnapshot {
        entity_id: quote.entity_id.clone(),
        market: quote.market.clone(),
        metric: quote.metric.clone(),
        captured_at,
        currency: quote.currency.clone(),
        value: normalize(quote.raw_value.as_deref()),
    }
}

async fn insert_snapshot(
    conn: &mut SqliteConnection,
    schema: HistorySchema,
    snapshot: &PriceSnapshot,
) -> Result<(), sqlx::Error> {
    let captured_at = snapshot.captured_at.timestamp_millis();
    match schema {
        HistorySchema::PerMetric { table, id_column } => {
            sqlx::query(&format!(
                "INSERT INTO \"{table}\" \
                 ({id_column}, market, metric, captured_at, currency, value) \
                 VALUES (?, ?, ?, ?, ?, ?)"
            ))
            .bind(&snapshot.entity_id)
            .bind(&snapshot.market)
            .bind(&snapshot.metric)
            .bind(captured_at)
            .bind(&snapshot.currency)
            .bind(snapshot.value)
            .execute(&mut *conn)
            .await?;
        }
        HistorySchema::PerMarket { table, id_column } => {
            sqlx::query(&format!(
                "INSERT INTO \"{table}\" ({id_column}, market, captured_at, currency, price) \
                 VALUES (?, ?, ?, ?, ?)"
            ))
            .bind(&snapshot.entity_id)
            .bind(&snapshot.market)
            .bind(captured_at)
            .bind(&snapshot.currency)
            .bind(snapshot.value)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::{connect, ensure_history_schema};

    const FEED_SCHEMA: &str = r#"
        CREATE TABLE tcgplayer_prices (
            card_id TEXT, currency TEXT, normal TEXT, holofoil TEXT,
            reverse_holofoil TEXT, updated_at TEXT
        );
        CREATE TABLE cardmarket_prices (
            card_id TEXT, trend_price TEXT, avg7 REAL, low_price TEXT, updated_at TEXT
        );
        CREATE TABLE sealed_prices (
            product_id TEXT, market TEXT, currency TEXT, price TEXT, updated_at TEXT
        );
    "#;

    async fn pool_with_feeds(seed: &str) -> SqlitePool {
        let pool = connect("sqlite::memory:").await.unwrap();
        ensure_history_schema(&pool).await.unwrap();
        sqlx::raw_sql(FEED_SCHEMA).execute(&pool).await.unwrap();
        sqlx::raw_sql(seed).execute(&pool).await.unwrap();
        pool
    }

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_inserts_one_row_per_present_metric() {
        let pool = pool_with_feeds(
            r#"
            INSERT INTO tcgplayer_prices VALUES ('E1', 'USD', '$3.50', NULL, 'abc', '2024-01-01');
            INSERT INTO cardmarket_prices VALUES ('E1', '2,95', 3.1, NULL, NULL);
            INSERT INTO sealed_prices VALUES ('P1', 'tcgplayer', NULL, '$120.00', NULL);
            "#,
        )
        .await;

        let report = SnapshotWriter::new(pool.clone()).run().await.unwrap();

        let rows: Vec<usize> = report.tables.iter().map(|t| t.rows).collect();
        assert_eq!(rows, vec![2, 2, 1]);
        assert_eq!(report.total_rows(), 5);

        let history: Vec<(String, String, String, Option<f64>)> = sqlx::query_as(
            "SELECT market, metric, currency, value FROM card_price_history \
             WHERE card_id = 'E1' ORDER BY market, metric",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(
            history,
            vec![
                ("cardmarket".into(), "avg7".into(), "EUR".into(), Some(3.1)),
                ("cardmarket".into(), "trend".into(), "EUR".into(), Some(2.95)),
                ("tcgplayer".into(), "normal".into(), "USD".into(), Some(3.5)),
                ("tcgplayer".into(), "reverse_holofoil".into(), "USD".into(), None),
            ]
        );

        let sealed: (String, Option<f64>, i64) = sqlx::query_as(
            "SELECT currency, price, captured_at FROM sealed_price_history WHERE product_id = 'P1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(sealed.0, "USD");
        assert_eq!(sealed.1, Some(120.0));
        assert_eq!(sealed.2, report.captured_at.timestamp_millis());
    }

    #[tokio::test]
    async fn test_duplicate_quotes_keep_first_row() {
        let pool = pool_with_feeds(
            r#"
            INSERT INTO sealed_prices VALUES ('P1', 'CardMarket', NULL, '1.00', NULL);
            INSERT INTO sealed_prices VALUES ('P1', 'cardmarket', NULL, '2.00', NULL);
            INSERT INTO tcgplayer_prices VALUES ('E1', 'USD', '3.00', NULL, NULL, NULL);
            INSERT INTO tcgplayer_prices VALUES ('E1', 'USD', '4.00', NULL, NULL, NULL);
            "#,
        )
        .await;

        let report = SnapshotWriter::new(pool.clone()).run().await.unwrap();
        let rows: Vec<usize> = report.tables.iter().map(|t| t.rows).collect();
        assert_eq!(rows, vec![1, 0, 1]);

        let sealed: Vec<(String, Option<f64>)> = sqlx::query_as(
            "SELECT market, price FROM sealed_price_history WHERE product_id = 'P1'",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(sealed, vec![("cardmarket".to_string(), Some(1.0))]);

        let card: Vec<Option<f64>> =
            sqlx::query_scalar("SELECT value FROM card_price_history WHERE card_id = 'E1'")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(card, vec![Some(3.0)]);
    }

    #[tokio::test]
    async fn test_snapshot_failure_rolls_back_every_table() {
        let pool = pool_with_feeds(
            r#"
            INSERT INTO tcgplayer_prices VALUES ('E1', 'USD', '1.00', NULL, NULL, NULL);
            INSERT INTO cardmarket_prices VALUES ('E1', '2.00', NULL, NULL, NULL);
            INSERT INTO sealed_prices VALUES ('P1', 'cardmarket', 'EUR', '5.00', NULL);
            "#,
        )
        .await;

        SnapshotWriter::new(pool.clone()).run().await.unwrap();
        assert_eq!(count(&pool, "card_price_history").await, 2);
        assert_eq!(count(&pool, "sealed_price_history").await, 1);

        sqlx::raw_sql(
            r#"
            CREATE TRIGGER fail_sealed BEFORE INSERT ON sealed_price_history
            BEGIN SELECT RAISE(ABORT, 'forced failure'); END;
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let err = SnapshotWriter::new(pool.clone()).run().await.unwrap_err();
        match err {
            Error::Transaction { table, .. } => assert_eq!(table, "sealed_prices"),
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(count(&pool, "card_price_history").await, 2);
        assert_eq!(count(&pool, "sealed_price_history").await, 1);
    }

    #[tokio::test]
    async fn test_captured_at_never_goes_backwards() {
        let pool = pool_with_feeds(
            "INSERT INTO tcgplayer_prices VALUES ('E1', 'USD', '1.00', NULL, NULL, NULL);",
        )
        .await;
        let future = (Utc::now() + chrono::Duration::days(1)).timestamp_millis();
        sqlx::query(
            "INSERT INTO card_price_history VALUES ('X', 'tcgplayer', 'normal', ?, 'USD', 1.0)",
        )
        .bind(future)
        .execute(&pool)
        .await
        .unwrap();

        let report = SnapshotWriter::new(pool.clone()).run().await.unwrap();
        assert_eq!(report.captured_at.timestamp_millis(), future + 1);

        let first = report.captured_at;
        let second = SnapshotWriter::new(pool.clone()).run().await.unwrap();
        assert!(second.captured_at > first);
        assert_eq!(count(&pool, "card_price_history").await, 3);
    }

    #[tokio::test]
    async fn test_missing_feed_table_is_skipped() {
        let pool = connect("sqlite::memory:").await.unwrap();
        ensure_history_schema(&pool).await.unwrap();
        sqlx::raw_sql(
            "CREATE TABLE tcgplayer_prices (card_id TEXT, normal TEXT);
             INSERT INTO tcgplayer_prices VALUES ('E9', '0,99');",
        )
        .execute(&pool)
        .await
        .unwrap();

        let report = SnapshotWriter::new(pool.clone()).run().await.unwrap();
        assert_eq!(report.total_rows(), 1);
        let currency: String =
            sqlx::query_scalar("SELECT currency FROM card_price_history WHERE card_id = 'E9'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(currency, "USD");
    }
}
