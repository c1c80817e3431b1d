use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use tracing::debug;

const HISTORY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS card_price_history (
    card_id     TEXT    NOT NULL,
    market      TEXT    NOT NULL,
    metric      TEXT    NOT NULL,
    captured_at INTEGER NOT NULL,
    currency    TEXT    NOT NULL,
    value       REAL
);
CREATE INDEX IF NOT EXISTS idx_card_price_history_lookup
    ON card_price_history (card_id, captured_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_card_price_history_point
    ON card_price_history (card_id, market, metric, captured_at);

CREATE TABLE IF NOT EXISTS sealed_price_history (
    product_id  TEXT    NOT NULL,
    market      TEXT    NOT NULL,
    captured_at INTEGER NOT NULL,
    currency    TEXT    NOT NULL,
    price       REAL
);
CREATE INDEX IF NOT EXISTS idx_sealed_price_history_lookup
    ON sealed_price_history (product_id, captured_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sealed_price_history_point
    ON sealed_price_history (product_id, market, captured_at);
"#;

/// Opens a pool for `url`, creating the database file when missing.
///
/// In-memory databases live as long as their connection, so they get a
/// single connection that is never recycled.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("Invalid database URL: {url}"))?
        .create_if_missing(true);

    let pool_options = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to database: {url}"))?;
    debug!(%url, "Connected to database");
    Ok(pool)
}

/// Creates the append-only history tables when they do not exist yet.
pub async fn ensure_history_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(HISTORY_SCHEMA)
        .execute(pool)
        .await
        .context("Failed to create history tables")?;
    Ok(())
}
