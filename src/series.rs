//! Time series read path over the history tables.

use crate::core::price::{Category, SINGLE_PRICE_METRIC, series_id};
use crate::core::{DisplayCurrency, FxRates};
use crate::store::tables::HistorySchema;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, instrument, warn};

pub const DEFAULT_DAYS: u32 = 90;
pub const MAX_DAYS: u32 = 365;

/// Lookback window in whole days, within `[1, MAX_DAYS]`.
///
/// Missing or non-finite input falls back to `default`; fractional input is
/// truncated.
pub fn clamp_days(value: Option<f64>, default: u32) -> u32 {
    match value {
        Some(days) if days.is_finite() => days.trunc().clamp(1.0, MAX_DAYS as f64) as u32,
        _ => default,
    }
}

#[derive(Debug, Clone)]
pub struct SeriesQuery {
    pub category: Category,
    pub entity_id: String,
    pub days: u32,
    pub display: DisplayCurrency,
    /// Case-insensitive market allow-list.
    pub markets: Option<Vec<String>>,
    /// Case-insensitive metric allow-list.
    pub keys: Option<Vec<String>>,
}

impl SeriesQuery {
    pub fn new(category: Category, entity_id: &str) -> Self {
        Self {
            category,
            entity_id: entity_id.to_string(),
            days: DEFAULT_DAYS,
            display: DisplayCurrency::Native,
            markets: None,
            keys: None,
        }
    }

    fn allows(&self, market: &str, metric: &str) -> bool {
        let contains = |list: &Option<Vec<String>>, value: &str| {
            list.as_ref()
                .is_none_or(|items| items.iter().any(|i| i.eq_ignore_ascii_case(value)))
        };
        contains(&self.markets, market) && contains(&self.keys, metric)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub t: DateTime<Utc>,
    pub native: Option<f64>,
    pub display: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub id: String,
    pub market: String,
    pub key: String,
    pub native_currency: String,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    fn empty(market: &str, key: &str, native_currency: &str) -> Self {
        Self {
            id: series_id(market, key),
            market: market.to_string(),
            key: key.to_string(),
            native_currency: native_currency.to_string(),
            points: Vec::new(),
        }
    }
}

/// A history row, unified across both schemas.
#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    market: String,
    metric: String,
    captured_at: i64,
    currency: Option<String>,
    value: Option<f64>,
}

pub struct SeriesAggregator {
    pool: SqlitePool,
    fx: FxRates,
}

impl SeriesAggregator {
    pub fn new(pool: SqlitePool, fx: FxRates) -> Self {
        Self { pool, fx }
    }

    pub fn fx(&self) -> FxRates {
        self.fx
    }

    /// Series for every allowed catalog pair of the category, followed by
    /// any extra pairs observed in the window. Catalog pairs are returned
    /// even when they have no points.
    #[instrument(
        name = "LoadSeries",
        skip(self, query),
        fields(category = %query.category, id = %query.entity_id, days = query.days)
    )]
    pub async fn load_series(&self, query: &SeriesQuery) -> Vec<Series> {
        let mut series: Vec<Series> = query
            .category
            .catalog()
            .iter()
            .filter(|key| query.allows(key.market, key.metric))
            .map(|key| Series::empty(key.market, key.metric, key.native_currency.code()))
            .collect();

        let rows = match self.fetch_rows(query).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Failed to read price history: {e}");
                return series;
            }
        };
        debug!(rows = rows.len(), "History rows loaded");

        for row in rows {
            let market = row.market.to_lowercase();
            if !query.allows(&market, &row.metric) {
                continue;
            }
            let index = match series
                .iter()
                .position(|s| s.market == market && s.key == row.metric)
            {
                Some(index) => index,
                None => {
                    let currency = row.currency.clone().unwrap_or_else(|| {
                        query.category.default_currency(&market).code().to_string()
                    });
                    series.push(Series::empty(&market, &row.metric, &currency));
                    series.len() - 1
                }
            };
            let Some(t) = DateTime::<Utc>::from_timestamp_millis(row.captured_at) else {
                continue;
            };
            let entry = &mut series[index];
            let currency = row.currency.as_deref().unwrap_or(&entry.native_currency);
            let display = self.fx.display_value(row.value, currency, query.display);
            entry.points.push(SeriesPoint {
                t,
                native: row.value,
                display,
            });
        }
        series
    }

    async fn fetch_rows(&self, query: &SeriesQuery) -> Result<Vec<HistoryRow>, sqlx::Error> {
        let cutoff = (Utc::now() - Duration::days(i64::from(query.days))).timestamp_millis();
        let sql = match HistorySchema::for_category(query.category) {
            HistorySchema::PerMetric { table, id_column } => format!(
                "SELECT market, metric, captured_at, currency, value FROM \"{table}\" \
                 WHERE {id_column} = ? AND captured_at >= ? ORDER BY captured_at ASC"
            ),
            HistorySchema::PerMarket { table, id_column } => format!(
                "SELECT market, '{SINGLE_PRICE_METRIC}' AS metric, captured_at, currency, \
                 price AS value FROM \"{table}\" \
                 WHERE {id_column} = ? AND captured_at >= ? ORDER BY captured_at ASC"
            ),
        };
        sqlx::query_as::<_, HistoryRow>(&sql)
            .bind(&query.entity_id)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
    }
}
