//! # Read API
//!
//! JSON endpoints over price history and current prices, using axum.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /prices/history/{category}/{entity_id}` - Per-market, per-metric
//!   series over a lookback window (`days`, `display`, `markets`, `keys`)
//! - `GET /prices/latest/{category}/{entity_id}` - Current quotes, formatted
//!   in the requested display currency (`display`)
//!
//! Read failures degrade to empty results. Only malformed requests (an
//! unsupported category or a blank id) are answered with `400`.

use crate::core::currency::FormattedPrice;
use crate::core::money::normalize;
use crate::core::price::PriceQuote;
use crate::core::{Category, Currency, DisplayCurrency, FxRates};
use crate::series::{DEFAULT_DAYS, Series, SeriesAggregator, SeriesQuery, clamp_days};
use crate::store::tables::SourceTable;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, warn};

pub const CACHE_CONTROL: &str = "public, max-age=60, stale-while-revalidate=300";

pub struct ApiState {
    pub pool: SqlitePool,
    pub fx: FxRates,
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/prices/history/{category}/{entity_id}", get(price_history))
        .route("/prices/latest/{category}/{entity_id}", get(latest_prices))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError(StatusCode, String);

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorResponse { error: self.1 })).into_response()
    }
}

fn validate(category: &str, entity_id: &str) -> Result<(Category, String), ApiError> {
    let category = category
        .parse::<Category>()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let entity_id = entity_id.trim();
    if entity_id.is_empty() {
        return Err(ApiError::bad_request("missing entity id"));
    }
    Ok((category, entity_id.to_string()))
}

fn cached<T: Serialize>(body: T) -> Response {
    ([(header::CACHE_CONTROL, CACHE_CONTROL)], Json(body)).into_response()
}

/// Splits a comma-separated allow-list; blank input means "no filter".
fn csv(value: Option<&str>) -> Option<Vec<String>> {
    let items: Vec<String> = value?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!items.is_empty()).then_some(items)
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub days: Option<String>,
    pub display: Option<String>,
    pub markets: Option<String>,
    pub keys: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub category: Category,
    pub entity_id: String,
    pub display: DisplayCurrency,
    pub fx: FxRates,
    pub days: u32,
    pub series: Vec<Series>,
}

async fn price_history(
    State(state): State<Arc<ApiState>>,
    Path((category, entity_id)): Path<(String, String)>,
    Query(params): Query<HistoryParams>,
) -> Result<Response, ApiError> {
    let (category, entity_id) = validate(&category, &entity_id)?;
    let days = clamp_days(
        params.days.as_deref().and_then(|d| d.trim().parse::<f64>().ok()),
        DEFAULT_DAYS,
    );
    let query = SeriesQuery {
        days,
        display: DisplayCurrency::parse_lenient(params.display.as_deref()),
        markets: csv(params.markets.as_deref()),
        keys: csv(params.keys.as_deref()),
        ..SeriesQuery::new(category, &entity_id)
    };

    let aggregator = SeriesAggregator::new(state.pool.clone(), state.fx);
    let series = aggregator.load_series(&query).await;

    Ok(cached(HistoryResponse {
        category,
        entity_id,
        display: query.display,
        fx: state.fx,
        days,
        series,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct LatestParams {
    pub display: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestQuote {
    pub market: String,
    pub metric: String,
    pub currency: String,
    pub native: Option<f64>,
    pub updated_at: Option<String>,
    pub formatted: Option<FormattedPrice>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestResponse {
    pub category: Category,
    pub entity_id: String,
    pub display: DisplayCurrency,
    pub fx: FxRates,
    pub quotes: Vec<LatestQuote>,
}

fn latest_quote(fx: &FxRates, quote: PriceQuote, display: DisplayCurrency) -> LatestQuote {
    let raw = quote.raw_value.as_deref();
    let formatted = quote
        .currency
        .parse::<Currency>()
        .ok()
        .and_then(|source| fx.maybe_format(raw, source, display));
    LatestQuote {
        native: normalize(raw),
        formatted,
        market: quote.market,
        metric: quote.metric,
        currency: quote.currency,
        updated_at: quote.updated_at,
    }
}

async fn read_latest(pool: &SqlitePool, category: Category, entity_id: &str) -> Vec<PriceQuote> {
    let mut conn = match pool.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("Failed to acquire database connection: {e}");
            return Vec::new();
        }
    };
    let mut quotes = Vec::new();
    for source in SourceTable::for_category(category) {
        match source.read_quotes(&mut *conn, Some(entity_id)).await {
            Ok(found) => quotes.extend(found),
            Err(e) => warn!(table = source.table, "Failed to read current prices: {e}"),
        }
    }
    quotes
}

async fn latest_prices(
    State(state): State<Arc<ApiState>>,
    Path((category, entity_id)): Path<(String, String)>,
    Query(params): Query<LatestParams>,
) -> Result<Response, ApiError> {
    let (category, entity_id) = validate(&category, &entity_id)?;
    let display = DisplayCurrency::parse_lenient(params.display.as_deref());

    let quotes: Vec<LatestQuote> = read_latest(&state.pool, category, &entity_id)
        .await
        .into_iter()
        .map(|quote| latest_quote(&state.fx, quote, display))
        .collect();
    debug!(%category, id = %entity_id, quotes = quotes.len(), "Latest prices served");

    Ok(cached(LatestResponse {
        category,
        entity_id,
        display,
        fx: state.fx,
        quotes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotWriter;
    use crate::store::db::{connect, ensure_history_schema};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn state() -> Arc<ApiState> {
        let pool = connect("sqlite::memory:").await.unwrap();
        ensure_history_schema(&pool).await.unwrap();
        sqlx::raw_sql(
            r#"
            CREATE TABLE tcgplayer_prices (
                card_id TEXT, currency TEXT, normal TEXT, updated_at TEXT
            );
            INSERT INTO tcgplayer_prices VALUES ('E1', 'USD', '$3.50', '2024-05-01');
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        Arc::new(ApiState {
            pool,
            fx: FxRates::from_config(Some("0.9"), None),
        })
    }

    async fn fetch(state: Arc<ApiState>, uri: &str) -> (StatusCode, Option<String>, Value) {
        let response = create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let cache = response
            .headers()
            .get(header::CACHE_CONTROL)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, cache, body)
    }

    #[tokio::test]
    async fn test_health() {
        let response = create_router(state().await)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_history_after_snapshot() {
        let state = state().await;
        SnapshotWriter::new(state.pool.clone()).run().await.unwrap();

        let (status, cache, body) = fetch(
            state,
            "/prices/history/cards/E1?days=30&display=eur&markets=tcgplayer&keys=normal,holofoil",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache.as_deref(), Some(CACHE_CONTROL));
        assert_eq!(body["category"], "cards");
        assert_eq!(body["entityId"], "E1");
        assert_eq!(body["display"], "EUR");
        assert_eq!(body["days"], 30);
        assert_eq!(body["fx"]["usdToEur"], 0.9);
        let series = body["series"].as_array().unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0]["id"], "tcgplayer:normal");
        assert_eq!(series[0]["nativeCurrency"], "USD");
        assert_eq!(series[0]["points"][0]["native"], 3.5);
        assert_eq!(series[0]["points"][0]["display"], 3.15);
        assert!(series[1]["points"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_defaults_and_invalid_params() {
        let (status, _, body) = fetch(
            state().await,
            "/prices/history/sealed/P1?days=abc&display=gbp",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["days"], 90);
        assert_eq!(body["display"], "NATIVE");
        assert_eq!(body["series"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_category_is_bad_request() {
        let (status, cache, body) = fetch(state().await, "/prices/history/coins/E1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(cache.is_none());
        assert_eq!(body["error"], "unsupported category: coins");
    }

    #[tokio::test]
    async fn test_blank_id_is_bad_request() {
        let (status, _, body) = fetch(state().await, "/prices/latest/cards/%20").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing entity id");
    }

    #[tokio::test]
    async fn test_latest_formats_in_display_currency() {
        let (status, cache, body) =
            fetch(state().await, "/prices/latest/cards/E1?display=EUR").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache.as_deref(), Some(CACHE_CONTROL));
        let quotes = body["quotes"].as_array().unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0]["native"], 3.5);
        assert_eq!(quotes[0]["updatedAt"], "2024-05-01");
        assert_eq!(quotes[0]["formatted"]["currency"], "EUR");
        assert_eq!(quotes[0]["formatted"]["text"], "€3.15");
    }

    #[test]
    fn test_latest_quote_falls_back_to_native_without_rate() {
        let quote = PriceQuote {
            entity_id: "E2".to_string(),
            market: "cardmarket".to_string(),
            metric: "trend".to_string(),
            currency: "EUR".to_string(),
            raw_value: Some("2,50".to_string()),
            updated_at: None,
        };
        let latest = latest_quote(&FxRates::default(), quote, DisplayCurrency::Usd);
        let formatted = latest.formatted.unwrap();
        assert_eq!(formatted.currency, Currency::Eur);
        assert_eq!(formatted.text, "€2.50");
    }
}
