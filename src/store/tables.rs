//! Typed description of the current-price feed tables.
//!
//! Feed importers have used different column names for the same field over
//! time. Each field carries an ordered list of accepted column names; the
//! first one that exists in the table and holds a non-NULL value on the row
//! wins. Consumers only ever see [`PriceQuote`]s.

use crate::core::Category;
use crate::core::currency::Currency;
use crate::core::price::{CARDMARKET, PriceQuote, SINGLE_PRICE_METRIC, TCGPLAYER};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::HashSet;

/// Where the market of a row comes from.
#[derive(Debug, Clone, Copy)]
pub enum MarketSource {
    Fixed(&'static str),
    Column(&'static [&'static str]),
}

/// Where the native currency of a row comes from.
#[derive(Debug, Clone, Copy)]
pub struct CurrencySource {
    pub columns: &'static [&'static str],
    pub default: Currency,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricColumns {
    pub metric: &'static str,
    pub columns: &'static [&'static str],
}

/// Layout of the history table a feed is snapshotted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySchema {
    /// One row per (entity, market, metric).
    PerMetric {
        table: &'static str,
        id_column: &'static str,
    },
    /// One row per (entity, market) holding a single price.
    PerMarket {
        table: &'static str,
        id_column: &'static str,
    },
}

impl HistorySchema {
    pub fn table(&self) -> &'static str {
        match *self {
            HistorySchema::PerMetric { table, .. } | HistorySchema::PerMarket { table, .. } => {
                table
            }
        }
    }

    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Cards => CARD_HISTORY,
            Category::Sealed => SEALED_HISTORY,
        }
    }
}

pub const CARD_HISTORY: HistorySchema = HistorySchema::PerMetric {
    table: "card_price_history",
    id_column: "card_id",
};

pub const SEALED_HISTORY: HistorySchema = HistorySchema::PerMarket {
    table: "sealed_price_history",
    id_column: "product_id",
};

#[derive(Debug, Clone, Copy)]
pub struct SourceTable {
    pub table: &'static str,
    pub category: Category,
    pub id_columns: &'static [&'static str],
    pub market: MarketSource,
    pub currency: CurrencySource,
    pub metrics: &'static [MetricColumns],
    pub updated_at_columns: &'static [&'static str],
    pub history: HistorySchema,
}

const UPDATED_AT: &[&str] = &["updated_at", "updatedAt", "last_updated"];

pub const TCGPLAYER_PRICES: SourceTable = SourceTable {
    table: "tcgplayer_prices",
    category: Category::Cards,
    id_columns: &["card_id", "cardId", "id"],
    market: MarketSource::Fixed(TCGPLAYER),
    currency: CurrencySource {
        columns: &["currency", "currency_code"],
        default: Currency::Usd,
    },
    metrics: &[
        MetricColumns {
            metric: "normal",
            columns: &["normal", "normal_market"],
        },
        MetricColumns {
            metric: "holofoil",
            columns: &["holofoil", "holofoil_market"],
        },
        MetricColumns {
            metric: "reverse_holofoil",
            columns: &["reverse_holofoil", "reverseHolofoil", "reverse_holofoil_market"],
        },
        MetricColumns {
            metric: "first_edition_holofoil",
            columns: &["first_edition_holofoil", "1stEditionHolofoil"],
        },
        MetricColumns {
            metric: "first_edition_normal",
            columns: &["first_edition_normal", "1stEditionNormal"],
        },
    ],
    updated_at_columns: UPDATED_AT,
    history: CARD_HISTORY,
};

pub const CARDMARKET_PRICES: SourceTable = SourceTable {
    table: "cardmarket_prices",
    category: Category::Cards,
    id_columns: &["card_id", "cardId", "id"],
    market: MarketSource::Fixed(CARDMARKET),
    currency: CurrencySource {
        columns: &[],
        default: Currency::Eur,
    },
    metrics: &[
        MetricColumns {
            metric: "trend",
            columns: &["trend_price", "trend", "trendPrice"],
        },
        MetricColumns {
            metric: "avg1",
            columns: &["avg1"],
        },
        MetricColumns {
            metric: "avg7",
            columns: &["avg7"],
        },
        MetricColumns {
            metric: "avg30",
            columns: &["avg30"],
        },
        MetricColumns {
            metric: "low",
            columns: &["low_price", "low", "lowPrice"],
        },
    ],
    updated_at_columns: UPDATED_AT,
    history: CARD_HISTORY,
};

pub const SEALED_PRICES: SourceTable = SourceTable {
    table: "sealed_prices",
    category: Category::Sealed,
    id_columns: &["product_id", "productId", "id"],
    market: MarketSource::Column(&["market", "source"]),
    currency: CurrencySource {
        columns: &["currency", "currency_code"],
        default: Currency::Usd,
    },
    metrics: &[MetricColumns {
        metric: SINGLE_PRICE_METRIC,
        columns: &["price", "market_price", "marketPrice"],
    }],
    updated_at_columns: UPDATED_AT,
    history: SEALED_HISTORY,
};

/// Feed tables snapshotted on every run, in order.
pub const SOURCE_TABLES: [SourceTable; 3] = [TCGPLAYER_PRICES, CARDMARKET_PRICES, SEALED_PRICES];

impl SourceTable {
    pub fn for_category(category: Category) -> impl Iterator<Item = &'static SourceTable> {
        SOURCE_TABLES.iter().filter(move |t| t.category == category)
    }

    /// Builds the projection for the columns this table actually has.
    ///
    /// Every selected value is cast to text so that numeric and textual
    /// imports go through the same money parser.
    pub fn projection(&self, existing: &HashSet<String>) -> Option<Projection> {
        let pick = |candidates: &[&'static str]| -> Vec<&'static str> {
            candidates
                .iter()
                .copied()
                .filter(|c| existing.contains(*c))
                .collect()
        };

        let ids = pick(self.id_columns);
        if ids.is_empty() {
            return None;
        }
        let markets = match self.market {
            MarketSource::Fixed(_) => Vec::new(),
            MarketSource::Column(columns) => pick(columns),
        };
        let metrics = self
            .metrics
            .iter()
            .map(|m| (m.metric, pick(m.columns)))
            .filter(|(_, columns)| !columns.is_empty())
            .collect();

        Some(Projection {
            ids,
            markets,
            currencies: pick(self.currency.columns),
            metrics,
            updated_at: pick(self.updated_at_columns),
        })
    }

    /// `SELECT` over the projected columns, with an optional id filter bound
    /// as the single parameter.
    pub fn select_sql(&self, projection: &Projection, filter_by_id: bool) -> String {
        let columns = projection.all_columns();
        let select = columns
            .iter()
            .map(|c| format!("CAST(\"{c}\" AS TEXT)"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {select} FROM \"{}\"", self.table);
        if filter_by_id {
            let ids = projection
                .ids
                .iter()
                .map(|c| format!("CAST(\"{c}\" AS TEXT)"))
                .collect::<Vec<_>>();
            let id_expr = match ids.as_slice() {
                [single] => single.clone(),
                _ => format!("COALESCE({})", ids.join(", ")),
            };
            sql.push_str(&format!(" WHERE {id_expr} = ?"));
        }
        sql
    }

    /// Maps one row selected with [`SourceTable::select_sql`] into quotes.
    ///
    /// Metrics whose value is NULL in every candidate column produce no
    /// quote. Rows without an id or market are skipped.
    pub fn quotes_from_row(&self, projection: &Projection, row: &SqliteRow) -> Vec<PriceQuote> {
        let columns = projection.all_columns();
        let value_of = |candidates: &[&'static str]| -> Option<String> {
            candidates.iter().find_map(|name| {
                let index = columns.iter().position(|c| c == name)?;
                row.try_get::<Option<String>, _>(index)
                    .ok()
                    .flatten()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            })
        };

        let Some(entity_id) = value_of(projection.ids.as_slice()) else {
            return Vec::new();
        };
        let market = match self.market {
            MarketSource::Fixed(market) => Some(market.to_string()),
            MarketSource::Column(_) => {
                value_of(projection.markets.as_slice()).map(|m| m.to_lowercase())
            }
        };
        let Some(market) = market else {
            return Vec::new();
        };
        let currency = value_of(projection.currencies.as_slice())
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| self.row_default_currency(&market).code().to_string());
        let updated_at = value_of(projection.updated_at.as_slice());

        projection
            .metrics
            .iter()
            .filter_map(|(metric, candidates)| {
                value_of(candidates.as_slice()).map(|raw| PriceQuote {
                    entity_id: entity_id.clone(),
                    market: market.clone(),
                    metric: metric.to_string(),
                    currency: currency.clone(),
                    raw_value: Some(raw),
                    updated_at: updated_at.clone(),
                })
            })
            .collect()
    }

    fn row_default_currency(&self, market: &str) -> Currency {
        match self.market {
            MarketSource::Fixed(_) => self.currency.default,
            MarketSource::Column(_) => self.category.default_currency(market),
        }
    }

    /// Reads the column names of the table; empty when it does not exist.
    pub async fn existing_columns(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<HashSet<String>, sqlx::Error> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
            .bind(self.table)
            .fetch_all(&mut *conn)
            .await?;
        Ok(names.into_iter().collect())
    }

    /// Reads every quote of the table, or only those of `entity_id`.
    pub async fn read_quotes(
        &self,
        conn: &mut SqliteConnection,
        entity_id: Option<&str>,
    ) -> Result<Vec<PriceQuote>, sqlx::Error> {
        let existing = self.existing_columns(conn).await?;
        let Some(projection) = self.projection(&existing) else {
            return Ok(Vec::new());
        };
        let sql = self.select_sql(&projection, entity_id.is_some());
        let mut query = sqlx::query(&sql);
        if let Some(id) = entity_id {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&mut *conn).await?;
        Ok(rows
            .iter()
            .flat_map(|row| self.quotes_from_row(&projection, row))
            .collect())
    }
}

/// Columns of a [`SourceTable`] present in the live schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub ids: Vec<&'static str>,
    pub markets: Vec<&'static str>,
    pub currencies: Vec<&'static str>,
    pub metrics: Vec<(&'static str, Vec<&'static str>)>,
    pub updated_at: Vec<&'static str>,
}

impl Projection {
    fn all_columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = Vec::new();
        let groups = [&self.ids, &self.markets, &self.currencies, &self.updated_at];
        for column in groups
            .into_iter()
            .flatten()
            .chain(self.metrics.iter().flat_map(|(_, c)| c))
        {
            if !columns.contains(column) {
                columns.push(*column);
            }
        }
        columns
    }
}
