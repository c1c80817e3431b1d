//! Pricing abstractions and core types

use super::currency::Currency;
use super::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

pub const TCGPLAYER: &str = "tcgplayer";
pub const CARDMARKET: &str = "cardmarket";

/// Entity family; each has its own history schema and catalog of series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Cards,
    Sealed,
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Category::Cards => "cards",
                Category::Sealed => "sealed",
            }
        )
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cards" | "card" => Ok(Category::Cards),
            "sealed" => Ok(Category::Sealed),
            _ => Err(Error::UnsupportedCategory(s.to_string())),
        }
    }
}

/// One known (market, metric) series of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesKey {
    pub market: &'static str,
    pub metric: &'static str,
    pub native_currency: Currency,
}

impl SeriesKey {
    const fn new(market: &'static str, metric: &'static str, native_currency: Currency) -> Self {
        Self {
            market,
            metric,
            native_currency,
        }
    }

    pub fn id(&self) -> String {
        series_id(self.market, self.metric)
    }
}

pub fn series_id(market: &str, metric: &str) -> String {
    format!("{market}:{metric}")
}

const CARD_SERIES: [SeriesKey; 10] = [
    SeriesKey::new(TCGPLAYER, "normal", Currency::Usd),
    SeriesKey::new(TCGPLAYER, "holofoil", Currency::Usd),
    SeriesKey::new(TCGPLAYER, "reverse_holofoil", Currency::Usd),
    SeriesKey::new(TCGPLAYER, "first_edition_holofoil", Currency::Usd),
    SeriesKey::new(TCGPLAYER, "first_edition_normal", Currency::Usd),
    SeriesKey::new(CARDMARKET, "trend", Currency::Eur),
    SeriesKey::new(CARDMARKET, "avg1", Currency::Eur),
    SeriesKey::new(CARDMARKET, "avg7", Currency::Eur),
    SeriesKey::new(CARDMARKET, "avg30", Currency::Eur),
    SeriesKey::new(CARDMARKET, "low", Currency::Eur),
];

/// Metric name used for schemas that hold a single price per market.
pub const SINGLE_PRICE_METRIC: &str = "price";

const SEALED_SERIES: [SeriesKey; 2] = [
    SeriesKey::new(TCGPLAYER, SINGLE_PRICE_METRIC, Currency::Usd),
    SeriesKey::new(CARDMARKET, SINGLE_PRICE_METRIC, Currency::Eur),
];

impl Category {
    pub fn catalog(&self) -> &'static [SeriesKey] {
        match self {
            Category::Cards => &CARD_SERIES,
            Category::Sealed => &SEALED_SERIES,
        }
    }

    /// Native currency assumed for a market when a row does not declare one.
    pub fn default_currency(&self, market: &str) -> Currency {
        self.catalog()
            .iter()
            .find(|key| key.market.eq_ignore_ascii_case(market))
            .map_or(Currency::Usd, |key| key.native_currency)
    }
}

/// Current price of one (entity, market, metric), as read from a feed table.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub entity_id: String,
    pub market: String,
    pub metric: String,
    pub currency: String,
    pub raw_value: Option<String>,
    pub updated_at: Option<String>,
}

/// Immutable history row.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSnapshot {
    pub entity_id: String,
    pub market: String,
    pub metric: String,
    pub captured_at: DateTime<Utc>,
    pub currency: String,
    pub value: Option<f64>,
}

/// Result of a single marketplace lookup that reached the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found { price: f64, url: Option<String> },
    NotFound,
}

/// Per-item listing-price lookup. Errors cover transport failures,
/// non-success statuses and undecodable bodies.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn lookup(&self, entity_id: &str) -> Result<Lookup>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!("cards".parse::<Category>().unwrap(), Category::Cards);
        assert_eq!("Sealed".parse::<Category>().unwrap(), Category::Sealed);
        let err = "coins".parse::<Category>().unwrap_err();
        assert_eq!(err.to_string(), "unsupported category: coins");
    }

    #[test]
    fn test_catalog_defaults() {
        assert_eq!(Category::Cards.catalog().len(), 10);
        assert_eq!(Category::Sealed.catalog()[1].id(), "cardmarket:price");
        assert_eq!(Category::Cards.default_currency("CardMarket"), Currency::Eur);
        assert_eq!(Category::Cards.default_currency("tcgplayer"), Currency::Usd);
    }
}
