//! Currency conversion between the two supported currencies

use super::money::{format_money, normalize, round_cents};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Usd => "$",
            Currency::Eur => "€",
        }
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            _ => Err(anyhow::anyhow!("Unsupported currency: {}", s)),
        }
    }
}

/// Currency requested by a caller for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DisplayCurrency {
    #[default]
    Native,
    Usd,
    Eur,
}

impl DisplayCurrency {
    /// Missing or unrecognised values resolve to `Native`.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_uppercase()).as_deref() {
            Some("USD") => DisplayCurrency::Usd,
            Some("EUR") => DisplayCurrency::Eur,
            _ => DisplayCurrency::Native,
        }
    }

    pub fn target(&self) -> Option<Currency> {
        match self {
            DisplayCurrency::Native => None,
            DisplayCurrency::Usd => Some(Currency::Usd),
            DisplayCurrency::Eur => Some(Currency::Eur),
        }
    }
}

impl Display for DisplayCurrency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.target() {
            Some(currency) => write!(f, "{currency}"),
            None => write!(f, "NATIVE"),
        }
    }
}

/// Directional exchange rates between USD and EUR.
///
/// Either direction may be missing. Callers must treat a missing rate as
/// "conversion unavailable", never as a default value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FxRates {
    pub usd_to_eur: Option<f64>,
    pub eur_to_usd: Option<f64>,
}

fn parse_rate(raw: Option<&str>) -> Option<f64> {
    raw?.trim()
        .parse::<f64>()
        .ok()
        .filter(|rate| rate.is_finite() && *rate > 0.0)
}

impl FxRates {
    /// Builds the rate pair from the two optional configured values.
    ///
    /// A configured direction is used as given. A direction that is not
    /// configured (or not a finite positive number) is derived as the
    /// reciprocal of the other one. When both are configured they are kept
    /// as-is even if they disagree.
    pub fn from_config(usd_to_eur: Option<&str>, eur_to_usd: Option<&str>) -> Self {
        let configured_usd_to_eur = parse_rate(usd_to_eur);
        let configured_eur_to_usd = parse_rate(eur_to_usd);

        let rates = FxRates {
            usd_to_eur: configured_usd_to_eur.or(configured_eur_to_usd.map(|r| 1.0 / r)),
            eur_to_usd: configured_eur_to_usd.or(configured_usd_to_eur.map(|r| 1.0 / r)),
        };
        debug!(?rates, "Resolved FX rates");
        rates
    }

    pub fn rate(&self, from: Currency, to: Currency) -> Option<f64> {
        match (from, to) {
            (Currency::Usd, Currency::Eur) => self.usd_to_eur,
            (Currency::Eur, Currency::Usd) => self.eur_to_usd,
            _ => Some(1.0),
        }
    }

    /// Converts `amount`. Same-currency conversion never needs a rate.
    pub fn convert(&self, amount: f64, from: Currency, to: Currency) -> Option<f64> {
        if from == to {
            return Some(amount);
        }
        self.rate(from, to).map(|rate| amount * rate)
    }

    /// Converts from a textual currency code. Unknown codes only convert to
    /// themselves, which never happens for the two supported targets.
    pub fn convert_code(&self, amount: f64, from: &str, to: Currency) -> Option<f64> {
        let from = from.parse::<Currency>().ok()?;
        self.convert(amount, from, to)
    }

    /// Value of a native amount in the requested display currency, rounded
    /// to cents. `Native` display returns the amount untouched.
    pub fn display_value(
        &self,
        amount: Option<f64>,
        native_currency: &str,
        display: DisplayCurrency,
    ) -> Option<f64> {
        let amount = amount?;
        match display.target() {
            None => Some(amount),
            Some(target) => self
                .convert_code(amount, native_currency, target)
                .map(round_cents),
        }
    }

    /// Parses `raw` and formats it for `display`.
    ///
    /// Returns `None` only when the text is not a price. When the display
    /// currency differs and no rate is available, the price is formatted in
    /// the source currency instead of being dropped.
    pub fn maybe_format(
        &self,
        raw: Option<&str>,
        source: Currency,
        display: DisplayCurrency,
    ) -> Option<FormattedPrice> {
        let amount = normalize(raw)?;
        let (amount, currency) = match display.target() {
            Some(target) if target != source => match self.convert(amount, source, target) {
                Some(converted) => (converted, target),
                None => {
                    debug!(%source, %target, "No FX rate, formatting in source currency");
                    (amount, source)
                }
            },
            _ => (amount, source),
        };
        Some(FormattedPrice::new(amount, currency))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedPrice {
    pub amount: f64,
    pub currency: Currency,
    pub text: String,
}

impl FormattedPrice {
    pub fn new(amount: f64, currency: Currency) -> Self {
        let amount = round_cents(amount);
        Self {
            amount,
            currency,
            text: format_money(amount, currency),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reciprocal_from_single_direction() {
        let rates = FxRates::from_config(Some("0.92"), None);
        assert_eq!(rates.usd_to_eur, Some(0.92));
        assert_eq!(rates.eur_to_usd, Some(1.0 / 0.92));

        let rates = FxRates::from_config(None, Some("1.25"));
        assert_eq!(rates.eur_to_usd, Some(1.25));
        assert_eq!(rates.usd_to_eur, Some(0.8));
    }

    #[test]
    fn test_both_directions_are_not_reconciled() {
        let rates = FxRates::from_config(Some("0.9"), Some("1.5"));
        assert_eq!(rates.usd_to_eur, Some(0.9));
        assert_eq!(rates.eur_to_usd, Some(1.5));
    }

    #[test]
    fn test_invalid_rates_are_absent() {
        let rates = FxRates::from_config(Some("-1"), Some("abc"));
        assert_eq!(rates, FxRates::default());

        let rates = FxRates::from_config(Some("0"), Some("1.1"));
        assert_eq!(rates.eur_to_usd, Some(1.1));
        assert_eq!(rates.usd_to_eur, Some(1.0 / 1.1));

        let rates = FxRates::from_config(Some("inf"), None);
        assert_eq!(rates, FxRates::default());
    }

    #[test]
    fn test_convert_identity_needs_no_rate() {
        let rates = FxRates::default();
        assert_eq!(rates.convert(100.0, Currency::Usd, Currency::Usd), Some(100.0));
        assert_eq!(rates.convert(100.0, Currency::Usd, Currency::Eur), None);
    }

    #[test]
    fn test_convert_code() {
        let rates = FxRates::from_config(Some("0.9"), None);
        assert_eq!(rates.convert_code(10.0, "usd", Currency::Eur), Some(9.0));
        assert_eq!(rates.convert_code(10.0, "GBP", Currency::Eur), None);
    }

    #[test]
    fn test_display_value() {
        let rates = FxRates::from_config(Some("0.9"), None);
        assert_eq!(
            rates.display_value(Some(3.5), "USD", DisplayCurrency::Eur),
            Some(3.15)
        );
        assert_eq!(
            rates.display_value(Some(3.5), "USD", DisplayCurrency::Native),
            Some(3.5)
        );
        assert_eq!(rates.display_value(None, "USD", DisplayCurrency::Eur), None);
        assert_eq!(
            FxRates::default().display_value(Some(3.5), "USD", DisplayCurrency::Eur),
            None
        );
    }

    #[test]
    fn test_maybe_format_falls_back_to_source() {
        let rates = FxRates::default();
        let formatted = rates
            .maybe_format(Some("$3.50"), Currency::Usd, DisplayCurrency::Eur)
            .unwrap();
        assert_eq!(formatted.currency, Currency::Usd);
        assert_eq!(formatted.text, "$3.50");
    }

    #[test]
    fn test_maybe_format_converts() {
        let rates = FxRates::from_config(Some("0.9"), None);
        let formatted = rates
            .maybe_format(Some("3.50"), Currency::Usd, DisplayCurrency::Eur)
            .unwrap();
        assert_eq!(formatted.currency, Currency::Eur);
        assert_eq!(formatted.amount, 3.15);
        assert_eq!(formatted.text, "€3.15");

        let native = rates
            .maybe_format(Some("3,50"), Currency::Eur, DisplayCurrency::Native)
            .unwrap();
        assert_eq!(native.text, "€3.50");
    }

    #[test]
    fn test_maybe_format_unparseable() {
        let rates = FxRates::from_config(Some("0.9"), None);
        assert!(
            rates
                .maybe_format(Some("n/a"), Currency::Usd, DisplayCurrency::Eur)
                .is_none()
        );
        assert!(
            rates
                .maybe_format(None, Currency::Usd, DisplayCurrency::Usd)
                .is_none()
        );
    }

    #[test]
    fn test_display_currency_parse() {
        assert_eq!(DisplayCurrency::parse_lenient(Some("eur")), DisplayCurrency::Eur);
        assert_eq!(DisplayCurrency::parse_lenient(Some("USD")), DisplayCurrency::Usd);
        assert_eq!(DisplayCurrency::parse_lenient(Some("GBP")), DisplayCurrency::Native);
        assert_eq!(DisplayCurrency::parse_lenient(None), DisplayCurrency::Native);
        assert_eq!(DisplayCurrency::Native.to_string(), "NATIVE");
    }
}
