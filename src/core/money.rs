//! Parsing and rendering of textual money amounts.

use super::currency::Currency;

const CURRENCY_SYMBOLS: [char; 5] = ['$', '€', '£', '¥', '₩'];

/// Parses a raw textual price into a finite number.
///
/// Currency symbols and whitespace are stripped. A comma is read as the
/// decimal separator when the text has no period, or when the last comma
/// comes after the last period (`1.234,56`); otherwise commas are
/// thousands separators. Anything that does not parse to a finite number
/// yields `None`, so "unknown" never turns into zero.
pub fn normalize(raw: Option<&str>) -> Option<f64> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }

    let stripped: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && !CURRENCY_SYMBOLS.contains(c))
        .collect();

    let cleaned = match (stripped.rfind(','), stripped.rfind('.')) {
        (Some(comma), period) if period.is_none_or(|p| comma > p) => {
            stripped.replace('.', "").replace(',', ".")
        }
        _ => stripped.replace(',', ""),
    };

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Renders an amount as a two-decimal string prefixed by the currency
/// symbol, without digit grouping.
pub fn format_money(amount: f64, currency: Currency) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}{}{:.2}", currency.symbol(), amount.abs())
}

/// Rounds to whole cents.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
