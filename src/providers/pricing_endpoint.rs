use crate::core::money::normalize;
use crate::core::{Lookup, PriceLookup};
use crate::providers::util::with_retry;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fields that may carry the listing URL, in order of preference.
const URL_FIELDS: [&str; 3] = ["url", "listingUrl", "itemWebUrl"];

/// Client for the per-item eBay price endpoint of the pricing service.
///
/// The endpoint searches the marketplace and stores what it finds; it is
/// called at most once per id per batch but may see an id again after a
/// restarted run.
pub struct PricingEndpoint {
    base_url: Url,
    secret: String,
    client: reqwest::Client,
    retries: usize,
}

impl PricingEndpoint {
    /// Fails when `base_url` is not an absolute http(s) URL, so a bad base
    /// is reported before any lookup is attempted.
    pub fn new(base_url: &str, secret: &str, timeout: Duration) -> Result<Self> {
        let base_url = parse_base_url(base_url)?;
        let client = reqwest::Client::builder()
            .user_agent("cardpulse/0.1")
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url,
            secret: secret.to_string(),
            client,
            retries: 1,
        })
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    fn url_for(&self, entity_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Pricing base URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(["api", "ebay", "price", entity_id]);
        Ok(url)
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("Invalid pricing base URL: {raw}"))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(anyhow!("Pricing base URL must be an http(s) URL: {raw}"));
    }
    Ok(url)
}

/// Interprets a decoded endpoint response.
fn parse_lookup(body: &Value) -> Lookup {
    if body.get("found").and_then(Value::as_bool) == Some(false) {
        return Lookup::NotFound;
    }
    let price = match body.get("price") {
        Some(Value::Number(n)) => n.as_f64().filter(|p| p.is_finite()),
        Some(Value::String(s)) => normalize(Some(s.as_str())),
        _ => None,
    };
    let url = URL_FIELDS.iter().find_map(|field| {
        body.get(*field)
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
    });
    match price {
        Some(price) => Lookup::Found { price, url },
        None => Lookup::NotFound,
    }
}

#[async_trait]
impl PriceLookup for PricingEndpoint {
    #[instrument(name = "EbayPriceLookup", skip(self), fields(id = %entity_id))]
    async fn lookup(&self, entity_id: &str) -> Result<Lookup> {
        let url = self.url_for(entity_id)?;
        debug!("Requesting listing price from {}", url);

        let response = with_retry(
            || {
                self.client
                    .get(url.clone())
                    .bearer_auth(&self.secret)
                    .send()
            },
            self.retries,
            250,
        )
        .await
        .with_context(|| format!("Request failed for id: {entity_id}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("HTTP error: {} for id: {}", status, entity_id));
        }

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body for id: {entity_id}"))?;
        let body: Value = serde_json::from_str(&text)
            .with_context(|| format!("Non-JSON response for id: {entity_id}"))?;

        Ok(parse_lookup(&body))
    }
}
