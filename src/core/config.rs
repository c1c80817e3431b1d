use super::currency::FxRates;
use super::error::Error;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://cardpulse.db";
pub const DEFAULT_PRICING_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct FxConfig {
    pub usd_to_eur: Option<String>,
    pub eur_to_usd: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct EbayConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Process-wide settings, built once at startup and handed to each
/// component. Components never read the environment themselves.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub fx: FxConfig,
    #[serde(default)]
    pub ebay: EbayConfig,
    pub cron_secret: Option<String>,
    #[serde(default = "default_pricing_base_url")]
    pub pricing_base_url: String,
    pub cursor_path: Option<PathBuf>,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_pricing_base_url() -> String {
    DEFAULT_PRICING_BASE_URL.to_string()
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_url: default_database_url(),
            fx: FxConfig::default(),
            ebay: EbayConfig::default(),
            cron_secret: None,
            pricing_base_url: default_pricing_base_url(),
            cursor_path: None,
            listen_addr: default_listen_addr(),
        }
    }
}

/// Settings the harvester cannot start without.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub cron_secret: String,
}

impl AppConfig {
    /// Loads the optional YAML file, then applies the process environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config file");
        Ok(config)
    }

    /// Overlays values found through `lookup`; blank values are ignored.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(rate) = get("USD_TO_EUR") {
            self.fx.usd_to_eur = Some(rate);
        }
        if let Some(rate) = get("EUR_TO_USD") {
            self.fx.eur_to_usd = Some(rate);
        }
        if let Some(id) = get("EBAY_CLIENT_ID") {
            self.ebay.client_id = Some(id);
        }
        if let Some(secret) = get("EBAY_CLIENT_SECRET") {
            self.ebay.client_secret = Some(secret);
        }
        if let Some(secret) = get("CRON_SECRET") {
            self.cron_secret = Some(secret);
        }
        if let Some(base) = get("PRICING_BASE_URL") {
            self.pricing_base_url = base;
        }
        if let Some(path) = get("HARVEST_CURSOR_PATH") {
            self.cursor_path = Some(PathBuf::from(path));
        }
        if let Some(addr) = get("LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        self
    }

    pub fn fx_rates(&self) -> FxRates {
        FxRates::from_config(self.fx.usd_to_eur.as_deref(), self.fx.eur_to_usd.as_deref())
    }

    pub fn harvest_credentials(&self) -> Result<HarvestCredentials, Error> {
        let required = |value: &Option<String>, name: &'static str| {
            value
                .as_ref()
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .ok_or(Error::ConfigurationMissing(name))
        };
        Ok(HarvestCredentials {
            client_id: required(&self.ebay.client_id, "EBAY_CLIENT_ID")?,
            client_secret: required(&self.ebay.client_secret, "EBAY_CLIENT_SECRET")?,
            cron_secret: required(&self.cron_secret, "CRON_SECRET")?,
        })
    }

    pub fn cursor_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.cursor_path {
            return Ok(custom_path.clone());
        }
        let proj_dirs = ProjectDirs::from("io", "cardpulse", "cardpulse")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().join("ebay-harvest.cursor"))
    }
}
