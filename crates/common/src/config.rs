//! Runtime configuration.
//!
//! Values start from built-in defaults, are optionally overlaid by a TOML file
//! and finally by process environment variables. Loaded once at startup.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BINANCE_URL: &str = "https://api.binance.com";
pub const DEFAULT_CMC_URL: &str = "https://pro-api.coinmarketcap.com";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub binance: BinanceConfig,
    pub cmc: CmcConfig,
    pub klines: KlineConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BinanceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BINANCE_URL.to_string(),
            api_key: None,
            api_secret: None,
            timeout_secs: 10,
        }
    }
}

impl BinanceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CmcConfig {
    pub base_url: String,
    /// Keys are used round-robin, one per request
    pub api_keys: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for CmcConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CMC_URL.to_string(),
            api_keys: Vec::new(),
            timeout_secs: 10,
        }
    }
}

impl CmcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Kline pagination tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KlineConfig {
    /// Candles requested per page (Binance caps this at 1000)
    pub page_limit: u32,
    /// Accumulated candle count after which each further page waits `cooldown_ms`
    pub cooldown_after: usize,
    pub cooldown_ms: u64,
}

impl Default for KlineConfig {
    fn default() -> Self {
        Self {
            page_limit: 1000,
            cooldown_after: 2000,
            cooldown_ms: 100,
        }
    }
}

impl KlineConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_symbols: usize,
    /// Upper bound on in-flight lookups during a batch
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_symbols: 50,
            concurrency: 50,
        }
    }
}

impl Config {
    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml_str(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Invalid TOML configuration")
    }

    /// Overlay environment values looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = non_empty("BINANCE_API_KEY") {
            self.binance.api_key = Some(key);
        }
        if let Some(secret) = non_empty("BINANCE_API_SECRET") {
            self.binance.api_secret = Some(secret);
        }
        if let Some(url) = non_empty("BINANCE_BASE_URL") {
            self.binance.base_url = url;
        }
        if let Some(keys) = non_empty("CMC_API_KEYS") {
            self.cmc.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(key) = non_empty("CMC_API_KEY") {
            if !self.cmc.api_keys.contains(&key) {
                self.cmc.api_keys.push(key);
            }
        }
        if let Some(url) = non_empty("CMC_BASE_URL") {
            self.cmc.base_url = url;
        }
    }
}
