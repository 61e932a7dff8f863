use crate::provider::PriceProvider;
use crate::symbol::{base_asset, normalize_symbol};
use async_trait::async_trait;
use crypto_mcp_common::config::CmcConfig;
use crypto_mcp_common::{MarketDataError, PriceQuote, PriceSource, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

const PROVIDER: &str = "coinmarketcap";
const QUOTES_PATH: &str = "/v2/cryptocurrency/quotes/latest";
const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";
const CONVERT: &str = "USD";
const USER_AGENT: &str = "crypto-mcp/0.1";

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    #[serde(default)]
    status: Option<ApiStatus>,
    #[serde(default)]
    data: HashMap<String, Vec<Listing>>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    name: Option<String>,
    #[serde(default)]
    quote: HashMap<String, Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    price: Option<f64>,
    volume_24h: Option<f64>,
    percent_change_24h: Option<f64>,
}

/// CoinMarketCap quotes client.
///
/// Price lookups only; CoinMarketCap is never asked for history.
pub struct CoinMarketCapClient {
    client: Client,
    base_url: String,
    api_keys: Vec<String>,
    next_key: AtomicUsize,
}

impl CoinMarketCapClient {
    pub fn new(config: &CmcConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MarketDataError::Setup(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_keys: config.api_keys.clone(),
            next_key: AtomicUsize::new(0),
        })
    }

    /// Next API key in round-robin order
    fn api_key(&self) -> Option<&str> {
        if self.api_keys.is_empty() {
            return None;
        }
        let index = self.next_key.fetch_add(1, Ordering::Relaxed) % self.api_keys.len();
        Some(self.api_keys[index].as_str())
    }

    pub async fn fetch_price(&self, symbol: &str) -> Result<PriceQuote> {
        let formatted = normalize_symbol(symbol);
        let asset = base_asset(&formatted).to_string();

        let api_key = self
            .api_key()
            .ok_or_else(|| MarketDataError::upstream(PROVIDER, "no API key configured"))?;

        let url = format!("{}{}", self.base_url, QUOTES_PATH);
        debug!("Calling CoinMarketCap quotes for {} ({})", asset, formatted);

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, api_key)
            .query(&[("symbol", asset.as_str()), ("convert", CONVERT)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MarketDataError::upstream(PROVIDER, "request timed out")
                } else {
                    MarketDataError::upstream(PROVIDER, format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MarketDataError::upstream(PROVIDER, format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<QuotesResponse>(&body)
                .ok()
                .and_then(|r| r.status)
                .and_then(|s| s.error_message)
                .unwrap_or(body);
            warn!("CoinMarketCap lookup failed for {}: HTTP {}", asset, status);
            return Err(MarketDataError::upstream(
                PROVIDER,
                format!("HTTP {}: {}", status, detail),
            ));
        }

        let parsed: QuotesResponse = serde_json::from_str(&body)
            .map_err(|e| MarketDataError::upstream(PROVIDER, format!("malformed response: {}", e)))?;

        into_quote(parsed, &asset, formatted)
    }
}

fn into_quote(response: QuotesResponse, asset: &str, symbol: String) -> Result<PriceQuote> {
    let listing = response
        .data
        .into_iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(asset))
        .and_then(|(_, listings)| listings.into_iter().next())
        .ok_or_else(|| {
            MarketDataError::upstream(PROVIDER, format!("symbol {} not found", asset))
        })?;

    let Listing { name, mut quote } = listing;
    let usd = quote.remove(CONVERT).ok_or_else(|| {
        MarketDataError::upstream(PROVIDER, format!("no {} quote for {}", CONVERT, asset))
    })?;

    let price = usd
        .price
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| {
            MarketDataError::upstream(PROVIDER, format!("no usable price for {}", asset))
        })?;

    let mut price_quote = PriceQuote::new(symbol, price, PriceSource::Secondary);
    price_quote.name = name;
    price_quote.price_change_percent = usd.percent_change_24h;
    price_quote.quote_volume = usd.volume_24h;
    Ok(price_quote)
}

#[async_trait]
impl PriceProvider for CoinMarketCapClient {
    async fn get_price(&self, symbol: &str) -> Result<PriceQuote> {
        self.fetch_price(symbol).await
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
