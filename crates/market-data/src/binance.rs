use crate::provider::{HistoryProvider, PriceProvider};
use crate::symbol::normalize_symbol;
use async_trait::async_trait;
use crypto_mcp_common::config::{BinanceConfig, KlineConfig};
use crypto_mcp_common::{
    now_millis, Candle, KlineSeries, MarketDataError, PriceQuote, PriceSource, Result,
};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const PROVIDER: &str = "binance";
const TICKER_PRICE_PATH: &str = "/api/v3/ticker/price";
const KLINES_PATH: &str = "/api/v3/klines";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";
const USER_AGENT: &str = "crypto-mcp/0.1";
/// History window used when no start time is given
const DEFAULT_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// `GET /api/v3/ticker/price` body
#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    price: String,
}

/// Error body Binance attaches to 4xx responses
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    msg: String,
}

/// Binance spot REST client, the primary source for prices and the only
/// source for klines
pub struct BinanceClient {
    client: Client,
    base_url: String,
    klines: KlineConfig,
}

impl BinanceClient {
    pub fn new(config: &BinanceConfig, klines: KlineConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| MarketDataError::Setup(format!("invalid Binance API key: {}", e)))?;
            headers.insert(API_KEY_HEADER, value);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| MarketDataError::Setup(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            klines,
        })
    }

    /// Current ticker price for `symbol`
    pub async fn fetch_price(&self, symbol: &str) -> Result<PriceQuote> {
        let formatted = normalize_symbol(symbol);
        let url = format!("{}{}", self.base_url, TICKER_PRICE_PATH);
        debug!("Calling Binance ticker price for {}", formatted);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", formatted.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        let ticker: TickerPriceResponse = read_json(response).await.map_err(|e| {
            warn!("Binance price lookup failed for {}: {}", formatted, e);
            e
        })?;

        let price = parse_f64(&ticker.price, "price")?;
        if price <= 0.0 {
            return Err(MarketDataError::upstream(
                PROVIDER,
                format!("non-positive price {} for {}", price, formatted),
            ));
        }

        Ok(PriceQuote::new(formatted, price, PriceSource::Primary))
    }

    /// Fetch every candle in `[start_time, end_time)` by walking the kline
    /// endpoint `limit` candles at a time.
    ///
    /// Any failed page aborts the whole walk; partial results are dropped.
    pub async fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: u32,
    ) -> Result<KlineSeries> {
        let formatted = normalize_symbol(symbol);
        let limit = limit.max(1);
        let now = now_millis();
        let target_end = end_time.unwrap_or(now);
        let mut cursor = start_time.unwrap_or(now - DEFAULT_WINDOW_MS);

        let mut all_klines: KlineSeries = Vec::new();
        let mut pages = 0u32;

        while cursor < target_end {
            let batch = self
                .fetch_kline_page(&formatted, interval, cursor, target_end, limit)
                .await
                .map_err(|e| {
                    warn!(
                        "Binance klines page {} failed for {} ({}): {}",
                        pages + 1,
                        formatted,
                        interval,
                        e
                    );
                    e
                })?;
            pages += 1;

            let batch_len = batch.len();
            let Some(last) = batch.last() else {
                break;
            };

            let next_cursor = last.close_time.checked_add(1).ok_or_else(|| {
                MarketDataError::upstream(
                    PROVIDER,
                    format!("kline cursor overflow after close time {}", last.close_time),
                )
            })?;
            if next_cursor <= cursor {
                return Err(MarketDataError::upstream(
                    PROVIDER,
                    format!("kline cursor did not advance past {}", cursor),
                ));
            }
            cursor = next_cursor;
            all_klines.extend(batch);

            debug!(
                "Binance klines page {} for {}: {} candles, {} total, cursor {}",
                pages,
                formatted,
                batch_len,
                all_klines.len(),
                cursor
            );

            if batch_len < limit as usize || cursor >= target_end {
                break;
            }

            if all_klines.len() > self.klines.cooldown_after {
                sleep(self.klines.cooldown()).await;
            }
        }

        info!(
            "Fetched {} {} candles for {} in {} page(s)",
            all_klines.len(),
            interval,
            formatted,
            pages
        );

        Ok(all_klines)
    }

    async fn fetch_kline_page(
        &self,
        symbol: &str,
        interval: &str,
        start_time: i64,
        end_time: i64,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}{}", self.base_url, KLINES_PATH);
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("startTime", start_time.to_string()),
            ("endTime", end_time.to_string()),
            ("limit", limit.to_string()),
        ];

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let rows: Vec<Vec<Value>> = read_json(response).await?;
        rows.iter().map(|row| parse_kline_row(row)).collect()
    }
}

#[async_trait]
impl PriceProvider for BinanceClient {
    async fn get_price(&self, symbol: &str) -> Result<PriceQuote> {
        self.fetch_price(symbol).await
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[async_trait]
impl HistoryProvider for BinanceClient {
    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<KlineSeries> {
        self.fetch_klines(symbol, interval, start_time, end_time, self.klines.page_limit)
            .await
    }
}

fn transport_error(err: reqwest::Error) -> MarketDataError {
    if err.is_timeout() {
        MarketDataError::upstream(PROVIDER, "request timed out")
    } else {
        MarketDataError::upstream(PROVIDER, format!("request failed: {}", err))
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiErrorResponse>(&body)
            .map(|e| e.msg)
            .unwrap_or(body);
        return Err(MarketDataError::upstream(
            PROVIDER,
            format!("HTTP {}: {}", status, detail),
        ));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| MarketDataError::upstream(PROVIDER, format!("malformed response: {}", e)))
}

fn parse_f64(raw: &str, field: &str) -> Result<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            MarketDataError::upstream(PROVIDER, format!("invalid {} value {:?}", field, raw))
        })
}

fn value_f64(value: &Value, field: &str) -> Result<f64> {
    match value {
        Value::String(raw) => parse_f64(raw, field),
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).ok_or_else(|| {
            MarketDataError::upstream(PROVIDER, format!("invalid {} value {}", field, n))
        }),
        other => Err(MarketDataError::upstream(
            PROVIDER,
            format!("invalid {} value {}", field, other),
        )),
    }
}

fn value_i64(value: &Value, field: &str) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(raw) => raw.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        MarketDataError::upstream(PROVIDER, format!("invalid {} value {}", field, value))
    })
}

/// `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`,
/// trailing columns are ignored
fn parse_kline_row(row: &[Value]) -> Result<Candle> {
    if row.len() < 7 {
        return Err(MarketDataError::upstream(
            PROVIDER,
            format!("kline row has {} columns, expected at least 7", row.len()),
        ));
    }

    let candle = Candle {
        open_time: value_i64(&row[0], "open time")?,
        open: value_f64(&row[1], "open")?,
        high: value_f64(&row[2], "high")?,
        low: value_f64(&row[3], "low")?,
        close: value_f64(&row[4], "close")?,
        volume: value_f64(&row[5], "volume")?,
        close_time: value_i64(&row[6], "close time")?,
    };

    if candle.open_time >= candle.close_time {
        return Err(MarketDataError::upstream(
            PROVIDER,
            format!(
                "kline open time {} is not before close time {}",
                candle.open_time, candle.close_time
            ),
        ));
    }

    Ok(candle)
}
