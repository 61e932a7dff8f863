use crate::protocol::CallToolResult;
use crate::time_arg::parse_time_arg;
use crypto_mcp_common::{MarketDataError, Result};
use market_data::Aggregator;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

/// Granularities accepted by `get_history`
pub const KLINE_INTERVALS: [&str; 15] = [
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

#[derive(Debug, Deserialize)]
struct PriceArgs {
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct BatchPriceArgs {
    symbols: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryArgs {
    symbol: String,
    interval: String,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
}

/// Tool declarations returned by `tools/list`
pub fn tool_definitions() -> Value {
    json!({
        "tools": [
            {
                "name": "get_price",
                "description": "Get the current price of a cryptocurrency. Tries Binance first, falls back to CoinMarketCap.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "symbol": {
                            "type": "string",
                            "description": "Cryptocurrency symbol (e.g., BTCUSDT, ETHUSDT)"
                        }
                    },
                    "required": ["symbol"]
                }
            },
            {
                "name": "get_batch_prices",
                "description": "Get current prices for up to 50 symbols at once. Each symbol is looked up independently; failures are reported per symbol.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "symbols": {
                            "type": "array",
                            "items": { "type": "string" },
                            "minItems": 1,
                            "maxItems": 50,
                            "description": "Cryptocurrency symbols (e.g., [\"BTCUSDT\", \"ETHUSDT\"])"
                        }
                    },
                    "required": ["symbols"]
                }
            },
            {
                "name": "get_history",
                "description": "Get historical kline (candlestick) data for a cryptocurrency from Binance. Returns an array of arrays: [OpenTime, Open, High, Low, Close, Volume, CloseTime][].",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "symbol": {
                            "type": "string",
                            "description": "Cryptocurrency symbol (e.g., BTCUSDT)"
                        },
                        "interval": {
                            "type": "string",
                            "description": "Candlestick interval (e.g., 1m, 5m, 1h, 1d)",
                            "enum": KLINE_INTERVALS
                        },
                        "startTime": {
                            "type": "string",
                            "description": "Start time in ISO 8601 format (e.g., 2023-01-01T00:00:00Z) or timestamp"
                        },
                        "endTime": {
                            "type": "string",
                            "description": "End time in ISO 8601 format (optional, defaults to now)"
                        }
                    },
                    "required": ["symbol", "interval"]
                }
            }
        ]
    })
}

/// Validates tool arguments and dispatches them to the aggregator
#[derive(Clone)]
pub struct ToolRouter {
    aggregator: Aggregator,
}

impl ToolRouter {
    pub fn new(aggregator: Aggregator) -> Self {
        Self { aggregator }
    }

    /// Run a tool.
    ///
    /// Every failure, an unknown tool name included, becomes an error result
    /// so the caller sees the reason.
    pub async fn call(&self, name: &str, arguments: Value) -> CallToolResult {
        let outcome = match name {
            "get_price" => self.get_price(arguments).await,
            "get_batch_prices" => self.get_batch_prices(arguments).await,
            "get_history" => self.get_history(arguments).await,
            other => {
                error!("Unknown tool requested: {}", other);
                return CallToolResult::error(&format!("Unknown tool: {}", other));
            }
        };

        match outcome {
            Ok(text) => CallToolResult::text(text),
            Err(e) => {
                error!("Error executing tool {}: {}", name, e);
                CallToolResult::error(&e.to_string())
            }
        }
    }

    async fn get_price(&self, arguments: Value) -> Result<String> {
        let args: PriceArgs = parse_args(arguments)?;
        let quote = self.aggregator.get_price(&args.symbol).await?;
        to_json(&quote)
    }

    async fn get_batch_prices(&self, arguments: Value) -> Result<String> {
        let args: BatchPriceArgs = parse_args(arguments)?;
        let batch = self.aggregator.get_batch_prices(&args.symbols).await?;
        to_json(&batch)
    }

    async fn get_history(&self, arguments: Value) -> Result<String> {
        let args: HistoryArgs = parse_args(arguments)?;

        if !KLINE_INTERVALS.contains(&args.interval.as_str()) {
            return Err(MarketDataError::validation(format!(
                "interval must be one of {}",
                KLINE_INTERVALS.join(", ")
            )));
        }

        let start = time_bound(args.start_time.as_deref())?;
        let end = time_bound(args.end_time.as_deref())?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(MarketDataError::validation(
                    "startTime must not be after endTime",
                ));
            }
        }

        let series = self
            .aggregator
            .get_klines(&args.symbol, &args.interval, start, end)
            .await?;
        info!("get_history {} {}: {} candles", args.symbol, args.interval, series.len());
        to_json(&series)
    }
}

/// A blank time argument means the bound was not given
fn time_bound(raw: Option<&str>) -> Result<Option<i64>> {
    raw.filter(|r| !r.trim().is_empty())
        .map(parse_time_arg)
        .transpose()
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| MarketDataError::validation(e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| MarketDataError::validation(format!("failed to serialize result: {}", e)))
}
