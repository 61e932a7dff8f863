use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Which upstream produced a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    /// Binance spot API
    Primary,
    /// CoinMarketCap quotes API, only consulted as a fallback
    Secondary,
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceSource::Primary => write!(f, "primary"),
            PriceSource::Secondary => write!(f, "secondary"),
        }
    }
}

/// Normalized spot price for a single symbol.
///
/// `price` is always present and finite. The 24h statistics depend on what
/// the answering source exposes and are omitted from JSON when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_change_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    pub source: PriceSource,
    /// Capture time in epoch milliseconds
    pub timestamp: i64,
}

impl PriceQuote {
    /// Quote with only the required fields populated, stamped with the current time
    pub fn new(symbol: impl Into<String>, price: f64, source: PriceSource) -> Self {
        Self {
            symbol: symbol.into(),
            name: None,
            price,
            price_change: None,
            price_change_percent: None,
            volume: None,
            quote_volume: None,
            high: None,
            low: None,
            source,
            timestamp: now_millis(),
        }
    }
}

/// One candlestick.
///
/// On the wire a candle is the 7-element array
/// `[openTime, open, high, low, close, volume, closeTime]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

type CandleTuple = (i64, f64, f64, f64, f64, f64, i64);

impl Serialize for Candle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tuple: CandleTuple = (
            self.open_time,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.close_time,
        );
        tuple.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Candle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (open_time, open, high, low, close, volume, close_time) =
            CandleTuple::deserialize(deserializer)?;
        Ok(Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time,
        })
    }
}

/// Chronologically ordered candles, concatenated across pagination pages
pub type KlineSeries = Vec<Candle>;

/// A symbol whose lookup failed inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub symbol: String,
    pub reason: String,
}

/// Partitioned outcome of a batch price lookup.
///
/// Both collections are in completion order, not input order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchPrices {
    pub succeeded: Vec<PriceQuote>,
    pub failed: Vec<BatchFailure>,
}

impl BatchPrices {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

#[derive(Serialize)]
struct BatchPricesWire<'a> {
    count: usize,
    total: usize,
    failed: usize,
    prices: &'a [PriceQuote],
    errors: &'a [BatchFailure],
}

impl Serialize for BatchPrices {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BatchPricesWire {
            count: self.succeeded.len(),
            total: self.total(),
            failed: self.failed.len(),
            prices: &self.succeeded,
            errors: &self.failed,
        }
        .serialize(serializer)
    }
}

/// Current wall clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_candle_serializes_as_seven_element_array() {
        let candle = Candle {
            open_time: 1_700_000_000_000,
            open: 35000.5,
            high: 35100.0,
            low: 34900.25,
            close: 35050.0,
            volume: 12.5,
            close_time: 1_700_000_059_999,
        };

        let value = serde_json::to_value(candle).unwrap();
        assert_eq!(
            value,
            json!([1_700_000_000_000i64, 35000.5, 35100.0, 34900.25, 35050.0, 12.5, 1_700_000_059_999i64])
        );

        let back: Candle = serde_json::from_value(value).unwrap();
        assert_eq!(back, candle);
    }

    #[test]
    fn test_price_quote_omits_absent_fields() {
        let mut quote = PriceQuote::new("ETH", 2500.0, PriceSource::Secondary);
        quote.timestamp = 1_700_000_000_000;

        let value = serde_json::to_value(&quote).unwrap();
        assert_eq!(
            value,
            json!({
                "symbol": "ETH",
                "price": 2500.0,
                "source": "secondary",
                "timestamp": 1_700_000_000_000i64,
            })
        );
    }

    #[test]
    fn test_price_quote_uses_camel_case_keys() {
        let mut quote = PriceQuote::new("BTCUSDT", 70000.0, PriceSource::Primary);
        quote.price_change_percent = Some(1.5);
        quote.quote_volume = Some(1_000_000.0);

        let value = serde_json::to_value(&quote).unwrap();
        assert_eq!(value["priceChangePercent"], json!(1.5));
        assert_eq!(value["quoteVolume"], json!(1_000_000.0));
        assert_eq!(value["source"], json!("primary"));
    }

    #[test]
    fn test_batch_prices_wire_format() {
        let batch = BatchPrices {
            succeeded: vec![PriceQuote::new("BTCUSDT", 70000.0, PriceSource::Primary)],
            failed: vec![BatchFailure {
                symbol: "NOPE".to_string(),
                reason: "Failed to fetch price for NOPE from all sources".to_string(),
            }],
        };

        let value = serde_json::to_value(&batch).unwrap();
        assert_eq!(value["count"], json!(1));
        assert_eq!(value["total"], json!(2));
        assert_eq!(value["failed"], json!(1));
        assert_eq!(value["prices"][0]["symbol"], json!("BTCUSDT"));
        assert_eq!(value["errors"][0]["symbol"], json!("NOPE"));
    }
}
