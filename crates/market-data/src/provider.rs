use async_trait::async_trait;
use crypto_mcp_common::{KlineSeries, PriceQuote, Result};

/// Spot price capability, implemented by every upstream source
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Fetch the current price for a free-form symbol
    async fn get_price(&self, symbol: &str) -> Result<PriceQuote>;

    /// Get the name of the upstream
    fn name(&self) -> &str;
}

/// Candlestick history capability.
///
/// Kept apart from [`PriceProvider`] so a source without history support
/// simply does not implement it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Fetch every candle between `start_time` and `end_time` (epoch ms).
    ///
    /// Missing bounds default to the last 24 hours.
    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<KlineSeries>;
}
