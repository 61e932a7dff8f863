use crate::binance::BinanceClient;
use crate::coinmarketcap::CoinMarketCapClient;
use crate::provider::{HistoryProvider, PriceProvider};
use crypto_mcp_common::config::{BatchConfig, Config};
use crypto_mcp_common::{
    BatchFailure, BatchPrices, KlineSeries, MarketDataError, PriceQuote, Result,
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Routes market data requests across the primary and fallback sources.
///
/// Prices: primary first, then one attempt on the fallback. Klines: primary
/// only, the fallback cannot serve history.
#[derive(Clone)]
pub struct Aggregator {
    primary: Arc<dyn PriceProvider>,
    history: Arc<dyn HistoryProvider>,
    fallback: Arc<dyn PriceProvider>,
    batch: BatchConfig,
}

impl Aggregator {
    pub fn new(
        primary: Arc<dyn PriceProvider>,
        history: Arc<dyn HistoryProvider>,
        fallback: Arc<dyn PriceProvider>,
        batch: BatchConfig,
    ) -> Self {
        Self {
            primary,
            history,
            fallback,
            batch,
        }
    }

    /// Binance as primary and history source, CoinMarketCap as fallback
    pub fn from_config(config: &Config) -> Result<Self> {
        let binance = Arc::new(BinanceClient::new(&config.binance, config.klines.clone())?);
        let cmc = Arc::new(CoinMarketCapClient::new(&config.cmc)?);

        if config.cmc.api_keys.is_empty() {
            warn!("No CoinMarketCap API key configured; price fallback will always fail");
        }

        Ok(Self::new(binance.clone(), binance, cmc, config.batch.clone()))
    }

    pub async fn get_price(&self, symbol: &str) -> Result<PriceQuote> {
        let primary_err = match self.primary.get_price(symbol).await {
            Ok(quote) => return Ok(quote),
            Err(e) => e,
        };

        warn!(
            "{} failed for {}: {}. Switching to {} fallback...",
            self.primary.name(),
            symbol,
            primary_err,
            self.fallback.name()
        );

        match self.fallback.get_price(symbol).await {
            Ok(quote) => Ok(quote),
            Err(fallback_err) => {
                error!(
                    "All sources failed for {} ({}: {})",
                    symbol,
                    self.fallback.name(),
                    fallback_err
                );
                Err(MarketDataError::AllSourcesFailed {
                    symbol: symbol.to_string(),
                })
            }
        }
    }

    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<KlineSeries> {
        self.history
            .get_klines(symbol, interval, start_time, end_time)
            .await
            .map_err(|e| {
                error!("Kline lookup failed for {}: {}", symbol, e);
                MarketDataError::HistoryUnavailable {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                }
            })
    }

    /// Look up every symbol concurrently, partitioning outcomes.
    ///
    /// A failing symbol never affects the others. Results arrive in
    /// completion order.
    pub async fn get_batch_prices(&self, symbols: &[String]) -> Result<BatchPrices> {
        if symbols.is_empty() {
            return Err(MarketDataError::validation("symbols must not be empty"));
        }
        if symbols.len() > self.batch.max_symbols {
            return Err(MarketDataError::validation(format!(
                "at most {} symbols per batch, got {}",
                self.batch.max_symbols,
                symbols.len()
            )));
        }

        let concurrency = self.batch.concurrency.max(1);
        let mut outcomes = stream::iter(symbols.iter())
            .map(|symbol| async move { (symbol, self.get_price(symbol).await) })
            .buffer_unordered(concurrency);

        let mut batch = BatchPrices::default();
        while let Some((symbol, outcome)) = outcomes.next().await {
            match outcome {
                Ok(quote) => batch.succeeded.push(quote),
                Err(e) => batch.failed.push(BatchFailure {
                    symbol: symbol.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        info!(
            "Batch price lookup: {}/{} succeeded",
            batch.succeeded.len(),
            batch.total()
        );

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockHistoryProvider, MockPriceProvider};
    use crypto_mcp_common::{Candle, PriceSource};
    use mockall::predicate::*;

    fn quote(symbol: &str, price: f64, source: PriceSource) -> PriceQuote {
        PriceQuote::new(symbol, price, source)
    }

    fn named(name: &str) -> MockPriceProvider {
        let mut mock = MockPriceProvider::new();
        mock.expect_name().return_const(name.to_string());
        mock
    }

    fn aggregator(
        primary: MockPriceProvider,
        history: MockHistoryProvider,
        fallback: MockPriceProvider,
    ) -> Aggregator {
        Aggregator::new(
            Arc::new(primary),
            Arc::new(history),
            Arc::new(fallback),
            BatchConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        // Given
        let mut primary = named("binance");
        primary
            .expect_get_price()
            .with(eq("BTCUSDT"))
            .times(1)
            .returning(|s| Ok(quote(s, 70000.0, PriceSource::Primary)));
        let mut fallback = named("coinmarketcap");
        fallback.expect_get_price().times(0);

        let agg = aggregator(primary, MockHistoryProvider::new(), fallback);

        // When
        let result = agg.get_price("BTCUSDT").await.unwrap();

        // Then
        assert_eq!(result.source, PriceSource::Primary);
        assert_eq!(result.price, 70000.0);
    }

    #[tokio::test]
    async fn test_primary_failure_falls_back_once() {
        // Given - primary has no such pair
        let mut primary = named("binance");
        primary
            .expect_get_price()
            .times(1)
            .returning(|_| Err(MarketDataError::upstream("binance", "HTTP 400: Invalid symbol.")));
        let mut fallback = named("coinmarketcap");
        fallback
            .expect_get_price()
            .with(eq("eth"))
            .times(1)
            .returning(|_| Ok(quote("ETH", 2500.0, PriceSource::Secondary)));

        let agg = aggregator(primary, MockHistoryProvider::new(), fallback);

        // When
        let result = agg.get_price("eth").await.unwrap();

        // Then
        assert_eq!(result.symbol, "ETH");
        assert_eq!(result.source, PriceSource::Secondary);
    }

    #[tokio::test]
    async fn test_both_sources_failing_yields_consolidated_error() {
        // Given
        let mut primary = named("binance");
        primary
            .expect_get_price()
            .times(1)
            .returning(|_| Err(MarketDataError::upstream("binance", "Network timeout")));
        let mut fallback = named("coinmarketcap");
        fallback
            .expect_get_price()
            .times(1)
            .returning(|_| Err(MarketDataError::upstream("coinmarketcap", "HTTP 401")));

        let agg = aggregator(primary, MockHistoryProvider::new(), fallback);

        // When
        let err = agg.get_price("doge").await.unwrap_err();

        // Then - neither raw provider error leaks
        assert!(matches!(&err, MarketDataError::AllSourcesFailed { symbol } if symbol == "doge"));
        let message = err.to_string();
        assert!(message.contains("doge"));
        assert!(!message.contains("Network timeout"));
        assert!(!message.contains("HTTP 401"));
    }

    #[tokio::test]
    async fn test_kline_failure_never_touches_fallback() {
        // Given
        let mut history = MockHistoryProvider::new();
        history
            .expect_get_klines()
            .times(1)
            .returning(|_, _, _, _| Err(MarketDataError::upstream("binance", "HTTP 400: Invalid interval.")));
        let mut primary = named("binance");
        primary.expect_get_price().times(0);
        let mut fallback = named("coinmarketcap");
        fallback.expect_get_price().times(0);

        let agg = aggregator(primary, history, fallback);

        // When
        let err = agg.get_klines("BTCUSDT", "7m", None, None).await.unwrap_err();

        // Then
        match err {
            MarketDataError::HistoryUnavailable { symbol, reason } => {
                assert_eq!(symbol, "BTCUSDT");
                assert!(reason.contains("Invalid interval"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_klines_pass_through_arguments() {
        // Given
        let candles = vec![Candle {
            open_time: 0,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10.0,
            close_time: 59_999,
        }];
        let expected = candles.clone();
        let mut history = MockHistoryProvider::new();
        history
            .expect_get_klines()
            .with(eq("ETHUSDT"), eq("1m"), eq(Some(0)), eq(Some(60_000)))
            .times(1)
            .returning(move |_, _, _, _| Ok(candles.clone()));

        let agg = aggregator(named("binance"), history, named("coinmarketcap"));

        // When
        let series = agg
            .get_klines("ETHUSDT", "1m", Some(0), Some(60_000))
            .await
            .unwrap();

        // Then
        assert_eq!(series, expected);
    }

    #[tokio::test]
    async fn test_batch_partitions_every_symbol_once() {
        // Given - 50 symbols, 10 unknown to both sources
        let symbols: Vec<String> = (0..50)
            .map(|i| {
                if i % 5 == 0 {
                    format!("BAD{}", i)
                } else {
                    format!("GOOD{}", i)
                }
            })
            .collect();

        let mut primary = named("binance");
        primary.expect_get_price().times(50).returning(|s| {
            if s.starts_with("GOOD") {
                Ok(quote(s, 1.0, PriceSource::Primary))
            } else {
                Err(MarketDataError::upstream("binance", "HTTP 400: Invalid symbol."))
            }
        });
        let mut fallback = named("coinmarketcap");
        fallback
            .expect_get_price()
            .times(10)
            .returning(|s| Err(MarketDataError::upstream("coinmarketcap", format!("symbol {} not found", s))));

        let agg = aggregator(primary, MockHistoryProvider::new(), fallback);

        // When
        let batch = agg.get_batch_prices(&symbols).await.unwrap();

        // Then
        assert_eq!(batch.succeeded.len(), 40);
        assert_eq!(batch.failed.len(), 10);
        assert_eq!(batch.total(), 50);

        let mut seen: Vec<String> = batch
            .succeeded
            .iter()
            .map(|q| q.symbol.clone())
            .chain(batch.failed.iter().map(|f| f.symbol.clone()))
            .collect();
        seen.sort();
        let mut expected = symbols.clone();
        expected.sort();
        assert_eq!(seen, expected);

        assert!(batch
            .failed
            .iter()
            .all(|f| f.reason == format!("Failed to fetch price for {} from all sources", f.symbol)));
    }

    #[tokio::test]
    async fn test_batch_rejects_oversized_and_empty_input() {
        let agg = aggregator(named("binance"), MockHistoryProvider::new(), named("coinmarketcap"));

        let too_many: Vec<String> = (0..51).map(|i| format!("S{}", i)).collect();
        assert!(matches!(
            agg.get_batch_prices(&too_many).await,
            Err(MarketDataError::Validation(_))
        ));
        assert!(matches!(
            agg.get_batch_prices(&[]).await,
            Err(MarketDataError::Validation(_))
        ));
    }
}
