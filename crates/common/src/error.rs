use thiserror::Error;

/// Errors surfaced by the market data core
#[derive(Debug, Error)]
pub enum MarketDataError {
    /// A single provider call failed (network, timeout, status, malformed body)
    #[error("{provider} request failed: {message}")]
    Upstream {
        provider: &'static str,
        message: String,
    },

    /// Every price source failed for the symbol
    #[error("Failed to fetch price for {symbol} from all sources")]
    AllSourcesFailed { symbol: String },

    /// The history source failed; there is no fallback for klines
    #[error("Failed to fetch klines for {symbol}: {reason}. Historical data has no fallback source")]
    HistoryUnavailable { symbol: String, reason: String },

    /// Malformed or missing arguments
    #[error("Invalid arguments: {0}")]
    Validation(String),

    /// A provider client could not be constructed
    #[error("Provider setup failed: {0}")]
    Setup(String),
}

impl MarketDataError {
    pub fn upstream(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, MarketDataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consolidated_error_names_symbol() {
        let err = MarketDataError::AllSourcesFailed {
            symbol: "BTCUSDT".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to fetch price for BTCUSDT from all sources"
        );
    }

    #[test]
    fn test_upstream_error_message() {
        let err = MarketDataError::upstream("binance", "HTTP 400: Invalid symbol.");
        assert_eq!(err.to_string(), "binance request failed: HTTP 400: Invalid symbol.");
    }
}
