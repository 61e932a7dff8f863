pub mod aggregator;
pub mod binance;
pub mod coinmarketcap;
pub mod provider;
pub mod symbol;

pub use aggregator::Aggregator;
pub use binance::BinanceClient;
pub use coinmarketcap::CoinMarketCapClient;
pub use provider::{HistoryProvider, PriceProvider};
pub use symbol::normalize_symbol;
