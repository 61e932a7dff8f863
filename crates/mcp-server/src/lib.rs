//! Model Context Protocol front end for the market data aggregator.
//!
//! Speaks newline-delimited JSON-RPC 2.0 and exposes `get_price`,
//! `get_batch_prices` and `get_history` as tools.

pub mod protocol;
pub mod server;
pub mod time_arg;
pub mod tools;

pub use server::McpServer;
pub use tools::ToolRouter;

pub const SERVER_NAME: &str = "crypto-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
