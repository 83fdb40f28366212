//! Coinbase adapters: the request/response product API as a `QuoteSource`
//! and the exchange websocket feed as a `Streamer`.

pub mod client;
pub mod parser;
pub mod stream;
pub mod types;

use std::sync::Arc;

pub use client::CoinbaseUnaryApi;
pub use stream::CoinbaseStreamer;

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::manager::PriceMonitor;

/// Builds a monitor backed by the Coinbase product API and websocket feed.
pub fn new_coinbase_monitor(
    unary_url: &str,
    config: MonitorConfig,
) -> Result<PriceMonitor<CoinbaseUnaryApi, CoinbaseStreamer>, MonitorError> {
    let source = Arc::new(CoinbaseUnaryApi::new(unary_url)?);
    PriceMonitor::new(config, source, CoinbaseStreamer::new)
}
