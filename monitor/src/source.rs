use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::QuoteSourceError;
use crate::types::AssetQuote;

/// Result of one request/response quote call.
#[derive(Debug, Clone, Default)]
pub struct QuoteBatch {
    /// Quotes in upstream response order.
    pub quotes: Vec<AssetQuote>,
    /// Same quotes keyed by product id.
    pub by_product_id: HashMap<String, AssetQuote>,
}

impl QuoteBatch {
    pub fn from_quotes(quotes: Vec<AssetQuote>) -> Self {
        let by_product_id = quotes
            .iter()
            .map(|q| (q.product_id().to_string(), q.clone()))
            .collect();

        Self {
            quotes,
            by_product_id,
        }
    }
}

/// Synchronous quote lookup for a set of product ids.
///
/// Shared between the monitor and its poller, so implementations must tolerate
/// concurrent calls.
#[async_trait]
pub trait QuoteSource: Send + Sync + 'static {
    async fn get_asset_quotes(&self, product_ids: &[String]) -> Result<QuoteBatch, QuoteSourceError>;
}
