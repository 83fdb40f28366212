use async_trait::async_trait;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::error::StreamerError;
use crate::types::{MessageUpdate, QuoteExtended, QuotePrice};

/// Wiring handed to a streamer when the monitor builds it.
#[derive(Clone)]
pub struct StreamerConfig {
    /// Child of the monitor's token; cancelled on `stop`.
    pub cancel: CancellationToken,
    pub tx_quote_price: Sender<MessageUpdate<QuotePrice>>,
    pub tx_quote_extended: Sender<MessageUpdate<QuoteExtended>>,
}

/// Push subscription for spot product ids.
#[async_trait]
pub trait Streamer: Send + Sync + 'static {
    async fn start(&self) -> Result<(), StreamerError>;

    /// Only valid before `start`.
    fn set_url(&self, url: String) -> Result<(), StreamerError>;

    /// Replaces the subscribed set. Updates published afterwards carry `version_vector`.
    async fn set_symbols_and_update_subscriptions(
        &self,
        product_ids: Vec<String>,
        version_vector: u64,
    ) -> Result<(), StreamerError>;
}
