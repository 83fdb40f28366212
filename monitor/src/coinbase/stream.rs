use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_tungstenite::{connect_async, tungstenite};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, trace, warn};

use crate::coinbase::parser::{parse_feed_message, ticker_to_quote};
use crate::coinbase::types::{FeedMessage, SubscriptionKind, SubscriptionRequest, Ticker};
use crate::config::DEFAULT_STREAMING_URL;
use crate::error::StreamerError;
use crate::poller::send_or_cancel;
use crate::streamer::{Streamer, StreamerConfig};
use crate::types::MessageUpdate;

const OUTBOUND_CAPACITY: usize = 16;

#[derive(Debug, Default)]
struct Subscriptions {
    product_ids: Vec<String>,
    version_vector: u64,
}

/// Ticker-channel client for the Coinbase exchange websocket feed.
///
/// One connection per instance. Reconnection is left to the embedder.
pub struct CoinbaseStreamer {
    url: Mutex<String>,
    is_started: AtomicBool,
    subscriptions: Arc<Mutex<Subscriptions>>,
    outbound: Mutex<Option<Sender<Message>>>,
    config: StreamerConfig,
}

impl CoinbaseStreamer {
    pub fn new(config: StreamerConfig) -> Self {
        Self {
            url: Mutex::new(DEFAULT_STREAMING_URL.to_string()),
            is_started: AtomicBool::new(false),
            subscriptions: Arc::new(Mutex::new(Subscriptions::default())),
            outbound: Mutex::new(None),
            config,
        }
    }

    pub fn url(&self) -> String {
        self.url.lock().clone()
    }

    pub fn product_ids(&self) -> Vec<String> {
        self.subscriptions.lock().product_ids.clone()
    }
}

#[async_trait]
impl Streamer for CoinbaseStreamer {
    #[instrument(skip(self), fields(url = %self.url()))]
    async fn start(&self) -> Result<(), StreamerError> {
        if self.is_started.swap(true, Ordering::AcqRel) {
            return Err(StreamerError::AlreadyStarted);
        }

        let url = self.url();
        let (ws, _) = match connect_async(url.as_str()).await {
            Ok(conn) => conn,
            Err(e) => {
                self.is_started.store(false, Ordering::Release);
                return Err(StreamerError::WebSocket(Box::new(e)));
            }
        };
        info!("websocket connection established");

        let (write, read) = ws.split();
        let (tx_outbound, rx_outbound) = mpsc::channel(OUTBOUND_CAPACITY);

        tokio::spawn(
            write_loop(write, rx_outbound, self.config.cancel.clone())
                .instrument(tracing::info_span!("coinbase_ws_writer")),
        );

        let reader = FeedReader {
            subscriptions: Arc::clone(&self.subscriptions),
            config: self.config.clone(),
        };
        tokio::spawn(reader.run(read).instrument(tracing::info_span!("coinbase_ws_reader")));

        *self.outbound.lock() = Some(tx_outbound.clone());

        let product_ids = self.product_ids();
        if !product_ids.is_empty() {
            send_subscription(&tx_outbound, SubscriptionKind::Subscribe, &product_ids).await?;
        }

        Ok(())
    }

    fn set_url(&self, url: String) -> Result<(), StreamerError> {
        if self.is_started.load(Ordering::Acquire) {
            return Err(StreamerError::UrlLocked);
        }

        *self.url.lock() = url;
        Ok(())
    }

    async fn set_symbols_and_update_subscriptions(
        &self,
        product_ids: Vec<String>,
        version_vector: u64,
    ) -> Result<(), StreamerError> {
        let (added, removed) = {
            let mut subs = self.subscriptions.lock();

            let current: HashSet<&String> = subs.product_ids.iter().collect();
            let next: HashSet<&String> = product_ids.iter().collect();

            let added: Vec<String> = product_ids
                .iter()
                .filter(|id| !current.contains(id))
                .cloned()
                .collect();
            let removed: Vec<String> = subs
                .product_ids
                .iter()
                .filter(|id| !next.contains(id))
                .cloned()
                .collect();

            subs.product_ids = product_ids;
            subs.version_vector = version_vector;

            (added, removed)
        };

        // Not connected yet: `start` subscribes whatever is recorded.
        let Some(tx) = self.outbound.lock().clone() else {
            return Ok(());
        };

        if !removed.is_empty() {
            send_subscription(&tx, SubscriptionKind::Unsubscribe, &removed).await?;
        }
        if !added.is_empty() {
            send_subscription(&tx, SubscriptionKind::Subscribe, &added).await?;
        }

        Ok(())
    }
}

async fn send_subscription(
    tx: &Sender<Message>,
    kind: SubscriptionKind,
    product_ids: &[String],
) -> Result<(), StreamerError> {
    let text = serde_json::to_string(&SubscriptionRequest::ticker(kind, product_ids))?;
    debug!(?kind, count = product_ids.len(), "sending subscription update");

    tx.send(Message::Text(text.into()))
        .await
        .map_err(|_| StreamerError::WriterClosed)
}

async fn write_loop<W>(mut sink: W, mut rx: Receiver<Message>, cancel: CancellationToken)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "websocket close failed");
                }
                return;
            }
            msg = rx.recv() => {
                let Some(msg) = msg else {
                    return;
                };
                if let Err(e) = sink.send(msg).await {
                    warn!(error = %e, "failed to write to websocket");
                    return;
                }
            }
        }
    }
}

struct FeedReader {
    subscriptions: Arc<Mutex<Subscriptions>>,
    config: StreamerConfig,
}

impl FeedReader {
    async fn run<R>(self, mut stream: R)
    where
        R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::select! {
                _ = self.config.cancel.cancelled() => return,
                msg = stream.next() => msg,
            };

            let msg = match msg {
                Some(Ok(m)) => m,
                Some(Err(e)) => {
                    warn!(error = ?e, "websocket stream error");
                    return;
                }
                None => {
                    warn!("websocket stream closed by server");
                    return;
                }
            };

            if !msg.is_text() {
                continue;
            }

            let Ok(raw) = msg.to_text() else {
                continue;
            };

            match parse_feed_message(raw) {
                Ok(FeedMessage::Ticker(ticker)) => {
                    if !self.forward_ticker(&ticker).await {
                        return;
                    }
                }
                Ok(FeedMessage::Subscriptions { channels }) => {
                    debug!(channels = channels.len(), "subscriptions acknowledged");
                }
                Ok(FeedMessage::Error { message, reason }) => {
                    warn!(%message, %reason, "feed reported an error");
                }
                Ok(FeedMessage::Other) => trace!("ignoring feed message"),
                Err(e) => warn!(error = %e, raw = %raw, "failed to parse feed message"),
            }
        }
    }

    /// Publishes price and extended updates. False once downstream is gone.
    async fn forward_ticker(&self, ticker: &Ticker) -> bool {
        let (quote_price, quote_extended) = match ticker_to_quote(ticker) {
            Ok(q) => q,
            Err(e) => {
                warn!(error = %e, "dropping malformed ticker");
                return true;
            }
        };

        let version_vector = self.subscriptions.lock().version_vector;
        let cancel = &self.config.cancel;

        let price = MessageUpdate {
            id: ticker.product_id.clone(),
            data: quote_price,
            version_vector,
        };
        if !send_or_cancel(cancel, &self.config.tx_quote_price, price).await {
            return false;
        }

        let extended = MessageUpdate {
            id: ticker.product_id.clone(),
            data: quote_extended,
            version_vector,
        };
        send_or_cancel(cancel, &self.config.tx_quote_extended, extended).await
    }
}
