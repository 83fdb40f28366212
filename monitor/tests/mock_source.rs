#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;

use monitor::config::MonitorConfig;
use monitor::error::{MonitorError, QuoteSourceError, StreamerError};
use monitor::manager::PriceMonitor;
use monitor::source::{QuoteBatch, QuoteSource};
use monitor::streamer::{Streamer, StreamerConfig};
use monitor::types::{AssetClass, AssetQuote, Exchange, MessageUpdate, Meta, QuotePrice};

/// In-memory quote table. Returns quotes for requested ids it knows, in request order.
#[derive(Default)]
pub struct MockQuoteSource {
    quotes: Mutex<HashMap<String, AssetQuote>>,
    calls: Mutex<Vec<Vec<String>>>,
    delays: Mutex<HashMap<Vec<String>, Duration>>,
    failing: AtomicBool,
}

impl MockQuoteSource {
    pub fn new(quotes: Vec<AssetQuote>) -> Arc<Self> {
        let source = Self::default();
        for q in quotes {
            source.upsert(q);
        }
        Arc::new(source)
    }

    pub fn upsert(&self, quote: AssetQuote) {
        self.quotes
            .lock()
            .insert(quote.meta.symbol_in_source_api.clone(), quote);
    }

    pub fn set_price(&self, product_id: &str, price: f64) {
        if let Some(q) = self.quotes.lock().get_mut(product_id) {
            q.quote_price.price = price;
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Holds every call for exactly `product_ids` for `delay` before answering.
    pub fn delay_call(&self, product_ids: &[&str], delay: Duration) {
        self.delays.lock().insert(ids(product_ids), delay);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl QuoteSource for MockQuoteSource {
    async fn get_asset_quotes(&self, product_ids: &[String]) -> Result<QuoteBatch, QuoteSourceError> {
        self.calls.lock().push(product_ids.to_vec());

        let delay = self.delays.lock().get(product_ids).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(QuoteSourceError::Unavailable("mock outage".into()));
        }

        let table = self.quotes.lock();
        let quotes = product_ids
            .iter()
            .filter_map(|id| table.get(id).cloned())
            .collect();

        Ok(QuoteBatch::from_quotes(quotes))
    }
}

/// What a `MockStreamer` saw, shared with the test body.
#[derive(Default)]
pub struct StreamerProbe {
    tx_quote_price: Mutex<Option<Sender<MessageUpdate<QuotePrice>>>>,
    subscriptions: Mutex<Vec<(Vec<String>, u64)>>,
    started: AtomicBool,
    url: Mutex<Option<String>>,
}

impl StreamerProbe {
    pub fn price_sender(&self) -> Sender<MessageUpdate<QuotePrice>> {
        self.tx_quote_price
            .lock()
            .clone()
            .expect("streamer built")
    }

    pub fn subscriptions(&self) -> Vec<(Vec<String>, u64)> {
        self.subscriptions.lock().clone()
    }

    pub fn last_subscription(&self) -> Option<(Vec<String>, u64)> {
        self.subscriptions.lock().last().cloned()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> Option<String> {
        self.url.lock().clone()
    }
}

pub struct MockStreamer {
    probe: Arc<StreamerProbe>,
    _config: StreamerConfig,
}

impl MockStreamer {
    pub fn builder(probe: Arc<StreamerProbe>) -> impl FnOnce(StreamerConfig) -> MockStreamer {
        move |config| {
            *probe.tx_quote_price.lock() = Some(config.tx_quote_price.clone());
            MockStreamer {
                probe,
                _config: config,
            }
        }
    }
}

#[async_trait]
impl Streamer for MockStreamer {
    async fn start(&self) -> Result<(), StreamerError> {
        if self.probe.started.swap(true, Ordering::SeqCst) {
            return Err(StreamerError::AlreadyStarted);
        }
        Ok(())
    }

    fn set_url(&self, url: String) -> Result<(), StreamerError> {
        if self.probe.is_started() {
            return Err(StreamerError::UrlLocked);
        }
        *self.probe.url.lock() = Some(url);
        Ok(())
    }

    async fn set_symbols_and_update_subscriptions(
        &self,
        product_ids: Vec<String>,
        version_vector: u64,
    ) -> Result<(), StreamerError> {
        self.probe
            .subscriptions
            .lock()
            .push((product_ids, version_vector));
        Ok(())
    }
}

pub fn spot(product_id: &str, price: f64) -> AssetQuote {
    AssetQuote {
        name: product_id.to_string(),
        symbol: product_id.to_string(),
        class: AssetClass::Spot,
        quote_price: QuotePrice {
            price,
            price_day_high: price,
            ..Default::default()
        },
        exchange: Exchange {
            name: "Coinbase".into(),
            is_active: true,
            is_regular_trading_session: true,
            ..Default::default()
        },
        meta: Meta {
            symbol_in_source_api: product_id.to_string(),
        },
        ..Default::default()
    }
}

pub fn future(product_id: &str, underlying: &str, price: f64) -> AssetQuote {
    let mut q = spot(product_id, price);
    q.class = AssetClass::FuturesContract;
    q.quote_futures.symbol_underlying = underlying.to_string();
    q
}

pub fn ids(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

pub struct Harness {
    pub monitor: PriceMonitor<MockQuoteSource, MockStreamer>,
    pub source: Arc<MockQuoteSource>,
    pub probe: Arc<StreamerProbe>,
    pub rx_update: Receiver<MessageUpdate<AssetQuote>>,
    pub rx_error: Receiver<MonitorError>,
    pub rx_rates: Receiver<Vec<String>>,
    pub cancel: CancellationToken,
}

pub fn harness(quotes: Vec<AssetQuote>, refresh_interval: Option<Duration>) -> Harness {
    let source = MockQuoteSource::new(quotes);
    let probe = Arc::new(StreamerProbe::default());
    let cancel = CancellationToken::new();

    let (tx_update, rx_update) = mpsc::channel(16);
    let (tx_error, rx_error) = mpsc::channel(16);
    let (tx_rates, rx_rates) = mpsc::channel(16);

    let monitor = PriceMonitor::new(
        MonitorConfig {
            cancel: cancel.clone(),
            tx_error,
            tx_update_asset_quote: tx_update,
            tx_request_currency_rates: tx_rates,
            streaming_url: Some("wss://example.invalid".into()),
            refresh_interval,
        },
        Arc::clone(&source),
        MockStreamer::builder(Arc::clone(&probe)),
    )
    .expect("monitor builds");

    Harness {
        monitor,
        source,
        probe,
        rx_update,
        rx_error,
        rx_rates,
        cancel,
    }
}
