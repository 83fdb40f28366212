//! Price monitor: the single owner of the quote cache.
//!
//! Responsibilities:
//! - Split the requested product ids between the streamer (spot) and the poller (derivatives).
//! - Resolve derivatives to their underlying so basis can be computed on every refresh.
//! - Rebuild the cache synchronously on symbol changes, forced refreshes and rate changes.
//! - Merge streamed and polled updates into the cache and republish them to the caller.
//!
//! Locking:
//! - `state` guards the cache, the symbol sets and the underlying map.
//! - `currency_rates` is separate. A refresh reads rates first and releases that
//!   lock before it takes the state write lock, so the two are never nested.
//!
//! A synchronous refresh always replaces the cache wholesale; only the merge
//! loop mutates individual entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::logger::warn_if_slow;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, trace, warn};

use crate::cache::{QuoteCache, RequestedSymbols, build_cache};
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::poller::{Poller, PollerConfig, send_or_cancel};
use crate::source::QuoteSource;
use crate::streamer::{Streamer, StreamerConfig};
use crate::symbols::{
    FROM_CURRENCY_CODE, dedup_sorted, has_underlying_product_id, merge_product_ids,
    partition_product_ids,
};
use crate::types::{AssetQuote, CurrencyRates, MessageUpdate, QuoteExtended, QuotePrice};

/// Capacity of the channels between the transports and the merge loop.
/// Kept at the minimum so transports feel the merge loop's pace.
const TRANSPORT_CHANNEL_CAPACITY: usize = 1;

const SLOW_UPSTREAM_CALL: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct MonitorState {
    /// Explicitly requested product ids.
    requested: RequestedSymbols,
    /// Requested ids plus underlyings needed for basis.
    product_ids: Vec<String>,
    product_ids_streaming: Vec<String>,
    product_ids_polling: Vec<String>,
    /// Derivative -> underlying. Entries are never removed.
    underlying_by_product_id: HashMap<String, String>,
    cache: QuoteCache,
    /// Bumped whenever the working set changes. A refresh started under an
    /// older generation is not swapped in.
    generation: u64,
    has_requested_currency_rates: bool,
}

struct UpdateReceivers {
    rx_quote_price: Receiver<MessageUpdate<QuotePrice>>,
    rx_quote_extended: Receiver<MessageUpdate<QuoteExtended>>,
    rx_poll_asset_quote: Receiver<MessageUpdate<AssetQuote>>,
}

pub struct PriceMonitor<Q, S> {
    source: Arc<Q>,
    streamer: S,
    poller: Poller<Q>,
    state: Arc<RwLock<MonitorState>>,
    currency_rates: RwLock<CurrencyRates>,
    receivers: Mutex<Option<UpdateReceivers>>,
    cancel: CancellationToken,
    is_started: AtomicBool,
    tx_update_asset_quote: Sender<MessageUpdate<AssetQuote>>,
    tx_request_currency_rates: Sender<Vec<String>>,
}

impl<Q: QuoteSource, S: Streamer> PriceMonitor<Q, S> {
    /// Wires the poller and the streamer to the merge loop's channels.
    ///
    /// `build_streamer` receives the channels the streamer must publish on.
    /// Fails if the optional streaming URL or refresh interval is rejected.
    pub fn new<F>(config: MonitorConfig, source: Arc<Q>, build_streamer: F) -> Result<Self, MonitorError>
    where
        F: FnOnce(StreamerConfig) -> S,
    {
        let cancel = config.cancel.child_token();

        let (tx_quote_price, rx_quote_price) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
        let (tx_quote_extended, rx_quote_extended) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
        let (tx_poll_asset_quote, rx_poll_asset_quote) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);

        let poller = Poller::new(
            &cancel,
            PollerConfig {
                source: Arc::clone(&source),
                tx_update_asset_quote: tx_poll_asset_quote,
                tx_error: config.tx_error,
            },
        );

        let streamer = build_streamer(StreamerConfig {
            cancel: cancel.child_token(),
            tx_quote_price,
            tx_quote_extended,
        });

        if let Some(url) = config.streaming_url {
            streamer.set_url(url)?;
        }

        if let Some(interval) = config.refresh_interval {
            poller.set_refresh_interval(interval)?;
        }

        Ok(Self {
            source,
            streamer,
            poller,
            state: Arc::new(RwLock::new(MonitorState::default())),
            currency_rates: RwLock::new(CurrencyRates::new()),
            receivers: Mutex::new(Some(UpdateReceivers {
                rx_quote_price,
                rx_quote_extended,
                rx_poll_asset_quote,
            })),
            cancel,
            is_started: AtomicBool::new(false),
            tx_update_asset_quote: config.tx_update_asset_quote,
            tx_request_currency_rates: config.tx_request_currency_rates,
        })
    }

    /// Replaces the requested product ids.
    ///
    /// Flow:
    /// 1) Dedup + sort, record the requested set.
    /// 2) First call only: ask for default currency rates.
    /// 3) Resolve new derivatives to their underlyings, extending the working set.
    /// 4) Partition the working set into streaming and polling subsets.
    /// 5) Refresh the cache so the new set is visible when this returns.
    /// 6) Hand the subsets and `version_vector` to the streamer and the poller.
    ///
    /// If the refresh fails neither transport has been reconfigured.
    #[instrument(skip(self, product_ids), fields(count = product_ids.len()))]
    pub async fn set_symbols(&self, product_ids: Vec<String>, version_vector: u64) -> Result<(), MonitorError> {
        let product_ids = dedup_sorted(product_ids);

        let should_request_rates = {
            let mut state = self.state.write();
            state.product_ids = product_ids.clone();
            state.requested = RequestedSymbols::new(product_ids);
            state.generation += 1;
            !std::mem::replace(&mut state.has_requested_currency_rates, true)
        };

        if should_request_rates {
            let codes = vec![FROM_CURRENCY_CODE.to_string()];
            if !send_or_cancel(&self.cancel, &self.tx_request_currency_rates, codes).await {
                warn!("currency rate request not delivered");
            }
        }

        self.resolve_underlying_product_ids().await?;

        let (streaming, polling) = {
            let mut state = self.state.write();
            let (streaming, polling) = partition_product_ids(&state.product_ids);
            state.product_ids_streaming = streaming.clone();
            state.product_ids_polling = polling.clone();
            (streaming, polling)
        };

        self.refresh_cache().await?;

        info!(
            streaming = streaming.len(),
            polling = polling.len(),
            "symbols updated"
        );

        self.streamer
            .set_symbols_and_update_subscriptions(streaming, version_vector)
            .await?;
        self.poller.set_symbols(polling, version_vector);

        Ok(())
    }

    /// Initial refresh, then streamer, poller and merge loop.
    ///
    /// A failure part-way leaves whatever already started running; the
    /// instance should be discarded.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), MonitorError> {
        if self.is_started.load(Ordering::Acquire) {
            return Err(MonitorError::AlreadyStarted);
        }

        self.refresh_cache().await?;
        self.streamer.start().await?;
        self.poller.start()?;

        let receivers = self
            .receivers
            .lock()
            .take()
            .ok_or(MonitorError::AlreadyStarted)?;

        let merge_loop = MergeLoop {
            state: Arc::clone(&self.state),
            cancel: self.cancel.clone(),
            tx_update_asset_quote: self.tx_update_asset_quote.clone(),
            receivers,
        };
        tokio::spawn(merge_loop.run().instrument(tracing::info_span!("merge_loop")));

        self.is_started.store(true, Ordering::Release);
        info!("price monitor started");

        Ok(())
    }

    /// Cancels every task owned by the monitor. Does not wait for them to exit.
    pub fn stop(&self) -> Result<(), MonitorError> {
        if !self.is_started.load(Ordering::Acquire) {
            return Err(MonitorError::NotStarted);
        }

        self.cancel.cancel();
        info!("price monitor stopped");

        Ok(())
    }

    /// Copies of the cached quotes. `ignore_cache` refreshes first; on failure
    /// the cache is left as it was.
    pub async fn get_asset_quotes(&self, ignore_cache: bool) -> Result<Vec<AssetQuote>, MonitorError> {
        if ignore_cache {
            return self.refresh_cache().await;
        }

        Ok(self.state.read().cache.snapshot())
    }

    /// Replaces the rate cache and refreshes so every quote picks up the new rate.
    #[instrument(skip(self, rates), fields(count = rates.len()))]
    pub async fn set_currency_rates(&self, rates: CurrencyRates) -> Result<(), MonitorError> {
        *self.currency_rates.write() = rates;

        self.refresh_cache().await?;

        Ok(())
    }

    pub fn product_ids(&self) -> Vec<String> {
        self.state.read().product_ids.clone()
    }

    pub fn product_ids_streaming(&self) -> Vec<String> {
        self.state.read().product_ids_streaming.clone()
    }

    pub fn product_ids_polling(&self) -> Vec<String> {
        self.state.read().product_ids_polling.clone()
    }

    pub fn underlying_product_ids(&self) -> HashMap<String, String> {
        self.state.read().underlying_by_product_id.clone()
    }

    pub fn poller(&self) -> &Poller<Q> {
        &self.poller
    }

    pub fn streamer(&self) -> &S {
        &self.streamer
    }

    /// Fetches the working set, rebuilds the cache and swaps it in.
    ///
    /// If the working set changed while the upstream call was in flight the
    /// result is dropped and the current cache is returned instead.
    async fn refresh_cache(&self) -> Result<Vec<AssetQuote>, MonitorError> {
        let (product_ids, requested, generation) = {
            let state = self.state.read();
            (
                state.product_ids.clone(),
                state.requested.clone(),
                state.generation,
            )
        };

        let batch = warn_if_slow(
            "quote_source_refresh",
            SLOW_UPSTREAM_CALL,
            self.source.get_asset_quotes(&product_ids),
        )
        .await?;

        let rate = self.currency_rates.read().get(FROM_CURRENCY_CODE).cloned();
        let cache = build_cache(batch, &requested, rate.as_ref());

        // Swapping under the write lock makes this refresh win over any merge
        // computed from subscriptions that predate it.
        let mut state = self.state.write();
        if state.generation != generation {
            debug!(
                generation,
                current = state.generation,
                "symbol set changed during refresh; result dropped"
            );
            return Ok(state.cache.snapshot());
        }

        let snapshot = cache.snapshot();
        state.cache = cache;
        let cached = state.cache.len();
        drop(state);

        debug!(quotes = cached, generation, "quote cache replaced");

        Ok(snapshot)
    }

    /// Adds underlyings of derivatives in the working set to it.
    ///
    /// Only derivatives missing from the underlying map are queried; known
    /// mappings are reused without an upstream call.
    async fn resolve_underlying_product_ids(&self) -> Result<(), MonitorError> {
        let unresolved: Vec<String> = {
            let state = self.state.read();
            state
                .product_ids
                .iter()
                .filter(|id| {
                    has_underlying_product_id(id)
                        && !state.underlying_by_product_id.contains_key(id.as_str())
                })
                .cloned()
                .collect()
        };

        let batch = if unresolved.is_empty() {
            None
        } else {
            debug!(count = unresolved.len(), "resolving underlying product ids");
            let batch = warn_if_slow(
                "quote_source_resolve_underlying",
                SLOW_UPSTREAM_CALL,
                self.source.get_asset_quotes(&unresolved),
            )
            .await?;
            Some(batch)
        };

        let mut state = self.state.write();

        for quote in batch.into_iter().flat_map(|b| b.quotes) {
            let underlying = &quote.quote_futures.symbol_underlying;
            if underlying.is_empty() {
                continue;
            }
            state
                .underlying_by_product_id
                .insert(quote.product_id().to_string(), underlying.clone());
        }

        let underlyings: Vec<String> = state
            .product_ids
            .iter()
            .filter_map(|id| state.underlying_by_product_id.get(id).cloned())
            .collect();

        let merged = merge_product_ids(&state.product_ids, &underlyings);
        if merged != state.product_ids {
            state.product_ids = merged;
            state.generation += 1;
        }

        Ok(())
    }
}

/// Consumes transport updates and merges them into the cache.
struct MergeLoop {
    state: Arc<RwLock<MonitorState>>,
    cancel: CancellationToken,
    tx_update_asset_quote: Sender<MessageUpdate<AssetQuote>>,
    receivers: UpdateReceivers,
}

impl MergeLoop {
    async fn run(mut self) {
        info!("merge loop started");

        loop {
            let merged = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("merge loop cancelled");
                    return;
                }
                Some(update) = self.receivers.rx_quote_extended.recv() => {
                    // Extended fields only arrive through polling for now.
                    trace!(product_id = %update.id, "extended quote update ignored");
                    None
                }
                Some(update) = self.receivers.rx_poll_asset_quote.recv() => {
                    merge_polled_update(&self.state, update)
                }
                Some(update) = self.receivers.rx_quote_price.recv() => {
                    merge_streamed_price(&self.state, update)
                }
                else => {
                    warn!("all transport channels closed; merge loop exiting");
                    return;
                }
            };

            let Some(merged) = merged else {
                continue;
            };

            debug!(
                symbol = %merged.id,
                price = merged.data.quote_price.price,
                version_vector = merged.version_vector,
                "quote merged"
            );

            if !send_or_cancel(&self.cancel, &self.tx_update_asset_quote, merged).await {
                info!("update channel closed or cancelled; merge loop exiting");
                return;
            }
        }
    }
}

/// Applies a polled quote: price, extended and exchange fields together.
///
/// Returns the merged update to publish, or `None` when the product id is not
/// cached or nothing the caller cares about changed.
fn merge_polled_update(
    state: &RwLock<MonitorState>,
    update: MessageUpdate<AssetQuote>,
) -> Option<MessageUpdate<AssetQuote>> {
    {
        let state = state.read();

        let Some(cached) = state.cache.get(&update.id) else {
            trace!(product_id = %update.id, "polled update for uncached product id");
            return None;
        };

        if cached.quote_price.price == update.data.quote_price.price
            && cached.exchange.is_active == update.data.exchange.is_active
            && cached.quote_price.price_day_high == update.data.quote_price.price_day_high
        {
            return None;
        }
    }

    // Not atomic with the check above: a refresh may swap the cache in between.
    // The entry is looked up again, so the write lands on whatever is current.
    let mut state = state.write();
    let cached = state.cache.get_mut(&update.id)?;

    let MessageUpdate {
        data,
        version_vector,
        ..
    } = update;

    cached.quote_price = data.quote_price;
    cached.quote_extended = data.quote_extended;
    cached.exchange.is_active = data.exchange.is_active;
    cached.exchange.is_regular_trading_session = data.exchange.is_regular_trading_session;

    Some(MessageUpdate {
        id: cached.symbol.clone(),
        data: cached.clone(),
        version_vector,
    })
}

/// Applies a streamed price. Only price-family fields change.
fn merge_streamed_price(
    state: &RwLock<MonitorState>,
    update: MessageUpdate<QuotePrice>,
) -> Option<MessageUpdate<AssetQuote>> {
    {
        let state = state.read();

        let Some(cached) = state.cache.get(&update.id) else {
            trace!(product_id = %update.id, "streamed price for uncached product id");
            return None;
        };

        if cached.quote_price.price == update.data.price {
            return None;
        }
    }

    let mut state = state.write();
    let cached = state.cache.get_mut(&update.id)?;

    cached.quote_price = update.data;

    // TODO: recompute basis of cached futures when their underlying's streamed price moves.

    Some(MessageUpdate {
        id: cached.symbol.clone(),
        data: cached.clone(),
        version_vector: update.version_vector,
    })
}
