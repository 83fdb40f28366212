//! Periodic polling fallback.
//!
//! Covers product ids the streaming feed does not serve. On every tick the
//! whole assigned subset is fetched from the Quote Source in one call and each
//! returned quote is published as a separate update.
//!
//! Lifecycle: idle -> started -> cancelled. There is no way back to idle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::error::{MonitorError, PollerError};
use crate::source::QuoteSource;
use crate::types::{AssetQuote, MessageUpdate};

pub struct PollerConfig<Q> {
    pub source: Arc<Q>,
    pub tx_update_asset_quote: Sender<MessageUpdate<AssetQuote>>,
    pub tx_error: Sender<MonitorError>,
}

#[derive(Debug, Default)]
struct PolledSymbols {
    product_ids: Vec<String>,
    version_vector: u64,
}

#[derive(Debug, Default)]
struct Lifecycle {
    refresh_interval: Duration,
    is_started: bool,
}

pub struct Poller<Q> {
    lifecycle: Mutex<Lifecycle>,
    worker: PollWorker<Q>,
}

impl<Q: QuoteSource> Poller<Q> {
    /// Creates an idle poller whose task is cancelled together with `cancel`.
    pub fn new(cancel: &CancellationToken, config: PollerConfig<Q>) -> Self {
        Self {
            lifecycle: Mutex::new(Lifecycle::default()),
            worker: PollWorker {
                source: config.source,
                symbols: Arc::new(Mutex::new(PolledSymbols::default())),
                cancel: cancel.child_token(),
                tx_update_asset_quote: config.tx_update_asset_quote,
                tx_error: config.tx_error,
            },
        }
    }

    /// Replaces the polled subset. Takes effect from the next tick.
    pub fn set_symbols(&self, product_ids: Vec<String>, version_vector: u64) {
        let mut symbols = self.worker.symbols.lock();
        symbols.product_ids = product_ids;
        symbols.version_vector = version_vector;
    }

    pub fn symbols(&self) -> (Vec<String>, u64) {
        let symbols = self.worker.symbols.lock();
        (symbols.product_ids.clone(), symbols.version_vector)
    }

    pub fn set_refresh_interval(&self, interval: Duration) -> Result<(), PollerError> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.is_started {
            return Err(PollerError::RefreshIntervalLocked);
        }

        lifecycle.refresh_interval = interval;
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.lifecycle.lock().is_started
    }

    /// Spawns the ticking task and returns immediately.
    pub fn start(&self) -> Result<(), PollerError> {
        let every = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.is_started {
                return Err(PollerError::AlreadyStarted);
            }
            if lifecycle.refresh_interval.is_zero() {
                return Err(PollerError::RefreshIntervalUnset);
            }
            lifecycle.is_started = true;
            lifecycle.refresh_interval
        };

        let worker = self.worker.clone();
        tokio::spawn(worker.run(every).instrument(tracing::info_span!("poller")));

        Ok(())
    }
}

struct PollWorker<Q> {
    source: Arc<Q>,
    symbols: Arc<Mutex<PolledSymbols>>,
    cancel: CancellationToken,
    tx_update_asset_quote: Sender<MessageUpdate<AssetQuote>>,
    tx_error: Sender<MonitorError>,
}

impl<Q> Clone for PollWorker<Q> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            symbols: Arc::clone(&self.symbols),
            cancel: self.cancel.clone(),
            tx_update_asset_quote: self.tx_update_asset_quote.clone(),
            tx_error: self.tx_error.clone(),
        }
    }
}

impl<Q: QuoteSource> PollWorker<Q> {
    async fn run(self, every: Duration) {
        // First tick lands one full interval after start.
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(every_ms = every.as_millis() as u64, "poller started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("poller cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if !self.poll_once().await {
                info!("poller stopped; update channel closed or cancelled");
                return;
            }
        }
    }

    /// One tick. Returns false when the task should exit.
    async fn poll_once(&self) -> bool {
        // Captured once so every update from this tick carries the same version.
        let (product_ids, version_vector) = {
            let symbols = self.symbols.lock();
            (symbols.product_ids.clone(), symbols.version_vector)
        };

        if product_ids.is_empty() {
            return true;
        }

        let batch = match self.source.get_asset_quotes(&product_ids).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, count = product_ids.len(), "poll failed");
                if !send_or_cancel(&self.cancel, &self.tx_error, MonitorError::Upstream(e)).await {
                    warn!("error channel unavailable; poll error dropped");
                }
                return !self.cancel.is_cancelled();
            }
        };

        debug!(count = batch.quotes.len(), version_vector, "poll succeeded");

        for quote in batch.quotes {
            let update = MessageUpdate {
                id: quote.product_id().to_string(),
                data: quote,
                version_vector,
            };

            if !send_or_cancel(&self.cancel, &self.tx_update_asset_quote, update).await {
                return false;
            }
        }

        true
    }
}

/// Sends unless cancellation fires first. False if not delivered.
pub(crate) async fn send_or_cancel<T>(
    cancel: &CancellationToken,
    tx: &Sender<T>,
    message: T,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        res = tx.send(message) => res.is_ok(),
    }
}
