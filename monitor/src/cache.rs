//! Quote cache and the enrichment pass that rebuilds it.
//!
//! The cache owns every `AssetQuote` it holds. Callers only ever receive
//! clones, and in-place updates go through the product id index.

use std::collections::{HashMap, HashSet};

use crate::source::QuoteBatch;
use crate::symbols::{DELAY_TEXT_REAL_TIME, FROM_CURRENCY_CODE, is_streaming_product_id};
use crate::types::{AssetClass, AssetQuote, CurrencyRate};

/// Product ids explicitly requested by the caller.
///
/// Distinct from the working set: underlyings pulled in only for basis
/// computation are never members.
#[derive(Debug, Clone, Default)]
pub struct RequestedSymbols {
    lookup: HashSet<String>,
}

impl RequestedSymbols {
    pub fn new(product_ids: Vec<String>) -> Self {
        Self {
            lookup: product_ids.into_iter().collect(),
        }
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.lookup.contains(product_id)
    }
}

/// Ordered quotes plus a product id index into them.
///
/// Both halves are only ever replaced together, under the monitor's write lock.
#[derive(Debug, Clone, Default)]
pub struct QuoteCache {
    quotes: Vec<AssetQuote>,
    index: HashMap<String, usize>,
}

impl QuoteCache {
    pub fn from_quotes(quotes: Vec<AssetQuote>) -> Self {
        let index = quotes
            .iter()
            .enumerate()
            .map(|(i, q)| (q.product_id().to_string(), i))
            .collect();

        Self { quotes, index }
    }

    pub fn get(&self, product_id: &str) -> Option<&AssetQuote> {
        self.index.get(product_id).map(|&i| &self.quotes[i])
    }

    pub fn get_mut(&mut self, product_id: &str) -> Option<&mut AssetQuote> {
        let i = *self.index.get(product_id)?;
        self.quotes.get_mut(i)
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.index.contains_key(product_id)
    }

    /// Deep copy of the cached quotes in cache order.
    pub fn snapshot(&self) -> Vec<AssetQuote> {
        self.quotes.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.quotes.len()
    }
}

/// Relative spread between the underlying and the derivative price.
///
/// `None` when the derivative price is zero or the result is not finite.
pub fn compute_basis(underlying_price: f64, price: f64) -> Option<f64> {
    if price == 0.0 {
        return None;
    }

    let basis = (underlying_price - price) / price;
    basis.is_finite().then_some(basis)
}

/// Builds a new cache from a Quote Source batch.
///
/// For each quote: applies the default currency rate when one is known, drops
/// quotes that were not explicitly requested, fills index price and basis for
/// futures whose underlying is in the same batch, and labels streaming-shape
/// quotes as real-time.
pub fn build_cache(
    batch: QuoteBatch,
    requested: &RequestedSymbols,
    rate: Option<&CurrencyRate>,
) -> QuoteCache {
    let QuoteBatch {
        quotes,
        by_product_id,
    } = batch;

    let mut enriched = Vec::with_capacity(quotes.len());

    for mut quote in quotes {
        if let Some(rate) = rate {
            quote.currency.rate = rate.rate;
            quote.currency.from_currency_code = FROM_CURRENCY_CODE.to_string();
            quote.currency.to_currency_code = rate.to_currency.clone();
        }

        if !requested.contains(quote.product_id()) {
            continue;
        }

        if quote.class == AssetClass::FuturesContract {
            match by_product_id.get(&quote.quote_futures.symbol_underlying) {
                Some(underlying) => {
                    let underlying_price = underlying.quote_price.price;
                    quote.quote_futures.index_price = Some(underlying_price);
                    quote.quote_futures.basis =
                        compute_basis(underlying_price, quote.quote_price.price);
                }
                None => {
                    quote.quote_futures.index_price = None;
                    quote.quote_futures.basis = None;
                }
            }
        }

        if is_streaming_product_id(quote.product_id()) {
            quote.exchange.delay_text = DELAY_TEXT_REAL_TIME.to_string();
        }

        enriched.push(quote);
    }

    QuoteCache::from_quotes(enriched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spot(product_id: &str, price: f64) -> AssetQuote {
        AssetQuote {
            symbol: product_id.to_string(),
            quote_price: crate::types::QuotePrice {
                price,
                ..Default::default()
            },
            meta: crate::types::Meta {
                symbol_in_source_api: product_id.to_string(),
            },
            ..Default::default()
        }
    }

    fn future(product_id: &str, underlying: &str, price: f64) -> AssetQuote {
        let mut q = spot(product_id, price);
        q.class = AssetClass::FuturesContract;
        q.quote_futures.symbol_underlying = underlying.to_string();
        q
    }

    fn requested(ids: &[&str]) -> RequestedSymbols {
        RequestedSymbols::new(ids.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn basis_for_known_underlying() {
        let basis = compute_basis(100.0, 95.0).unwrap();
        assert!((basis - 0.052631578).abs() < 1e-6);
    }

    #[test]
    fn basis_absent_for_zero_price() {
        assert_eq!(compute_basis(100.0, 0.0), None);
    }

    #[test]
    fn unrequested_quotes_are_dropped() {
        let batch = QuoteBatch::from_quotes(vec![
            spot("BTC-USD", 50_000.0),
            future("XYZ-CDE", "XYZ-USD", 95.0),
            spot("XYZ-USD", 100.0),
        ]);

        let cache = build_cache(batch, &requested(&["BTC-USD", "XYZ-CDE"]), None);

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("BTC-USD"));
        assert!(cache.contains("XYZ-CDE"));
        assert!(!cache.contains("XYZ-USD"));
    }

    #[test]
    fn futures_get_index_price_and_basis_from_same_batch() {
        let batch = QuoteBatch::from_quotes(vec![
            future("XYZ-CDE", "XYZ-USD", 95.0),
            spot("XYZ-USD", 100.0),
        ]);

        let cache = build_cache(batch, &requested(&["XYZ-CDE"]), None);
        let q = cache.get("XYZ-CDE").unwrap();

        assert_eq!(q.quote_futures.index_price, Some(100.0));
        assert!((q.quote_futures.basis.unwrap() - 5.0 / 95.0).abs() < 1e-12);
        assert_eq!(q.exchange.delay_text, "");
    }

    #[test]
    fn futures_without_underlying_in_batch_have_no_basis() {
        let batch = QuoteBatch::from_quotes(vec![future("XYZ-CDE", "XYZ-USD", 95.0)]);

        let cache = build_cache(batch, &requested(&["XYZ-CDE"]), None);
        let q = cache.get("XYZ-CDE").unwrap();

        assert_eq!(q.quote_futures.index_price, None);
        assert_eq!(q.quote_futures.basis, None);
    }

    #[test]
    fn streaming_quotes_are_real_time_and_converted() {
        let rate = CurrencyRate {
            from_currency: "USD".into(),
            to_currency: "EUR".into(),
            rate: 0.9,
        };
        let batch = QuoteBatch::from_quotes(vec![spot("BTC-USD", 50_000.0)]);

        let cache = build_cache(batch, &requested(&["BTC-USD"]), Some(&rate));
        let q = cache.get("BTC-USD").unwrap();

        assert_eq!(q.exchange.delay_text, DELAY_TEXT_REAL_TIME);
        assert_eq!(q.currency.rate, 0.9);
        assert_eq!(q.currency.from_currency_code, "USD");
        assert_eq!(q.currency.to_currency_code, "EUR");
    }

    #[test]
    fn index_follows_cache_order() {
        let mut cache = QuoteCache::from_quotes(vec![spot("A-USD", 1.0), spot("B-USD", 2.0)]);

        cache.get_mut("B-USD").unwrap().quote_price.price = 3.0;

        let snapshot = cache.snapshot();
        assert_eq!(snapshot[0].quote_price.price, 1.0);
        assert_eq!(snapshot[1].quote_price.price, 3.0);
    }
}
