use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Kind of instrument a quote describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    #[default]
    Spot,

    FuturesContract,
}

/// Price-family fields. This is the only part of a quote the streaming feed updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotePrice {
    pub price: f64,
    pub price_prev_close: f64,
    pub price_open: f64,
    pub price_day_high: f64,
    pub price_day_low: f64,
    pub change: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteExtended {
    pub fifty_two_week_high: f64,
    pub fifty_two_week_low: f64,
    pub market_cap: f64,
    pub volume: f64,
}

/// Derivative-only fields.
///
/// `index_price` and `basis` are only populated when the underlying's quote
/// was present in the same refresh batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteFutures {
    pub symbol_underlying: String,
    pub index_price: Option<f64>,
    pub basis: Option<f64>,
    pub open_interest: f64,
    pub expiry: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub name: String,
    pub delay_text: String,
    pub is_active: bool,
    pub is_regular_trading_session: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub rate: f64,
    pub from_currency_code: String,
    pub to_currency_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Identifier of the instrument in the upstream API namespace (product id).
    pub symbol_in_source_api: String,
}

/// Authoritative record for one instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetQuote {
    pub name: String,
    /// Display symbol; used as the id of outgoing update messages.
    pub symbol: String,
    pub class: AssetClass,
    pub currency: Currency,
    pub quote_price: QuotePrice,
    pub quote_extended: QuoteExtended,
    pub quote_futures: QuoteFutures,
    pub exchange: Exchange,
    pub meta: Meta,
}

impl AssetQuote {
    pub fn product_id(&self) -> &str {
        &self.meta.symbol_in_source_api
    }
}

/// Envelope for every update flowing between the transports, the merge loop
/// and the monitor's caller.
///
/// `version_vector` is supplied by the caller with each symbol set and echoed
/// back untouched so consumers can drop updates from a superseded generation.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageUpdate<T> {
    pub id: String,
    pub data: T,
    pub version_vector: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRate {
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
}

/// Conversion rates keyed by source currency code.
pub type CurrencyRates = HashMap<String, CurrencyRate>;
