//! Conversions from Coinbase payloads into the monitor's quote model.
//!
//! Pure and stateless; the client and the streamer do the I/O.

use crate::coinbase::types::{FeedMessage, Product, Ticker};
use crate::error::QuoteSourceError;
use crate::types::{
    AssetClass, AssetQuote, Currency, Exchange, Meta, QuoteExtended, QuoteFutures, QuotePrice,
};

const EXCHANGE_NAME: &str = "Coinbase";
const PRODUCT_TYPE_FUTURE: &str = "FUTURE";
const STATUS_ONLINE: &str = "online";

/// Parses a numeric string field. Empty strings read as zero.
fn parse_number(product_id: &str, field: &'static str, value: &str) -> Result<f64, QuoteSourceError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0.0);
    }

    value.parse().map_err(|_| QuoteSourceError::Parse {
        product_id: product_id.to_string(),
        field,
        value: value.to_string(),
    })
}

/// Maps one product API entry to an `AssetQuote`.
///
/// The API only reports a 24h percentage change, so the previous close is
/// derived from it and the absolute change follows from that.
pub fn product_to_asset_quote(product: &Product) -> Result<AssetQuote, QuoteSourceError> {
    let id = product.product_id.as_str();

    let price = parse_number(id, "price", &product.price)?;
    let change_percent = parse_number(
        id,
        "price_percentage_change_24h",
        &product.price_percentage_change_24h,
    )?;
    let volume = parse_number(id, "volume_24h", &product.volume_24h)?;

    let price_prev_close = if change_percent <= -100.0 {
        0.0
    } else {
        price / (1.0 + change_percent / 100.0)
    };
    let change = if price_prev_close == 0.0 {
        0.0
    } else {
        price - price_prev_close
    };

    let mut quote = AssetQuote {
        name: product.base_name.clone(),
        symbol: product.product_id.clone(),
        class: AssetClass::Spot,
        currency: Currency {
            from_currency_code: product.quote_currency_id.clone(),
            ..Default::default()
        },
        quote_price: QuotePrice {
            price,
            price_prev_close,
            price_open: price_prev_close,
            change,
            change_percent,
            ..Default::default()
        },
        quote_extended: QuoteExtended {
            volume,
            ..Default::default()
        },
        quote_futures: QuoteFutures::default(),
        exchange: Exchange {
            name: EXCHANGE_NAME.to_string(),
            is_active: product.status == STATUS_ONLINE,
            is_regular_trading_session: true,
            ..Default::default()
        },
        meta: Meta {
            symbol_in_source_api: product.product_id.clone(),
        },
    };

    if product.product_type == PRODUCT_TYPE_FUTURE {
        let details = product.future_product_details.clone().unwrap_or_default();

        quote.class = AssetClass::FuturesContract;
        if !details.contract_display_name.is_empty() {
            quote.name = details.contract_display_name.clone();
        }
        quote.quote_futures = QuoteFutures {
            symbol_underlying: if details.contract_root_unit.is_empty() {
                String::new()
            } else {
                format!("{}-USD", details.contract_root_unit)
            },
            open_interest: parse_number(id, "open_interest", &details.open_interest)?,
            expiry: details.contract_expiry,
            ..Default::default()
        };
    }

    Ok(quote)
}

/// Price and extended fields carried by one ticker message.
pub fn ticker_to_quote(ticker: &Ticker) -> Result<(QuotePrice, QuoteExtended), QuoteSourceError> {
    let id = ticker.product_id.as_str();

    let price = parse_number(id, "price", &ticker.price)?;
    let open = parse_number(id, "open_24h", &ticker.open_24h)?;
    let change = if open == 0.0 { 0.0 } else { price - open };
    let change_percent = if open == 0.0 { 0.0 } else { change / open * 100.0 };

    let quote_price = QuotePrice {
        price,
        price_prev_close: open,
        price_open: open,
        price_day_high: parse_number(id, "high_24h", &ticker.high_24h)?,
        price_day_low: parse_number(id, "low_24h", &ticker.low_24h)?,
        change,
        change_percent,
    };

    let quote_extended = QuoteExtended {
        volume: parse_number(id, "volume_24h", &ticker.volume_24h)?,
        ..Default::default()
    };

    Ok((quote_price, quote_extended))
}

pub fn parse_feed_message(raw: &str) -> Result<FeedMessage, serde_json::Error> {
    serde_json::from_str(raw)
}
