//! Product id shape rules.
//!
//! Coinbase refers to trading pairs as product ids. Derivative contracts
//! (Coinbase Derivatives Exchange) carry a `CDE` marker and are only reachable
//! through polling; everything else is a spot pair served by the streaming feed.

/// Default currency quotes are denominated in.
pub const FROM_CURRENCY_CODE: &str = "USD";

/// Delay label applied to quotes served by the streaming feed.
pub const DELAY_TEXT_REAL_TIME: &str = "Real-time";

const DERIVATIVE_PREFIX: &str = "CDE";
const DERIVATIVE_SUFFIX: &str = "-CDE";

/// True when the product id names a contract on an underlying instrument.
pub fn has_underlying_product_id(product_id: &str) -> bool {
    product_id.ends_with(DERIVATIVE_SUFFIX) || product_id.starts_with(DERIVATIVE_PREFIX)
}

pub fn is_streaming_product_id(product_id: &str) -> bool {
    !has_underlying_product_id(product_id)
}

/// Splits product ids into `(streaming, polling)` preserving input order.
pub fn partition_product_ids(product_ids: &[String]) -> (Vec<String>, Vec<String>) {
    product_ids
        .iter()
        .cloned()
        .partition(|product_id| is_streaming_product_id(product_id))
}

/// Merges two id lists into one sorted, deduplicated list.
pub fn merge_product_ids(a: &[String], b: &[String]) -> Vec<String> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    merged.extend_from_slice(a);
    merged.extend_from_slice(b);
    dedup_sorted(merged)
}

pub fn dedup_sorted(mut product_ids: Vec<String>) -> Vec<String> {
    product_ids.sort();
    product_ids.dedup();
    product_ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn derivative_marker_detection() {
        assert!(has_underlying_product_id("BIT-31JAN25-CDE"));
        assert!(has_underlying_product_id("CDE-BTC"));
        assert!(!has_underlying_product_id("BTC-USD"));
        assert!(!has_underlying_product_id("ACDE-USD"));
        assert!(!has_underlying_product_id("BTC-CDEX"));
        assert!(!has_underlying_product_id("BTCCDE"));
    }

    #[test]
    fn partition_routes_by_shape() {
        let (streaming, polling) =
            partition_product_ids(&ids(&["BTC-USD", "XYZ-CDE", "ETH-USD", "CDE-ABC"]));

        assert_eq!(streaming, ids(&["BTC-USD", "ETH-USD"]));
        assert_eq!(polling, ids(&["XYZ-CDE", "CDE-ABC"]));
    }

    #[test]
    fn merge_sorts_and_dedups() {
        let merged = merge_product_ids(&ids(&["XYZ-CDE", "BTC-USD"]), &ids(&["BTC-USD", "XYZ-USD"]));
        assert_eq!(merged, ids(&["BTC-USD", "XYZ-CDE", "XYZ-USD"]));
    }
}
