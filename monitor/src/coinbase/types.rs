use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ProductsEnvelope {
    #[serde(default)]
    pub products: Vec<Product>,
}

/// One entry of `GET /api/v3/brokerage/market/products`.
///
/// Numeric fields arrive as strings and may be empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Product {
    pub product_id: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub price_percentage_change_24h: String,
    #[serde(default)]
    pub volume_24h: String,
    #[serde(default)]
    pub base_name: String,
    #[serde(default)]
    pub quote_currency_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub future_product_details: Option<FutureProductDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FutureProductDetails {
    #[serde(default)]
    pub contract_root_unit: String,
    #[serde(default)]
    pub contract_display_name: String,
    #[serde(default)]
    pub contract_expiry: String,
    #[serde(default)]
    pub open_interest: String,
}

/// Messages received from the exchange websocket feed.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    Ticker(Ticker),
    Subscriptions {
        #[serde(default)]
        channels: Vec<serde_json::Value>,
    },
    Error {
        #[serde(default)]
        message: String,
        #[serde(default)]
        reason: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ticker {
    pub product_id: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub open_24h: String,
    #[serde(default)]
    pub high_24h: String,
    #[serde(default)]
    pub low_24h: String,
    #[serde(default)]
    pub volume_24h: String,
}

/// `subscribe` / `unsubscribe` request on the ticker channel.
#[derive(Debug, Serialize)]
pub struct SubscriptionRequest<'a> {
    #[serde(rename = "type")]
    pub kind: SubscriptionKind,
    pub product_ids: &'a [String],
    pub channels: [&'static str; 1],
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    Subscribe,
    Unsubscribe,
}

impl<'a> SubscriptionRequest<'a> {
    pub fn ticker(kind: SubscriptionKind, product_ids: &'a [String]) -> Self {
        Self {
            kind,
            product_ids,
            channels: ["ticker"],
        }
    }
}
