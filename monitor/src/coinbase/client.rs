use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::coinbase::parser::product_to_asset_quote;
use crate::coinbase::types::{Product, ProductsEnvelope};
use crate::error::QuoteSourceError;
use crate::source::{QuoteBatch, QuoteSource};

const PRODUCTS_PATH: &str = "/api/v3/brokerage/market/products";

/// Request/response client for the Coinbase public product API.
#[derive(Clone)]
pub struct CoinbaseUnaryApi {
    http: Client,
    url: String,
}

impl CoinbaseUnaryApi {
    pub fn new(url: impl Into<String>) -> Result<Self, QuoteSourceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }

    #[instrument(skip(self, product_ids), fields(count = product_ids.len()), level = "debug")]
    pub async fn fetch_products(&self, product_ids: &[String]) -> Result<Vec<Product>, QuoteSourceError> {
        let url = format!("{}{}", self.url.trim_end_matches('/'), PRODUCTS_PATH);
        let query: Vec<(&str, &str)> = product_ids
            .iter()
            .map(|id| ("product_ids", id.as_str()))
            .collect();

        let resp = self.http.get(&url).query(&query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(QuoteSourceError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = resp.bytes().await?;
        let envelope: ProductsEnvelope = serde_json::from_slice(&body)
            .map_err(|e| QuoteSourceError::InvalidResponse(e.to_string()))?;

        debug!(returned = envelope.products.len(), "coinbase products fetched");

        Ok(envelope.products)
    }
}

#[async_trait]
impl QuoteSource for CoinbaseUnaryApi {
    async fn get_asset_quotes(&self, product_ids: &[String]) -> Result<QuoteBatch, QuoteSourceError> {
        if product_ids.is_empty() {
            return Ok(QuoteBatch::default());
        }

        let products = self.fetch_products(product_ids).await?;
        let quotes = products
            .iter()
            .map(product_to_asset_quote)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(QuoteBatch::from_quotes(quotes))
    }
}
