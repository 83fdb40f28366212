use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::MonitorError;
use crate::types::{AssetQuote, MessageUpdate};

/// Wiring for a `PriceMonitor`.
pub struct MonitorConfig {
    /// Parent lifecycle token. The monitor derives a child token from it, so
    /// cancelling the parent also stops the monitor's tasks.
    pub cancel: CancellationToken,

    /// Asynchronous failures (e.g. a failed poll) are reported here.
    pub tx_error: Sender<MonitorError>,

    /// Merged updates for the caller.
    pub tx_update_asset_quote: Sender<MessageUpdate<AssetQuote>>,

    /// Receives the default currency code once, on the first `set_symbols`.
    pub tx_request_currency_rates: Sender<Vec<String>>,

    /// Overrides the streamer's endpoint.
    pub streaming_url: Option<String>,

    /// Poll cadence for derivative product ids. Required before `start`.
    pub refresh_interval: Option<Duration>,
}

/// Settings for an embedding application, read from the environment.
#[derive(Clone, Debug)]
pub struct MonitorSettings {
    /// Base URL of the request/response quote API.
    pub unary_url: String,

    /// Websocket endpoint of the streaming feed.
    pub streaming_url: String,

    /// Poll cadence for product ids the streaming feed does not cover.
    pub refresh_interval: Duration,

    /// Capacity of the channels between the monitor and its embedder.
    ///
    /// The merge loop blocks on a full update channel, so this is the amount
    /// of slack a slow consumer gets before updates back up into the transports.
    pub channel_capacity: usize,

    /// Emit JSON logs.
    pub json_logs: bool,
}

pub const DEFAULT_UNARY_URL: &str = "https://api.coinbase.com";
pub const DEFAULT_STREAMING_URL: &str = "wss://ws-feed.exchange.coinbase.com";
const DEFAULT_REFRESH_INTERVAL_MS: u64 = 10_000;
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            unary_url: DEFAULT_UNARY_URL.to_string(),
            streaming_url: DEFAULT_STREAMING_URL.to_string(),
            refresh_interval: Duration::from_millis(DEFAULT_REFRESH_INTERVAL_MS),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            json_logs: false,
        }
    }
}

impl MonitorSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let refresh_ms = parse_or(
            "MONITOR_REFRESH_INTERVAL_MS",
            lookup("MONITOR_REFRESH_INTERVAL_MS"),
            DEFAULT_REFRESH_INTERVAL_MS,
        );
        let channel_capacity = parse_or(
            "MONITOR_CHANNEL_CAPACITY",
            lookup("MONITOR_CHANNEL_CAPACITY"),
            DEFAULT_CHANNEL_CAPACITY,
        )
        .max(1);

        Self {
            unary_url: lookup("COINBASE_UNARY_URL").unwrap_or(defaults.unary_url),
            streaming_url: lookup("COINBASE_STREAMING_URL").unwrap_or(defaults.streaming_url),
            refresh_interval: Duration::from_millis(refresh_ms),
            channel_capacity,
            json_logs: lookup("APP_ENV").is_some_and(|v| v == "production"),
        }
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(key, value = %raw, default = %default, "invalid setting; using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> MonitorSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MonitorSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let s = settings(&[]);
        assert_eq!(s.unary_url, DEFAULT_UNARY_URL);
        assert_eq!(s.streaming_url, DEFAULT_STREAMING_URL);
        assert_eq!(s.refresh_interval, Duration::from_secs(10));
        assert_eq!(s.channel_capacity, 256);
        assert!(!s.json_logs);
    }

    #[test]
    fn overrides_and_invalid_values() {
        let s = settings(&[
            ("COINBASE_UNARY_URL", "http://localhost:9000"),
            ("MONITOR_REFRESH_INTERVAL_MS", "2500"),
            ("MONITOR_CHANNEL_CAPACITY", "lots"),
            ("APP_ENV", "production"),
        ]);
        assert_eq!(s.unary_url, "http://localhost:9000");
        assert_eq!(s.refresh_interval, Duration::from_millis(2500));
        assert_eq!(s.channel_capacity, 256);
        assert!(s.json_logs);
    }
}
