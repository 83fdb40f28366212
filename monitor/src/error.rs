use thiserror::Error;

/// Failures of a request/response quote call.
#[derive(Error, Debug)]
pub enum QuoteSourceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("failed to parse {field} value {value:?} for {product_id}")]
    Parse {
        product_id: String,
        field: &'static str,
        value: String,
    },

    #[error("quote source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum StreamerError {
    #[error("streamer already started")]
    AlreadyStarted,

    #[error("cannot set url while streamer is started")]
    UrlLocked,

    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("failed to encode subscription: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("websocket writer closed")]
    WriterClosed,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PollerError {
    #[error("poller already started")]
    AlreadyStarted,

    #[error("refresh interval is not set")]
    RefreshIntervalUnset,

    #[error("cannot set refresh interval while poller is started")]
    RefreshIntervalLocked,
}

/// Error taxonomy surfaced by the monitor, both as return values and on the
/// shared error channel.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("monitor already started")]
    AlreadyStarted,

    #[error("monitor not started")]
    NotStarted,

    #[error("upstream fetch failed: {0}")]
    Upstream(#[from] QuoteSourceError),

    #[error(transparent)]
    Streamer(#[from] StreamerError),

    #[error(transparent)]
    Poller(#[from] PollerError),
}
