use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Output format of the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable lines with thread names.
    Pretty,
}

static LOG_FORMAT: OnceCell<LogFormat> = OnceCell::new();

/// Installs the process-wide subscriber and returns the format in effect.
///
/// Only the first call decides the format; later calls return it unchanged.
/// Filter comes from `RUST_LOG`, defaulting to `info`.
pub fn init_logger(service_name: &'static str, json: bool) -> LogFormat {
    *LOG_FORMAT.get_or_init(|| {
        let format = if json { LogFormat::Json } else { LogFormat::Pretty };

        let base = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_span_events(fmt::format::FmtSpan::CLOSE);

        let output: Box<dyn Layer<Registry> + Send + Sync> = match format {
            LogFormat::Json => base.json().boxed(),
            LogFormat::Pretty => base.with_thread_names(true).boxed(),
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // Another subscriber may already own the process (e.g. under a test harness).
        if tracing_subscriber::registry()
            .with(output)
            .with(filter)
            .try_init()
            .is_ok()
        {
            tracing::info!(service = service_name, ?format, "logger initialized");
        }

        format
    })
}
