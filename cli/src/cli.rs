use std::time::Duration;

use clap::Parser;

use monitor::config::MonitorSettings;
use monitor::symbols::dedup_sorted;

#[derive(Debug, Parser)]
#[clap(name = "price-monitor", version)]
pub struct Cli {
    /// Product ids to watch, e.g. BTC-USD or BIT-31JAN25-CDE
    #[clap(required = true, value_delimiter = ',')]
    pub product_ids: Vec<String>,

    /// Poll cadence for derivatives, overrides MONITOR_REFRESH_INTERVAL_MS
    #[clap(long)]
    pub refresh_interval_ms: Option<u64>,

    /// Emit JSON logs regardless of APP_ENV
    #[clap(long)]
    pub json: bool,
}

impl Cli {
    /// Folds command line overrides into environment settings.
    pub(crate) fn apply(&self, settings: &mut MonitorSettings) {
        if let Some(ms) = self.refresh_interval_ms.filter(|ms| *ms > 0) {
            settings.refresh_interval = Duration::from_millis(ms);
        }
        settings.json_logs |= self.json;
    }

    pub(crate) fn product_ids(&self) -> Vec<String> {
        dedup_sorted(
            self.product_ids
                .iter()
                .map(|id| id.trim().to_uppercase())
                .filter(|id| !id.is_empty())
                .collect(),
        )
    }
}
