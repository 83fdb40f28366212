pub mod cli;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cli::Cli;
use common::logger::init_logger;
use monitor::coinbase::new_coinbase_monitor;
use monitor::config::{MonitorConfig, MonitorSettings};
use monitor::types::{CurrencyRate, CurrencyRates};

const SERVICE_NAME: &str = "price-monitor";

/// Rates for the requested codes. Quotes are already USD, so this is the identity.
fn identity_rates(codes: &[String]) -> CurrencyRates {
    codes
        .iter()
        .map(|code| {
            let rate = CurrencyRate {
                from_currency: code.clone(),
                to_currency: code.clone(),
                rate: 1.0,
            };
            (code.clone(), rate)
        })
        .collect::<HashMap<_, _>>()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = MonitorSettings::from_env();
    cli.apply(&mut settings);
    init_logger(SERVICE_NAME, settings.json_logs);

    let cancel = CancellationToken::new();
    let (tx_update, mut rx_update) = mpsc::channel(settings.channel_capacity);
    let (tx_error, mut rx_error) = mpsc::channel(settings.channel_capacity);
    let (tx_rates, mut rx_rates) = mpsc::channel::<Vec<String>>(1);

    let monitor = Arc::new(new_coinbase_monitor(
        &settings.unary_url,
        MonitorConfig {
            cancel: cancel.clone(),
            tx_error,
            tx_update_asset_quote: tx_update,
            tx_request_currency_rates: tx_rates,
            streaming_url: Some(settings.streaming_url.clone()),
            refresh_interval: Some(settings.refresh_interval),
        },
    )?);

    tokio::spawn(async move {
        while let Some(update) = rx_update.recv().await {
            let quote = &update.data;
            info!(
                product_id = %update.id,
                version = update.version_vector,
                price = quote.quote_price.price,
                change_percent = quote.quote_price.change_percent,
                basis = ?quote.quote_futures.basis,
                "quote updated"
            );
        }
    });

    tokio::spawn(async move {
        while let Some(e) = rx_error.recv().await {
            warn!(error = %e, "monitor reported an error");
        }
    });

    let rates_monitor = Arc::clone(&monitor);
    tokio::spawn(async move {
        while let Some(codes) = rx_rates.recv().await {
            if let Err(e) = rates_monitor.set_currency_rates(identity_rates(&codes)).await {
                error!(error = %e, "failed to apply currency rates");
            }
        }
    });

    let product_ids = cli.product_ids();
    monitor.set_symbols(product_ids.clone(), 1).await?;
    monitor.start().await?;

    for quote in monitor.get_asset_quotes(false).await? {
        info!(
            product_id = %quote.product_id(),
            price = quote.quote_price.price,
            delay = %quote.exchange.delay_text,
            "initial quote"
        );
    }
    info!(
        streaming = ?monitor.product_ids_streaming(),
        polling = ?monitor.product_ids_polling(),
        "monitor running, ctrl-c to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    monitor.stop()?;

    Ok(())
}
