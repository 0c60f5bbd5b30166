// =============================================================================
// Meridian Analytics — Main Entry Point
// =============================================================================
//
// Batch run: load config, fetch each symbol's prices (or returns), analyse decay
// and market regimes, print a summary and optionally write JSON reports.
// Exits with an error only when no instrument could be analysed.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod decay;
mod error;
mod market_data;
mod pipeline;
mod regime;
mod report;
mod runtime_config;
mod stats;
mod types;
mod yahoo;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::market_data::PriceProvider;
use crate::runtime_config::AnalysisConfig;

const DEFAULT_CONFIG_PATH: &str = "meridian_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("MERIDIAN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = AnalysisConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, path = %config_path, "Failed to load config, using defaults");
        AnalysisConfig::default()
    });

    // Override symbols from env if available.
    if let Ok(syms) = std::env::var("MERIDIAN_SYMBOLS") {
        config.override_symbols(&syms);
    }

    info!(
        symbols = ?config.symbols,
        source = %config.data_source,
        signal = %config.signal,
        regime_method = %config.regime.method,
        "Meridian analytics starting"
    );

    // ── 2. Provider ──────────────────────────────────────────────────────
    let provider = PriceProvider::new(
        config.data_source.clone(),
        config.fetch_timeout(),
        config.fetch_retries,
    )?;

    // ── 3. Batch ─────────────────────────────────────────────────────────
    let summary = pipeline::run_batch(&config, &provider).await;

    for (symbol, reason) in &summary.failed {
        warn!(symbol = %symbol, reason = %reason, "instrument skipped");
    }

    if !summary.any_succeeded() {
        anyhow::bail!(
            "no instrument could be analysed ({} failed)",
            summary.failed.len()
        );
    }

    info!(
        analysed = summary.succeeded.len(),
        skipped = summary.failed.len(),
        "Meridian analytics finished"
    );
    Ok(())
}
