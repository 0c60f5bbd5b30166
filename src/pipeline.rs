// =============================================================================
// Analysis Pipeline
// =============================================================================
//
// prices  -> signal returns          -> decay analysis
//         -> instrument log returns   -> regime analysis
// returns -> decay analysis and regime analysis on the same series
//         -> text summary / JSON report
//
// Instruments are processed one after another.  A failing instrument is
// logged and listed in the batch summary; the rest of the batch proceeds.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::decay::{DecayAnalyzer, DecayReport, SignalKind};
use crate::error::{AnalysisError, Result};
use crate::market_data::{MarketInput, PriceProvider};
use crate::regime::RegimeAnalysis;
use crate::report;
use crate::runtime_config::AnalysisConfig;
use crate::types::{PriceHistory, Series};

/// Everything computed for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentAnalysis {
    pub symbol: String,
    /// Signal applied to the prices; `None` when returns were supplied.
    pub signal: Option<SignalKind>,
    pub generated_at: DateTime<Utc>,
    pub first_date: DateTime<Utc>,
    pub last_date: DateTime<Utc>,
    /// Input points: prices, or returns when those were supplied.
    pub observations: usize,
    pub decay: DecayReport,
    pub regime: RegimeAnalysis,
}

pub fn analyze_input(input: &MarketInput, config: &AnalysisConfig) -> Result<InstrumentAnalysis> {
    match input {
        MarketInput::Prices(history) => analyze_instrument(history, config),
        MarketInput::Returns { symbol, returns } => analyze_returns(symbol, returns, config),
    }
}

/// Decay of the configured signal, regimes of the instrument's log returns.
pub fn analyze_instrument(history: &PriceHistory, config: &AnalysisConfig) -> Result<InstrumentAnalysis> {
    let signal_returns = config.signal.returns(history);
    assemble(
        &history.symbol,
        Some(config.signal),
        history.prices(),
        &signal_returns,
        &history.log_returns(),
        config,
    )
}

/// Decay and regimes of a supplied return series.
pub fn analyze_returns(symbol: &str, returns: &Series, config: &AnalysisConfig) -> Result<InstrumentAnalysis> {
    assemble(symbol, None, returns, returns, returns, config)
}

fn assemble(
    symbol: &str,
    signal: Option<SignalKind>,
    input: &Series,
    decay_returns: &Series,
    regime_returns: &Series,
    config: &AnalysisConfig,
) -> Result<InstrumentAnalysis> {
    let timestamps = input.timestamps();
    let (first_date, last_date) = match (timestamps.first(), timestamps.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(AnalysisError::EmptySeries("instrument input")),
    };

    let decay = DecayAnalyzer::new(
        config.decay.window,
        config.decay.breakpoint_threshold,
        config.decay.cluster_gap_days,
    )
    .analyze(decay_returns)?;

    let regime = config.regime.detector().detect(regime_returns)?;

    Ok(InstrumentAnalysis {
        symbol: symbol.to_string(),
        signal,
        generated_at: Utc::now(),
        first_date,
        last_date,
        observations: input.len(),
        decay,
        regime,
    })
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub reports_written: Vec<PathBuf>,
}

impl BatchSummary {
    pub fn any_succeeded(&self) -> bool {
        !self.succeeded.is_empty()
    }
}

/// Analyse every configured symbol, printing a summary for each.
pub async fn run_batch(config: &AnalysisConfig, provider: &PriceProvider) -> BatchSummary {
    let mut summary = BatchSummary::default();

    for symbol in &config.symbols {
        match process_symbol(symbol, config, provider).await {
            Ok((analysis, written)) => {
                println!("{}", report::render_text(&analysis));
                summary.reports_written.extend(written);
                summary.succeeded.push(symbol.clone());
            }
            Err(e) => {
                error!(symbol = %symbol, error = format!("{e:#}"), "instrument analysis failed");
                summary.failed.push((symbol.clone(), format!("{e:#}")));
            }
        }
    }

    info!(
        succeeded = summary.succeeded.len(),
        failed = summary.failed.len(),
        reports = summary.reports_written.len(),
        "batch complete"
    );
    summary
}

async fn process_symbol(
    symbol: &str,
    config: &AnalysisConfig,
    provider: &PriceProvider,
) -> anyhow::Result<(InstrumentAnalysis, Option<PathBuf>)> {
    let input = provider.fetch(symbol).await?;
    let analysis = analyze_input(&input, config)?;
    let written = match &config.output_dir {
        Some(dir) => Some(report::write_json(&analysis, dir)?),
        None => None,
    };
    Ok((analysis, written))
}
