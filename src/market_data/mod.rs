// =============================================================================
// Market Data — per-symbol input providers
// =============================================================================
//
// Supplies one validated input per symbol: a `PriceHistory` from the Yahoo
// chart endpoint or `{dir}/{symbol}.csv`, or a ready-made return series from
// `{dir}/{symbol}.csv` when the source is `returns_csv`.

pub mod csv_loader;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{PriceHistory, Series};
use crate::yahoo::YahooClient;

pub use csv_loader::{load_csv, load_returns_csv};

fn default_base_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

fn default_range() -> String {
    "10y".to_string()
}

fn default_interval() -> String {
    "1d".to_string()
}

/// Where an instrument's data comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    Yahoo {
        #[serde(default = "default_base_url")]
        base_url: String,
        #[serde(default = "default_range")]
        range: String,
        #[serde(default = "default_interval")]
        interval: String,
    },
    /// Closing prices, one file per symbol.
    Csv { dir: PathBuf },
    /// Per-period returns, one file per symbol.  The configured signal is
    /// not applied; decay and regimes both run on these returns.
    ReturnsCsv { dir: PathBuf },
}

impl Default for DataSource {
    fn default() -> Self {
        Self::Yahoo {
            base_url: default_base_url(),
            range: default_range(),
            interval: default_interval(),
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yahoo { range, interval, .. } => {
                write!(f, "yahoo(range={range}, interval={interval})")
            }
            Self::Csv { dir } => write!(f, "csv({})", dir.display()),
            Self::ReturnsCsv { dir } => write!(f, "returns_csv({})", dir.display()),
        }
    }
}

/// What a provider hands to the pipeline for one symbol.
#[derive(Debug, Clone)]
pub enum MarketInput {
    Prices(PriceHistory),
    Returns { symbol: String, returns: Series },
}

pub struct PriceProvider {
    source: DataSource,
    yahoo: Option<YahooClient>,
}

impl PriceProvider {
    pub fn new(source: DataSource, timeout: Duration, retries: u32) -> Result<Self> {
        let yahoo = match &source {
            DataSource::Yahoo { base_url, .. } => Some(YahooClient::new(base_url, timeout, retries)?),
            DataSource::Csv { .. } | DataSource::ReturnsCsv { .. } => None,
        };
        Ok(Self { source, yahoo })
    }

    pub async fn fetch(&self, symbol: &str) -> Result<MarketInput> {
        let observations = match (&self.source, &self.yahoo) {
            (DataSource::Yahoo { range, interval, .. }, Some(client)) => {
                client.get_closes(symbol, range, interval).await?
            }
            (DataSource::Yahoo { .. }, None) => anyhow::bail!("Yahoo client not initialised"),
            (DataSource::Csv { dir }, _) => load_csv(&dir.join(format!("{symbol}.csv")))?,
            (DataSource::ReturnsCsv { dir }, _) => {
                let observations = load_returns_csv(&dir.join(format!("{symbol}.csv")))?;
                let returns = Series::from_observations(&observations)
                    .with_context(|| format!("invalid return series for {symbol}"))?;
                info!(
                    symbol,
                    source = %self.source,
                    returns = returns.len(),
                    "return series loaded"
                );
                return Ok(MarketInput::Returns {
                    symbol: symbol.to_string(),
                    returns,
                });
            }
        };

        let history = PriceHistory::new(symbol, &observations)
            .with_context(|| format!("invalid price history for {symbol}"))?;

        info!(
            symbol,
            source = %self.source,
            bars = history.len(),
            last_price = ?history.last_price().map(|p| format!("{:.2}", p)),
            "price history loaded"
        );
        Ok(MarketInput::Prices(history))
    }
}
