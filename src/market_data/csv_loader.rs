// =============================================================================
// CSV Loader — closing prices or pre-computed returns
// =============================================================================
//
// Reads one instrument from a headed CSV file:
//
//   - first column: `YYYY-MM-DD` date or RFC 3339 timestamp
//   - price files: `Adj Close`, then `Close` (case-insensitive), otherwise
//     the last column
//   - return files: `Return` (case-insensitive), otherwise the last column
//   - rows whose value is empty, `null` or `NaN` are skipped

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

use crate::types::Observation;

/// Load closing prices from the CSV file at `path`.
pub fn load_csv(path: &Path) -> Result<Vec<Observation>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let observations =
        read_observations(file).with_context(|| format!("failed to read {}", path.display()))?;
    debug!(path = %path.display(), count = observations.len(), "CSV prices loaded");
    Ok(observations)
}

/// Load per-period returns from the CSV file at `path`.
pub fn load_returns_csv(path: &Path) -> Result<Vec<Observation>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let observations =
        read_returns(file).with_context(|| format!("failed to read {}", path.display()))?;
    debug!(path = %path.display(), count = observations.len(), "CSV returns loaded");
    Ok(observations)
}

pub fn read_observations<R: Read>(input: R) -> Result<Vec<Observation>> {
    read_column(input, price_column, "price")
}

pub fn read_returns<R: Read>(input: R) -> Result<Vec<Observation>> {
    read_column(input, return_column, "return")
}

fn read_column<R: Read>(
    input: R,
    pick: fn(&StringRecord) -> Option<usize>,
    what: &str,
) -> Result<Vec<Observation>> {
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let headers = reader.headers().context("missing CSV header row")?.clone();
    let value_col = pick(&headers).context("CSV has fewer than two columns")?;

    let mut observations = Vec::new();
    for (row, record) in reader.records().enumerate() {
        // header is line 1
        let line = row + 2;
        let record = record.with_context(|| format!("malformed CSV record at line {line}"))?;

        let raw_value = record.get(value_col).unwrap_or("");
        if is_missing(raw_value) {
            continue;
        }
        let value: f64 = raw_value
            .parse()
            .with_context(|| format!("invalid {what} '{raw_value}' at line {line}"))?;
        let raw_date = record.get(0).unwrap_or("");
        let timestamp =
            parse_timestamp(raw_date).with_context(|| format!("invalid date '{raw_date}' at line {line}"))?;

        observations.push(Observation { timestamp, value });
    }
    Ok(observations)
}

fn price_column(headers: &StringRecord) -> Option<usize> {
    if headers.len() < 2 {
        return None;
    }
    let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    find("adj close")
        .or_else(|| find("close"))
        .or(Some(headers.len() - 1))
}

fn return_column(headers: &StringRecord) -> Option<usize> {
    if headers.len() < 2 {
        return None;
    }
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("return"))
        .or(Some(headers.len() - 1))
}

fn is_missing(raw: &str) -> bool {
    raw.is_empty() || raw.eq_ignore_ascii_case("null") || raw.eq_ignore_ascii_case("nan")
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).context("invalid midnight")?;
        return Ok(midnight.and_utc());
    }
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
