// =============================================================================
// Yahoo Finance Chart Client — daily closes over HTTP with bounded retries
// =============================================================================
//
// Only the public chart endpoint is used:
//
//   GET {base_url}/v8/finance/chart/{symbol}?range={range}&interval={interval}
//
// The symbol is pushed as one encoded path segment and the query pairs go
// through reqwest's form encoder, so `^GSPC` or `BRK/B` reach the server
// intact.
// Adjusted closes are preferred when the response carries them; bars with a
// null close are skipped.  Every request has a hard timeout, and failed
// requests are retried with a linear backoff (500 ms, 1 s, 1.5 s, ...).
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::types::Observation;

/// Backoff step between retries (multiplied by the attempt number).
const BACKOFF_STEP: Duration = Duration::from_millis(500);

// -----------------------------------------------------------------------------
// Response shape (only the fields we read)
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

// -----------------------------------------------------------------------------
// Client
// -----------------------------------------------------------------------------

#[derive(Clone)]
pub struct YahooClient {
    base_url: reqwest::Url,
    client: reqwest::Client,
    retries: u32,
}

impl YahooClient {
    /// `timeout` applies to each request; `retries` is the total number of
    /// attempts (at least one is always made).
    pub fn new(base_url: &str, timeout: Duration, retries: u32) -> Result<Self> {
        let base_url = reqwest::Url::parse(base_url)
            .with_context(|| format!("invalid Yahoo base URL '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Yahoo base URL '{base_url}' cannot carry a path");
        }

        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (meridian-analytics)")
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        debug!(
            base_url = %base_url,
            timeout_ms = timeout.as_millis() as u64,
            retries,
            "YahooClient initialised"
        );

        Ok(Self {
            base_url,
            client,
            retries: retries.max(1),
        })
    }

    fn chart_url(&self, symbol: &str) -> Result<reqwest::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Yahoo base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        Ok(url)
    }

    /// Daily (or `interval`) closes for `symbol`, oldest first.
    #[instrument(skip(self), name = "yahoo::get_closes")]
    pub async fn get_closes(
        &self,
        symbol: &str,
        range: &str,
        interval: &str,
    ) -> Result<Vec<Observation>> {
        let mut last_err = None;

        for attempt in 1..=self.retries {
            match self.request_chart(symbol, range, interval).await {
                Ok(observations) => {
                    debug!(symbol, attempt, count = observations.len(), "chart fetched");
                    return Ok(observations);
                }
                Err(e) => {
                    warn!(
                        symbol,
                        attempt,
                        max_attempts = self.retries,
                        error = %e,
                        "chart request failed"
                    );
                    last_err = Some(e);
                    if attempt < self.retries {
                        tokio::time::sleep(BACKOFF_STEP * attempt).await;
                    }
                }
            }
        }

        let err = last_err.unwrap_or_else(|| anyhow::anyhow!("no attempt made"));
        Err(err.context(format!(
            "giving up on {symbol} after {} attempt(s)",
            self.retries
        )))
    }

    async fn request_chart(
        &self,
        symbol: &str,
        range: &str,
        interval: &str,
    ) -> Result<Vec<Observation>> {
        let url = self.chart_url(symbol)?;

        let resp = self
            .client
            .get(url)
            .query(&[("range", range), ("interval", interval)])
            .send()
            .await
            .context("GET /v8/finance/chart request failed")?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .context("failed to read chart response body")?;

        if !status.is_success() {
            anyhow::bail!("Yahoo GET /v8/finance/chart/{} returned {}: {}", symbol, status, body);
        }

        parse_chart(&body)
    }
}

/// Extract (timestamp, close) pairs from a chart response body.
pub fn parse_chart(body: &str) -> Result<Vec<Observation>> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).context("failed to parse chart response")?;

    if let Some(err) = envelope.chart.error {
        anyhow::bail!("Yahoo chart error {}: {}", err.code, err.description);
    }

    let result = envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .context("chart response has no result")?;

    let closes: Vec<Option<f64>> = match result.indicators.adjclose.into_iter().next() {
        Some(adj) if !adj.adjclose.is_empty() => adj.adjclose,
        _ => result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .context("chart response has no quote data")?,
    };

    let mut observations = Vec::with_capacity(result.timestamp.len());
    let mut skipped = 0_usize;
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(value) = closes.get(i).copied().flatten() else {
            skipped += 1;
            continue;
        };
        let timestamp = Utc
            .timestamp_opt(ts, 0)
            .single()
            .with_context(|| format!("invalid unix timestamp {ts} in chart response"))?;
        observations.push(Observation { timestamp, value });
    }

    if skipped > 0 {
        debug!(skipped, "chart bars without a close skipped");
    }
    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "SPY"},
                "timestamp": [1704205800, 1704292200, 1704378600, 1704465000],
                "indicators": {
                    "quote": [{"close": [472.65, null, 467.28, 467.92], "open": [1, 2, 3, 4]}],
                    "adjclose": [{"adjclose": [465.1, null, 459.8, 460.4]}]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn adjusted_close_preferred_and_nulls_skipped() {
        let obs = parse_chart(BODY).unwrap();
        assert_eq!(obs.len(), 3);
        assert!((obs[0].value - 465.1).abs() < 1e-12);
        assert!((obs[2].value - 460.4).abs() < 1e-12);
        assert_eq!(obs[0].timestamp.timestamp(), 1704205800);
        assert_eq!(obs[1].timestamp.timestamp(), 1704378600);
    }

    #[test]
    fn falls_back_to_raw_close() {
        let body = r#"{"chart": {"result": [{
            "timestamp": [1704205800, 1704292200],
            "indicators": {"quote": [{"close": [10.0, 11.0]}]}
        }], "error": null}}"#;
        let obs = parse_chart(body).unwrap();
        assert_eq!(obs.len(), 2);
        assert!((obs[1].value - 11.0).abs() < 1e-12);
    }

    #[test]
    fn api_error_is_reported() {
        let body = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        let err = parse_chart(body).unwrap_err();
        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn garbage_body_is_an_error() {
        assert!(parse_chart("<html>").is_err());
    }

    #[test]
    fn symbol_is_one_encoded_path_segment() {
        let client = YahooClient::new("http://127.0.0.1:9/", Duration::from_secs(1), 1).unwrap();
        let url = client.chart_url("BRK/B").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9/v8/finance/chart/BRK%2FB");
        assert!(YahooClient::new("not a url", Duration::from_secs(1), 1).is_err());
    }

    // -------------------------------------------------------------------------
    // Local HTTP stub: answers each connection with the next canned status,
    // repeating the last one, and records every request line.
    // -------------------------------------------------------------------------

    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve(statuses: Vec<u16>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            let mut n = 0;
            loop {
                let Ok((mut stream, _)) = listener.accept().await else { return };
                let mut buf = Vec::new();
                let mut chunk = [0_u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(k) => buf.extend_from_slice(&chunk[..k]),
                    }
                }
                let request = String::from_utf8_lossy(&buf);
                seen.lock().unwrap().push(request.lines().next().unwrap_or("").to_string());

                let status = statuses[n.min(statuses.len() - 1)];
                n += 1;
                let body = if status == 200 { BODY } else { "upstream unavailable" };
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{addr}"), requests)
    }

    #[tokio::test]
    async fn server_error_is_retried_until_success() {
        let (base, requests) = serve(vec![500, 200]).await;
        let client = YahooClient::new(&base, Duration::from_secs(2), 3).unwrap();

        let obs = client.get_closes("SPY", "5y", "1d").await.unwrap();
        assert_eq!(obs.len(), 3);
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn persistent_failure_gives_up_after_all_attempts() {
        let (base, requests) = serve(vec![503]).await;
        let client = YahooClient::new(&base, Duration::from_secs(2), 3).unwrap();

        let err = client.get_closes("SPY", "5y", "1d").await.unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("giving up on SPY after 3 attempt(s)"), "{msg}");
        assert!(msg.contains("503"), "{msg}");
        assert_eq!(requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn query_values_are_encoded() {
        let (base, requests) = serve(vec![200]).await;
        let client = YahooClient::new(&base, Duration::from_secs(2), 1).unwrap();

        client.get_closes("^GSPC", "1y", "1d&x=1").await.unwrap();
        let line = requests.lock().unwrap()[0].clone();
        assert!(line.starts_with("GET /v8/finance/chart/"), "{line}");
        assert!(line.contains("GSPC?range=1y&interval=1d%26x%3D1 "), "{line}");
    }
}
