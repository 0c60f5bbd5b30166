// =============================================================================
// Shared types used across the analysis pipeline
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// A single (timestamp, value) observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

// =============================================================================
// Series
// =============================================================================

/// A time-indexed sequence of optional values.
///
/// Timestamps are strictly increasing.  `None` marks an undefined point, e.g.
/// the warm-up prefix of a rolling computation or a degenerate window.
/// Deserialising goes through [`Series::new`], so a JSON series is held to
/// the same rules as one built in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SeriesData")]
pub struct Series {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<Option<f64>>,
}

/// Unvalidated wire form of a [`Series`].
#[derive(Deserialize)]
struct SeriesData {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<Option<f64>>,
}

impl TryFrom<SeriesData> for Series {
    type Error = AnalysisError;

    fn try_from(data: SeriesData) -> Result<Self> {
        Self::new(data.timestamps, data.values)
    }
}

impl Series {
    /// Build a series, validating length and timestamp order.
    ///
    /// NaN and infinite values are stored as undefined points.
    pub fn new(timestamps: Vec<DateTime<Utc>>, values: Vec<Option<f64>>) -> Result<Self> {
        if timestamps.len() != values.len() {
            return Err(AnalysisError::LengthMismatch {
                timestamps: timestamps.len(),
                values: values.len(),
            });
        }
        check_increasing(&timestamps)?;
        let values = values
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();
        Ok(Self { timestamps, values })
    }

    /// Build a fully-defined series from observations.
    pub fn from_observations(observations: &[Observation]) -> Result<Self> {
        let timestamps = observations.iter().map(|o| o.timestamp).collect();
        let values = observations.iter().map(|o| Some(o.value)).collect();
        Self::new(timestamps, values)
    }

    /// A series sharing `self`'s index with new values.
    ///
    /// Callers inside the crate always produce exactly one value per
    /// timestamp, so the index invariant carries over.
    pub(crate) fn with_values(&self, values: Vec<Option<f64>>) -> Self {
        debug_assert_eq!(values.len(), self.timestamps.len());
        Self {
            timestamps: self.timestamps.clone(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    /// Iterate over the defined points only.
    pub fn defined(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.timestamps
            .iter()
            .zip(&self.values)
            .filter_map(|(ts, v)| v.map(|v| (*ts, v)))
    }

    /// Defined values, in order, without timestamps.
    pub fn defined_values(&self) -> Vec<f64> {
        self.values.iter().flatten().copied().collect()
    }

    pub fn defined_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_all_undefined(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    pub fn last_defined(&self) -> Option<(DateTime<Utc>, f64)> {
        self.defined().last()
    }

    /// Running sum.  An undefined input point contributes nothing and is
    /// undefined in the output.
    pub fn cumulative_sum(&self) -> Series {
        let mut running = 0.0_f64;
        let values = self
            .values
            .iter()
            .map(|v| {
                v.map(|x| {
                    running += x;
                    running
                })
            })
            .collect();
        self.with_values(values)
    }

    /// Contiguous sub-range `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> Series {
        let end = end.min(self.len());
        let start = start.min(end);
        Self {
            timestamps: self.timestamps[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
        }
    }
}

fn check_increasing(timestamps: &[DateTime<Utc>]) -> Result<()> {
    for (i, pair) in timestamps.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(AnalysisError::NonIncreasingTimestamp {
                index: i + 1,
                previous: pair[0],
                current: pair[1],
            });
        }
    }
    Ok(())
}

// =============================================================================
// PriceHistory
// =============================================================================

/// Validated closing prices for one instrument.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    pub symbol: String,
    prices: Series,
}

impl PriceHistory {
    pub fn new(symbol: impl Into<String>, observations: &[Observation]) -> Result<Self> {
        if observations.is_empty() {
            return Err(AnalysisError::EmptySeries("price history"));
        }
        for (index, o) in observations.iter().enumerate() {
            if !o.value.is_finite() || o.value <= 0.0 {
                return Err(AnalysisError::InvalidPrice {
                    index,
                    value: o.value,
                });
            }
        }
        Ok(Self {
            symbol: symbol.into(),
            prices: Series::from_observations(observations)?,
        })
    }

    pub fn prices(&self) -> &Series {
        &self.prices
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// `ln(p[t] / p[t-1])`, indexed from the second observation on.
    pub fn log_returns(&self) -> Series {
        let ts = self.prices.timestamps();
        let px = self.prices.values();
        let mut timestamps = Vec::with_capacity(ts.len().saturating_sub(1));
        let mut values = Vec::with_capacity(ts.len().saturating_sub(1));
        for i in 1..ts.len() {
            timestamps.push(ts[i]);
            values.push(match (px[i - 1], px[i]) {
                (Some(prev), Some(cur)) => Some((cur / prev).ln()),
                _ => None,
            });
        }
        Series {
            timestamps,
            values,
        }
    }

    pub fn last_price(&self) -> Option<f64> {
        self.prices.last_defined().map(|(_, p)| p)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    /// Consecutive calendar days starting 2020-01-01.
    pub(crate) fn daily_index(len: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        (0..len).map(|i| start + Duration::days(i as i64)).collect()
    }

    pub(crate) fn daily_series(values: &[f64]) -> Series {
        let values: Vec<_> = values.iter().copied().map(Some).collect();
        Series::new(daily_index(values.len()), values).unwrap()
    }

    #[test]
    fn rejects_duplicate_timestamps() {
        let mut ts = daily_index(3);
        ts[2] = ts[1];
        let err = Series::new(ts, vec![Some(1.0), Some(2.0), Some(3.0)]).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::NonIncreasingTimestamp { index: 2, .. }
        ));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = Series::new(daily_index(3), vec![Some(1.0)]).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::LengthMismatch {
                timestamps: 3,
                values: 1
            }
        ));
    }

    #[test]
    fn non_finite_values_become_undefined() {
        let s = Series::new(
            daily_index(4),
            vec![Some(1.0), Some(f64::NAN), Some(f64::INFINITY), Some(f64::NEG_INFINITY)],
        )
        .unwrap();
        assert_eq!(s.values(), &[Some(1.0), None, None, None]);
        assert_eq!(s.defined_count(), 1);
    }

    #[test]
    fn deserialise_validates_the_index() {
        let ok = r#"{"timestamps": ["2020-01-01T00:00:00Z", "2020-01-02T00:00:00Z"],
                     "values": [0.5, null]}"#;
        let s: Series = serde_json::from_str(ok).unwrap();
        assert_eq!(s.values(), &[Some(0.5), None]);

        let unordered = r#"{"timestamps": ["2020-01-02T00:00:00Z", "2020-01-01T00:00:00Z"],
                            "values": [1.0, 2.0]}"#;
        let err = serde_json::from_str::<Series>(unordered).unwrap_err();
        assert!(err.to_string().contains("is not after the previous one"), "{err}");

        let short = r#"{"timestamps": ["2020-01-01T00:00:00Z"], "values": []}"#;
        assert!(serde_json::from_str::<Series>(short).is_err());
    }

    #[test]
    fn serialised_series_reads_back_equal() {
        let s = Series::new(daily_index(3), vec![Some(0.1), None, Some(-0.2)]).unwrap();
        let back: Series = serde_json::from_str(&serde_json::to_string(&s).unwrap()).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn cumulative_sum_skips_gaps() {
        let s = Series::new(daily_index(4), vec![Some(1.0), None, Some(2.0), Some(3.0)]).unwrap();
        let c = s.cumulative_sum();
        assert_eq!(c.values(), &[Some(1.0), None, Some(3.0), Some(6.0)]);
    }

    #[test]
    fn log_returns_drop_first_observation() {
        let ts = daily_index(3);
        let obs: Vec<Observation> = ts
            .iter()
            .zip([100.0, 110.0, 99.0])
            .map(|(t, v)| Observation {
                timestamp: *t,
                value: v,
            })
            .collect();
        let history = PriceHistory::new("TEST", &obs).unwrap();
        let r = history.log_returns();
        assert_eq!(r.len(), 2);
        assert_eq!(r.timestamps()[0], ts[1]);
        assert!((r.get(0).unwrap() - (1.1_f64).ln()).abs() < 1e-12);
        assert!((r.get(1).unwrap() - (0.9_f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_positive_prices() {
        let ts = daily_index(2);
        let obs = [
            Observation {
                timestamp: ts[0],
                value: 10.0,
            },
            Observation {
                timestamp: ts[1],
                value: 0.0,
            },
        ];
        assert!(matches!(
            PriceHistory::new("X", &obs),
            Err(AnalysisError::InvalidPrice { index: 1, .. })
        ));
    }

    #[test]
    fn empty_history_is_an_error() {
        assert!(matches!(
            PriceHistory::new("X", &[]),
            Err(AnalysisError::EmptySeries(_))
        ));
    }
}
