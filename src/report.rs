// =============================================================================
// Report Output — console summary and JSON file
// =============================================================================

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::pipeline::InstrumentAnalysis;

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.decimals$}"))
}

/// Plain-text summary of one instrument's analysis.
pub fn render_text(a: &InstrumentAnalysis) -> String {
    let d = &a.decay;
    let r = &a.regime;
    let mut out = String::new();

    let _ = writeln!(out, "{}", "=".repeat(60));
    let (signal, unit) = match a.signal {
        Some(signal) => (signal.to_string(), "prices"),
        None => ("supplied returns".to_string(), "returns"),
    };
    let _ = writeln!(
        out,
        "{}  {}  ({} to {}, {} {})",
        a.symbol,
        signal,
        a.first_date.format("%Y-%m-%d"),
        a.last_date.format("%Y-%m-%d"),
        a.observations,
        unit
    );
    let _ = writeln!(out, "{}", "=".repeat(60));

    let _ = writeln!(out, "Signal decay (window {})", d.window);
    let _ = writeln!(out, "  Annual return:      {}%", fmt_opt(d.summary.annual_return_pct, 2));
    let _ = writeln!(out, "  Annual volatility:  {}%", fmt_opt(d.summary.annual_vol_pct, 2));
    let _ = writeln!(out, "  Sharpe:             {}", fmt_opt(d.summary.sharpe, 3));
    let _ = writeln!(out, "  Max drawdown:       {}%", fmt_opt(d.summary.max_drawdown_pct, 2));
    let _ = writeln!(
        out,
        "  Sharpe 1st / 2nd half: {} / {}  (change {})",
        fmt_opt(d.first_half_sharpe, 3),
        fmt_opt(d.second_half_sharpe, 3),
        fmt_opt(d.sharpe_change(), 3)
    );
    let _ = writeln!(out, "  Verdict:            {}", d.verdict);
    let _ = writeln!(
        out,
        "  Latest rolling return / vol: {}% / {}%",
        fmt_opt(d.rolling_return.last_defined().map(|(_, v)| v), 2),
        fmt_opt(d.rolling_volatility.last_defined().map(|(_, v)| v), 2)
    );
    let _ = writeln!(out, "  Rolling Sharpe trend: {} / year", fmt_opt(d.sharpe_trend_per_year, 4));
    let _ = writeln!(
        out,
        "  Latest autocorrelation: {}",
        fmt_opt(d.rolling_autocorrelation.last_defined().map(|(_, v)| v), 3)
    );
    let _ = writeln!(
        out,
        "  Half-life:          {} ({})",
        d.half_life,
        d.half_life.interpretation()
    );
    let _ = writeln!(out, "  Breakpoints:        {}", d.breakpoints.len());
    for ts in &d.breakpoints {
        let _ = writeln!(out, "    {}", ts.format("%Y-%m-%d"));
    }

    let _ = writeln!(out);
    let _ = write!(out, "Regimes ({}", r.method_used);
    if r.fell_back() {
        let _ = write!(out, ", fell back from {}", r.method_requested);
    }
    let _ = writeln!(out, ")");
    let _ = writeln!(
        out,
        "  {:<10} {:>6} {:>7} {:>9} {:>8} {:>7} {:>7} {:>8} {:>8} {:>6}",
        "Regime", "Days", "% Time", "Ann Ret%", "Ann Vol%", "Sharpe", "Skew", "Worst%", "Best%", "Stay%"
    );
    for s in &r.stats {
        let stay = r.transitions.probability(s.regime, s.regime).map(|p| p * 100.0);
        let _ = writeln!(
            out,
            "  {:<10} {:>6} {:>7.1} {:>9} {:>8} {:>7} {:>7} {:>8} {:>8} {:>6}",
            s.regime.to_string(),
            s.count,
            s.pct_time,
            fmt_opt(s.ann_return_pct, 2),
            fmt_opt(s.ann_vol_pct, 2),
            fmt_opt(s.sharpe, 2),
            fmt_opt(s.skewness, 2),
            fmt_opt(s.worst_pct, 2),
            fmt_opt(s.best_pct, 2),
            fmt_opt(stay, 1)
        );
    }

    // Rows are "from", columns "to"; a label that never has a successor
    // gets a row of dashes.
    let labels = r.transitions.labels();
    let _ = write!(out, "  Transitions (%)\n    {:<10}", "");
    for to in &labels {
        let _ = write!(out, " {:>9}", to.to_string());
    }
    let _ = writeln!(out);
    for from in &labels {
        let row = r.transitions.row(*from);
        let _ = write!(out, "    {:<10}", from.to_string());
        for to in &labels {
            let cell = row.as_ref().map(|row| row.get(to).copied().unwrap_or(0.0) * 100.0);
            let _ = write!(out, " {:>9}", cell.map_or_else(|| "-".to_string(), |p| format!("{p:.1}")));
        }
        let _ = writeln!(out);
    }
    let _ = write!(
        out,
        "  Current regime:     {}",
        r.current_regime.map_or_else(|| "n/a".to_string(), |l| l.to_string())
    );
    let since = r
        .regimes
        .changes()
        .last()
        .and_then(|&i| r.regimes.timestamps().get(i).copied());
    if let Some(ts) = since {
        let _ = write!(out, " (since {})", ts.format("%Y-%m-%d"));
    }
    let _ = writeln!(out);

    out
}

/// Write `{dir}/{symbol}_analysis.json` through a `.tmp` sibling and a
/// rename.  Creates `dir` if needed.
pub fn write_json(analysis: &InstrumentAnalysis, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    let path = dir.join(format!("{}_analysis.json", analysis.symbol));
    let tmp_path = path.with_extension("json.tmp");

    let content = serde_json::to_string_pretty(analysis)
        .context("failed to serialise analysis report to JSON")?;

    std::fs::write(&tmp_path, &content)
        .with_context(|| format!("failed to write tmp report to {}", tmp_path.display()))?;

    std::fs::rename(&tmp_path, &path)
        .with_context(|| format!("failed to rename tmp report to {}", path.display()))?;

    info!(path = %path.display(), symbol = %analysis.symbol, "analysis report written (atomic)");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decay::SignalKind;
    use crate::pipeline::analyze_instrument;
    use crate::pipeline::tests::shifted_history;
    use crate::runtime_config::AnalysisConfig;

    fn analysis() -> InstrumentAnalysis {
        let mut cfg = AnalysisConfig::default();
        cfg.signal = SignalKind::BuyAndHold;
        cfg.decay.window = 60;
        analyze_instrument(&shifted_history("SYN"), &cfg).unwrap()
    }

    #[test]
    fn text_summary_mentions_every_section() {
        let text = render_text(&analysis());
        assert!(text.contains("SYN  buy-and-hold"));
        assert!(text.contains("501 prices"));
        assert!(text.contains("Latest rolling return / vol:"));
        assert!(text.contains("Half-life:"));
        assert!(text.contains("Regimes (volatility)"));
        assert!(text.contains("Crisis"));
        assert!(text.contains("Current regime:     Crisis (since 2020-"));
        assert!(text.contains("Stay%"));
        assert!(text.contains("Transitions (%)"));
        // Warm-up labels get their own table row and matrix row.
        let unknown_rows = text.lines().filter(|l| l.trim_start().starts_with("Unknown")).count();
        assert_eq!(unknown_rows, 2);
    }

    #[test]
    fn json_report_is_written_and_parses() {
        let dir = std::env::temp_dir().join(format!("meridian-report-{}", std::process::id()));
        let a = analysis();
        let path = write_json(&a, &dir).unwrap();
        assert_eq!(path, dir.join("SYN_analysis.json"));
        assert!(!path.with_extension("json.tmp").exists());

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["symbol"], "SYN");
        assert_eq!(value["signal"]["kind"], "buy_and_hold");
        assert_eq!(value["regime"]["current_regime"], "Crisis");
        assert!(value["decay"]["half_life"]["status"].is_string());
        assert!(value["decay"]["rolling_return"]["values"].is_array());

        let back: InstrumentAnalysis = serde_json::from_value(value).unwrap();
        assert_eq!(back.regime.regimes.len(), a.regime.regimes.len());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn supplied_returns_are_labelled() {
        let mut cfg = AnalysisConfig::default();
        cfg.decay.window = 60;
        let returns = shifted_history("SYN").log_returns();
        let a = crate::pipeline::analyze_returns("STRAT", &returns, &cfg).unwrap();
        let text = render_text(&a);
        assert!(text.contains("STRAT  supplied returns"));
        assert!(text.contains("500 returns"));
    }

    #[test]
    fn missing_values_render_as_na() {
        assert_eq!(fmt_opt(None, 2), "n/a");
        assert_eq!(fmt_opt(Some(1.23456), 2), "1.23");
    }
}
