//! Reporting and export: JSON, CSV, and Markdown artifact generation.
//!
//! Provides three export formats for backtest reports:
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: trade history, balance history, and a flat summary row
//! - **Markdown**: a human-readable single-run report
//!
//! All persisted artifacts include a `schema_version` field. Newer versions
//! are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use predtrade_core::domain::TradeRecord;

use crate::metrics::PerformanceSummary;
use crate::runner::{BacktestReport, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestReport` to pretty JSON.
pub fn export_json(report: &BacktestReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize BacktestReport to JSON")
}

/// Deserialize a `BacktestReport` from JSON, rejecting newer schema versions.
pub fn import_json(json: &str) -> Result<BacktestReport> {
    let report: BacktestReport =
        serde_json::from_str(json).context("failed to deserialize BacktestReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export the trade history as CSV, one row per closed trade.
///
/// Columns: side, entry_bar, opened_at, entry_price, exit_bar, closed_at,
/// exit_price, exit_reason, size, leverage, pnl_rate, fee_rate, pnl_amount,
/// balance_after, bars_held
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "side",
        "entry_bar",
        "opened_at",
        "entry_price",
        "exit_bar",
        "closed_at",
        "exit_price",
        "exit_reason",
        "size",
        "leverage",
        "pnl_rate",
        "fee_rate",
        "pnl_amount",
        "balance_after",
        "bars_held",
    ])?;

    for t in trades {
        wtr.write_record([
            t.side.to_string(),
            t.entry_bar.to_string(),
            t.opened_at.to_rfc3339(),
            format!("{:.6}", t.entry_price),
            t.exit_bar.to_string(),
            t.closed_at.to_rfc3339(),
            format!("{:.6}", t.exit_price),
            t.exit_reason.to_string(),
            format!("{:.8}", t.size),
            t.leverage.to_string(),
            format!("{:.6}", t.pnl_rate),
            t.fee_rate.to_string(),
            format!("{:.2}", t.pnl_amount),
            format!("{:.2}", t.balance_after),
            t.bars_held().to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export a balance history as CSV with trade and balance columns.
///
/// Row 0 is the starting balance; row `i` is the balance after trade `i`.
pub fn export_balance_csv(balance_history: &[f64]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["trade", "balance"])?;
    for (i, balance) in balance_history.iter().enumerate() {
        wtr.write_record([i.to_string(), format!("{:.2}", balance)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export a summary as a two-row CSV: field names, then values.
pub fn export_summary_csv(summary: &PerformanceSummary) -> Result<String> {
    let fields = summary.to_field_map();
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(fields.keys())?;
    wtr.write_record(fields.values())?;
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates a directory named `{symbol}_{run_id prefix}/` under `output_dir`
/// containing:
/// - `manifest.json`: the full `BacktestReport`
/// - `trades.csv`: trade history
/// - `balance.csv`: balance after each trade
/// - `summary.csv`: flattened performance summary
///
/// Returns the path to the created directory.
pub fn save_artifacts(report: &BacktestReport, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(artifact_dir_name(report));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    write_file(&run_dir.join("manifest.json"), &export_json(report)?)?;
    write_file(&run_dir.join("trades.csv"), &export_trades_csv(&report.trades)?)?;
    write_file(
        &run_dir.join("balance.csv"),
        &export_balance_csv(&report.balance_history)?,
    )?;
    write_file(&run_dir.join("summary.csv"), &export_summary_csv(&report.summary)?)?;

    tracing::info!(dir = %run_dir.display(), "saved artifacts");
    Ok(run_dir)
}

/// Load a `BacktestReport` from an artifact directory's manifest.json.
///
/// Rejects newer schema versions.
pub fn load_artifacts(dir: &Path) -> Result<BacktestReport> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

fn artifact_dir_name(report: &BacktestReport) -> String {
    let symbol: String = report
        .symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let id_len = report.run_id.len().min(12);
    format!("{}_{}", symbol, &report.run_id[..id_len])
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

// ─── Markdown reports ───────────────────────────────────────────────

/// Generate a Markdown report for a single backtest run.
pub fn generate_report(report: &BacktestReport) -> String {
    let mut md = String::with_capacity(2048);

    md.push_str("# Backtest Report\n\n");

    // Metadata
    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Symbol | {} |\n", report.symbol));
    md.push_str(&format!("| Interval | {} |\n", report.interval));
    match (report.first_bar, report.last_bar) {
        (Some(first), Some(last)) => {
            md.push_str(&format!("| Period | {} to {} |\n", first.to_rfc3339(), last.to_rfc3339()));
        }
        _ => md.push_str("| Period | (no bars) |\n"),
    }
    md.push_str(&format!(
        "| Bars | {} ({} held for missing signal) |\n",
        report.bar_count, report.skipped_signals
    ));
    md.push_str(&format!("| Strategy | {} |\n", report.strategy));
    md.push_str(&format!("| Signals | {} |\n", report.signal_source));
    md.push_str(&format!("| Run ID | {} |\n", report.run_id));
    md.push('\n');

    // Trading parameters
    let e = &report.engine;
    md.push_str("## Parameters\n\n");
    md.push_str("| Parameter | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Initial Balance | {:.2} |\n", e.initial_balance));
    md.push_str(&format!("| Leverage | {} |\n", e.leverage));
    md.push_str(&format!("| Stop Loss | {:.2}% |\n", e.stop_loss * 100.0));
    md.push_str(&format!("| Fee Rate | {:.4}% |\n", e.fee_rate * 100.0));
    md.push_str(&format!("| Min Order Amount | {} |\n", e.min_order_amount));
    md.push_str(&format!("| Trading Mode | {:?} |\n", e.trading_mode));
    md.push('\n');

    // Performance Summary
    let s = &report.summary;
    md.push_str("## Performance Summary\n\n");
    if s.trade_count == 0 {
        md.push_str("No trades.\n\n");
    }
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Trades | {} |\n", s.trade_count));
    md.push_str(&format!("| Wins / Losses | {} / {} |\n", s.win_count, s.loss_count));
    md.push_str(&format!("| Win Rate | {} |\n", percent(s.win_rate.value())));
    md.push_str(&format!("| P&L Ratio | {:.3} |\n", s.pnl_ratio));
    md.push_str(&format!("| Max Profit | {} |\n", percent(s.max_profit_rate.value())));
    md.push_str(&format!("| Max Loss | {} |\n", percent(s.max_loss_rate.value())));
    md.push_str(&format!("| Final Balance | {:.2} |\n", s.final_balance));
    md.push_str(&format!("| Total Return | {:.2}% |\n", s.total_return * 100.0));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", s.max_drawdown * 100.0));
    md.push_str(&format!("| Stop-Loss Exits | {} |\n", s.stop_loss_exits));
    md.push_str(&format!("| Forced Closes | {} |\n", s.forced_closes));
    md.push_str(&format!(
        "| Max Consecutive Wins | {} |\n",
        s.max_consecutive_wins
    ));
    md.push_str(&format!(
        "| Max Consecutive Losses | {} |\n",
        s.max_consecutive_losses
    ));
    if report.rejected_orders > 0 {
        md.push_str(&format!(
            "| Rejected Orders | {} |\n",
            report.rejected_orders
        ));
    }
    md.push('\n');

    // Trades
    if !report.trades.is_empty() {
        md.push_str("## Trades\n\n");
        md.push_str("| # | Side | Entry | Exit | Reason | P&L | Balance |\n");
        md.push_str("| --- | --- | --- | --- | --- | --- | --- |\n");
        for (i, t) in report.trades.iter().enumerate() {
            md.push_str(&format!(
                "| {} | {} | {:.4} | {:.4} | {} | {:.2}% | {:.2} |\n",
                i + 1,
                t.side,
                t.entry_price,
                t.exit_price,
                t.exit_reason,
                t.pnl_rate * 100.0,
                t.balance_after
            ));
        }
        md.push('\n');
    }

    md
}

fn percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}%", v * 100.0),
        None => "undefined".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_csv_has_header_and_rows() {
        let csv = export_balance_csv(&[1000.0, 1050.0, 997.5]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec!["trade,balance", "0,1000.00", "1,1050.00", "2,997.50"]);
    }

    #[test]
    fn empty_trades_csv_is_header_only() {
        let csv = export_trades_csv(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert!(csv.starts_with("side,entry_bar,opened_at"));
    }

    #[test]
    fn percent_marks_undefined() {
        assert_eq!(percent(None), "undefined");
        assert_eq!(percent(Some(0.125)), "12.50%");
    }
}
