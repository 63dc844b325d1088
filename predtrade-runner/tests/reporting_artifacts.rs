//! Artifact bundle and report export tests.

use predtrade_runner::config::BacktestConfig;
use predtrade_runner::export::{
    export_json, export_summary_csv, export_trades_csv, generate_report, import_json,
    load_artifacts, save_artifacts,
};
use predtrade_runner::runner::{run_single_backtest, BacktestReport, SCHEMA_VERSION};

fn make_report() -> BacktestReport {
    let config = BacktestConfig::from_toml_str(
        r#"
[backtest]
symbol = "BTC/USDT:USDT"
start = "2024-01-01T00:00:00Z"

[trading]
leverage = 2.0
stop_loss = 0.015
threshold = 0.001

[data]
source = "synthetic"
seed = 11
bars = 400
"#,
    )
    .unwrap();
    run_single_backtest(&config).unwrap()
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = tempfile::tempdir().unwrap();
    let report = make_report();

    let dir = save_artifacts(&report, temp_dir.path()).unwrap();
    assert!(dir.join("manifest.json").exists());
    assert!(dir.join("trades.csv").exists());
    assert!(dir.join("balance.csv").exists());
    assert!(dir.join("summary.csv").exists());
    let name = dir.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("BTC_USDT_USDT_"), "{name}");

    let loaded = load_artifacts(&dir).unwrap();
    assert_eq!(loaded.run_id, report.run_id);
    assert_eq!(loaded.trades, report.trades);
    assert_eq!(loaded.summary.trade_count, report.summary.trade_count);
    assert_eq!(loaded.summary.win_rate, report.summary.win_rate);
}

#[test]
fn trade_csv_has_one_row_per_trade() {
    let report = make_report();
    let csv = export_trades_csv(&report.trades).unwrap();
    assert_eq!(csv.lines().count(), report.trades.len() + 1);
}

#[test]
fn summary_csv_is_field_map() {
    let report = make_report();
    let csv = export_summary_csv(&report.summary).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].split(',').any(|f| f == "win_rate"));
    assert!(lines[0].split(',').any(|f| f == "max_drawdown"));
}

#[test]
fn newer_schema_is_rejected() {
    let mut report = make_report();
    report.schema_version = SCHEMA_VERSION + 1;
    let json = export_json(&report).unwrap();
    let err = import_json(&json).unwrap_err();
    assert!(err.to_string().contains("unsupported schema version"));
}

#[test]
fn missing_schema_version_defaults_to_current() {
    let report = make_report();
    let mut value: serde_json::Value = serde_json::from_str(&export_json(&report).unwrap()).unwrap();
    value.as_object_mut().unwrap().remove("schema_version");
    let loaded = import_json(&value.to_string()).unwrap();
    assert_eq!(loaded.schema_version, SCHEMA_VERSION);
}

#[test]
fn markdown_report_sections() {
    let report = make_report();
    let md = generate_report(&report);
    assert!(md.starts_with("# Backtest Report"));
    assert!(md.contains("## Performance Summary"));
    assert!(md.contains("| Symbol | BTC/USDT:USDT |"));
    assert!(md.contains(&report.run_id));
}
