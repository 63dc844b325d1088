//! predtrade CLI: backtest, fetch, and live tick commands.
//!
//! Commands:
//! - `backtest`: run a backtest from a TOML config, for one or several symbols
//! - `fetch`: download closed klines from Binance into a bar CSV
//! - `tick`: process the newest closed bar against a persisted live state (paper fills)
//!
//! Logging goes through `tracing`; set `RUST_LOG` to change the level (default `info`).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use predtrade_core::data::{
    write_bars_csv, BarSource, BinanceKlines, BinanceMarket, CsvBarSource, Interval,
    SyntheticSource,
};
use predtrade_core::exchange::PaperExecutor;
use predtrade_core::live::{load_context, save_context, LiveTrader, TickReport};
use predtrade_core::signal::LinearTrend;
use predtrade_runner::config::{DataConfig, SignalConfig};
use predtrade_runner::{
    generate_report, run_batch, save_artifacts, BacktestConfig, BacktestReport,
};

#[derive(Parser)]
#[command(
    name = "predtrade",
    about = "predtrade CLI: prediction-driven single-position trading engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest from a TOML config file.
    Backtest {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Run these symbols instead of `[backtest].symbol` (in parallel).
        #[arg(long = "symbol")]
        symbols: Vec<String>,

        /// Output directory. Defaults to `[report].output_dir`.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Also write a Markdown report next to the artifacts.
        #[arg(long, default_value_t = false)]
        report: bool,
    },
    /// Download closed klines from Binance into a CSV file.
    Fetch {
        /// Symbol (e.g., BTCUSDT or BTC/USDT:USDT).
        #[arg(long)]
        symbol: String,

        /// Bar interval: 1m, 5m, 15m, 30m, 1h, 4h, 1d.
        #[arg(long, default_value = "1h")]
        interval: Interval,

        /// Start time (RFC 3339).
        #[arg(long)]
        start: DateTime<Utc>,

        /// End time (RFC 3339, exclusive). Defaults to now.
        #[arg(long)]
        end: Option<DateTime<Utc>>,

        /// Query USDⓈ-M futures instead of spot.
        #[arg(long, default_value_t = false)]
        futures: bool,

        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,
    },
    /// Process the newest closed bar and persist the position state.
    Tick {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// State file carried between ticks.
        #[arg(long, default_value = "predtrade-state.json")]
        state: PathBuf,

        /// Paper-fill slippage in basis points.
        #[arg(long, default_value_t = 0.0)]
        slippage_bps: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest {
            config,
            symbols,
            output_dir,
            report,
        } => run_backtest_cmd(&config, &symbols, output_dir, report),
        Commands::Fetch {
            symbol,
            interval,
            start,
            end,
            futures,
            out,
        } => run_fetch(&symbol, interval, start, end, futures, &out),
        Commands::Tick {
            config,
            state,
            slippage_bps,
        } => run_tick(&config, &state, slippage_bps),
    }
}

fn run_backtest_cmd(
    config_path: &Path,
    symbols: &[String],
    output_dir: Option<PathBuf>,
    write_report: bool,
) -> Result<()> {
    let config = BacktestConfig::load(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    let output_dir = output_dir.unwrap_or_else(|| config.report.output_dir.clone());

    let configs: Vec<BacktestConfig> = if symbols.is_empty() {
        vec![config]
    } else {
        symbols.iter().map(|s| config.for_symbol(s)).collect()
    };

    let mut failures = 0;
    for (config, result) in configs.iter().zip(run_batch(&configs)) {
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(symbol = %config.backtest.symbol, error = %e, "backtest failed");
                failures += 1;
                continue;
            }
        };

        print_summary(&report);
        let run_dir = save_artifacts(&report, &output_dir)?;
        if write_report {
            let path = run_dir.join("report.md");
            std::fs::write(&path, generate_report(&report))
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        println!("Artifacts saved to: {}", run_dir.display());
    }

    if failures > 0 {
        bail!("{failures} of {} backtests failed", configs.len());
    }
    Ok(())
}

fn run_fetch(
    symbol: &str,
    interval: Interval,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    futures: bool,
    out: &Path,
) -> Result<()> {
    let market = if futures {
        BinanceMarket::UsdM
    } else {
        BinanceMarket::Spot
    };
    let source = BinanceKlines::new(market)?;
    let bars = source
        .fetch_bars(symbol, interval, start, end)
        .with_context(|| format!("failed to fetch {symbol} {interval}"))?;
    write_bars_csv(out, &bars)?;
    println!("Wrote {} bars to {}", bars.len(), out.display());
    Ok(())
}

fn run_tick(config_path: &Path, state_path: &Path, slippage_bps: f64) -> Result<()> {
    let config = BacktestConfig::load(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    let window_size = match &config.signal {
        SignalConfig::LinearTrend { window_size } => *window_size,
        SignalConfig::Predictions { .. } => {
            bail!("live ticks need a signal provider; a predictions file cannot forecast new bars")
        }
    };
    let provider = LinearTrend::new(window_size);

    let source: Box<dyn BarSource> = match &config.data {
        DataConfig::Binance { market } => Box::new(BinanceKlines::new(*market)?),
        DataConfig::Csv { path } => Box::new(CsvBarSource::new(path)),
        DataConfig::Synthetic {
            seed,
            start_price,
            volatility,
            ..
        } => Box::new(SyntheticSource {
            seed: *seed,
            start_price: *start_price,
            volatility: *volatility,
            ..SyntheticSource::default()
        }),
    };

    let engine = config.engine_config();
    let strategy = config.strategy();
    let symbol = config.backtest.symbol.as_str();

    let mut ctx = load_context(state_path, symbol, &engine)?;
    let mut executor = PaperExecutor::new(slippage_bps);
    let trader = LiveTrader {
        source: source.as_ref(),
        provider: &provider,
        strategy: &strategy,
        config: &engine,
        symbol,
        interval: config.backtest.interval,
    };

    match trader.tick(&mut ctx, &mut executor, Utc::now())? {
        TickReport::AlreadyProcessed { bar_time } => {
            println!("Bar {bar_time} already processed; nothing to do.");
            return Ok(());
        }
        TickReport::Processed {
            bar_time,
            close,
            forecast,
            missed_stop,
            outcome,
        } => {
            if let Some(trade) = &missed_stop {
                println!(
                    "Stop hit on missed bar {} at {:.4}: {:.2}%, balance {:.2}",
                    trade.closed_at,
                    trade.exit_price,
                    trade.pnl_rate * 100.0,
                    trade.balance_after
                );
            }
            println!("Bar {bar_time}: close {close:.4}, forecast {forecast:.4}");
            if let Some(trade) = &outcome.closed {
                println!(
                    "Closed {} ({}) at {:.4}: {:.2}%, balance {:.2}",
                    trade.side,
                    trade.exit_reason,
                    trade.exit_price,
                    trade.pnl_rate * 100.0,
                    trade.balance_after
                );
            }
            if let Some(position) = &outcome.opened {
                println!(
                    "Opened {} {:.6} at {:.4}",
                    position.side, position.size, position.entry_price
                );
            }
            if outcome.order_rejected {
                println!("Order below minimum amount; not opened.");
            }
        }
    }

    save_context(state_path, symbol, &ctx)?;
    println!("Balance: {:.2}", ctx.account.balance);
    Ok(())
}

fn print_summary(report: &BacktestReport) {
    let s = &report.summary;
    println!();
    println!("=== Backtest Result ===");
    println!("Symbol:         {} ({})", report.symbol, report.interval);
    if let (Some(first), Some(last)) = (report.first_bar, report.last_bar) {
        println!("Period:         {first} to {last}");
    }
    println!(
        "Bars:           {} ({} held without signal)",
        report.bar_count, report.skipped_signals
    );
    println!("Signals:        {}", report.signal_source);
    println!("Trades:         {}", s.trade_count);
    println!();
    println!("--- Performance ---");
    println!("Win Rate:       {}", percent(s.win_rate.value()));
    println!("P&L Ratio:      {:.3}", s.pnl_ratio);
    println!("Max Profit:     {}", percent(s.max_profit_rate.value()));
    println!("Max Loss:       {}", percent(s.max_loss_rate.value()));
    println!("Final Balance:  {:.2}", s.final_balance);
    println!("Total Return:   {:.2}%", s.total_return * 100.0);
    println!("Max Drawdown:   {:.2}%", s.max_drawdown * 100.0);
    println!("Stop Exits:     {}", s.stop_loss_exits);
    println!("Forced Closes:  {}", s.forced_closes);
    if report.rejected_orders > 0 {
        println!("WARNING: {} orders below minimum amount", report.rejected_orders);
    }
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "undefined".to_string(), |v| format!("{:.2}%", v * 100.0))
}
