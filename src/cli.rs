//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{
    self as backtest_engine, BacktestConfig, BacktestResult, Contribution, CurrentAllocation,
};
use crate::domain::config_validation::{
    read_double, read_end_date, read_enum, read_int, read_list, read_start_date, read_weights, validate_all,
};
use crate::domain::error::PortfolioSimError;
use crate::domain::indicator::MovingAverageKind;
use crate::domain::monte_carlo::{self, MonteCarloConfig, MonteCarloResult};
use crate::domain::price::{FillPolicy, PriceSeries, PriceTable};
use crate::domain::schedule::TradingFrequency;
use crate::domain::signal::{MomentumConfig, SignalConfig, DEFAULT_MOMENTUM_LOOKBACKS};
use crate::domain::tuning::{run_sweep, SweepConfig, SweepEntry};
use crate::domain::universe::load_universe;
use crate::domain::weighting::WeightingStrategy;
use crate::domain::weights::AssetWeight;
use crate::ports::config_port::ConfigPort;

#[derive(Parser, Debug)]
#[command(name = "portfolio-sim", about = "Portfolio backtester and Monte Carlo projector")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a historical backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory of per-ticker CSV files; overrides [data] price_dir
        #[arg(short, long)]
        prices: Option<PathBuf>,
    },
    /// Backtest, then project the strategy's returns forward
    Simulate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        prices: Option<PathBuf>,
    },
    /// Show the latest market signal and the allocation it implies
    Signals {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        prices: Option<PathBuf>,
    },
    /// Sweep moving-average and momentum parameters
    Tune {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        prices: Option<PathBuf>,
    },
    /// Validate a configuration file without loading prices
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest { config, prices } => run_backtest(&config, prices.as_deref()),
        Command::Simulate { config, prices } => run_simulate(&config, prices.as_deref()),
        Command::Signals { config, prices } => run_signals(&config, prices.as_deref()),
        Command::Tune { config, prices } => run_tune(&config, prices.as_deref()),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = PortfolioSimError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(e: PortfolioSimError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

fn read_count(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> Result<usize, PortfolioSimError> {
    let raw = read_int(config, section, key, default as i64)?;
    usize::try_from(raw).map_err(|_| PortfolioSimError::invalid_config(section, key, "must be non-negative"))
}

fn read_ticker(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config.get_non_empty(section, key).map(|t| t.to_uppercase())
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, PortfolioSimError> {
    let weights = read_weights(config, "weights")?.ok_or_else(|| PortfolioSimError::ConfigMissing {
        section: "portfolio".into(),
        key: "weights".into(),
    })?;
    let out_of_market = read_weights(config, "out_of_market")?.unwrap_or_else(AssetWeight::new);

    let momentum = match read_count(config, "strategy", "momentum_select", 0)? {
        0 => None,
        select => Some(MomentumConfig {
            select,
            lookbacks: read_list(config, "strategy", "momentum_lookbacks")?
                .unwrap_or_else(|| DEFAULT_MOMENTUM_LOOKBACKS.to_vec()),
            remove_negative: config.get_bool("strategy", "remove_negative_momentum", true),
        }),
    };

    let amount = read_double(config, "contribution", "amount", 0.0)?;
    let contribution = if amount > 0.0 {
        Some(Contribution {
            amount,
            frequency: read_enum(config, "contribution", "frequency", TradingFrequency::Monthly)?,
        })
    } else {
        None
    };

    Ok(BacktestConfig {
        start_date: read_start_date(config)?,
        end_date: read_end_date(config)?,
        initial_value: read_double(config, "portfolio", "initial_value", 10_000.0)?,
        weights,
        cash_ticker: read_ticker(config, "portfolio", "cash_ticker"),
        bond_ticker: read_ticker(config, "portfolio", "bond_ticker"),
        benchmark: read_ticker(config, "portfolio", "benchmark"),
        out_of_market,
        trading_frequency: read_enum(config, "strategy", "trading_frequency", TradingFrequency::Monthly)?,
        weighting: read_enum(config, "strategy", "weighting", WeightingStrategy::UseFileWeights)?,
        signal: SignalConfig {
            window: read_count(config, "strategy", "ma_window", 200)?,
            slow_window: match read_count(config, "strategy", "slow_window", 0)? {
                0 => None,
                slow => Some(slow),
            },
            kind: read_enum(config, "strategy", "ma_kind", MovingAverageKind::Sma)?,
            threshold_asset: read_ticker(config, "strategy", "threshold_asset"),
            momentum,
        },
        asset_filter: config.get_bool("strategy", "asset_filter", true),
        rebalance_on_transition: config.get_bool("strategy", "rebalance_on_transition", true),
        volatility_lookback: read_count(config, "strategy", "volatility_lookback", 63)?,
        volatility_floor: read_double(config, "strategy", "volatility_floor", 1e-8)?,
        fill_policy: read_enum(config, "strategy", "fill_policy", FillPolicy::ForwardFill)?,
        contribution,
        confidence: read_double(config, "risk", "confidence", 0.95)?,
        risk_free_rate: read_double(config, "risk", "risk_free_rate", 0.0)?,
    })
}

/// Projection settings; the starting value and contribution come from
/// the backtest so the projection continues the same plan.
pub fn build_monte_carlo_config(
    config: &dyn ConfigPort,
    backtest: &BacktestConfig,
) -> Result<MonteCarloConfig, PortfolioSimError> {
    Ok(MonteCarloConfig {
        paths: read_count(config, "simulation", "paths", 1000)?,
        horizon_years: read_double(config, "simulation", "horizon_years", 10.0)?,
        seed: read_count(config, "simulation", "seed", 42)? as u64,
        percentiles: read_list(config, "simulation", "percentiles")?.unwrap_or_else(|| vec![5.0, 50.0, 95.0]),
        initial_value: backtest.initial_value,
        contribution: backtest.contribution,
        keep_paths: config.get_bool("simulation", "keep_paths", false),
    })
}

/// Sweep grid; each axis defaults to the single value the backtest uses.
pub fn build_sweep_config(config: &dyn ConfigPort, base: &BacktestConfig) -> Result<SweepConfig, PortfolioSimError> {
    let current_select = base.signal.momentum.as_ref().map_or(0, |m| m.select);
    Ok(SweepConfig {
        ma_windows: read_list(config, "tuning", "ma_windows")?.unwrap_or_else(|| vec![base.signal.window]),
        select_counts: read_list(config, "tuning", "select_counts")?.unwrap_or_else(|| vec![current_select]),
        kinds: read_list(config, "tuning", "ma_kinds")?.unwrap_or_else(|| vec![base.signal.kind]),
        max_drawdown_tolerance: read_double(config, "tuning", "max_drawdown_tolerance", 1.0)?,
    })
}

pub fn resolve_price_dir(config: &dyn ConfigPort, prices: Option<&Path>) -> Result<PathBuf, PortfolioSimError> {
    match prices {
        Some(p) => Ok(p.to_path_buf()),
        None => config
            .get_non_empty("data", "price_dir")
            .map(PathBuf::from)
            .ok_or_else(|| PortfolioSimError::ConfigMissing {
                section: "data".into(),
                key: "price_dir".into(),
            }),
    }
}

/// Load and validate config, build the backtest settings and read every
/// required ticker's history.
fn prepare(
    config_path: &Path,
    prices: Option<&Path>,
) -> Result<(FileConfigAdapter, BacktestConfig, PriceSeries), ExitCode> {
    info!(path = %config_path.display(), "Loading config");
    let adapter = load_config(config_path)?;
    validate_all(&adapter).map_err(fail)?;
    let bt_config = build_backtest_config(&adapter).map_err(fail)?;

    let price_dir = resolve_price_dir(&adapter, prices).map_err(fail)?;
    let data_port = CsvAdapter::new(price_dir);
    let tickers = bt_config.required_tickers();
    info!(tickers = tickers.len(), "Loading price history");
    let series = load_universe(&data_port, &tickers, bt_config.end_date).map_err(fail)?;

    Ok((adapter, bt_config, series))
}

fn run_backtest(config_path: &Path, prices: Option<&Path>) -> ExitCode {
    let (_, bt_config, series) = match prepare(config_path, prices) {
        Ok(p) => p,
        Err(code) => return code,
    };
    match backtest_engine::run_backtest(&series, &bt_config) {
        Ok(result) => {
            print_backtest_summary(&result, &bt_config);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_simulate(config_path: &Path, prices: Option<&Path>) -> ExitCode {
    let (adapter, bt_config, series) = match prepare(config_path, prices) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let result = match backtest_engine::run_backtest(&series, &bt_config) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };
    print_backtest_summary(&result, &bt_config);

    let mc_config = match build_monte_carlo_config(&adapter, &bt_config) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    match monte_carlo::simulate(&result.returns, &mc_config) {
        Ok(projection) => {
            print_simulation_summary(&projection, &mc_config);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_signals(config_path: &Path, prices: Option<&Path>) -> ExitCode {
    let (_, bt_config, series) = match prepare(config_path, prices) {
        Ok(p) => p,
        Err(code) => return code,
    };
    match backtest_engine::current_allocation(&series, &bt_config) {
        Ok(allocation) => {
            print_signals(&allocation, &bt_config);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_tune(config_path: &Path, prices: Option<&Path>) -> ExitCode {
    let (adapter, bt_config, series) = match prepare(config_path, prices) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let sweep = match build_sweep_config(&adapter, &bt_config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let table = match PriceTable::align(
        &series,
        &bt_config.required_tickers(),
        bt_config.end_date,
        bt_config.fill_policy,
    ) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };

    let entries = run_sweep(&table, &bt_config, &sweep);
    print_sweep(&entries, sweep.max_drawdown_tolerance);
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    info!(path = %config_path.display(), "Validating config");
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_all(&adapter) {
        return fail(e);
    }
    let bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    println!("Configuration is valid");
    println!("  weights:    {}", format_weights(&bt_config.weights));
    if !bt_config.out_of_market.is_empty() {
        println!("  out of market: {}", format_weights(&bt_config.out_of_market));
    }
    println!("  tickers:    {}", bt_config.required_tickers().join(", "));
    match bt_config.signal.slow_window {
        Some(slow) => println!(
            "  signal:     {} {}/{} ({})",
            bt_config.signal.kind, bt_config.signal.window, slow, bt_config.trading_frequency
        ),
        None => println!(
            "  signal:     {} {} ({})",
            bt_config.signal.kind, bt_config.signal.window, bt_config.trading_frequency
        ),
    }
    println!("  weighting:  {}", bt_config.weighting);
    ExitCode::SUCCESS
}

fn format_weights(weights: &AssetWeight) -> String {
    weights
        .iter()
        .map(|(t, w)| format!("{t}:{w}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_backtest_summary(result: &BacktestResult, config: &BacktestConfig) {
    let m = &result.metrics;
    let first = result.states.first().map(|s| s.date);
    let last = result.states.last().map(|s| s.date);

    println!("=== Backtest ===");
    if let (Some(first), Some(last)) = (first, last) {
        println!("Period:           {first} to {last} ({} days)", result.states.len());
    }
    println!("Final Value:      {:.2}", result.final_value());
    println!("Invested:         {:.2}", result.invested_capital());
    println!("Total Return:     {:.2}%", m.total_return * 100.0);
    println!("CAGR:             {:.2}%", m.cagr * 100.0);
    println!("Avg Annual:       {:.2}%", m.average_annual_return * 100.0);
    println!("Volatility:       {:.2}%", m.annualized_volatility * 100.0);
    println!("Max Drawdown:     {:.2}% ({} days)", m.max_drawdown * 100.0, m.max_drawdown_duration);
    println!("VaR ({:.0}%):       {:.2}%", m.confidence * 100.0, m.var * 100.0);
    println!("CVaR ({:.0}%):      {:.2}%", m.confidence * 100.0, m.cvar * 100.0);
    println!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    println!("Sortino Ratio:    {:.2}", m.sortino_ratio);
    println!("Rebalances:       {}", result.rebalances.len());

    if let Some(bh) = result.buy_and_hold.last() {
        println!("Buy & Hold:       {:.2}", bh.value);
    }
    if let (Some(ticker), Some(curve)) = (&config.benchmark, &result.benchmark) {
        if let Some(point) = curve.last() {
            println!("Benchmark {ticker}:    {:.2}", point.value);
        }
    }

    if let Some(state) = result.states.last() {
        println!("\n=== Final Holdings ===");
        for (ticker, shares) in &state.holdings {
            println!("  {ticker}: {shares:.4} shares");
        }
        println!("  cash: {:.2}", state.cash);
    }

    for warning in &result.warnings {
        warn!("{warning}");
    }
}

fn print_signals(allocation: &CurrentAllocation, config: &BacktestConfig) {
    let signal = &allocation.signal;
    println!("=== Signals on {} ===", signal.date);
    println!("Market state:     {}", signal.state);
    for (ticker, state) in &signal.ticker_states {
        match signal.scores.get(ticker) {
            Some(score) => println!("  {ticker:<8} {:<14} momentum {:>7.2}%", state.to_string(), score * 100.0),
            None => println!("  {ticker:<8} {state}"),
        }
    }
    if let Some(momentum) = &config.signal.momentum {
        println!("Top {} by momentum: {}", momentum.select, signal.ranked.join(", "));
    }

    println!("\n=== Target Allocation ===");
    if allocation.target.is_empty() {
        println!("  cash: 100.00%");
    }
    for (ticker, weight) in allocation.target.iter() {
        println!("  {ticker}: {:.2}%", weight * 100.0);
    }
    if let Some(warning) = &allocation.warning {
        warn!("{warning}");
    }
}

fn print_simulation_summary(result: &MonteCarloResult, config: &MonteCarloConfig) {
    let t = &result.terminal;
    println!("\n=== Monte Carlo ===");
    println!(
        "Paths:            {} over {} years (seed {})",
        result.path_count(),
        config.horizon_years,
        config.seed
    );
    println!("Invested:         {:.2}", t.invested);
    println!("Mean:             {:.2}", t.mean);
    println!("Median:           {:.2}", t.median);
    println!("Min / Max:        {:.2} / {:.2}", t.min, t.max);
    println!("P(below invested): {:.1}%", t.probability_below_invested * 100.0);
    for band in &result.bands {
        if let Some(v) = band.values.last() {
            println!("  p{:<5} {:.2}", band.percentile, v);
        }
    }
}

fn print_sweep(entries: &[SweepEntry], tolerance: f64) {
    println!("=== Parameter Sweep (max drawdown tolerance {:.1}%) ===", tolerance * 100.0);
    println!("{:>6} {:>6} {:>4} {:>9} {:>9} {:>9} {:>3}", "window", "select", "kind", "cagr", "maxdd", "vol", "ok");
    for entry in entries {
        match &entry.outcome {
            Ok(m) => println!(
                "{:>6} {:>6} {:>4} {:>8.2}% {:>8.2}% {:>8.2}% {:>3}",
                entry.ma_window,
                entry.select_count,
                entry.kind,
                m.cagr * 100.0,
                m.max_drawdown * 100.0,
                m.volatility * 100.0,
                if entry.within_tolerance { "yes" } else { "no" }
            ),
            Err(reason) => println!(
                "{:>6} {:>6} {:>4} failed: {reason}",
                entry.ma_window, entry.select_count, entry.kind
            ),
        }
    }
}
