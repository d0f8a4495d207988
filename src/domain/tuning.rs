//! Grid search over signal parameters.
//!
//! Each combination is an independent backtest on the same aligned
//! table, so the grid runs in parallel without shared mutable state.

use rayon::prelude::*;
use tracing::{info, warn};

use super::backtest::{run_on_table, BacktestConfig};
use super::indicator::MovingAverageKind;
use super::price::PriceTable;
use super::signal::{MomentumConfig, DEFAULT_MOMENTUM_LOOKBACKS};

#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub ma_windows: Vec<usize>,
    /// Momentum selection counts; zero turns momentum off.
    pub select_counts: Vec<usize>,
    pub kinds: Vec<MovingAverageKind>,
    /// Largest acceptable drawdown magnitude, e.g. 0.25 for -25%.
    pub max_drawdown_tolerance: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SweepMetrics {
    pub cagr: f64,
    pub max_drawdown: f64,
    pub volatility: f64,
    pub var: f64,
    pub cvar: f64,
    pub final_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SweepEntry {
    pub ma_window: usize,
    pub select_count: usize,
    pub kind: MovingAverageKind,
    /// Error text when the combination could not be run.
    pub outcome: Result<SweepMetrics, String>,
    pub within_tolerance: bool,
}

/// Every combination, ranked: in-tolerance entries by CAGR first, then
/// out-of-tolerance entries by CAGR, then failures.
pub fn run_sweep(table: &PriceTable, base: &BacktestConfig, sweep: &SweepConfig) -> Vec<SweepEntry> {
    let grid: Vec<(usize, usize, MovingAverageKind)> = sweep
        .ma_windows
        .iter()
        .flat_map(|&w| {
            sweep
                .select_counts
                .iter()
                .flat_map(move |&n| sweep.kinds.iter().map(move |&k| (w, n, k)))
        })
        .collect();

    info!(combinations = grid.len(), "Starting parameter sweep");

    let mut entries: Vec<SweepEntry> = grid
        .into_par_iter()
        .map(|(ma_window, select_count, kind)| {
            let config = variant(base, ma_window, select_count, kind);
            let outcome = run_on_table(table, &config)
                .map(|result| SweepMetrics {
                    cagr: result.metrics.cagr,
                    max_drawdown: result.metrics.max_drawdown,
                    volatility: result.metrics.annualized_volatility,
                    var: result.metrics.var,
                    cvar: result.metrics.cvar,
                    final_value: result.final_value(),
                })
                .map_err(|e| {
                    warn!(ma_window, select_count, %kind, error = %e, "Sweep combination failed");
                    e.to_string()
                });
            let within_tolerance = outcome
                .as_ref()
                .is_ok_and(|m| m.max_drawdown.abs() <= sweep.max_drawdown_tolerance);
            SweepEntry {
                ma_window,
                select_count,
                kind,
                outcome,
                within_tolerance,
            }
        })
        .collect();

    entries.sort_by(|a, b| tier(a).cmp(&tier(b)).then_with(|| rank_key(b).total_cmp(&rank_key(a))));
    entries
}

fn tier(entry: &SweepEntry) -> u8 {
    match (&entry.outcome, entry.within_tolerance) {
        (Ok(_), true) => 0,
        (Ok(_), false) => 1,
        (Err(_), _) => 2,
    }
}

fn rank_key(entry: &SweepEntry) -> f64 {
    entry.outcome.as_ref().map_or(f64::NEG_INFINITY, |m| m.cagr)
}

fn variant(base: &BacktestConfig, ma_window: usize, select_count: usize, kind: MovingAverageKind) -> BacktestConfig {
    let mut config = base.clone();
    config.signal.window = ma_window;
    config.signal.kind = kind;
    config.signal.momentum = if select_count == 0 {
        None
    } else {
        let (lookbacks, remove_negative) = match &base.signal.momentum {
            Some(m) => (m.lookbacks.clone(), m.remove_negative),
            None => (DEFAULT_MOMENTUM_LOOKBACKS.to_vec(), true),
        };
        Some(MomentumConfig {
            select: select_count,
            lookbacks,
            remove_negative,
        })
    };
    config
}
