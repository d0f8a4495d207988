//! Sequential backtest over the aligned trading calendar.
//!
//! Each day runs through [`step`], a pure function of the previous
//! snapshot and that day's [`DayInput`]. Everything the step needs
//! (prices, contribution, rebalance target) is resolved beforehand from
//! data at or before the day itself.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::comparison::{benchmark_trajectory, buy_and_hold_trajectory};
use super::error::PortfolioSimError;
use super::metrics::RiskMetrics;
use super::portfolio::{EquityPoint, PortfolioState};
use super::price::{FillPolicy, PriceSeries, PriceTable};
use super::schedule::{contribution_dates, rebalance_schedule, RebalanceReason, TradingFrequency};
use super::signal::{generate_signals, select_momentum, Signal, SignalConfig};
use super::weighting::{WeightingInput, WeightingStrategy};
use super::weights::AssetWeight;

/// A recurring cash injection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Contribution {
    pub amount: f64,
    pub frequency: TradingFrequency,
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    /// `None` starts as early as the data and warm-up allow.
    pub start_date: Option<NaiveDate>,
    pub end_date: NaiveDate,
    pub initial_value: f64,
    pub weights: AssetWeight,
    pub cash_ticker: Option<String>,
    pub bond_ticker: Option<String>,
    pub benchmark: Option<String>,
    pub out_of_market: AssetWeight,
    pub trading_frequency: TradingFrequency,
    pub weighting: WeightingStrategy,
    pub signal: SignalConfig,
    /// Drop candidates that are individually out of the market.
    pub asset_filter: bool,
    pub rebalance_on_transition: bool,
    pub volatility_lookback: usize,
    pub volatility_floor: f64,
    pub fill_policy: FillPolicy,
    pub contribution: Option<Contribution>,
    pub confidence: f64,
    pub risk_free_rate: f64,
}

impl BacktestConfig {
    /// Tickers with positive file weight; the primary universe.
    pub fn universe(&self) -> Vec<String> {
        self.weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(t, _)| t.clone())
            .collect()
    }

    /// Tickers that get a market state but are never selected by momentum.
    pub fn auxiliary(&self) -> Vec<String> {
        let mut aux: Vec<String> = self.out_of_market.tickers().cloned().collect();
        if let Some(bond) = &self.bond_ticker {
            if !aux.contains(bond) {
                aux.push(bond.clone());
            }
        }
        aux
    }

    /// Every ticker whose prices the run reads.
    pub fn required_tickers(&self) -> Vec<String> {
        let mut all: BTreeSet<String> = self.weights.tickers().cloned().collect();
        all.extend(self.auxiliary());
        all.extend(self.cash_ticker.iter().cloned());
        all.extend(self.signal.threshold_asset.iter().cloned());
        all.extend(self.benchmark.iter().cloned());
        all.into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RebalanceEvent {
    pub date: NaiveDate,
    pub reason: RebalanceReason,
    pub target: AssetWeight,
}

/// Everything known on one trading day.
#[derive(Debug, Clone)]
pub struct DayInput {
    pub date: NaiveDate,
    pub prices: BTreeMap<String, f64>,
    pub contribution: f64,
    pub target: Option<AssetWeight>,
}

/// Advance one trading day: re-price, add any contribution, then rebalance.
pub fn step(prev: &PortfolioState, input: &DayInput) -> Result<PortfolioState, PortfolioSimError> {
    let marked = prev.marked_to_market(input.date, &input.prices)?;
    let funded = if input.contribution != 0.0 {
        marked.with_cash_added(input.contribution)
    } else {
        marked
    };
    match &input.target {
        Some(target) => funded.rebalanced(target, &input.prices),
        None => Ok(funded),
    }
}

/// Time-weighted return between two snapshots, net of the day's contribution.
pub fn period_return(prev: &PortfolioState, next: &PortfolioState, contribution: f64) -> f64 {
    if prev.value > 0.0 {
        (next.value - contribution) / prev.value - 1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BacktestResult {
    pub states: Vec<PortfolioState>,
    /// One return per state after the first.
    pub returns: Vec<f64>,
    pub rebalances: Vec<RebalanceEvent>,
    pub metrics: RiskMetrics,
    pub warnings: Vec<String>,
    pub total_contributions: f64,
    pub buy_and_hold: Vec<EquityPoint>,
    pub benchmark: Option<Vec<EquityPoint>>,
}

impl BacktestResult {
    pub fn final_value(&self) -> f64 {
        self.states.last().map(|s| s.value).unwrap_or(0.0)
    }

    pub fn invested_capital(&self) -> f64 {
        self.states.first().map(|s| s.value).unwrap_or(0.0) + self.total_contributions
    }
}

/// Align `series` and run the backtest.
pub fn run_backtest(series: &PriceSeries, config: &BacktestConfig) -> Result<BacktestResult, PortfolioSimError> {
    let tickers = config.required_tickers();
    let table = PriceTable::align(series, &tickers, config.end_date, config.fill_policy)?;
    run_on_table(&table, config)
}

/// Run the backtest on an already aligned table.
pub fn run_on_table(table: &PriceTable, config: &BacktestConfig) -> Result<BacktestResult, PortfolioSimError> {
    let universe = primary_universe(config)?;
    let signals = generate_signals(table, &universe, &config.auxiliary(), &config.signal)?;
    let start = first_trading_index(table, config, signals.start_index)?;
    let calendar = &table.dates()[start..];

    let transitions: Vec<NaiveDate> = if config.rebalance_on_transition {
        signals
            .transition_dates()
            .into_iter()
            .filter(|d| *d > calendar[0])
            .collect()
    } else {
        Vec::new()
    };
    let schedule = rebalance_schedule(calendar, config.trading_frequency, &transitions);
    let contribution_days: BTreeSet<NaiveDate> = match config.contribution {
        Some(c) if c.amount != 0.0 => contribution_dates(calendar, c.frequency).into_iter().collect(),
        _ => BTreeSet::new(),
    };

    info!(
        start = %calendar[0],
        end = %calendar[calendar.len() - 1],
        days = calendar.len(),
        rebalances = schedule.len(),
        weighting = %config.weighting,
        "Starting backtest"
    );

    let mut state = PortfolioState::all_cash(calendar[0], config.initial_value);
    let mut states = Vec::with_capacity(calendar.len());
    let mut returns = Vec::with_capacity(calendar.len().saturating_sub(1));
    let mut rebalances = Vec::with_capacity(schedule.len());
    let mut warnings = Vec::new();
    let mut total_contributions = 0.0;

    for idx in start..table.len() {
        let date = table.date(idx);
        let prices = prices_at(table, idx)?;

        let contribution = match config.contribution {
            Some(c) if contribution_days.contains(&date) => c.amount,
            _ => 0.0,
        };

        let target = match schedule.get(&date) {
            Some(&reason) => {
                let signal = signals.at_table_index(idx).ok_or_else(|| {
                    PortfolioSimError::InsufficientHistory {
                        ticker: universe[0].clone(),
                        needed: signals.start_index + 1,
                        available: idx + 1,
                    }
                })?;
                let target = resolve_target(table, idx, signal, config, &universe)?;
                warnings.extend(degenerate_warning(signal, config));
                debug!(%date, %reason, state = %signal.state, assets = target.len(), "Rebalance");
                rebalances.push(RebalanceEvent {
                    date,
                    reason,
                    target: target.clone(),
                });
                Some(target)
            }
            None => None,
        };

        let input = DayInput {
            date,
            prices,
            contribution,
            target,
        };
        let next = step(&state, &input)?;
        if idx > start {
            returns.push(period_return(&state, &next, contribution));
        }
        total_contributions += contribution;
        states.push(next.clone());
        state = next;
    }

    let curve: Vec<EquityPoint> = states.iter().map(PortfolioState::equity_point).collect();
    let metrics = RiskMetrics::compute(&curve, &returns, config.confidence, config.risk_free_rate)?;

    let buy_and_hold = buy_and_hold_trajectory(table, start, &config.weights, config.initial_value)?;
    let benchmark = match &config.benchmark {
        Some(ticker) => Some(benchmark_trajectory(table, start, ticker, config.initial_value)?),
        None => None,
    };

    info!(
        final_value = state.value,
        cagr = metrics.cagr,
        max_drawdown = metrics.max_drawdown,
        warnings = warnings.len(),
        "Backtest complete"
    );

    Ok(BacktestResult {
        states,
        returns,
        rebalances,
        metrics,
        warnings,
        total_contributions,
        buy_and_hold,
        benchmark,
    })
}

/// The latest signal in `series` and the target a rebalance on that day
/// would apply.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentAllocation {
    pub signal: Signal,
    pub target: AssetWeight,
    pub warning: Option<String>,
}

/// Align `series` and resolve the allocation for its last date.
pub fn current_allocation(
    series: &PriceSeries,
    config: &BacktestConfig,
) -> Result<CurrentAllocation, PortfolioSimError> {
    let tickers = config.required_tickers();
    let table = PriceTable::align(series, &tickers, config.end_date, config.fill_policy)?;
    allocation_on_table(&table, config)
}

pub fn allocation_on_table(
    table: &PriceTable,
    config: &BacktestConfig,
) -> Result<CurrentAllocation, PortfolioSimError> {
    let universe = primary_universe(config)?;
    let signals = generate_signals(table, &universe, &config.auxiliary(), &config.signal)?;
    warmup_index(table, config, signals.start_index)?;

    let idx = table.len() - 1;
    let signal = signals
        .at_table_index(idx)
        .ok_or_else(|| PortfolioSimError::InsufficientHistory {
            ticker: universe[0].clone(),
            needed: signals.start_index + 1,
            available: table.len(),
        })?;
    let target = resolve_target(table, idx, signal, config, &universe)?;
    info!(date = %signal.date, state = %signal.state, assets = target.len(), "Resolved current allocation");

    Ok(CurrentAllocation {
        warning: degenerate_warning(signal, config),
        signal: signal.clone(),
        target,
    })
}

fn primary_universe(config: &BacktestConfig) -> Result<Vec<String>, PortfolioSimError> {
    let universe = config.universe();
    if universe.is_empty() {
        return Err(PortfolioSimError::InvalidWeights {
            ticker: "*".into(),
            reason: "no ticker carries a positive weight".into(),
        });
    }
    Ok(universe)
}

fn degenerate_warning(signal: &Signal, config: &BacktestConfig) -> Option<String> {
    let requested = config.signal.momentum.as_ref()?.select;
    if !(signal.degenerate && signal.state.is_in()) {
        return None;
    }
    let date = signal.date;
    warn!(%date, selected = signal.ranked.len(), requested, "Degenerate momentum selection");
    Some(format!(
        "{date}: momentum selection returned {} of {} requested tickers",
        signal.ranked.len(),
        requested
    ))
}

/// First table index where the signals and the weighting are both defined.
fn warmup_index(table: &PriceTable, config: &BacktestConfig, signal_start: usize) -> Result<usize, PortfolioSimError> {
    let warmup = signal_start.max(config.weighting.warmup(config.volatility_lookback));
    if warmup >= table.len() {
        let ticker = config.universe().into_iter().next().unwrap_or_default();
        return Err(PortfolioSimError::InsufficientHistory {
            ticker,
            needed: warmup + 1,
            available: table.len(),
        });
    }
    Ok(warmup)
}

fn first_trading_index(
    table: &PriceTable,
    config: &BacktestConfig,
    signal_start: usize,
) -> Result<usize, PortfolioSimError> {
    let warmup = warmup_index(table, config, signal_start)?;
    let requested = match config.start_date {
        Some(date) => table
            .index_on_or_after(date)
            .ok_or_else(|| PortfolioSimError::InsufficientData {
                what: format!("trading days on or after {date}"),
                len: 0,
                minimum: 1,
            })?,
        None => 0,
    };
    Ok(warmup.max(requested))
}

fn prices_at(table: &PriceTable, idx: usize) -> Result<BTreeMap<String, f64>, PortfolioSimError> {
    table
        .tickers()
        .map(|t| table.price(t, idx).map(|p| (t.clone(), p)))
        .collect()
}

/// Target weights for a rebalance on table index `idx`.
fn resolve_target(
    table: &PriceTable,
    idx: usize,
    signal: &Signal,
    config: &BacktestConfig,
    universe: &[String],
) -> Result<AssetWeight, PortfolioSimError> {
    if signal.state.is_in() {
        let candidates: &[String] = if config.signal.momentum.is_some() {
            &signal.ranked
        } else {
            universe
        };
        let eligible: Vec<String> = candidates
            .iter()
            .filter(|t| !config.asset_filter || signal.is_in(t))
            .cloned()
            .collect();
        let target = config.weighting.compute_weights(&WeightingInput {
            eligible: &eligible,
            file_weights: &config.weights,
            prices: table,
            index: idx,
            volatility_lookback: config.volatility_lookback,
            volatility_floor: config.volatility_floor,
        })?;
        if !target.is_empty() {
            return Ok(target);
        }
    }
    Ok(substitute_target(signal, config))
}

/// Where the portfolio goes when the primary universe is unavailable.
fn substitute_target(signal: &Signal, config: &BacktestConfig) -> AssetWeight {
    let available: Vec<String> = config
        .out_of_market
        .tickers()
        .filter(|t| signal.is_in(t))
        .cloned()
        .collect();
    if !available.is_empty() {
        let target = if config.signal.momentum.is_some() {
            let best = select_momentum(&signal.scores, &available, 1, false);
            AssetWeight::equal(&best)
        } else {
            config.out_of_market.restricted_to(&available).normalized()
        };
        if !target.is_empty() {
            return target;
        }
    }
    if let Some(bond) = config.bond_ticker.as_ref().filter(|b| signal.is_in(b)) {
        return AssetWeight::equal(std::iter::once(bond));
    }
    if let Some(cash) = &config.cash_ticker {
        return AssetWeight::equal(std::iter::once(cash));
    }
    AssetWeight::new()
}
