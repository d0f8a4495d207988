//! Market-state and momentum signals.
//!
//! Signals are computed once per configuration from the aligned
//! [`PriceTable`] and are immutable afterwards. The first signal sits on
//! the first table date where every tracked indicator is past warm-up;
//! earlier dates carry no signal at all.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;

use super::error::PortfolioSimError;
use super::indicator::roc::calculate_roc;
use super::indicator::{IndicatorSeries, MovingAverageKind};
use super::price::PriceTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MarketState {
    InMarket,
    OutOfMarket,
}

impl MarketState {
    pub fn is_in(self) -> bool {
        self == MarketState::InMarket
    }

    /// Crossover rule: in the market when the faster series (the close, or
    /// the fast average) is at or above the slower one.
    pub fn from_crossover(fast: f64, slow: f64) -> Self {
        if fast >= slow {
            MarketState::InMarket
        } else {
            MarketState::OutOfMarket
        }
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketState::InMarket => write!(f, "IN_MARKET"),
            MarketState::OutOfMarket => write!(f, "OUT_OF_MARKET"),
        }
    }
}

/// Roughly one, three, six, nine and twelve months of trading days.
pub const DEFAULT_MOMENTUM_LOOKBACKS: [usize; 5] = [21, 63, 126, 189, 252];

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumConfig {
    /// How many tickers to keep after ranking.
    pub select: usize,
    /// Trailing windows (trading days) averaged into the score.
    pub lookbacks: Vec<usize>,
    pub remove_negative: bool,
}

impl MomentumConfig {
    pub fn longest_lookback(&self) -> usize {
        self.lookbacks.iter().copied().max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub window: usize,
    /// When set, the `window` average is compared against this longer
    /// average instead of against the close.
    pub slow_window: Option<usize>,
    pub kind: MovingAverageKind,
    pub threshold_asset: Option<String>,
    pub momentum: Option<MomentumConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub date: NaiveDate,
    /// Overall state driving the portfolio.
    pub state: MarketState,
    pub ticker_states: BTreeMap<String, MarketState>,
    /// Momentum scores for every tracked ticker; empty when momentum is off.
    pub scores: BTreeMap<String, f64>,
    /// Momentum selection over the primary universe, best first.
    pub ranked: Vec<String>,
    /// Fewer tickers qualified than were requested.
    pub degenerate: bool,
}

impl Signal {
    pub fn state_of(&self, ticker: &str) -> Option<MarketState> {
        self.ticker_states.get(ticker).copied()
    }

    pub fn is_in(&self, ticker: &str) -> bool {
        self.state_of(ticker).is_some_and(MarketState::is_in)
    }
}

/// Signals aligned to the tail of a price table.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSeries {
    /// Table index of the first signal.
    pub start_index: usize,
    pub signals: Vec<Signal>,
}

impl SignalSeries {
    pub fn at_table_index(&self, idx: usize) -> Option<&Signal> {
        idx.checked_sub(self.start_index)
            .and_then(|i| self.signals.get(i))
    }

    /// Dates where the overall state differs from the previous day.
    pub fn transition_dates(&self) -> Vec<NaiveDate> {
        self.signals
            .windows(2)
            .filter(|w| w[0].state != w[1].state)
            .map(|w| w[1].date)
            .collect()
    }
}

/// Generate one signal per table date from the first fully-defined date on.
///
/// `universe` is the primary ticker set (drives the overall state and the
/// momentum selection). `auxiliary` tickers get a state and a score but
/// are never selected.
pub fn generate_signals(
    table: &PriceTable,
    universe: &[String],
    auxiliary: &[String],
    config: &SignalConfig,
) -> Result<SignalSeries, PortfolioSimError> {
    let mut tracked: Vec<String> = universe.to_vec();
    for ticker in auxiliary.iter().chain(config.threshold_asset.iter()) {
        if !tracked.contains(ticker) {
            tracked.push(ticker.clone());
        }
    }

    if let Some(slow) = config.slow_window {
        if slow <= config.window {
            return Err(PortfolioSimError::invalid_config(
                "strategy",
                "slow_window",
                format!("slow window {slow} must be longer than ma_window {}", config.window),
            ));
        }
    }

    let mut averages: BTreeMap<&str, IndicatorSeries> = BTreeMap::new();
    let mut slow_averages: BTreeMap<&str, IndicatorSeries> = BTreeMap::new();
    let mut momentum: BTreeMap<&str, Vec<IndicatorSeries>> = BTreeMap::new();
    let mut start_index = 0usize;

    for ticker in &tracked {
        let closes = table.column(ticker).ok_or_else(|| PortfolioSimError::NoData {
            ticker: ticker.clone(),
        })?;

        let average = config.kind.calculate(closes, config.window);
        let first = average
            .first_valid()
            .ok_or_else(|| PortfolioSimError::InsufficientHistory {
                ticker: ticker.clone(),
                needed: config.window,
                available: closes.len(),
            })?;
        start_index = start_index.max(first);
        averages.insert(ticker.as_str(), average);

        if let Some(slow) = config.slow_window {
            let slow_average = config.kind.calculate(closes, slow);
            let first = slow_average
                .first_valid()
                .ok_or_else(|| PortfolioSimError::InsufficientHistory {
                    ticker: ticker.clone(),
                    needed: slow,
                    available: closes.len(),
                })?;
            start_index = start_index.max(first);
            slow_averages.insert(ticker.as_str(), slow_average);
        }

        if let Some(mom) = &config.momentum {
            let needed = mom.longest_lookback();
            if needed >= closes.len() {
                return Err(PortfolioSimError::InsufficientHistory {
                    ticker: ticker.clone(),
                    needed: needed + 1,
                    available: closes.len(),
                });
            }
            start_index = start_index.max(needed);
            let series = mom
                .lookbacks
                .iter()
                .map(|&lb| calculate_roc(closes, lb))
                .collect();
            momentum.insert(ticker.as_str(), series);
        }
    }

    let mut signals = Vec::with_capacity(table.len().saturating_sub(start_index));
    for idx in start_index..table.len() {
        let mut ticker_states = BTreeMap::new();
        for ticker in &tracked {
            let average = averages
                .get(ticker.as_str())
                .and_then(|s| s.value_at(idx))
                .ok_or_else(|| PortfolioSimError::InsufficientHistory {
                    ticker: ticker.clone(),
                    needed: config.window,
                    available: idx + 1,
                })?;
            let state = match config.slow_window {
                Some(slow) => {
                    let slow_average = slow_averages
                        .get(ticker.as_str())
                        .and_then(|s| s.value_at(idx))
                        .ok_or_else(|| PortfolioSimError::InsufficientHistory {
                            ticker: ticker.clone(),
                            needed: slow,
                            available: idx + 1,
                        })?;
                    MarketState::from_crossover(average, slow_average)
                }
                None => MarketState::from_crossover(table.price(ticker, idx)?, average),
            };
            ticker_states.insert(ticker.clone(), state);
        }

        let state = match &config.threshold_asset {
            Some(threshold) => ticker_states
                .get(threshold)
                .copied()
                .unwrap_or(MarketState::OutOfMarket),
            None if universe
                .iter()
                .any(|t| ticker_states.get(t).is_some_and(|s| s.is_in())) =>
            {
                MarketState::InMarket
            }
            None => MarketState::OutOfMarket,
        };

        let mut scores = BTreeMap::new();
        for (ticker, series) in &momentum {
            let rocs: Vec<f64> = series.iter().filter_map(|s| s.value_at(idx)).collect();
            if !rocs.is_empty() {
                scores.insert(ticker.to_string(), rocs.iter().sum::<f64>() / rocs.len() as f64);
            }
        }

        let (ranked, degenerate) = match &config.momentum {
            Some(mom) => {
                let picked = select_momentum(&scores, universe, mom.select, mom.remove_negative);
                let short = picked.len() < mom.select;
                (picked, short)
            }
            None => (Vec::new(), false),
        };

        signals.push(Signal {
            date: table.date(idx),
            state,
            ticker_states,
            scores,
            ranked,
            degenerate,
        });
    }

    Ok(SignalSeries {
        start_index,
        signals,
    })
}

/// Rank `candidates` by score, best first, and keep the top `count`.
///
/// Ties break on ticker name. With `remove_negative`, scores below zero
/// are dropped before the cut, so the result may be shorter than `count`.
pub fn select_momentum(
    scores: &BTreeMap<String, f64>,
    candidates: &[String],
    count: usize,
    remove_negative: bool,
) -> Vec<String> {
    let mut ranked: Vec<(&String, f64)> = candidates
        .iter()
        .filter_map(|t| scores.get(t).map(|s| (t, *s)))
        .filter(|(_, s)| !(remove_negative && *s < 0.0))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(count).map(|(t, _)| t.clone()).collect()
}
