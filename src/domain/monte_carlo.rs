//! Bootstrap projection of a strategy's historical daily returns.
//!
//! Every path draws returns with replacement from the same read-only
//! history. Path `i` owns a `ChaCha8Rng` seeded with the master seed on
//! stream `i`, so a path's draws depend only on `(seed, i)` and the
//! result is identical however rayon schedules the work.
//!
//! Paths advance together one step at a time and only the current value
//! of each is held; percentile bands are taken from that column before
//! the next step. Full trajectories are stored only with `keep_paths`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::info;

use super::backtest::Contribution;
use super::error::PortfolioSimError;
use super::metrics::percentile;

pub const STEPS_PER_YEAR: usize = 252;

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloConfig {
    pub paths: usize,
    /// May be fractional; rounded to whole trading days.
    pub horizon_years: f64,
    pub seed: u64,
    /// Percentiles (0..=100) reported per step.
    pub percentiles: Vec<f64>,
    pub initial_value: f64,
    pub contribution: Option<Contribution>,
    /// Retain every path's full trajectory in the result.
    pub keep_paths: bool,
}

impl MonteCarloConfig {
    pub fn steps(&self) -> usize {
        (self.horizon_years * STEPS_PER_YEAR as f64).round() as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SimulationPath {
    pub index: usize,
    /// Value at each step; `values[0]` is the starting value.
    pub values: Vec<f64>,
}

impl SimulationPath {
    pub fn terminal(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PercentileBand {
    pub percentile: f64,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TerminalSummary {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Starting value plus every contribution over the horizon.
    pub invested: f64,
    pub probability_below_invested: f64,
    /// Every path's terminal value, ascending.
    pub sorted: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MonteCarloResult {
    pub steps: usize,
    /// Full trajectories; empty unless `keep_paths` was set.
    pub paths: Vec<SimulationPath>,
    pub bands: Vec<PercentileBand>,
    pub terminal: TerminalSummary,
}

impl MonteCarloResult {
    pub fn path_count(&self) -> usize {
        self.terminal.sorted.len()
    }

    pub fn band(&self, percentile: f64) -> Option<&PercentileBand> {
        self.bands.iter().find(|b| b.percentile == percentile)
    }
}

/// One path's generator and current value.
struct PathWalker {
    rng: ChaCha8Rng,
    value: f64,
}

impl PathWalker {
    fn new(seed: u64, index: usize, initial_value: f64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(index as u64);
        PathWalker {
            rng,
            value: initial_value,
        }
    }

    fn advance(&mut self, returns: &[f64], contribution: Option<Contribution>, step: usize) {
        let r = returns[self.rng.gen_range(0..returns.len())];
        self.value = (self.value * (1.0 + r)).max(0.0);
        if let Some(c) = contribution {
            if step % c.frequency.trading_days() == 0 {
                self.value += c.amount;
            }
        }
    }
}

/// Run `config.paths` independent bootstrap paths over `returns`.
pub fn simulate(returns: &[f64], config: &MonteCarloConfig) -> Result<MonteCarloResult, PortfolioSimError> {
    if returns.len() < 2 {
        return Err(PortfolioSimError::InsufficientData {
            what: "historical returns".into(),
            len: returns.len(),
            minimum: 2,
        });
    }
    if config.paths == 0 {
        return Err(PortfolioSimError::InsufficientData {
            what: "simulation paths".into(),
            len: 0,
            minimum: 1,
        });
    }
    let steps = config.steps();
    if steps == 0 {
        return Err(PortfolioSimError::InsufficientData {
            what: "simulation steps".into(),
            len: 0,
            minimum: 1,
        });
    }

    info!(
        paths = config.paths,
        steps,
        seed = config.seed,
        keep_paths = config.keep_paths,
        "Starting Monte Carlo simulation"
    );

    let mut walkers: Vec<PathWalker> = (0..config.paths)
        .map(|index| PathWalker::new(config.seed, index, config.initial_value))
        .collect();
    let mut paths: Vec<SimulationPath> = if config.keep_paths {
        (0..config.paths)
            .map(|index| SimulationPath {
                index,
                values: Vec::with_capacity(steps + 1),
            })
            .collect()
    } else {
        Vec::new()
    };
    let mut bands: Vec<PercentileBand> = config
        .percentiles
        .iter()
        .map(|&p| PercentileBand {
            percentile: p,
            values: Vec::with_capacity(steps + 1),
        })
        .collect();

    let mut column = record_step(&walkers, &mut bands, &mut paths);
    for step in 1..=steps {
        walkers
            .par_iter_mut()
            .for_each(|w| w.advance(returns, config.contribution, step));
        column = record_step(&walkers, &mut bands, &mut paths);
    }

    let terminal = summarize_terminal(column, config);
    info!(
        median = terminal.median,
        probability_below_invested = terminal.probability_below_invested,
        "Monte Carlo simulation complete"
    );

    Ok(MonteCarloResult {
        steps,
        paths,
        bands,
        terminal,
    })
}

/// Push this step's percentiles (and values, when paths are kept) and
/// return the sorted column.
fn record_step(walkers: &[PathWalker], bands: &mut [PercentileBand], paths: &mut [SimulationPath]) -> Vec<f64> {
    for (path, walker) in paths.iter_mut().zip(walkers) {
        path.values.push(walker.value);
    }
    let mut column: Vec<f64> = walkers.iter().map(|w| w.value).collect();
    column.par_sort_unstable_by(f64::total_cmp);
    for band in bands.iter_mut() {
        band.values.push(percentile(&column, band.percentile));
    }
    column
}

fn summarize_terminal(sorted: Vec<f64>, config: &MonteCarloConfig) -> TerminalSummary {
    let n = sorted.len() as f64;
    let contributions = config
        .contribution
        .map(|c| c.amount * (config.steps() / c.frequency.trading_days()) as f64)
        .unwrap_or(0.0);
    let invested = config.initial_value + contributions;
    let below = sorted.iter().filter(|v| **v < invested).count() as f64;

    TerminalSummary {
        mean: sorted.iter().sum::<f64>() / n,
        median: percentile(&sorted, 50.0),
        min: sorted.first().copied().unwrap_or(0.0),
        max: sorted.last().copied().unwrap_or(0.0),
        invested,
        probability_below_invested: below / n,
        sorted,
    }
}
