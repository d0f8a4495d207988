//! Risk and performance statistics over a value trajectory.

use super::error::PortfolioSimError;
use super::indicator::stddev::sample_std;
use super::portfolio::EquityPoint;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RiskMetrics {
    pub total_return: f64,
    pub cagr: f64,
    /// `(1 + mean daily return)^252 - 1`.
    pub average_annual_return: f64,
    pub daily_std: f64,
    pub annualized_volatility: f64,
    /// Non-positive fraction.
    pub max_drawdown: f64,
    /// Longest stretch of consecutive trading days below a prior peak.
    pub max_drawdown_duration: usize,
    pub confidence: f64,
    /// Loss magnitude at `confidence`.
    pub var: f64,
    /// Mean loss magnitude at or beyond the VaR threshold.
    pub cvar: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
}

impl RiskMetrics {
    /// `curve` is the value trajectory and `returns` the matching period
    /// returns (one fewer than the curve).
    pub fn compute(
        curve: &[EquityPoint],
        returns: &[f64],
        confidence: f64,
        risk_free_rate: f64,
    ) -> Result<Self, PortfolioSimError> {
        if returns.len() < 2 {
            return Err(PortfolioSimError::InsufficientData {
                what: "return series".into(),
                len: returns.len(),
                minimum: 2,
            });
        }
        let (first, last) = match (curve.first(), curve.last()) {
            (Some(f), Some(l)) if curve.len() >= 2 => (f, l),
            _ => {
                return Err(PortfolioSimError::InsufficientData {
                    what: "value trajectory".into(),
                    len: curve.len(),
                    minimum: 2,
                });
            }
        };

        let total_return = if first.value > 0.0 {
            last.value / first.value - 1.0
        } else {
            0.0
        };
        let days = (last.date - first.date).num_days();
        let cagr = compute_cagr(first.value, last.value, days);

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let daily_std = sample_std(returns);
        let average_annual_return = (1.0 + mean).powf(TRADING_DAYS_PER_YEAR) - 1.0;
        let annualized_volatility = daily_std * TRADING_DAYS_PER_YEAR.sqrt();

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(curve);
        let (var, cvar) = value_at_risk(returns, confidence)?;

        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(returns, mean, daily_std, daily_rf);

        Ok(RiskMetrics {
            total_return,
            cagr,
            average_annual_return,
            daily_std,
            annualized_volatility,
            max_drawdown,
            max_drawdown_duration,
            confidence,
            var,
            cvar,
            sharpe_ratio,
            sortino_ratio,
        })
    }
}

/// `(end / start)^(365.25 / days) - 1`; zero when undefined.
pub fn compute_cagr(start_value: f64, end_value: f64, days: i64) -> f64 {
    if days <= 0 || start_value <= 0.0 || end_value < 0.0 {
        return 0.0;
    }
    (end_value / start_value).powf(DAYS_PER_YEAR / days as f64) - 1.0
}

/// Historical VaR and CVaR as loss magnitudes.
///
/// The cut-off is the `floor((1 - c) * n)`-th smallest return; CVaR
/// averages every return up to and including it. Fails when the series
/// holds less than one full observation in the tail.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> Result<(f64, f64), PortfolioSimError> {
    let n = returns.len();
    let tail_fraction = 1.0 - confidence;
    if tail_fraction * (n as f64) < 1.0 {
        return Err(PortfolioSimError::InsufficientData {
            what: "VaR tail".into(),
            len: n,
            minimum: (1.0 / tail_fraction).ceil() as usize,
        });
    }

    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);
    let idx = ((tail_fraction * n as f64).floor() as usize).min(n - 1);
    let tail = &sorted[..=idx];
    let var = -sorted[idx];
    let cvar = -(tail.iter().sum::<f64>() / tail.len() as f64);
    Ok((var, cvar))
}

/// Linear-interpolated percentile (`p` in 0..=100) of ascending `sorted`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

fn compute_drawdown(curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.value;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0usize;
    let mut current_duration = 0usize;

    for point in curve {
        if point.value >= peak {
            peak = point.value;
            current_duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.min(point.value / peak - 1.0);
            current_duration += 1;
            max_duration = max_duration.max(current_duration);
        }
    }

    (max_dd, max_duration)
}

fn compute_risk_adjusted(returns: &[f64], mean: f64, stddev: f64, daily_rf: f64) -> (f64, f64) {
    let excess_return = mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside / returns.len() as f64).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
