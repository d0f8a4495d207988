#![allow(dead_code)]

use chrono::{Datelike, NaiveDate, Weekday};
use portfolio_sim::domain::backtest::BacktestConfig;
use portfolio_sim::domain::error::PortfolioSimError;
use portfolio_sim::domain::indicator::MovingAverageKind;
use portfolio_sim::domain::price::{FillPolicy, PricePoint};
use portfolio_sim::domain::schedule::TradingFrequency;
use portfolio_sim::domain::signal::SignalConfig;
use portfolio_sim::domain::weighting::WeightingStrategy;
use portfolio_sim::domain::weights::AssetWeight;
use portfolio_sim::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PricePoint>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_prices(mut self, ticker: &str, points: Vec<PricePoint>) -> Self {
        self.data.insert(ticker.to_string(), points);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortfolioSimError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(PortfolioSimError::DataSource {
                reason: reason.clone(),
            });
        }
        let points = self.data.get(ticker).ok_or_else(|| PortfolioSimError::NoData {
            ticker: ticker.to_string(),
        })?;
        Ok(points
            .iter()
            .filter(|p| p.date <= end_date && start_date.is_none_or(|s| p.date >= s))
            .copied()
            .collect())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `n` consecutive weekdays starting at or after `start`.
pub fn trading_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    start
        .iter_days()
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(n)
        .collect()
}

pub fn points(dates: &[NaiveDate], closes: &[f64]) -> Vec<PricePoint> {
    dates
        .iter()
        .zip(closes)
        .map(|(d, c)| PricePoint::new(*d, *c))
        .collect()
}

/// Closes compounding at a fixed daily rate.
pub fn compounding(start: f64, rate: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start * (1.0 + rate).powi(i as i32)).collect()
}

pub fn weights(pairs: &[(&str, f64)]) -> AssetWeight {
    AssetWeight::from_pairs(pairs.iter().map(|(t, w)| (t.to_string(), *w))).unwrap()
}

pub fn sample_config(pairs: &[(&str, f64)]) -> BacktestConfig {
    BacktestConfig {
        start_date: None,
        end_date: date(2030, 12, 31),
        initial_value: 10_000.0,
        weights: weights(pairs),
        cash_ticker: None,
        bond_ticker: None,
        benchmark: None,
        out_of_market: AssetWeight::new(),
        trading_frequency: TradingFrequency::Monthly,
        weighting: WeightingStrategy::UseFileWeights,
        signal: SignalConfig {
            window: 5,
            slow_window: None,
            kind: MovingAverageKind::Sma,
            threshold_asset: None,
            momentum: None,
        },
        asset_filter: true,
        rebalance_on_transition: true,
        volatility_lookback: 10,
        volatility_floor: 1e-8,
        fill_policy: FillPolicy::ForwardFill,
        contribution: None,
        confidence: 0.95,
        risk_free_rate: 0.0,
    }
}
