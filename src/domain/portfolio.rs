//! Portfolio snapshots and value trajectories.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::error::PortfolioSimError;
use super::weights::AssetWeight;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Holdings, cash and mark-to-market value at the close of one date.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortfolioState {
    pub date: NaiveDate,
    /// Fractional units held per ticker.
    pub holdings: BTreeMap<String, f64>,
    pub cash: f64,
    pub value: f64,
}

impl PortfolioState {
    pub fn all_cash(date: NaiveDate, cash: f64) -> Self {
        PortfolioState {
            date,
            holdings: BTreeMap::new(),
            cash,
            value: cash,
        }
    }

    /// Value of holdings plus cash at `prices`.
    pub fn market_value(
        &self,
        date: NaiveDate,
        prices: &BTreeMap<String, f64>,
    ) -> Result<f64, PortfolioSimError> {
        let mut total = self.cash;
        for (ticker, units) in &self.holdings {
            let price = prices
                .get(ticker)
                .ok_or_else(|| PortfolioSimError::DataGap {
                    ticker: ticker.clone(),
                    date,
                })?;
            total += units * price;
        }
        Ok(total)
    }

    /// Same holdings re-priced at `date`.
    pub fn marked_to_market(
        &self,
        date: NaiveDate,
        prices: &BTreeMap<String, f64>,
    ) -> Result<Self, PortfolioSimError> {
        let value = self.market_value(date, prices)?;
        Ok(PortfolioState {
            date,
            holdings: self.holdings.clone(),
            cash: self.cash,
            value,
        })
    }

    pub fn with_cash_added(&self, amount: f64) -> Self {
        PortfolioState {
            cash: self.cash + amount,
            value: self.value + amount,
            ..self.clone()
        }
    }

    /// Replace holdings with `target` weights of the current value.
    ///
    /// Whatever the target does not allocate stays as cash, so an empty
    /// target liquidates to cash.
    pub fn rebalanced(
        &self,
        target: &AssetWeight,
        prices: &BTreeMap<String, f64>,
    ) -> Result<Self, PortfolioSimError> {
        let mut holdings = BTreeMap::new();
        let mut invested = 0.0;
        for (ticker, weight) in target {
            if *weight <= 0.0 {
                continue;
            }
            let price = prices
                .get(ticker)
                .ok_or_else(|| PortfolioSimError::DataGap {
                    ticker: ticker.clone(),
                    date: self.date,
                })?;
            let allocation = self.value * weight;
            holdings.insert(ticker.clone(), allocation / price);
            invested += allocation;
        }
        Ok(PortfolioState {
            date: self.date,
            holdings,
            cash: (self.value - invested).max(0.0),
            value: self.value,
        })
    }

    pub fn equity_point(&self) -> EquityPoint {
        EquityPoint {
            date: self.date,
            value: self.value,
        }
    }
}
