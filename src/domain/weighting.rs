//! Target-weight resolution at a rebalance date.

use std::fmt;
use std::str::FromStr;

use super::error::PortfolioSimError;
use super::indicator::stddev::sample_std;
use super::price::PriceTable;
use super::weights::AssetWeight;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum WeightingStrategy {
    #[default]
    UseFileWeights,
    EqualWeight,
    RiskContribution,
}

/// Everything a strategy may look at. Prices are only read up to `index`.
#[derive(Debug, Clone, Copy)]
pub struct WeightingInput<'a> {
    pub eligible: &'a [String],
    pub file_weights: &'a AssetWeight,
    pub prices: &'a PriceTable,
    pub index: usize,
    pub volatility_lookback: usize,
    pub volatility_floor: f64,
}

impl WeightingStrategy {
    /// Normalized target weights over `input.eligible`.
    ///
    /// Returns an empty mapping when nothing eligible can carry weight
    /// (e.g. none of the eligible tickers appear in the file weights).
    pub fn compute_weights(&self, input: &WeightingInput<'_>) -> Result<AssetWeight, PortfolioSimError> {
        if input.eligible.is_empty() {
            return Ok(AssetWeight::new());
        }
        match self {
            WeightingStrategy::UseFileWeights => Ok(input
                .file_weights
                .restricted_to(input.eligible)
                .normalized()),
            WeightingStrategy::EqualWeight => Ok(AssetWeight::equal(input.eligible)),
            WeightingStrategy::RiskContribution => {
                let mut inverse = Vec::with_capacity(input.eligible.len());
                for ticker in input.eligible {
                    let vol = trailing_volatility(
                        input.prices,
                        ticker,
                        input.index,
                        input.volatility_lookback,
                    )?;
                    inverse.push((ticker.clone(), 1.0 / vol.max(input.volatility_floor)));
                }
                Ok(AssetWeight::from_pairs(inverse)?.normalized())
            }
        }
    }

    /// Trading days of history this strategy needs before the first rebalance.
    pub fn warmup(&self, volatility_lookback: usize) -> usize {
        match self {
            WeightingStrategy::RiskContribution => volatility_lookback,
            _ => 0,
        }
    }
}

/// Sample standard deviation of the trailing `lookback` daily returns ending at `index`.
pub fn trailing_volatility(
    prices: &PriceTable,
    ticker: &str,
    index: usize,
    lookback: usize,
) -> Result<f64, PortfolioSimError> {
    if lookback < 2 {
        return Err(PortfolioSimError::InsufficientHistory {
            ticker: ticker.to_string(),
            needed: 3,
            available: lookback + 1,
        });
    }
    let returns = prices.trailing_returns(ticker, index, lookback)?;
    Ok(sample_std(&returns))
}

impl FromStr for WeightingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "use_file_weights" | "file" => Ok(WeightingStrategy::UseFileWeights),
            "equal_weight" | "equal" => Ok(WeightingStrategy::EqualWeight),
            "risk_contribution" | "risk" => Ok(WeightingStrategy::RiskContribution),
            other => Err(format!("unknown weighting strategy '{other}'")),
        }
    }
}

impl fmt::Display for WeightingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightingStrategy::UseFileWeights => write!(f, "use_file_weights"),
            WeightingStrategy::EqualWeight => write!(f, "equal_weight"),
            WeightingStrategy::RiskContribution => write!(f, "risk_contribution"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn table(columns: &[(&str, Vec<f64>)]) -> PriceTable {
        let len = columns[0].1.len();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..len)
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();
        let map: BTreeMap<String, Vec<f64>> = columns
            .iter()
            .map(|(t, c)| (t.to_string(), c.clone()))
            .collect();
        PriceTable::from_columns(dates, map).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn input<'a>(
        eligible: &'a [String],
        file_weights: &'a AssetWeight,
        prices: &'a PriceTable,
        index: usize,
    ) -> WeightingInput<'a> {
        WeightingInput {
            eligible,
            file_weights,
            prices,
            index,
            volatility_lookback: 2,
            volatility_floor: 1e-8,
        }
    }

    #[test]
    fn equal_weight_overrides_file_weights() {
        let file = AssetWeight::from_pairs(vec![("A".to_string(), 0.6), ("B".to_string(), 0.4)]).unwrap();
        let prices = table(&[("A", vec![1.0]), ("B", vec![1.0])]);
        let eligible = names(&["A", "B"]);
        let w = WeightingStrategy::EqualWeight
            .compute_weights(&input(&eligible, &file, &prices, 0))
            .unwrap();
        assert_relative_eq!(w.get("A").unwrap(), 0.5);
        assert_relative_eq!(w.get("B").unwrap(), 0.5);
    }

    #[test]
    fn file_weights_renormalized_over_eligible() {
        let file = AssetWeight::from_pairs(vec![
            ("A".to_string(), 0.5),
            ("B".to_string(), 0.3),
            ("C".to_string(), 0.2),
        ])
        .unwrap();
        let prices = table(&[("A", vec![1.0])]);
        let eligible = names(&["B", "C"]);
        let w = WeightingStrategy::UseFileWeights
            .compute_weights(&input(&eligible, &file, &prices, 0))
            .unwrap();
        assert!(w.is_normalized());
        assert_relative_eq!(w.get("B").unwrap(), 0.6);
        assert_relative_eq!(w.get("C").unwrap(), 0.4);
    }

    #[test]
    fn risk_contribution_inverse_volatility() {
        // A swings twice as hard as B in return space
        let prices = table(&[
            ("A", vec![100.0, 110.0, 99.0]),
            ("B", vec![100.0, 105.0, 99.75]),
        ]);
        let file = AssetWeight::new();
        let eligible = names(&["A", "B"]);
        let w = WeightingStrategy::RiskContribution
            .compute_weights(&input(&eligible, &file, &prices, 2))
            .unwrap();
        assert!(w.is_normalized());
        assert_relative_eq!(w.get("B").unwrap(), 2.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(w.get("A").unwrap(), 1.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn risk_contribution_constant_price_uses_floor() {
        let prices = table(&[
            ("A", vec![100.0, 100.0, 100.0]),
            ("B", vec![100.0, 110.0, 99.0]),
        ]);
        let file = AssetWeight::new();
        let eligible = names(&["A", "B"]);
        let w = WeightingStrategy::RiskContribution
            .compute_weights(&input(&eligible, &file, &prices, 2))
            .unwrap();
        assert!(w.get("A").unwrap().is_finite());
        assert!(w.get("A").unwrap() > 0.99);
        assert!(w.is_normalized());
    }

    #[test]
    fn risk_contribution_short_history() {
        let prices = table(&[("A", vec![100.0, 101.0])]);
        let file = AssetWeight::new();
        let eligible = names(&["A"]);
        let err = WeightingStrategy::RiskContribution
            .compute_weights(&input(&eligible, &file, &prices, 1))
            .unwrap_err();
        assert!(matches!(err, PortfolioSimError::InsufficientHistory { .. }));
    }

    #[test]
    fn empty_eligible_yields_empty() {
        let file = AssetWeight::new();
        let prices = table(&[("A", vec![1.0])]);
        let w = WeightingStrategy::EqualWeight
            .compute_weights(&input(&[], &file, &prices, 0))
            .unwrap();
        assert!(w.is_empty());
    }

    #[test]
    fn parse_strategy() {
        assert_eq!(
            "risk_contribution".parse::<WeightingStrategy>(),
            Ok(WeightingStrategy::RiskContribution)
        );
        assert!("momentum".parse::<WeightingStrategy>().is_err());
    }
}
