//! Ticker to target-weight mapping.
//!
//! Backed by a `BTreeMap` so iteration order (and therefore every sum
//! computed over it) is deterministic across runs.

use std::collections::btree_map;
use std::collections::{BTreeMap, HashSet};

use super::error::{PortfolioSimError, WeightsParseError};

/// Tolerance for treating a weight vector as summing to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AssetWeight {
    weights: BTreeMap<String, f64>,
}

impl AssetWeight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from pairs, rejecting negative or non-finite weights.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, PortfolioSimError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut weights = BTreeMap::new();
        for (ticker, weight) in pairs {
            let ticker = ticker.into();
            validate_weight(&ticker, weight)?;
            weights.insert(ticker, weight);
        }
        Ok(Self { weights })
    }

    /// Equal 1/k weights over `tickers`.
    pub fn equal<'a, I>(tickers: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let unique: Vec<&String> = tickers.into_iter().collect();
        let share = if unique.is_empty() {
            0.0
        } else {
            1.0 / unique.len() as f64
        };
        Self {
            weights: unique.into_iter().map(|t| (t.clone(), share)).collect(),
        }
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.weights.get(ticker).copied()
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.weights.contains_key(ticker)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn tickers(&self) -> impl Iterator<Item = &String> {
        self.weights.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, f64> {
        self.weights.iter()
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn is_normalized(&self) -> bool {
        (self.total() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
    }

    /// Rescale to sum to one. Zero-weight entries are dropped; an all-zero
    /// mapping normalizes to empty.
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total <= 0.0 {
            return Self::new();
        }
        Self {
            weights: self
                .weights
                .iter()
                .filter(|(_, w)| **w > 0.0)
                .map(|(t, w)| (t.clone(), w / total))
                .collect(),
        }
    }

    /// Keep only the tickers in `eligible`.
    pub fn restricted_to<'a, I>(&self, eligible: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let keep: HashSet<&String> = eligible.into_iter().collect();
        Self {
            weights: self
                .weights
                .iter()
                .filter(|(t, _)| keep.contains(t))
                .map(|(t, w)| (t.clone(), *w))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AssetWeight {
    type Item = (&'a String, &'a f64);
    type IntoIter = btree_map::Iter<'a, String, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.weights.iter()
    }
}

fn validate_weight(ticker: &str, weight: f64) -> Result<(), PortfolioSimError> {
    if !weight.is_finite() {
        return Err(PortfolioSimError::InvalidWeights {
            ticker: ticker.to_string(),
            reason: format!("weight {weight} is not a finite number"),
        });
    }
    if weight < 0.0 {
        return Err(PortfolioSimError::InvalidWeights {
            ticker: ticker.to_string(),
            reason: format!("weight {weight} is negative"),
        });
    }
    Ok(())
}

/// Parse `SPY:0.6, AGG:0.4` into raw pairs. Tickers are upper-cased.
///
/// Numeric validation (sign, finiteness) happens in [`AssetWeight::from_pairs`].
pub fn parse_weights(input: &str) -> Result<Vec<(String, f64)>, WeightsParseError> {
    let mut pairs = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(WeightsParseError::EmptyEntry);
        }
        let (ticker, raw) = trimmed
            .split_once(':')
            .ok_or_else(|| WeightsParseError::MissingSeparator(trimmed.to_string()))?;
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(WeightsParseError::EmptyEntry);
        }
        let raw = raw.trim();
        let weight: f64 = raw.parse().map_err(|_| WeightsParseError::NotANumber {
            ticker: ticker.clone(),
            raw: raw.to_string(),
        })?;
        if !seen.insert(ticker.clone()) {
            return Err(WeightsParseError::DuplicateTicker(ticker));
        }
        pairs.push((ticker, weight));
    }

    Ok(pairs)
}
