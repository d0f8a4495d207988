//! Trailing-window indicators over a dense close column.
//!
//! Every calculator returns one `IndicatorPoint` per input close. Points
//! inside the warm-up window are marked `valid: false` and must not be
//! read as values.

pub mod ema;
pub mod roc;
pub mod sma;
pub mod stddev;

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorPoint {
    pub valid: bool,
    pub value: f64,
}

impl IndicatorPoint {
    pub(crate) fn warmup() -> Self {
        Self {
            valid: false,
            value: 0.0,
        }
    }

    pub(crate) fn of(value: f64) -> Self {
        Self { valid: true, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Roc(usize),
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Value at `idx` if it exists and is past warm-up.
    pub fn value_at(&self, idx: usize) -> Option<f64> {
        self.values
            .get(idx)
            .filter(|p| p.valid)
            .map(|p| p.value)
    }

    /// Index of the first valid point.
    pub fn first_valid(&self) -> Option<usize> {
        self.values.iter().position(|p| p.valid)
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Roc(period) => write!(f, "ROC({})", period),
        }
    }
}

/// Moving-average flavour used by the crossover rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MovingAverageKind {
    #[default]
    Sma,
    Ema,
}

impl MovingAverageKind {
    pub fn calculate(self, closes: &[f64], window: usize) -> IndicatorSeries {
        match self {
            MovingAverageKind::Sma => sma::calculate_sma(closes, window),
            MovingAverageKind::Ema => ema::calculate_ema(closes, window),
        }
    }
}

impl FromStr for MovingAverageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sma" | "simple" => Ok(MovingAverageKind::Sma),
            "ema" | "exponential" => Ok(MovingAverageKind::Ema),
            other => Err(format!("unknown moving average kind '{other}'")),
        }
    }
}

impl fmt::Display for MovingAverageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovingAverageKind::Sma => write!(f, "sma"),
            MovingAverageKind::Ema => write!(f, "ema"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_type_display() {
        assert_eq!(IndicatorType::Sma(200).to_string(), "SMA(200)");
        assert_eq!(IndicatorType::Roc(63).to_string(), "ROC(63)");
    }

    #[test]
    fn indicator_type_hash_eq() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(IndicatorType::Sma(20), "sma20");
        map.insert(IndicatorType::Ema(20), "ema20");

        assert_eq!(map.get(&IndicatorType::Sma(20)), Some(&"sma20"));
        assert_eq!(map.get(&IndicatorType::Ema(20)), Some(&"ema20"));
        assert_eq!(map.get(&IndicatorType::Roc(20)), None);
    }

    #[test]
    fn moving_average_kind_parse() {
        assert_eq!("SMA".parse::<MovingAverageKind>(), Ok(MovingAverageKind::Sma));
        assert_eq!("ema".parse::<MovingAverageKind>(), Ok(MovingAverageKind::Ema));
        assert!("wma".parse::<MovingAverageKind>().is_err());
    }

    #[test]
    fn series_first_valid_and_lookup() {
        let series = MovingAverageKind::Sma.calculate(&[1.0, 2.0, 3.0], 2);
        assert_eq!(series.first_valid(), Some(1));
        assert_eq!(series.value_at(0), None);
        assert_eq!(series.value_at(2), Some(2.5));
        assert_eq!(series.value_at(9), None);
    }
}
