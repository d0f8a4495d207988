//! Trailing total return over n trading days.
//!
//! ROC(n)[i] = C[i] / C[i-n] - 1, as a fraction. Warmup: first n closes invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};

pub fn calculate_roc(closes: &[f64], period: usize) -> IndicatorSeries {
    let mut values = Vec::with_capacity(closes.len());

    for i in 0..closes.len() {
        if period == 0 || i < period {
            values.push(IndicatorPoint::warmup());
            continue;
        }
        let prev = closes[i - period];
        let value = if prev == 0.0 {
            0.0
        } else {
            closes[i] / prev - 1.0
        };
        values.push(IndicatorPoint::of(value));
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Roc(period),
        values,
    }
}
