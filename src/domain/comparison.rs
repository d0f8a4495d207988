//! Reference trajectories shown next to the strategy.

use super::error::PortfolioSimError;
use super::portfolio::EquityPoint;
use super::price::PriceTable;
use super::weights::AssetWeight;

/// Buy `weights` with `initial_value` on table index `start` and never trade again.
pub fn buy_and_hold_trajectory(
    table: &PriceTable,
    start: usize,
    weights: &AssetWeight,
    initial_value: f64,
) -> Result<Vec<EquityPoint>, PortfolioSimError> {
    let target = weights.normalized();
    let mut units = Vec::with_capacity(target.len());
    for (ticker, weight) in &target {
        let price = table.price(ticker, start)?;
        units.push((ticker.as_str(), initial_value * weight / price));
    }

    let mut curve = Vec::with_capacity(table.len().saturating_sub(start));
    for idx in start..table.len() {
        let mut value = 0.0;
        for (ticker, held) in &units {
            value += held * table.price(ticker, idx)?;
        }
        curve.push(EquityPoint {
            date: table.date(idx),
            value,
        });
    }
    Ok(curve)
}

/// `ticker`'s price path scaled so it starts at `initial_value`.
pub fn benchmark_trajectory(
    table: &PriceTable,
    start: usize,
    ticker: &str,
    initial_value: f64,
) -> Result<Vec<EquityPoint>, PortfolioSimError> {
    buy_and_hold_trajectory(
        table,
        start,
        &AssetWeight::equal(std::iter::once(&ticker.to_string())),
        initial_value,
    )
}
