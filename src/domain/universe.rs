//! Loads the price history for every ticker a run needs.
//!
//! Unlike a screening universe, nothing here is optional: a ticker named
//! in the weights, the bond/cash slots or the benchmark must have data,
//! so a missing or empty series is an error rather than a skip.

use crate::domain::error::PortfolioSimError;
use crate::domain::price::PriceSeries;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use tracing::{debug, info};

/// Fetch every ticker in `tickers` up to `end_date`.
///
/// The whole history is requested so that indicators can warm up on
/// data before the configured start date.
pub fn load_universe(
    data_port: &dyn DataPort,
    tickers: &[String],
    end_date: NaiveDate,
) -> Result<PriceSeries, PortfolioSimError> {
    let mut series = PriceSeries::new();

    for ticker in tickers {
        let points = data_port.fetch_prices(ticker, None, end_date)?;
        if points.is_empty() {
            return Err(PortfolioSimError::NoData {
                ticker: ticker.clone(),
            });
        }

        let first = points.iter().map(|p| p.date).min();
        let last = points.iter().map(|p| p.date).max();
        debug!(ticker = %ticker, ?first, ?last, "Fetched price history");
        info!(ticker = %ticker, observations = points.len(), "Loaded ticker");

        series.insert(ticker.clone(), points)?;
    }

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::PricePoint;
    use std::collections::HashMap;

    struct MockDataPort {
        data: HashMap<String, Vec<PricePoint>>,
    }

    impl DataPort for MockDataPort {
        fn fetch_prices(
            &self,
            ticker: &str,
            _start_date: Option<NaiveDate>,
            end_date: NaiveDate,
        ) -> Result<Vec<PricePoint>, PortfolioSimError> {
            self.data
                .get(ticker)
                .map(|points| points.iter().filter(|p| p.date <= end_date).cloned().collect())
                .ok_or_else(|| PortfolioSimError::NoData {
                    ticker: ticker.to_string(),
                })
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn port() -> MockDataPort {
        let mut data = HashMap::new();
        data.insert(
            "SPY".to_string(),
            vec![PricePoint::new(d(1), 500.0), PricePoint::new(d(4), 505.0)],
        );
        data.insert("AGG".to_string(), vec![PricePoint::new(d(4), 98.0)]);
        data.insert("LATE".to_string(), vec![PricePoint::new(d(20), 10.0)]);
        MockDataPort { data }
    }

    #[test]
    fn loads_every_ticker() {
        let tickers = vec!["SPY".to_string(), "AGG".to_string()];
        let series = load_universe(&port(), &tickers, d(31)).unwrap();
        assert!(series.contains("SPY"));
        assert!(series.contains("AGG"));
        assert_eq!(series.get("SPY").unwrap().len(), 2);
    }

    #[test]
    fn missing_ticker_is_an_error() {
        let tickers = vec!["SPY".to_string(), "XYZ".to_string()];
        let err = load_universe(&port(), &tickers, d(31)).unwrap_err();
        assert!(matches!(err, PortfolioSimError::NoData { ticker } if ticker == "XYZ"));
    }

    #[test]
    fn empty_history_before_end_is_an_error() {
        let tickers = vec!["LATE".to_string()];
        let err = load_universe(&port(), &tickers, d(10)).unwrap_err();
        assert!(matches!(err, PortfolioSimError::NoData { ticker } if ticker == "LATE"));
    }
}
