//! Price data port trait.

use crate::domain::error::PortfolioSimError;
use crate::domain::price::PricePoint;
use chrono::NaiveDate;

pub trait DataPort {
    /// Adjusted closes for `ticker` up to `end_date`, oldest first.
    /// `start_date = None` returns all available history.
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortfolioSimError>;
}
