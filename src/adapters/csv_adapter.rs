//! CSV price directory adapter.
//!
//! One file per ticker, `<base>/<TICKER>.csv`, with a header row. The
//! `Date` column is required; `Adj Close` is preferred over `Close`.

use crate::domain::error::PortfolioSimError;
use crate::domain::price::PricePoint;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker))
    }
}

fn source_error(reason: String) -> PortfolioSimError {
    PortfolioSimError::DataSource { reason }
}

fn column_index(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    })
}

impl DataPort for CsvAdapter {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortfolioSimError> {
        let path = self.csv_path(ticker);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PortfolioSimError::NoData {
                ticker: ticker.to_string(),
            },
            _ => source_error(format!("failed to read {}: {}", path.display(), e)),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| source_error(format!("{}: bad header: {}", path.display(), e)))?
            .clone();
        let date_col = column_index(&headers, &["Date"])
            .ok_or_else(|| source_error(format!("{}: missing Date column", path.display())))?;
        let close_col = column_index(&headers, &["Adj Close", "Adj_Close", "Close"])
            .ok_or_else(|| source_error(format!("{}: missing Close column", path.display())))?;

        let mut points = Vec::new();
        let mut skipped = 0usize;

        for result in rdr.records() {
            let record = result.map_err(|e| source_error(format!("CSV parse error: {}", e)))?;

            let date_str = record
                .get(date_col)
                .ok_or_else(|| source_error("missing date value".into()))?;
            let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
                .map_err(|e| source_error(format!("invalid date '{}': {}", date_str, e)))?;

            if date > end_date || start_date.is_some_and(|s| date < s) {
                continue;
            }

            let raw = record.get(close_col).unwrap_or("").trim();
            if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
                skipped += 1;
                continue;
            }
            let close: f64 = raw
                .parse()
                .map_err(|e| source_error(format!("invalid close '{}' on {}: {}", raw, date, e)))?;

            points.push(PricePoint::new(date, close));
        }

        if skipped > 0 {
            debug!(ticker, skipped, "Skipped rows without a close");
        }

        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}
