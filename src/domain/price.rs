//! Adjusted-close price series and calendar alignment.
//!
//! `PriceSeries` holds what the data collaborator supplied, one ordered
//! sequence per ticker. `PriceTable` is the aligned, gap-free view the
//! engine works on: one shared trading calendar and one dense column per
//! ticker, with gaps resolved by the configured [`FillPolicy`].

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;

use super::error::PortfolioSimError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

#[derive(Debug, Clone)]
pub struct TickerPrices {
    pub ticker: String,
    pub points: Vec<PricePoint>,
    date_index: HashMap<NaiveDate, usize>,
}

impl TickerPrices {
    /// Sorts by date and rejects duplicate dates or non-positive prices.
    pub fn new(ticker: String, mut points: Vec<PricePoint>) -> Result<Self, PortfolioSimError> {
        points.sort_by_key(|p| p.date);
        for pair in points.windows(2) {
            if pair[0].date == pair[1].date {
                return Err(PortfolioSimError::DataSource {
                    reason: format!("duplicate date {} for {}", pair[0].date, ticker),
                });
            }
        }
        if let Some(bad) = points.iter().find(|p| !(p.close.is_finite() && p.close > 0.0)) {
            return Err(PortfolioSimError::DataSource {
                reason: format!("invalid price {} for {} on {}", bad.close, ticker, bad.date),
            });
        }
        let date_index = points
            .iter()
            .enumerate()
            .map(|(i, p)| (p.date, i))
            .collect();
        Ok(Self {
            ticker,
            points,
            date_index,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn close_on(&self, date: NaiveDate) -> Option<f64> {
        self.date_index.get(&date).map(|&i| self.points[i].close)
    }

    /// Most recent close on or before `date`.
    pub fn close_at_or_before(&self, date: NaiveDate) -> Option<f64> {
        let idx = self.points.partition_point(|p| p.date <= date);
        idx.checked_sub(1).map(|i| self.points[i].close)
    }
}

/// Prices per ticker as delivered by the data collaborator.
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    tickers: BTreeMap<String, TickerPrices>,
}

impl PriceSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        ticker: impl Into<String>,
        points: Vec<PricePoint>,
    ) -> Result<(), PortfolioSimError> {
        let ticker = ticker.into();
        let prices = TickerPrices::new(ticker.clone(), points)?;
        self.tickers.insert(ticker, prices);
        Ok(())
    }

    pub fn get(&self, ticker: &str) -> Option<&TickerPrices> {
        self.tickers.get(ticker)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.tickers.contains_key(ticker)
    }

    pub fn tickers(&self) -> impl Iterator<Item = &String> {
        self.tickers.keys()
    }
}

/// How a missing price for one ticker on a calendar date is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FillPolicy {
    #[default]
    ForwardFill,
    Fail,
}

impl FromStr for FillPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forward_fill" | "ffill" => Ok(FillPolicy::ForwardFill),
            "fail" => Ok(FillPolicy::Fail),
            other => Err(format!("unknown fill policy '{other}'")),
        }
    }
}

/// Sorted union of all dates carried by `tickers`, up to and including `end`.
pub fn build_unified_timeline(series: &PriceSeries, tickers: &[String], end: NaiveDate) -> Vec<NaiveDate> {
    let unique: BTreeSet<NaiveDate> = tickers
        .iter()
        .filter_map(|t| series.get(t))
        .flat_map(|tp| tp.points.iter().map(|p| p.date))
        .filter(|d| *d <= end)
        .collect();
    unique.into_iter().collect()
}

/// Dense, aligned closes on a shared trading calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl PriceTable {
    /// Align `tickers` onto one calendar ending at `end`.
    ///
    /// The calendar starts at the first date on which every ticker has a
    /// price, so no column ever needs a value from before its own history.
    pub fn align(
        series: &PriceSeries,
        tickers: &[String],
        end: NaiveDate,
        policy: FillPolicy,
    ) -> Result<Self, PortfolioSimError> {
        let mut first_common: Option<NaiveDate> = None;
        for ticker in tickers {
            let prices = series
                .get(ticker)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| PortfolioSimError::NoData {
                    ticker: ticker.clone(),
                })?;
            let first = prices.first_date().ok_or_else(|| PortfolioSimError::NoData {
                ticker: ticker.clone(),
            })?;
            first_common = Some(first_common.map_or(first, |d| d.max(first)));
        }

        let start = first_common.ok_or_else(|| PortfolioSimError::InsufficientData {
            what: "tickers".into(),
            len: 0,
            minimum: 1,
        })?;

        let dates: Vec<NaiveDate> = build_unified_timeline(series, tickers, end)
            .into_iter()
            .filter(|d| *d >= start)
            .collect();
        if dates.is_empty() {
            return Err(PortfolioSimError::InsufficientData {
                what: "trading calendar".into(),
                len: 0,
                minimum: 1,
            });
        }

        let mut columns = BTreeMap::new();
        for ticker in tickers {
            let Some(prices) = series.get(ticker) else {
                return Err(PortfolioSimError::NoData {
                    ticker: ticker.clone(),
                });
            };
            let mut column = Vec::with_capacity(dates.len());
            for &date in &dates {
                let close = match (prices.close_on(date), policy) {
                    (Some(close), _) => close,
                    (None, FillPolicy::ForwardFill) => prices.close_at_or_before(date).ok_or_else(|| {
                        PortfolioSimError::DataGap {
                            ticker: ticker.clone(),
                            date,
                        }
                    })?,
                    (None, FillPolicy::Fail) => {
                        return Err(PortfolioSimError::DataGap {
                            ticker: ticker.clone(),
                            date,
                        });
                    }
                };
                column.push(close);
            }
            columns.insert(ticker.clone(), column);
        }

        Ok(Self { dates, columns })
    }

    /// Build directly from aligned columns. Every column must match `dates` in length.
    pub fn from_columns(
        dates: Vec<NaiveDate>,
        columns: BTreeMap<String, Vec<f64>>,
    ) -> Result<Self, PortfolioSimError> {
        for (ticker, column) in &columns {
            if column.len() != dates.len() {
                return Err(PortfolioSimError::DataSource {
                    reason: format!(
                        "column {} has {} prices for {} dates",
                        ticker,
                        column.len(),
                        dates.len()
                    ),
                });
            }
        }
        Ok(Self { dates, columns })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn date(&self, idx: usize) -> NaiveDate {
        self.dates[idx]
    }

    /// Index of the first calendar date on or after `date`.
    pub fn index_on_or_after(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.dates.partition_point(|d| *d < date);
        (idx < self.dates.len()).then_some(idx)
    }

    pub fn tickers(&self) -> impl Iterator<Item = &String> {
        self.columns.keys()
    }

    pub fn column(&self, ticker: &str) -> Option<&[f64]> {
        self.columns.get(ticker).map(|c| c.as_slice())
    }

    pub fn price(&self, ticker: &str, idx: usize) -> Result<f64, PortfolioSimError> {
        self.columns
            .get(ticker)
            .and_then(|c| c.get(idx).copied())
            .ok_or_else(|| PortfolioSimError::DataGap {
                ticker: ticker.to_string(),
                date: self.dates.get(idx).copied().unwrap_or(NaiveDate::MIN),
            })
    }

    /// Simple daily returns of `ticker` over the `lookback` days ending at `idx`.
    pub fn trailing_returns(
        &self,
        ticker: &str,
        idx: usize,
        lookback: usize,
    ) -> Result<Vec<f64>, PortfolioSimError> {
        let column = self.column(ticker).ok_or_else(|| PortfolioSimError::NoData {
            ticker: ticker.to_string(),
        })?;
        if lookback == 0 || idx < lookback || idx >= column.len() {
            return Err(PortfolioSimError::InsufficientHistory {
                ticker: ticker.to_string(),
                needed: lookback + 1,
                available: (idx + 1).min(column.len()),
            });
        }
        Ok(column[idx - lookback..=idx]
            .windows(2)
            .map(|w| w[1] / w[0] - 1.0)
            .collect())
    }
}
