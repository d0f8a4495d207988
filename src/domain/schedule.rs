//! Rebalance and contribution calendars.

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TradingFrequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl TradingFrequency {
    /// Bucket a date into its period; a new key marks a frequency boundary.
    fn period_key(self, date: NaiveDate) -> (i32, u32) {
        match self {
            TradingFrequency::Daily => (date.year(), date.ordinal()),
            TradingFrequency::Weekly => {
                let week = date.iso_week();
                (week.year(), week.week())
            }
            TradingFrequency::Monthly => (date.year(), date.month()),
            TradingFrequency::Quarterly => (date.year(), date.month0() / 3),
            TradingFrequency::Yearly => (date.year(), 0),
        }
    }

    /// Approximate trading days per period, used where no real calendar exists.
    pub fn trading_days(self) -> usize {
        match self {
            TradingFrequency::Daily => 1,
            TradingFrequency::Weekly => 5,
            TradingFrequency::Monthly => 21,
            TradingFrequency::Quarterly => 63,
            TradingFrequency::Yearly => 252,
        }
    }
}

impl FromStr for TradingFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(TradingFrequency::Daily),
            "weekly" => Ok(TradingFrequency::Weekly),
            "monthly" => Ok(TradingFrequency::Monthly),
            "quarterly" => Ok(TradingFrequency::Quarterly),
            "yearly" | "annually" => Ok(TradingFrequency::Yearly),
            other => Err(format!("unknown frequency '{other}'")),
        }
    }
}

impl fmt::Display for TradingFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TradingFrequency::Daily => "daily",
            TradingFrequency::Weekly => "weekly",
            TradingFrequency::Monthly => "monthly",
            TradingFrequency::Quarterly => "quarterly",
            TradingFrequency::Yearly => "yearly",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RebalanceReason {
    Scheduled,
    SignalTransition,
}

impl fmt::Display for RebalanceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceReason::Scheduled => write!(f, "SCHEDULED"),
            RebalanceReason::SignalTransition => write!(f, "SIGNAL_TRANSITION"),
        }
    }
}

/// First trading day of every period touched by `dates`, including the first date.
pub fn scheduled_dates(dates: &[NaiveDate], frequency: TradingFrequency) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut last_key = None;
    for &date in dates {
        let key = frequency.period_key(date);
        if last_key != Some(key) {
            out.push(date);
            last_key = Some(key);
        }
    }
    out
}

/// Contribution days: period boundaries, never the first day of the run.
pub fn contribution_dates(dates: &[NaiveDate], frequency: TradingFrequency) -> Vec<NaiveDate> {
    let mut out = scheduled_dates(dates, frequency);
    if !out.is_empty() {
        out.remove(0);
    }
    out
}

/// Merge scheduled dates with signal transitions.
///
/// A date flagged by both sources collapses to one `SignalTransition` event.
pub fn rebalance_schedule(
    dates: &[NaiveDate],
    frequency: TradingFrequency,
    transitions: &[NaiveDate],
) -> BTreeMap<NaiveDate, RebalanceReason> {
    let mut schedule: BTreeMap<NaiveDate, RebalanceReason> = scheduled_dates(dates, frequency)
        .into_iter()
        .map(|d| (d, RebalanceReason::Scheduled))
        .collect();
    for &date in transitions {
        schedule.insert(date, RebalanceReason::SignalTransition);
    }
    schedule
}
