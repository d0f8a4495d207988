//! Core domain types and logic.

pub mod weights;
pub mod price;
pub mod indicator;
pub mod signal;
pub mod weighting;
pub mod schedule;
pub mod portfolio;
pub mod backtest;
pub mod comparison;
pub mod metrics;
pub mod monte_carlo;
pub mod tuning;
pub mod universe;
pub mod config_validation;
pub mod error;
