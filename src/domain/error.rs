//! Domain error types.

use chrono::NaiveDate;

/// A malformed `TICKER:weight` list.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeightsParseError {
    #[error("empty entry in weight list")]
    EmptyEntry,

    #[error("entry '{0}' is not of the form TICKER:weight")]
    MissingSeparator(String),

    #[error("weight for {ticker} is not a number: '{raw}'")]
    NotANumber { ticker: String, raw: String },

    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),
}

/// Top-level error type for portfolio-sim.
#[derive(Debug, thiserror::Error)]
pub enum PortfolioSimError {
    #[error("missing price for {ticker} on {date}")]
    DataGap { ticker: String, date: NaiveDate },

    #[error("invalid weight for {ticker}: {reason}")]
    InvalidWeights { ticker: String, reason: String },

    #[error("insufficient history for {ticker}: need {needed} observations, have {available}")]
    InsufficientHistory {
        ticker: String,
        needed: usize,
        available: usize,
    },

    #[error("insufficient data for {what}: have {len}, need at least {minimum}")]
    InsufficientData {
        what: String,
        len: usize,
        minimum: usize,
    },

    #[error("no price data for {ticker}")]
    NoData { ticker: String },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PortfolioSimError {
    pub fn invalid_config(section: &str, key: &str, reason: impl Into<String>) -> Self {
        PortfolioSimError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&PortfolioSimError> for std::process::ExitCode {
    fn from(err: &PortfolioSimError) -> Self {
        let code: u8 = match err {
            PortfolioSimError::Io(_) => 1,
            PortfolioSimError::ConfigParse { .. }
            | PortfolioSimError::ConfigMissing { .. }
            | PortfolioSimError::ConfigInvalid { .. } => 2,
            PortfolioSimError::DataSource { .. } => 3,
            PortfolioSimError::InvalidWeights { .. } => 4,
            PortfolioSimError::DataGap { .. }
            | PortfolioSimError::NoData { .. }
            | PortfolioSimError::InsufficientHistory { .. }
            | PortfolioSimError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
