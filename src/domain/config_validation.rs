//! Configuration validation.
//!
//! Validates all config fields before any price data is touched. The
//! `read_*` helpers are shared with the config builders in the CLI so a
//! value is parsed the same way whether it is validated or used.

use crate::domain::error::PortfolioSimError;
use crate::domain::indicator::MovingAverageKind;
use crate::domain::monte_carlo::STEPS_PER_YEAR;
use crate::domain::price::FillPolicy;
use crate::domain::schedule::TradingFrequency;
use crate::domain::weighting::WeightingStrategy;
use crate::domain::weights::{parse_weights, AssetWeight};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::str::FromStr;

/// A malformed comma-separated list value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ListParseError {
    #[error("empty entry in list")]
    EmptyEntry,

    #[error("'{0}' is not a valid entry")]
    Invalid(String),
}

/// Parse `a, b, c` into values of `T`.
pub fn parse_list<T: FromStr>(input: &str) -> Result<Vec<T>, ListParseError> {
    input
        .split(',')
        .map(|token| {
            let trimmed = token.trim();
            if trimmed.is_empty() {
                return Err(ListParseError::EmptyEntry);
            }
            trimmed
                .parse()
                .map_err(|_| ListParseError::Invalid(trimmed.to_string()))
        })
        .collect()
}

pub fn validate_all(config: &dyn ConfigPort) -> Result<(), PortfolioSimError> {
    validate_portfolio_config(config)?;
    validate_strategy_config(config)?;
    validate_contribution_config(config)?;
    validate_risk_config(config)?;
    validate_simulation_config(config)?;
    validate_tuning_config(config)?;
    Ok(())
}

pub fn validate_portfolio_config(config: &dyn ConfigPort) -> Result<(), PortfolioSimError> {
    read_weights(config, "weights")?.ok_or_else(|| PortfolioSimError::ConfigMissing {
        section: "portfolio".into(),
        key: "weights".into(),
    })?;
    read_weights(config, "out_of_market")?;

    if read_double(config, "portfolio", "initial_value", 10_000.0)? <= 0.0 {
        return Err(PortfolioSimError::invalid_config(
            "portfolio",
            "initial_value",
            "initial_value must be positive",
        ));
    }

    let end = read_end_date(config)?;
    if let Some(start) = read_start_date(config)? {
        if start >= end {
            return Err(PortfolioSimError::invalid_config(
                "portfolio",
                "start_date",
                "start_date must be before end_date",
            ));
        }
    }
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), PortfolioSimError> {
    read_enum::<TradingFrequency>(config, "strategy", "trading_frequency", TradingFrequency::Monthly)?;
    read_enum::<WeightingStrategy>(config, "strategy", "weighting", WeightingStrategy::UseFileWeights)?;
    read_enum::<MovingAverageKind>(config, "strategy", "ma_kind", MovingAverageKind::Sma)?;
    read_enum::<FillPolicy>(config, "strategy", "fill_policy", FillPolicy::ForwardFill)?;

    let ma_window = read_int(config, "strategy", "ma_window", 200)?;
    if ma_window < 1 {
        return Err(PortfolioSimError::invalid_config(
            "strategy",
            "ma_window",
            "ma_window must be at least 1",
        ));
    }
    let slow_window = read_int(config, "strategy", "slow_window", 0)?;
    if slow_window != 0 && slow_window <= ma_window {
        return Err(PortfolioSimError::invalid_config(
            "strategy",
            "slow_window",
            "slow_window must be longer than ma_window",
        ));
    }
    if read_int(config, "strategy", "momentum_select", 0)? < 0 {
        return Err(PortfolioSimError::invalid_config(
            "strategy",
            "momentum_select",
            "momentum_select must be non-negative",
        ));
    }
    if let Some(lookbacks) = read_list::<usize>(config, "strategy", "momentum_lookbacks")? {
        if lookbacks.contains(&0) {
            return Err(PortfolioSimError::invalid_config(
                "strategy",
                "momentum_lookbacks",
                "lookbacks must be positive",
            ));
        }
    }
    if read_int(config, "strategy", "volatility_lookback", 63)? < 2 {
        return Err(PortfolioSimError::invalid_config(
            "strategy",
            "volatility_lookback",
            "volatility_lookback must be at least 2",
        ));
    }
    if read_double(config, "strategy", "volatility_floor", 1e-8)? <= 0.0 {
        return Err(PortfolioSimError::invalid_config(
            "strategy",
            "volatility_floor",
            "volatility_floor must be positive",
        ));
    }
    Ok(())
}

pub fn validate_contribution_config(config: &dyn ConfigPort) -> Result<(), PortfolioSimError> {
    if read_double(config, "contribution", "amount", 0.0)? < 0.0 {
        return Err(PortfolioSimError::invalid_config(
            "contribution",
            "amount",
            "amount must be non-negative",
        ));
    }
    read_enum::<TradingFrequency>(config, "contribution", "frequency", TradingFrequency::Monthly)?;
    Ok(())
}

pub fn validate_risk_config(config: &dyn ConfigPort) -> Result<(), PortfolioSimError> {
    let confidence = read_double(config, "risk", "confidence", 0.95)?;
    if confidence <= 0.0 || confidence >= 1.0 {
        return Err(PortfolioSimError::invalid_config(
            "risk",
            "confidence",
            "confidence must be between 0 and 1",
        ));
    }
    let rate = read_double(config, "risk", "risk_free_rate", 0.0)?;
    if !(0.0..1.0).contains(&rate) {
        return Err(PortfolioSimError::invalid_config(
            "risk",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

pub fn validate_simulation_config(config: &dyn ConfigPort) -> Result<(), PortfolioSimError> {
    if read_int(config, "simulation", "paths", 1000)? < 1 {
        return Err(PortfolioSimError::invalid_config(
            "simulation",
            "paths",
            "paths must be at least 1",
        ));
    }
    let horizon_years = read_double(config, "simulation", "horizon_years", 10.0)?;
    let horizon_steps = (horizon_years * STEPS_PER_YEAR as f64).round();
    if !horizon_steps.is_finite() || horizon_steps < 1.0 {
        return Err(PortfolioSimError::invalid_config(
            "simulation",
            "horizon_years",
            "horizon_years must cover at least one trading day",
        ));
    }
    if read_int(config, "simulation", "seed", 42)? < 0 {
        return Err(PortfolioSimError::invalid_config(
            "simulation",
            "seed",
            "seed must be non-negative",
        ));
    }
    if let Some(percentiles) = read_list::<f64>(config, "simulation", "percentiles")? {
        if percentiles.iter().any(|p| !(0.0..=100.0).contains(p)) {
            return Err(PortfolioSimError::invalid_config(
                "simulation",
                "percentiles",
                "percentiles must be between 0 and 100",
            ));
        }
    }
    Ok(())
}

pub fn validate_tuning_config(config: &dyn ConfigPort) -> Result<(), PortfolioSimError> {
    if let Some(windows) = read_list::<usize>(config, "tuning", "ma_windows")? {
        if windows.contains(&0) {
            return Err(PortfolioSimError::invalid_config(
                "tuning",
                "ma_windows",
                "windows must be positive",
            ));
        }
    }
    read_list::<usize>(config, "tuning", "select_counts")?;
    read_list::<MovingAverageKind>(config, "tuning", "ma_kinds")?;
    let tolerance = read_double(config, "tuning", "max_drawdown_tolerance", 1.0)?;
    if tolerance <= 0.0 || tolerance > 1.0 {
        return Err(PortfolioSimError::invalid_config(
            "tuning",
            "max_drawdown_tolerance",
            "max_drawdown_tolerance must be in (0, 1]",
        ));
    }
    Ok(())
}

pub fn read_int(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> Result<i64, PortfolioSimError> {
    match config.get_non_empty(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| PortfolioSimError::invalid_config(section, key, format!("'{raw}' is not an integer"))),
    }
}

pub fn read_double(config: &dyn ConfigPort, section: &str, key: &str, default: f64) -> Result<f64, PortfolioSimError> {
    match config.get_non_empty(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| PortfolioSimError::invalid_config(section, key, format!("'{raw}' is not a number"))),
    }
}

pub fn read_enum<T>(config: &dyn ConfigPort, section: &str, key: &str, default: T) -> Result<T, PortfolioSimError>
where
    T: FromStr<Err = String>,
{
    match config.get_non_empty(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|reason: String| PortfolioSimError::invalid_config(section, key, reason)),
    }
}

pub fn read_list<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<Vec<T>>, PortfolioSimError> {
    config
        .get_non_empty(section, key)
        .map(|raw| parse_list(&raw).map_err(|e| PortfolioSimError::invalid_config(section, key, e.to_string())))
        .transpose()
}

/// `[portfolio] <key>` as a weight mapping; `None` when unset.
pub fn read_weights(config: &dyn ConfigPort, key: &str) -> Result<Option<AssetWeight>, PortfolioSimError> {
    let Some(raw) = config.get_non_empty("portfolio", key) else {
        return Ok(None);
    };
    let pairs = parse_weights(&raw).map_err(|e| PortfolioSimError::invalid_config("portfolio", key, e.to_string()))?;
    let weights = AssetWeight::from_pairs(pairs)?;
    if weights.total() <= 0.0 {
        return Err(PortfolioSimError::InvalidWeights {
            ticker: "*".into(),
            reason: format!("[portfolio] {key} has no positive weight"),
        });
    }
    Ok(Some(weights))
}

pub fn read_end_date(config: &dyn ConfigPort) -> Result<NaiveDate, PortfolioSimError> {
    let raw = config
        .get_non_empty("portfolio", "end_date")
        .ok_or_else(|| PortfolioSimError::ConfigMissing {
            section: "portfolio".into(),
            key: "end_date".into(),
        })?;
    parse_date(&raw, "end_date")
}

/// `None` for `earliest` or when unset.
pub fn read_start_date(config: &dyn ConfigPort) -> Result<Option<NaiveDate>, PortfolioSimError> {
    match config.get_non_empty("portfolio", "start_date") {
        None => Ok(None),
        Some(raw) if raw.eq_ignore_ascii_case("earliest") => Ok(None),
        Some(raw) => parse_date(&raw, "start_date").map(Some),
    }
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, PortfolioSimError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        PortfolioSimError::invalid_config("portfolio", field, format!("invalid {} format, expected YYYY-MM-DD", field))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const BASE: &str = "[portfolio]\nweights = SPY:0.6, AGG:0.4\nend_date = 2024-12-31\n";

    fn with(extra: &str) -> FileConfigAdapter {
        make_config(&format!("{BASE}{extra}"))
    }

    fn invalid_key(err: PortfolioSimError) -> String {
        match err {
            PortfolioSimError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn minimal_config_passes() {
        assert!(validate_all(&with("")).is_ok());
    }

    #[test]
    fn full_config_passes() {
        let config = make_config(
            r#"
[portfolio]
weights = SPY:0.5, QQQ:0.3, EFA:0.2
initial_value = 50000
start_date = 2010-01-01
end_date = 2024-12-31
cash_ticker = SHV
bond_ticker = AGG
benchmark = SPY
out_of_market = GLD:0.5, TLT:0.5

[strategy]
trading_frequency = quarterly
weighting = risk_contribution
ma_window = 150
ma_kind = ema
threshold_asset = SPY
asset_filter = true
momentum_select = 2
momentum_lookbacks = 21, 63, 126
remove_negative_momentum = true
volatility_lookback = 40
fill_policy = fail

[contribution]
amount = 500
frequency = monthly

[simulation]
paths = 2000
horizon_years = 20
seed = 7
percentiles = 10, 50, 90

[risk]
confidence = 0.99
risk_free_rate = 0.02

[tuning]
ma_windows = 50, 100, 200
select_counts = 0, 1, 2
max_drawdown_tolerance = 0.3
"#,
        );
        assert!(validate_all(&config).is_ok());
    }

    #[test]
    fn missing_weights_fails() {
        let config = make_config("[portfolio]\nend_date = 2024-12-31\n");
        let err = validate_all(&config).unwrap_err();
        assert!(matches!(err, PortfolioSimError::ConfigMissing { key, .. } if key == "weights"));
    }

    #[test]
    fn malformed_weights_fail() {
        let config = make_config("[portfolio]\nweights = SPY 0.6\nend_date = 2024-12-31\n");
        assert_eq!(invalid_key(validate_all(&config).unwrap_err()), "weights");
    }

    #[test]
    fn negative_weight_is_invalid_weights() {
        let config = make_config("[portfolio]\nweights = SPY:-0.6\nend_date = 2024-12-31\n");
        let err = validate_all(&config).unwrap_err();
        assert!(matches!(err, PortfolioSimError::InvalidWeights { ticker, .. } if ticker == "SPY"));
    }

    #[test]
    fn all_zero_weights_fail() {
        let config = make_config("[portfolio]\nweights = SPY:0\nend_date = 2024-12-31\n");
        assert!(matches!(
            validate_all(&config).unwrap_err(),
            PortfolioSimError::InvalidWeights { .. }
        ));
    }

    #[test]
    fn missing_end_date_fails() {
        let config = make_config("[portfolio]\nweights = SPY:1\n");
        let err = validate_all(&config).unwrap_err();
        assert!(matches!(err, PortfolioSimError::ConfigMissing { key, .. } if key == "end_date"));
    }

    #[test]
    fn start_after_end_fails() {
        let err = validate_all(&with("start_date = 2025-01-01\n")).unwrap_err();
        assert_eq!(invalid_key(err), "start_date");
    }

    #[test]
    fn earliest_start_accepted() {
        let config = with("start_date = earliest\n");
        assert!(validate_all(&config).is_ok());
        assert_eq!(read_start_date(&config).unwrap(), None);
    }

    #[test]
    fn bad_date_format_fails() {
        let config = make_config("[portfolio]\nweights = SPY:1\nend_date = 31/12/2024\n");
        assert_eq!(invalid_key(validate_all(&config).unwrap_err()), "end_date");
    }

    #[test]
    fn initial_value_must_be_positive() {
        let err = validate_all(&with("initial_value = 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "initial_value");
    }

    #[test]
    fn unknown_frequency_fails() {
        let err = validate_all(&with("[strategy]\ntrading_frequency = hourly\n")).unwrap_err();
        assert_eq!(invalid_key(err), "trading_frequency");
    }

    #[test]
    fn unknown_weighting_fails() {
        let err = validate_all(&with("[strategy]\nweighting = magic\n")).unwrap_err();
        assert_eq!(invalid_key(err), "weighting");
    }

    #[test]
    fn ma_window_zero_fails() {
        let err = validate_all(&with("[strategy]\nma_window = 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "ma_window");
    }

    #[test]
    fn slow_window_must_exceed_ma_window() {
        let err = validate_all(&with("[strategy]\nma_window = 50\nslow_window = 50\n")).unwrap_err();
        assert_eq!(invalid_key(err), "slow_window");
        assert!(validate_all(&with("[strategy]\nma_window = 50\nslow_window = 200\n")).is_ok());
    }

    #[test]
    fn non_numeric_int_fails() {
        let err = validate_all(&with("[strategy]\nma_window = long\n")).unwrap_err();
        assert_eq!(invalid_key(err), "ma_window");
    }

    #[test]
    fn zero_lookback_fails() {
        let err = validate_all(&with("[strategy]\nmomentum_lookbacks = 21, 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "momentum_lookbacks");
    }

    #[test]
    fn negative_contribution_fails() {
        let err = validate_all(&with("[contribution]\namount = -5\n")).unwrap_err();
        assert_eq!(invalid_key(err), "amount");
    }

    #[test]
    fn confidence_out_of_range_fails() {
        let err = validate_all(&with("[risk]\nconfidence = 1.0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "confidence");
    }

    #[test]
    fn risk_free_rate_negative_fails() {
        let err = validate_all(&with("[risk]\nrisk_free_rate = -0.01\n")).unwrap_err();
        assert_eq!(invalid_key(err), "risk_free_rate");
    }

    #[test]
    fn zero_paths_fails() {
        let err = validate_all(&with("[simulation]\npaths = 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "paths");
    }

    #[test]
    fn fractional_horizon_passes() {
        assert!(validate_all(&with("[simulation]\nhorizon_years = 2.5\n")).is_ok());
    }

    #[test]
    fn horizon_shorter_than_a_day_fails() {
        let err = validate_all(&with("[simulation]\nhorizon_years = 0.001\n")).unwrap_err();
        assert_eq!(invalid_key(err), "horizon_years");
        let err = validate_all(&with("[simulation]\nhorizon_years = -3\n")).unwrap_err();
        assert_eq!(invalid_key(err), "horizon_years");
    }

    #[test]
    fn percentile_out_of_range_fails() {
        let err = validate_all(&with("[simulation]\npercentiles = 5, 150\n")).unwrap_err();
        assert_eq!(invalid_key(err), "percentiles");
    }

    #[test]
    fn tuning_tolerance_range() {
        let err = validate_all(&with("[tuning]\nmax_drawdown_tolerance = 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "max_drawdown_tolerance");
    }

    #[test]
    fn parse_list_values() {
        assert_eq!(parse_list::<usize>("21, 63,126").unwrap(), vec![21, 63, 126]);
        assert_eq!(parse_list::<usize>("21,,63"), Err(ListParseError::EmptyEntry));
        assert_eq!(
            parse_list::<usize>("21,x"),
            Err(ListParseError::Invalid("x".into()))
        );
    }
}
