//! CLI integration tests: INI files and CSV price directories on disk.

mod common;

use clap::Parser;
use common::*;
use portfolio_sim::adapters::csv_adapter::CsvAdapter;
use portfolio_sim::adapters::file_config_adapter::FileConfigAdapter;
use portfolio_sim::cli::{self, Cli};
use portfolio_sim::domain::backtest::run_backtest;
use portfolio_sim::domain::error::PortfolioSimError;
use portfolio_sim::domain::universe::load_universe;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use tempfile::TempDir;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn write_csv(dir: &Path, ticker: &str, closes: &[f64]) {
    let days = trading_days(date(2023, 1, 2), closes.len());
    let mut body = String::from("Date,Open,High,Low,Close,Adj Close,Volume\n");
    for (d, c) in days.iter().zip(closes) {
        writeln!(body, "{d},{c},{c},{c},{c},{c},1000").unwrap();
    }
    std::fs::write(dir.join(format!("{ticker}.csv")), body).unwrap();
}

fn price_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let spy: Vec<f64> = (0..300)
        .map(|i| 400.0 + i as f64 * 0.5 + (i as f64 * 0.15).sin() * 12.0)
        .collect();
    write_csv(dir.path(), "SPY", &spy);
    write_csv(dir.path(), "AGG", &compounding(100.0, 0.0001, 300));
    write_csv(dir.path(), "SHV", &[110.0; 300]);
    dir
}

fn same_code(actual: ExitCode, expected: ExitCode) -> bool {
    format!("{actual:?}") == format!("{expected:?}")
}

fn run(args: &[&str]) -> ExitCode {
    cli::run(Cli::parse_from(std::iter::once("portfolio-sim").chain(args.iter().copied())))
}

const VALID_INI: &str = r#"
[portfolio]
weights = SPY:0.7, AGG:0.3
initial_value = 10000
start_date = earliest
end_date = 2024-06-30
cash_ticker = SHV
benchmark = SPY

[strategy]
trading_frequency = monthly
weighting = use_file_weights
ma_window = 50
ma_kind = sma

[contribution]
amount = 100
frequency = monthly

[simulation]
paths = 50
horizon_years = 1
seed = 3

[risk]
confidence = 0.95

[tuning]
ma_windows = 20, 50
select_counts = 0, 1
ma_kinds = sma, ema
max_drawdown_tolerance = 0.5
"#;

mod config_loading {
    use super::*;

    #[test]
    fn build_backtest_config_from_file() {
        let file = write_temp_ini(VALID_INI);
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();

        assert_eq!(config.end_date, date(2024, 6, 30));
        assert_eq!(config.start_date, None);
        assert_eq!(config.signal.window, 50);
        assert_eq!(config.required_tickers(), vec!["AGG", "SHV", "SPY"]);
    }

    #[test]
    fn build_sweep_config_reads_grid() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let base = cli::build_backtest_config(&adapter).unwrap();
        let sweep = cli::build_sweep_config(&adapter, &base).unwrap();

        assert_eq!(sweep.ma_windows, vec![20, 50]);
        assert_eq!(sweep.select_counts, vec![0, 1]);
        assert_eq!(sweep.kinds.len(), 2);
        assert_eq!(sweep.max_drawdown_tolerance, 0.5);
    }

    #[test]
    fn missing_config_file_is_config_error() {
        let code = cli::load_config(Path::new("/nonexistent/portfolio.ini")).unwrap_err();
        assert!(same_code(code, ExitCode::from(2)));
    }
}

mod pipeline {
    use super::*;
    use portfolio_sim::domain::backtest::current_allocation;
    use portfolio_sim::domain::signal::MarketState;

    #[test]
    fn current_allocation_from_csv_directory() {
        let dir = price_dir();
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        let port = CsvAdapter::new(dir.path().to_path_buf());

        let series = load_universe(&port, &config.required_tickers(), config.end_date).unwrap();
        let now = current_allocation(&series, &config).unwrap();

        assert_eq!(now.signal.date, trading_days(date(2023, 1, 2), 300)[299]);
        assert!((now.target.total() - 1.0).abs() < 1e-9);
        if now.signal.state == MarketState::OutOfMarket {
            assert_eq!(now.target.get("SHV"), Some(1.0));
        }
    }

    #[test]
    fn csv_directory_feeds_backtest() {
        let dir = price_dir();
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        let port = CsvAdapter::new(dir.path().to_path_buf());

        let series = load_universe(&port, &config.required_tickers(), config.end_date).unwrap();
        let result = run_backtest(&series, &config).unwrap();

        // 50-day SMA warm-up
        assert_eq!(result.states.len(), 300 - 49);
        assert!(result.total_contributions > 0.0);
        assert!(result.benchmark.is_some());
        assert!(result.states.iter().all(|s| s.value > 0.0));
    }

    #[test]
    fn missing_csv_reports_no_data() {
        let dir = price_dir();
        std::fs::remove_file(dir.path().join("AGG.csv")).unwrap();
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        let port = CsvAdapter::new(dir.path().to_path_buf());

        let err = load_universe(&port, &config.required_tickers(), config.end_date).unwrap_err();
        assert!(matches!(err, PortfolioSimError::NoData { ticker } if ticker == "AGG"));
    }
}

mod commands {
    use super::*;

    #[test]
    fn validate_accepts_good_config() {
        let file = write_temp_ini(VALID_INI);
        let code = run(&["validate", "--config", file.path().to_str().unwrap()]);
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn validate_rejects_bad_config() {
        let file = write_temp_ini("[portfolio]\nweights = SPY:0.5\nend_date = 2024-06-30\n[risk]\nconfidence = 2\n");
        let code = run(&["validate", "--config", file.path().to_str().unwrap()]);
        assert!(same_code(code, ExitCode::from(2)));
    }

    #[test]
    fn validate_rejects_negative_weights() {
        let file = write_temp_ini("[portfolio]\nweights = SPY:-1\nend_date = 2024-06-30\n");
        let code = run(&["validate", "--config", file.path().to_str().unwrap()]);
        assert!(same_code(code, ExitCode::from(4)));
    }

    #[test]
    fn backtest_command_succeeds() {
        let dir = price_dir();
        let file = write_temp_ini(VALID_INI);
        let code = run(&[
            "backtest",
            "--config",
            file.path().to_str().unwrap(),
            "--prices",
            dir.path().to_str().unwrap(),
        ]);
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn simulate_command_succeeds() {
        let dir = price_dir();
        let file = write_temp_ini(VALID_INI);
        let code = run(&[
            "simulate",
            "--config",
            file.path().to_str().unwrap(),
            "--prices",
            dir.path().to_str().unwrap(),
        ]);
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn tune_command_succeeds() {
        let dir = price_dir();
        let file = write_temp_ini(VALID_INI);
        let code = run(&[
            "tune",
            "--config",
            file.path().to_str().unwrap(),
            "--prices",
            dir.path().to_str().unwrap(),
        ]);
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn signals_command_succeeds() {
        let dir = price_dir();
        let file = write_temp_ini(VALID_INI);
        let code = run(&[
            "signals",
            "--config",
            file.path().to_str().unwrap(),
            "--prices",
            dir.path().to_str().unwrap(),
        ]);
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn signals_with_two_averages_and_fractional_horizon() {
        let dir = price_dir();
        let ini = VALID_INI
            .replace("ma_window = 50", "ma_window = 20\nslow_window = 100")
            .replace("horizon_years = 1", "horizon_years = 0.5");
        let file = write_temp_ini(&ini);
        for command in ["signals", "simulate"] {
            let code = run(&[
                command,
                "--config",
                file.path().to_str().unwrap(),
                "--prices",
                dir.path().to_str().unwrap(),
            ]);
            assert!(same_code(code, ExitCode::SUCCESS), "{command}");
        }
    }

    #[test]
    fn slow_window_not_longer_is_config_error() {
        let dir = price_dir();
        let ini = VALID_INI.replace("ma_window = 50", "ma_window = 50\nslow_window = 30");
        let file = write_temp_ini(&ini);
        let code = run(&[
            "signals",
            "--config",
            file.path().to_str().unwrap(),
            "--prices",
            dir.path().to_str().unwrap(),
        ]);
        assert!(same_code(code, ExitCode::from(2)));
    }

    #[test]
    fn price_dir_from_config() {
        let dir = price_dir();
        let ini = format!("{VALID_INI}\n[data]\nprice_dir = {}\n", dir.path().display());
        let file = write_temp_ini(&ini);
        let code = run(&["backtest", "--config", file.path().to_str().unwrap()]);
        assert!(same_code(code, ExitCode::SUCCESS));
    }

    #[test]
    fn missing_price_dir_is_config_error() {
        let file = write_temp_ini(VALID_INI);
        let code = run(&["backtest", "--config", file.path().to_str().unwrap()]);
        assert!(same_code(code, ExitCode::from(2)));
    }

    #[test]
    fn missing_ticker_file_is_data_error() {
        let dir = price_dir();
        std::fs::remove_file(dir.path().join("SHV.csv")).unwrap();
        let file = write_temp_ini(VALID_INI);
        let code = run(&[
            "backtest",
            "--config",
            file.path().to_str().unwrap(),
            "--prices",
            dir.path().to_str().unwrap(),
        ]);
        assert!(same_code(code, ExitCode::from(5)));
    }
}
